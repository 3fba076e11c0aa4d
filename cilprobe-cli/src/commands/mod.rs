pub mod common;
pub mod dump;
pub mod instrument;
