//! Bounds-checked cursors over raw method body buffers.
//!
//! # Key Components
//!
//! - [`io`] - Little-endian primitive codec shared by both cursors
//! - [`parser`] - Read cursor used while decoding
//! - [`writer`] - Write cursor used while encoding into a host-supplied buffer

pub mod io;
pub mod parser;
pub mod writer;
