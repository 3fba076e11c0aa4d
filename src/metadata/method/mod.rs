//! Method body headers, data sections and exception clauses.
//!
//! These types describe a method body the way it is laid out in bytes. They are consumed
//! by [`crate::rewriter::Method`], which binds the offsets found here to instructions.

mod body;
mod exceptions;
mod types;

pub use body::*;
pub use exceptions::*;
pub use types::*;
