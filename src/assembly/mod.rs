//! CIL operations and the instruction model built on top of them.
//!
//! # Key Components
//!
//! - [`OpCode`] / [`Operation`] - The static operation table
//! - [`Instruction`] - One decoded or injected instruction
//! - [`InstructionId`] - Stable handle to an instruction owned by a [`crate::rewriter::Method`]

mod instruction;
mod operations;

pub use instruction::*;
pub use operations::*;
