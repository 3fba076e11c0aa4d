//! Metadata values that appear inside CIL method bodies.
//!
//! # Key Components
//!
//! - [`token`] - Metadata table row references carried as operands
//! - [`method`] - Method headers, data sections and exception clauses

/// Metadata tokens
pub mod token;
/// Method body headers and exception clauses
pub mod method;
