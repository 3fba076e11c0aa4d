// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # cilprobe
//!
//! A CIL method body rewriter for code coverage profilers. Built in pure Rust, `cilprobe`
//! decodes the method bodies a .NET runtime hands to a profiler at JIT time, inserts probe
//! instructions at statement and branch locations, and encodes the result back into the
//! exact layout the runtime expects.
//!
//! ## Features
//!
//! - **Complete opcode table** - Every ECMA-335 Partition III operation, with operand classes
//! - **Tiny and fat bodies** - Both header shapes, small and fat exception sections
//! - **Stable references** - Branches and exception regions keep pointing at the right code
//!   while probes are inserted around it
//! - **Branch normalization** - Short branches are widened once so insertions never overflow
//!   a displacement
//! - **Idempotent rewriting** - Already instrumented bodies are detected and left alone
//! - **Coverage policy** - Statement and branch path probes, managed or native callbacks
//!
//! ## Quick Start
//!
//! ```rust
//! use cilprobe::prelude::*;
//!
//! // tiny header, code: ldarg.0; brtrue.s +1; nop; ret
//! let mut method = Method::decode(&[0x16, 0x02, 0x2D, 0x01, 0x00, 0x2A])?;
//!
//! let probe = Probe::Managed { method: Token::new(0x0A00_0001) };
//! method.insert_at_original_offset(4, &probe.sequence(7))?;
//!
//! let mut body = vec![0u8; method.method_size()];
//! method.write(&mut body)?;
//! println!("{}", Method::decode(&body)?);
//! # Ok::<(), cilprobe::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`] - Bounds-checked little-endian read and write cursors
//! - [`assembly`] - The operation table and the instruction model
//! - [`metadata`] - Tokens, method headers, data sections and raw exception clauses
//! - [`rewriter`] - The mutable method model: decode, insert, lay out, encode
//! - [`coverage`] - Probe placement policy and the per-method compilation workflow
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Standards Compliance
//!
//! `cilprobe` implements the method body format of the **ECMA-335 specification** (6th
//! edition), Partition II section 25.4, and the instruction set of Partition III.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). A body that cannot be decoded or an
//! offset that does not resolve to an instruction is an error, never a panic:
//!
//! ```rust
//! use cilprobe::{Error, rewriter::Method};
//!
//! // br.s +1 jumps into the middle of ldc.i4.s
//! match Method::decode(&[0x12, 0x2B, 0x01, 0x1F, 0x05]) {
//!     Err(Error::InstructionNotFound(offset)) => assert_eq!(offset, 3),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```
//!
//! ## Development and Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//! cargo +nightly fuzz run method --release
//! ```
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use cilprobe::prelude::*;
///
/// let method = Method::decode(&[0x06, 0x2A])?;
/// assert_eq!(method.instructions().next().map(|i| i.opcode), Some(OpCode::Ret));
/// # Ok::<(), cilprobe::Error>(())
/// ```
pub mod prelude;

/// Bounds-checked byte cursors.
///
/// [`file::parser::Parser`] reads and [`file::writer::Writer`] writes little-endian
/// primitives through the [`file::io::CilIO`] trait.
pub mod file;

/// The CIL operation table and the instruction model.
///
/// # Key Types
///
/// - [`assembly::OpCode`] - Every operation, with mnemonic, encoding, operand class and flow
/// - [`assembly::Instruction`] - One decoded or injected instruction
/// - [`assembly::InstructionId`] - Stable handle to an instruction inside a method
pub mod assembly;

/// Metadata level building blocks of a method body.
///
/// - [`metadata::token`] - Metadata tokens
/// - [`metadata::method`] - Headers, data sections and exception clauses (ECMA-335 II.25.4)
pub mod metadata;

/// Mutable method model.
///
/// See [`rewriter::Method`] for the decode, insert and encode workflow.
pub mod rewriter;

/// Coverage instrumentation policy and compilation-event handling.
pub mod coverage;

/// `cilprobe` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilprobe` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

/// Little-endian read cursor over a byte slice.
///
/// See [`file::parser::Parser`].
pub use file::parser::Parser;
