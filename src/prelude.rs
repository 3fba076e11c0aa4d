//! # cilprobe Prelude
//!
//! This module provides a convenient prelude for the most commonly used types from the
//! cilprobe library. Import this module to get quick access to the essential types for
//! method body rewriting and coverage instrumentation.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilprobe operations
pub use crate::Error;

/// The result type used throughout cilprobe
pub use crate::Result;

/// Low-level parsing cursor
pub use crate::Parser;

// ================================================================================================
// Instruction Model
// ================================================================================================

/// Operations and instructions
pub use crate::assembly::{FlowType, Instruction, InstructionId, OpCode, OperandKind};

/// Metadata token type
pub use crate::metadata::token::Token;

/// Exception clause kinds
pub use crate::metadata::method::ExceptionHandlerKind;

// ================================================================================================
// Rewriting
// ================================================================================================

/// The mutable method model and its exception regions
pub use crate::rewriter::{ExceptionRegion, Method};

// ================================================================================================
// Coverage
// ================================================================================================

/// Probe placement
pub use crate::coverage::{
    instrument, is_already_instrumented, BranchPoint, Instrumentation, InstrumentationConfig,
    InstrumentationPoints, PointerWidth, Probe, ProbeStyle, SequencePoint,
};

/// Compilation-event handling
pub use crate::coverage::{
    CoverageSession, FunctionId, FunctionInfo, ModuleId, Outcome, PointSource, RuntimeHost,
    VisitQueue, VisitSink,
};
