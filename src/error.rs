use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which covers every failure the rewriting engine and the
/// coverage layer built on top of it can report.
///
/// # Error Categories
///
/// ## Structural Errors
/// - [`Error::Malformed`] - The method body violates the binary layout the engine expects
/// - [`Error::OutOfBounds`] - A cursor read or write went past the end of its buffer
/// - [`Error::Empty`] - An empty method body was provided
/// - [`Error::UnknownOpcode`] - The code stream contains an opcode that is not defined
/// - [`Error::InstructionNotFound`] - An offset did not resolve to an instruction boundary
///
/// Structural errors mean the input was corrupt or a precondition of the engine was
/// violated. The engine never continues with a half-resolved instruction graph, since the
/// resulting body could crash the host runtime.
///
/// ## Host Interaction Errors
/// - [`Error::Host`] - Fetching a body, resolving a probe, or allocating a buffer failed
/// - [`Error::PointsUnavailable`] - The instrumentation point request failed
/// - [`Error::LockError`] - A shared visit buffer could not be locked
///
/// Host interaction errors are local to a single method: the method is compiled
/// unmodified and nothing else is affected.
///
/// # Examples
///
/// ```rust
/// use cilprobe::{Error, rewriter::Method};
///
/// match Method::decode(&[]) {
///     Err(Error::Empty) => {}
///     other => panic!("unexpected result: {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The method body is damaged and could not be processed.
    ///
    /// The error includes the source location where the malformation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted on a read or write cursor.
    #[error("Out of Bound access would have occurred - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// The code stream contains an opcode that is not part of the instruction set.
    ///
    /// Two-byte opcodes are reported with their `0xFE` prefix in the high byte.
    #[error("Unknown opcode 0x{0:04X}")]
    UnknownOpcode(u16),

    /// No instruction starts at the requested offset.
    ///
    /// Raised for branch targets, exception region boundaries and insertion points that
    /// fall in the middle of an instruction or outside the method body.
    #[error("No instruction found at offset 0x{0:04X}")]
    InstructionNotFound(i64),

    /// A call into the host runtime failed.
    ///
    /// Covers fetching function and module information, reading the original body,
    /// resolving the probe for a module, allocating the new body and handing it back.
    #[error("Host call failed - {0}")]
    Host(String),

    /// The instrumentation points for a method could not be obtained.
    #[error("Instrumentation points unavailable - {0}")]
    PointsUnavailable(String),

    /// Failed to lock target.
    ///
    /// This error occurs when a shared visit buffer was poisoned by a panicking writer.
    #[error("Failed to lock target")]
    LockError,
}

impl Error {
    /// Returns `true` if this error was caused by the host or the point source rather
    /// than by the structure of the method body.
    #[must_use]
    pub fn is_host_failure(&self) -> bool {
        matches!(
            self,
            Error::Host(_) | Error::PointsUnavailable(_) | Error::LockError
        )
    }
}
