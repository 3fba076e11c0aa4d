//! Coverage instrumentation on top of the rewriter.
//!
//! This module turns a list of requested probe locations into rewritten method bodies:
//!
//! - [`crate::coverage::InstrumentationPoints`] carries the statement and branch points a
//!   collector asks for
//! - [`crate::coverage::Probe`] builds the instruction sequence that reports a point
//! - [`crate::coverage::instrument`] places the probes in a [`crate::rewriter::Method`]
//! - [`crate::coverage::CoverageSession`] drives the whole exchange with the runtime for one
//!   compilation event at a time
//! - [`crate::coverage::VisitQueue`] batches the ids reported at run time
//!
//! # Usage Examples
//!
//! ```rust
//! use cilprobe::{
//!     coverage::{instrument, InstrumentationConfig, InstrumentationPoints, Probe},
//!     metadata::token::Token,
//!     rewriter::Method,
//! };
//!
//! // ldarg.0; brtrue.s +1; nop; ret
//! let mut method = Method::decode(&[0x16, 0x02, 0x2D, 0x01, 0x00, 0x2A])?;
//! let points: InstrumentationPoints = "seq 0 1\nbranch 1 0 2\nbranch 1 1 3".parse()?;
//! let probe = Probe::Managed { method: Token::new(0x0A00_0001) };
//!
//! let placed = instrument(&mut method, &points, &probe, &InstrumentationConfig::default())?;
//! assert_eq!(placed.total(), 3);
//! let body = method.to_bytes()?;
//! # Ok::<(), cilprobe::Error>(())
//! ```

mod config;
mod instrument;
mod points;
mod probe;
mod session;
mod visits;

pub use config::*;
pub use instrument::*;
pub use points::*;
pub use probe::*;
pub use session::*;
pub use visits::*;
