//! Instrumentation points for one method.
//!
//! The coverage collector decides where probes go; this module only carries its answer. Each
//! point pairs an offset in the method body as compiled with the unique id the probe reports
//! when it executes.
//!
//! Points can also be read from a plain text listing, one point per line:
//!
//! ```text
//! # offset   id
//! seq    0x00  1
//! seq    0x07  2
//! # offset path id
//! branch 0x03  0  3
//! branch 0x03  1  4
//! ```
//!
//! Numbers are decimal or `0x`-prefixed hexadecimal; `#` starts a comment.

use std::str::FromStr;

use crate::{Error, Result};

/// A probe that marks the start of a source statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePoint {
    /// Offset of the instruction in the body as compiled
    pub offset: u32,
    /// Id reported when the probe executes
    pub id: u32,
}

/// A probe on one outgoing path of a conditional branch.
///
/// Path 0 is the fall-through; path `n` is the `n`-th target of the branch, so a `switch`
/// with `k` cases has paths `0..=k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchPoint {
    /// Offset of the branch instruction in the body as compiled
    pub offset: u32,
    /// Path index
    pub path: u32,
    /// Id reported when the path is taken
    pub id: u32,
}

/// Every point requested for one method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentationPoints {
    /// Statement probes
    pub sequence_points: Vec<SequencePoint>,
    /// Branch path probes
    pub branch_points: Vec<BranchPoint>,
}

impl InstrumentationPoints {
    /// Returns `true` if no probe was requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequence_points.is_empty() && self.branch_points.is_empty()
    }

    /// Total number of requested probes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sequence_points.len() + self.branch_points.len()
    }
}

impl FromStr for InstrumentationPoints {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let mut points = InstrumentationPoints::default();

        for (index, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            let numbers = fields[1..]
                .iter()
                .map(|field| parse_number(field, index + 1))
                .collect::<Result<Vec<u32>>>()?;

            match (fields[0], numbers.as_slice()) {
                ("seq", [offset, id]) => points.sequence_points.push(SequencePoint {
                    offset: *offset,
                    id: *id,
                }),
                ("branch", [offset, path, id]) => points.branch_points.push(BranchPoint {
                    offset: *offset,
                    path: *path,
                    id: *id,
                }),
                _ => {
                    return Err(malformed_error!(
                        "Line {}: expected `seq <offset> <id>` or `branch <offset> <path> <id>`",
                        index + 1
                    ))
                }
            }
        }

        Ok(points)
    }
}

fn parse_number(field: &str, line: usize) -> Result<u32> {
    let parsed = match field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => field.parse(),
    };
    parsed.map_err(|_| malformed_error!("Line {}: invalid number `{}`", line, field))
}
