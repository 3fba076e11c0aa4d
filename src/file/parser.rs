//! Read cursor over a raw method body.
//!
//! This module provides the [`crate::file::parser::Parser`] type, the reading half of the
//! buffer cursor used by the rewriting engine. It wraps a byte slice plus a running
//! position and offers bounds-checked little-endian reads, alignment and relative movement.
//!
//! # Key Components
//!
//! - [`crate::file::parser::Parser::read_le`] - Read a primitive and advance
//! - [`crate::file::parser::Parser::peek_le`] - Read a primitive without advancing
//! - [`crate::file::parser::Parser::align`] - Advance to the next multiple of an alignment
//! - [`crate::file::parser::Parser::advance_by`] - Move by a signed distance
//! - [`crate::file::parser::Parser::seek`] - Move to an absolute position
//!
//! # Usage Examples
//!
//! ```rust
//! use cilprobe::Parser;
//!
//! let data = [0x2B, 0x05, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_le::<u8>()?, 0x2B);
//! parser.advance_by(-1)?;
//! assert_eq!(parser.read_le::<u16>()?, 0x052B);
//!
//! parser.align(4)?;
//! assert_eq!(parser.read_le::<u32>()?, 1);
//! assert!(!parser.has_more_data());
//! # Ok::<(), cilprobe::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, CilIO},
    Result,
};

/// A cursor-based reader for method body bytes.
///
/// The parser maintains an internal position and checks every operation against the
/// length of the underlying slice, so a truncated or corrupted body produces an error
/// instead of reading past the end.
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`crate::file::parser::Parser`] from a byte slice.
    ///
    /// # Arguments
    /// * `data` - The byte slice to read from
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Returns the number of bytes between the current position and the end.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Get the current position of the parser within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Move the current position to the specified index.
    ///
    /// Seeking to exactly the end of the data is allowed; any subsequent read fails.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is beyond the data length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Move the position by a signed number of bytes.
    ///
    /// Negative steps move backwards, which the data section reader uses to step back over
    /// a section header it has already read.
    ///
    /// # Arguments
    /// * `step` - Signed amount of bytes to move
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the new position would be negative or
    /// beyond the data length.
    pub fn advance_by(&mut self, step: isize) -> Result<()> {
        let Some(target) = self.position.checked_add_signed(step) else {
            return Err(out_of_bounds_error!());
        };

        self.seek(target)
    }

    /// Align the position to a specific boundary.
    ///
    /// This advances the position to the next multiple of the specified alignment. The
    /// skipped padding bytes are not inspected.
    ///
    /// # Arguments
    /// * `alignment` - The boundary to align to (must be a power of 2)
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if aligning would exceed the data length.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        if self.position + padding > self.data.len() {
            return Err(out_of_bounds_error!());
        }
        self.position += padding;
        Ok(())
    }

    /// Peek at a value of type `T` in little-endian format without advancing the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading `T` would exceed the data length.
    pub fn peek_le<T: CilIO>(&self) -> Result<T> {
        let mut temp_position = self.position;
        read_le_at::<T>(self.data, &mut temp_position)
    }

    /// Read a type `T` from the current position in little-endian format and advance the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read `count` raw bytes and advance the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `count` bytes remain.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(out_of_bounds_error!());
        }

        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn sequential_reads() -> Result<()> {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_le::<u8>()?, 0x01);
        assert_eq!(parser.read_le::<u16>()?, 0x0302);
        assert_eq!(parser.read_le::<u32>()?, 0x0706_0504);
        assert_eq!(parser.pos(), 7);
        assert!(!parser.has_more_data());
        assert!(parser.read_le::<u8>().is_err());

        Ok(())
    }

    #[test]
    fn peek_does_not_move() -> Result<()> {
        let data = [0xFE, 0x1A];
        let parser = Parser::new(&data);

        assert_eq!(parser.peek_le::<u16>()?, 0x1AFE);
        assert_eq!(parser.pos(), 0);

        Ok(())
    }

    #[test]
    fn advance_backwards() -> Result<()> {
        let data = [0xFE, 0x01];
        let mut parser = Parser::new(&data);

        parser.advance_by(2)?;
        parser.advance_by(-1)?;
        assert_eq!(parser.read_le::<u8>()?, 0x01);

        let result = parser.advance_by(-3);
        assert!(matches!(result, Err(Error::OutOfBounds { .. })));
        assert_eq!(parser.pos(), 2);

        assert!(parser.advance_by(1).is_err());

        Ok(())
    }

    #[test]
    fn align_to_dword() -> Result<()> {
        let data = [0u8; 9];
        let mut parser = Parser::new(&data);

        parser.align(4)?;
        assert_eq!(parser.pos(), 0);

        parser.advance_by(5)?;
        parser.align(4)?;
        assert_eq!(parser.pos(), 8);

        parser.advance_by(1)?;
        assert!(parser.align(4).is_err());

        Ok(())
    }

    #[test]
    fn seek_and_bytes() -> Result<()> {
        let data = [0x10, 0x20, 0x30, 0x40];
        let mut parser = Parser::new(&data);

        parser.seek(1)?;
        assert_eq!(parser.read_bytes(2)?, &[0x20, 0x30]);
        assert_eq!(parser.remaining(), 1);
        assert!(parser.read_bytes(2).is_err());

        parser.seek(4)?;
        assert!(parser.seek(5).is_err());

        Ok(())
    }
}
