//! Write cursor over a caller-supplied output buffer.
//!
//! [`crate::file::writer::Writer`] is the writing half of the buffer cursor. The
//! rewriting engine serializes a method body into a buffer that usually comes from a
//! host-side allocator, so the writer never grows its buffer: every write is checked
//! against the buffer length and fails with [`crate::Error::OutOfBounds`] instead.
//!
//! # Usage Examples
//!
//! ```rust
//! use cilprobe::file::writer::Writer;
//!
//! let mut buffer = [0xAAu8; 8];
//! let mut writer = Writer::new(&mut buffer);
//!
//! writer.write_le(0x2A_u8)?;
//! writer.align(4)?;
//! writer.write_le(0x0600_0001_u32)?;
//! assert_eq!(writer.pos(), 8);
//! assert_eq!(buffer, [0x2A, 0, 0, 0, 0x01, 0x00, 0x00, 0x06]);
//! # Ok::<(), cilprobe::Error>(())
//! ```

use crate::{
    file::io::{write_le_at, CilIO},
    Result,
};

/// A cursor-based writer over a fixed-size byte buffer.
pub struct Writer<'a> {
    /// The buffer receiving the output
    data: &'a mut [u8],
    /// Current position within the buffer
    position: usize,
}

impl<'a> Writer<'a> {
    /// Create a new writer positioned at the start of `data`.
    pub fn new(data: &'a mut [u8]) -> Self {
        Writer { data, position: 0 }
    }

    /// Returns the length of the underlying buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the underlying buffer has no capacity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the current position of the writer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Write `value` in little-endian format and advance the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
    pub fn write_le<T: CilIO>(&mut self, value: T) -> Result<()> {
        write_le_at(self.data, &mut self.position, value)
    }

    /// Advance to the next multiple of `alignment`, zero-filling the padding.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the padding does not fit.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        if self.position + padding > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.data[self.position..self.position + padding].fill(0);
        self.position += padding;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn writes_in_order() -> Result<()> {
        let mut buffer = [0u8; 7];
        let mut writer = Writer::new(&mut buffer);

        writer.write_le(0xFE_u8)?;
        writer.write_le(0x1A_u8)?;
        writer.write_le(-3_i32)?;
        writer.write_le(0x2A_u8)?;
        assert_eq!(writer.pos(), 7);
        assert_eq!(buffer, [0xFE, 0x1A, 0xFD, 0xFF, 0xFF, 0xFF, 0x2A]);

        Ok(())
    }

    #[test]
    fn overflow_is_rejected() {
        let mut buffer = [0u8; 3];
        let mut writer = Writer::new(&mut buffer);

        assert!(matches!(
            writer.write_le(1_u32),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(writer.write_le(1_u64).is_err());
        assert_eq!(writer.pos(), 0);
    }

    #[test]
    fn align_pads_with_zero() -> Result<()> {
        let mut buffer = [0xFFu8; 8];
        let mut writer = Writer::new(&mut buffer);

        writer.write_le(0x2A_u8)?;
        writer.align(4)?;
        assert_eq!(writer.pos(), 4);
        writer.align(4)?;
        assert_eq!(writer.pos(), 4);
        assert_eq!(&buffer[..4], &[0x2A, 0, 0, 0]);

        Ok(())
    }

    #[test]
    fn align_past_end() {
        let mut buffer = [0u8; 2];
        let mut writer = Writer::new(&mut buffer);
        writer.write_le(0_u8).unwrap();
        assert!(writer.align(4).is_err());
    }
}
