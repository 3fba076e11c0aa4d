//! Method header and data section handling for CIL method bodies.
//!
//! This module decodes the two header shapes ECMA-335 defines (tiny and fat) together with
//! the chain of extra data sections that may follow the code, and encodes the fat header
//! used for every body the rewriter emits.
//!
//! # Examples
//!
//! ```rust
//! use cilprobe::metadata::method::MethodBody;
//!
//! // Tiny header: code size 1 (1 << 2 | 0x2), followed by `ret`
//! let data = [0x06, 0x2A];
//! let body = MethodBody::from(&data)?;
//!
//! assert!(!body.header.is_fat());
//! assert_eq!(body.header.code_size, 1);
//! assert_eq!(body.header.max_stack, 8);
//! assert_eq!(body.code(&data)?, &[0x2A]);
//! # Ok::<(), cilprobe::Error>(())
//! ```
//!
//! # References
//! - ECMA-335 6th Edition, Partition II, Section 25.4 - Method Header Format

use crate::{
    file::{parser::Parser, writer::Writer},
    metadata::method::{
        ExceptionHandler, MethodBodyFlags, SectionFlags, FAT_CLAUSE_SIZE, FAT_HEADER_SIZE,
        METHOD_HEADER_FLAGS_MASK, METHOD_HEADER_FORMAT_MASK, SECTION_HEADER_SIZE,
        SMALL_CLAUSE_SIZE, TINY_HEADER_SIZE, TINY_MAX_STACK,
    },
    Error, Result,
};

/// The decoded header of a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHeader {
    /// Header flags as found in the input
    pub flags: MethodBodyFlags,
    /// Size of the header in bytes
    pub size_header: usize,
    /// Size of the code in bytes
    pub code_size: u32,
    /// Maximum number of items on the operand stack
    pub max_stack: u16,
    /// `MetaData` token for a signature describing the layout of the local variables for the method. 0 == no local variables
    pub local_var_sig_token: u32,
}

impl MethodHeader {
    /// Reads either header shape from the start of a method body.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for empty input, [`crate::Error::OutOfBounds`] if the
    /// header is truncated and [`crate::Error::Malformed`] for an unknown format or a fat
    /// header smaller than three DWORDs.
    pub fn read(parser: &mut Parser) -> Result<Self> {
        if parser.is_empty() {
            return Err(Error::Empty);
        }

        let first_byte = parser.peek_le::<u8>()?;
        match first_byte & METHOD_HEADER_FORMAT_MASK {
            0x2 => {
                parser.advance_by(1)?;
                Ok(MethodHeader {
                    flags: MethodBodyFlags::TINY_FORMAT,
                    size_header: TINY_HEADER_SIZE,
                    code_size: u32::from(first_byte >> 2),
                    max_stack: TINY_MAX_STACK,
                    local_var_sig_token: 0,
                })
            }
            0x3 => {
                let first_duo = parser.read_le::<u16>()?;
                let size_header = usize::from(first_duo >> 12) * 4;
                if size_header < FAT_HEADER_SIZE {
                    return Err(malformed_error!(
                        "Fat method header claims {} bytes",
                        size_header
                    ));
                }

                let max_stack = parser.read_le::<u16>()?;
                let code_size = parser.read_le::<u32>()?;
                let local_var_sig_token = parser.read_le::<u32>()?;
                parser.seek(size_header)?;

                Ok(MethodHeader {
                    flags: MethodBodyFlags::from_bits_truncate(
                        first_duo & METHOD_HEADER_FLAGS_MASK,
                    ),
                    size_header,
                    code_size,
                    max_stack,
                    local_var_sig_token,
                })
            }
            format => Err(malformed_error!(
                "Invalid method header format - {}",
                format
            )),
        }
    }

    /// Returns `true` if the header was read from the fat shape.
    #[must_use]
    pub fn is_fat(&self) -> bool {
        self.flags.contains(MethodBodyFlags::FAT_FORMAT)
    }

    /// Returns `true` if locals are zero-initialized.
    #[must_use]
    pub fn is_init_local(&self) -> bool {
        self.flags.contains(MethodBodyFlags::INIT_LOCALS)
    }

    /// Returns `true` if extra data sections follow the code.
    #[must_use]
    pub fn has_more_sections(&self) -> bool {
        self.is_fat() && self.flags.contains(MethodBodyFlags::MORE_SECTS)
    }

    /// Writes a fat header for `code_size` bytes of code.
    ///
    /// The tiny shape is never produced. `INIT_LOCALS`, max-stack and the local signature
    /// token carry over from the decoded header; `MORE_SECTS` reflects `more_sections`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than 12 bytes remain.
    pub fn write_fat(&self, writer: &mut Writer, code_size: u32, more_sections: bool) -> Result<()> {
        let mut flags = MethodBodyFlags::FAT_FORMAT;
        if self.is_init_local() {
            flags |= MethodBodyFlags::INIT_LOCALS;
        }
        if more_sections {
            flags |= MethodBodyFlags::MORE_SECTS;
        }

        #[allow(clippy::cast_possible_truncation)]
        let dwords = (FAT_HEADER_SIZE / 4) as u16;

        writer.write_le((dwords << 12) | flags.bits())?;
        writer.write_le(self.max_stack)?;
        writer.write_le(code_size)?;
        writer.write_le(self.local_var_sig_token)
    }
}

/// A method body split into its header and exception clauses.
///
/// The code itself is not copied; use [`MethodBody::code`] with the original buffer.
#[derive(Debug, Clone)]
pub struct MethodBody {
    /// The method header
    pub header: MethodHeader,
    /// All exception clauses, in section order, widened to the fat representation
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Create a `MethodBody` object from a sequence of bytes.
    ///
    /// # Arguments
    /// * `data` - The byte slice from which this object shall be created
    ///
    /// # Errors
    /// Returns an error if the data is empty, out of bounds, or malformed.
    pub fn from(data: &[u8]) -> Result<MethodBody> {
        let mut parser = Parser::new(data);
        let header = MethodHeader::read(&mut parser)?;

        let code_end = header
            .size_header
            .checked_add(header.code_size as usize)
            .ok_or_else(|| out_of_bounds_error!())?;
        if code_end > data.len() {
            return Err(out_of_bounds_error!());
        }

        // Exception Handling -> II.25.4.6
        let mut exception_handlers = Vec::new();
        if header.has_more_sections() {
            parser.seek(code_end)?;
            read_sections(&mut parser, &mut exception_handlers)?;
        }

        Ok(MethodBody {
            header,
            exception_handlers,
        })
    }

    /// Returns the code bytes of this body within `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than header plus code.
    pub fn code<'a>(&self, data: &'a [u8]) -> Result<&'a [u8]> {
        let start = self.header.size_header;
        let end = start + self.header.code_size as usize;
        data.get(start..end).ok_or_else(|| out_of_bounds_error!())
    }

    /// Size of the single fat exception section emitted for `clauses` clauses.
    #[must_use]
    pub fn fat_section_size(clauses: usize) -> usize {
        SECTION_HEADER_SIZE + clauses * FAT_CLAUSE_SIZE
    }
}

fn read_sections(parser: &mut Parser, handlers: &mut Vec<ExceptionHandler>) -> Result<()> {
    loop {
        parser.align(4)?;
        let section_start = parser.pos();
        let flags = SectionFlags::from_bits_truncate(parser.read_le::<u8>()?);

        let (section_size, clause_size) = if flags.contains(SectionFlags::FAT_FORMAT) {
            // Re-read the kind byte as the low byte of a DWORD; the size is the upper 24 bits
            parser.advance_by(-1)?;
            (parser.read_le::<u32>()? as usize >> 8, FAT_CLAUSE_SIZE)
        } else {
            let size = usize::from(parser.read_le::<u8>()?);
            let _reserved = parser.read_le::<u16>()?;
            (size, SMALL_CLAUSE_SIZE)
        };

        if section_size < SECTION_HEADER_SIZE {
            return Err(malformed_error!(
                "Data section at {} is {} bytes",
                section_start,
                section_size
            ));
        }
        if section_size > parser.len() - section_start {
            return Err(out_of_bounds_error!());
        }

        if flags.contains(SectionFlags::EHTABLE) {
            let clauses = (section_size - SECTION_HEADER_SIZE) / clause_size;
            for _ in 0..clauses {
                let clause = if clause_size == FAT_CLAUSE_SIZE {
                    ExceptionHandler::read_fat(parser)?
                } else {
                    ExceptionHandler::read_small(parser)?
                };
                handlers.push(clause);
            }
        }

        parser.seek(section_start + section_size)?;
        if !flags.contains(SectionFlags::MORE_SECTS) {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::method::ExceptionHandlerKind;

    #[test]
    fn tiny() -> Result<()> {
        let data = [0x22, 0x2B, 0x05, 0x38, 0x00, 0x00, 0x00, 0x00, 0x2A];
        let body = MethodBody::from(&data)?;

        assert_eq!(body.header.size_header, 1);
        assert_eq!(body.header.code_size, 8);
        assert_eq!(body.header.max_stack, 8);
        assert_eq!(body.header.local_var_sig_token, 0);
        assert!(!body.header.is_fat());
        assert!(!body.header.has_more_sections());
        assert!(body.exception_handlers.is_empty());
        assert_eq!(body.code(&data)?.len(), 8);

        Ok(())
    }

    #[test]
    fn tiny_truncated() {
        let data = [0x22, 0x2A];
        assert!(matches!(
            MethodBody::from(&data),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn empty_and_invalid() {
        assert!(matches!(MethodBody::from(&[]), Err(Error::Empty)));
        assert!(matches!(
            MethodBody::from(&[0x01, 0x2A]),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn fat() -> Result<()> {
        #[rustfmt::skip]
        let data = [
            0x13, 0x30, 0x02, 0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x11,
            0x2A,
        ];
        let body = MethodBody::from(&data)?;

        assert!(body.header.is_fat());
        assert!(body.header.is_init_local());
        assert_eq!(body.header.size_header, 12);
        assert_eq!(body.header.max_stack, 2);
        assert_eq!(body.header.code_size, 1);
        assert_eq!(body.header.local_var_sig_token, 0x1100_0003);
        assert_eq!(body.code(&data)?, &[0x2A]);

        Ok(())
    }

    #[test]
    fn fat_with_small_section() -> Result<()> {
        #[rustfmt::skip]
        let data = [
            // header: fat, more sections, max stack 1, code size 9
            0x1B, 0x30, 0x01, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            // code
            0x00, 0xDE, 0x05, 0x26, 0xDE, 0x02, 0x00, 0xDC, 0x2A,
            // padding
            0x00, 0x00, 0x00,
            // small EH section, 16 bytes
            0x01, 0x10, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x03, 0x03, 0x00, 0x03, 0x01, 0x00, 0x00, 0x01,
        ];
        let body = MethodBody::from(&data)?;

        assert_eq!(body.exception_handlers.len(), 1);
        let clause = &body.exception_handlers[0];
        assert_eq!(clause.kind(), Some(ExceptionHandlerKind::Catch));
        assert_eq!(clause.try_offset, 0);
        assert_eq!(clause.try_length, 3);
        assert_eq!(clause.handler_offset, 3);
        assert_eq!(clause.handler_length, 3);
        assert_eq!(clause.class_or_filter, 0x0100_0001);

        Ok(())
    }

    #[test]
    fn section_chain_skips_foreign_sections() -> Result<()> {
        #[rustfmt::skip]
        let data = [
            0x0B, 0x30, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x2A, 0x00, 0x00, 0x00,
            // non-EH small section with a following section
            0x82, 0x08, 0x00, 0x00, 0xAA, 0xBB, 0xCC, 0xDD,
            // fat EH section, one clause
            0x41, 0x1C, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let body = MethodBody::from(&data)?;

        assert_eq!(body.exception_handlers.len(), 1);
        assert_eq!(
            body.exception_handlers[0].kind(),
            Some(ExceptionHandlerKind::Finally)
        );

        Ok(())
    }

    #[test]
    fn truncated_section() {
        #[rustfmt::skip]
        let data = [
            0x0B, 0x30, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x2A, 0x00, 0x00, 0x00,
            0x41, 0x1C, 0x00, 0x00, 0x02, 0x00,
        ];
        assert!(MethodBody::from(&data).is_err());
    }

    #[test]
    fn write_fat_header() -> Result<()> {
        let header = MethodHeader {
            flags: MethodBodyFlags::TINY_FORMAT,
            size_header: 1,
            code_size: 8,
            max_stack: 8,
            local_var_sig_token: 0,
        };

        let mut buffer = [0u8; 12];
        let mut writer = Writer::new(&mut buffer);
        header.write_fat(&mut writer, 0x40, true)?;

        assert_eq!(
            buffer,
            [0x0B, 0x30, 0x08, 0x00, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );

        let reread = MethodHeader::read(&mut Parser::new(&buffer))?;
        assert!(reread.is_fat());
        assert!(reread.has_more_sections());
        assert!(!reread.is_init_local());
        assert_eq!(reread.code_size, 0x40);

        Ok(())
    }
}
