//! Exception clause representation for CIL method bodies.
//!
//! This module provides the raw, offset-based form of the try/catch/filter/finally/fault
//! clauses found in the extra data sections of a method body (ECMA-335 II.25.4.6). Both
//! the small (12 byte) and the fat (24 byte) on-disk layouts decode into the same
//! [`ExceptionHandler`] value; only the fat layout is ever written.

use bitflags::bitflags;

use crate::{
    file::{parser::Parser, writer::Writer},
    metadata::token::Token,
    Result,
};

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    ///
    /// These flags determine how the exception handler processes exceptions and
    /// control flow within try/catch/finally blocks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        ///
        /// The `class_or_filter` field contains the metadata token of the exception type
        /// that this handler catches.
        const EXCEPTION = 0x0000;

        /// An exception filter and handler clause.
        ///
        /// The `class_or_filter` field contains the offset of the filter block.
        const FILTER = 0x0001;

        /// A finally clause.
        const FINALLY = 0x0002;

        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// The four clause kinds an exception handler can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionHandlerKind {
    /// Typed catch clause
    Catch,
    /// Filter followed by a handler
    Filter,
    /// Finally clause
    Finally,
    /// Fault clause
    Fault,
}

impl ExceptionHandlerKind {
    /// Classifies raw clause flags; returns `None` for combinations ECMA-335 does not define.
    #[must_use]
    pub fn from_flags(flags: ExceptionHandlerFlags) -> Option<Self> {
        match flags.bits() {
            0x0000 => Some(ExceptionHandlerKind::Catch),
            0x0001 => Some(ExceptionHandlerKind::Filter),
            0x0002 => Some(ExceptionHandlerKind::Finally),
            0x0004 => Some(ExceptionHandlerKind::Fault),
            _ => None,
        }
    }

    /// The flags value written for this kind.
    #[must_use]
    pub fn flags(self) -> ExceptionHandlerFlags {
        match self {
            ExceptionHandlerKind::Catch => ExceptionHandlerFlags::EXCEPTION,
            ExceptionHandlerKind::Filter => ExceptionHandlerFlags::FILTER,
            ExceptionHandlerKind::Finally => ExceptionHandlerFlags::FINALLY,
            ExceptionHandlerKind::Fault => ExceptionHandlerFlags::FAULT,
        }
    }
}

/// Exception handler clause as stored in a method body.
///
/// # Layout in IL
///
/// ```text
/// try {
///     // try_offset -> try_offset + try_length
/// }
/// catch (ExceptionType) {
///     // handler_offset -> handler_offset + handler_length
/// }
/// ```
///
/// # References
/// - ECMA-335 6th Edition, Partition II, Section 25.4.6 - Exception Handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// Offset in bytes of try block from start of the code.
    pub try_offset: u32,
    /// Length in bytes of the try block.
    pub try_length: u32,
    /// Location of the handler for this try block.
    pub handler_offset: u32,
    /// Size of the handler code in bytes.
    pub handler_length: u32,
    /// Class token for typed clauses, filter offset for filter clauses, 0 otherwise.
    pub class_or_filter: u32,
}

impl ExceptionHandler {
    /// Reads a small clause (2-byte flags and offsets, 1-byte lengths) and widens it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the clause is truncated.
    pub fn read_small(parser: &mut Parser) -> Result<Self> {
        Ok(ExceptionHandler {
            flags: ExceptionHandlerFlags::from_bits_retain(parser.read_le::<u16>()?),
            try_offset: u32::from(parser.read_le::<u16>()?),
            try_length: u32::from(parser.read_le::<u8>()?),
            handler_offset: u32::from(parser.read_le::<u16>()?),
            handler_length: u32::from(parser.read_le::<u8>()?),
            class_or_filter: parser.read_le::<u32>()?,
        })
    }

    /// Reads a fat clause (six DWORDs).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the clause is truncated, or
    /// [`crate::Error::Malformed`] if the flags do not fit in 16 bits.
    pub fn read_fat(parser: &mut Parser) -> Result<Self> {
        let raw_flags = parser.read_le::<u32>()?;
        let Ok(flags) = u16::try_from(raw_flags) else {
            return Err(malformed_error!(
                "Exception clause flags 0x{:08X} out of range",
                raw_flags
            ));
        };

        Ok(ExceptionHandler {
            flags: ExceptionHandlerFlags::from_bits_retain(flags),
            try_offset: parser.read_le::<u32>()?,
            try_length: parser.read_le::<u32>()?,
            handler_offset: parser.read_le::<u32>()?,
            handler_length: parser.read_le::<u32>()?,
            class_or_filter: parser.read_le::<u32>()?,
        })
    }

    /// Writes this clause in the fat layout.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than 24 bytes remain.
    pub fn write_fat(&self, writer: &mut Writer) -> Result<()> {
        writer.write_le(u32::from(self.flags.bits()))?;
        writer.write_le(self.try_offset)?;
        writer.write_le(self.try_length)?;
        writer.write_le(self.handler_offset)?;
        writer.write_le(self.handler_length)?;
        writer.write_le(self.class_or_filter)
    }

    /// The kind of this clause, if its flags are valid.
    #[must_use]
    pub fn kind(&self) -> Option<ExceptionHandlerKind> {
        ExceptionHandlerKind::from_flags(self.flags)
    }

    /// End of the protected block (exclusive).
    #[must_use]
    pub fn try_end(&self) -> u64 {
        u64::from(self.try_offset) + u64::from(self.try_length)
    }

    /// End of the handler block (exclusive).
    #[must_use]
    pub fn handler_end(&self) -> u64 {
        u64::from(self.handler_offset) + u64::from(self.handler_length)
    }

    /// The caught type of a typed clause.
    #[must_use]
    pub fn class_token(&self) -> Option<Token> {
        match self.kind() {
            Some(ExceptionHandlerKind::Catch) => Some(Token(self.class_or_filter)),
            _ => None,
        }
    }

    /// The filter block offset of a filter clause.
    #[must_use]
    pub fn filter_offset(&self) -> Option<u32> {
        match self.kind() {
            Some(ExceptionHandlerKind::Filter) => Some(self.class_or_filter),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_clause_widens() -> Result<()> {
        let data = [
            0x02, 0x00, // finally
            0x01, 0x00, // try offset
            0x05, // try length
            0x06, 0x00, // handler offset
            0x02, // handler length
            0x00, 0x00, 0x00, 0x00,
        ];
        let mut parser = Parser::new(&data);
        let clause = ExceptionHandler::read_small(&mut parser)?;

        assert_eq!(clause.kind(), Some(ExceptionHandlerKind::Finally));
        assert_eq!(clause.try_offset, 1);
        assert_eq!(clause.try_end(), 6);
        assert_eq!(clause.handler_offset, 6);
        assert_eq!(clause.handler_end(), 8);
        assert_eq!(clause.class_token(), None);
        assert_eq!(parser.pos(), 12);

        Ok(())
    }

    #[test]
    fn fat_clause_write_then_read() -> Result<()> {
        let clause = ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_offset: 0x10,
            try_length: 0x20,
            handler_offset: 0x30,
            handler_length: 0x08,
            class_or_filter: 0x0100_0005,
        };

        let mut buffer = [0u8; 24];
        let mut writer = Writer::new(&mut buffer);
        clause.write_fat(&mut writer)?;
        assert_eq!(writer.pos(), 24);
        assert_eq!(&buffer[..4], &[0, 0, 0, 0]);
        assert_eq!(&buffer[20..], &[0x05, 0x00, 0x00, 0x01]);

        let mut parser = Parser::new(&buffer);
        let decoded = ExceptionHandler::read_fat(&mut parser)?;
        assert_eq!(decoded, clause);
        assert_eq!(decoded.class_token(), Some(Token(0x0100_0005)));
        assert_eq!(decoded.filter_offset(), None);

        Ok(())
    }

    #[test]
    fn invalid_kinds() {
        assert_eq!(
            ExceptionHandlerKind::from_flags(ExceptionHandlerFlags::from_bits_retain(0x3)),
            None
        );
        assert_eq!(
            ExceptionHandlerKind::from_flags(ExceptionHandlerFlags::from_bits_retain(0x8)),
            None
        );

        let data = [0x00, 0x00, 0x01, 0x00];
        let mut parser = Parser::new(&data);
        assert!(ExceptionHandler::read_fat(&mut parser).is_err());
    }
}
