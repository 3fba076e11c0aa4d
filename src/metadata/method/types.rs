//! Method body and data section flags for CIL method bodies.
//!
//! # Key Types
//! - [`MethodBodyFlags`]: Flags stored in the first bits of a method header
//! - [`SectionFlags`]: Flags leading each extra data section

use bitflags::bitflags;

/// Size of a fat method header in bytes (three DWORDs)
pub const FAT_HEADER_SIZE: usize = 12;
/// Size of a tiny method header in bytes
pub const TINY_HEADER_SIZE: usize = 1;
/// Implicit max-stack of a method with a tiny header
pub const TINY_MAX_STACK: u16 = 8;
/// Size of the header that leads every data section
pub const SECTION_HEADER_SIZE: usize = 4;
/// Size of a fat exception clause
pub const FAT_CLAUSE_SIZE: usize = 24;
/// Size of a small exception clause
pub const SMALL_CLAUSE_SIZE: usize = 12;

/// Bitmask isolating the header format in the first byte of a method header
pub const METHOD_HEADER_FORMAT_MASK: u8 = 0b_0000_0011;
/// Bitmask isolating the flags in the first WORD of a fat method header
pub const METHOD_HEADER_FLAGS_MASK: u16 = 0x0FFF;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags that a method body can have
    pub struct MethodBodyFlags: u16 {
        /// Tiny method header format
        const TINY_FORMAT = 0x2;
        /// Fat method header format
        const FAT_FORMAT = 0x3;
        /// Flag of the fat method header, showing that there are more data sections appended to the header
        const MORE_SECTS = 0x8;
        /// Flag to indicate that this method should call the default constructor on all local variables
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags that a method body section can have
    pub struct SectionFlags: u8 {
        /// Indicates that this section contains exception handling data
        const EHTABLE = 0x1;
        /// Reserved, shall be 0
        const OPT_ILTABLE = 0x2;
        /// Indicates that the data section format is fat
        const FAT_FORMAT = 0x40;
        /// Indicates that the data section is followed by another one
        const MORE_SECTS = 0x80;
    }
}
