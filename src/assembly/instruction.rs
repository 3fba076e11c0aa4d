//! CIL instruction representation, decoding and encoding.
//!
//! An [`crate::assembly::Instruction`] is one operation together with its operand and the
//! bookkeeping the rewriter needs to move it around: the offset it occupies now, the offset
//! it occupied when the body was first decoded, and the instructions it may branch to.
//!
//! Branch targets are stored as [`crate::assembly::InstructionId`] handles rather than
//! positions. A handle names a storage slot inside a [`crate::rewriter::Method`], so it
//! stays valid while other instructions are inserted around it.
//!
//! # Templates
//!
//! Instructions handed to the insertion functions of [`crate::rewriter::Method`] are
//! *templates*. Inside a template list, a branch handle refers to the position of another
//! template in the same list (see [`crate::assembly::Instruction::with_targets`]); the
//! handles are remapped when the list is copied into a method.
//!
//! # Usage Examples
//!
//! ```rust
//! use cilprobe::assembly::{Instruction, OpCode};
//!
//! let probe = [
//!     Instruction::with_operand(OpCode::LdcI4, 17),
//!     Instruction::with_operand(OpCode::Call, 0x0A00_0001),
//! ];
//! assert_eq!(probe.iter().map(Instruction::size).sum::<usize>(), 10);
//! assert_eq!(probe[0].original_offset(), -1);
//! ```

use std::fmt;

use crate::{
    assembly::{Encoding, FlowType, OpCode, OperandKind, Operation, FE_PREFIX},
    file::{parser::Parser, writer::Writer},
    Error, Result,
};

/// Operand value of a long-form branch whose displacement has not been laid out yet.
pub const PENDING_DISPLACEMENT: i64 = i64::MIN;

/// Stable handle to an instruction owned by a [`crate::rewriter::Method`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstructionId(pub(crate) usize);

impl InstructionId {
    /// The raw slot index behind this handle.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single CIL instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The operation
    pub opcode: OpCode,
    /// Operand widened to 64 bits; its meaning depends on [`OperandKind`]
    pub operand: i64,
    pub(crate) offset: i64,
    pub(crate) original_offset: i64,
    pub(crate) branches: Vec<InstructionId>,
    pub(crate) branch_offsets: Vec<i32>,
}

impl Instruction {
    /// Creates an operand-less instruction that is not part of any method yet.
    #[must_use]
    pub fn new(opcode: OpCode) -> Self {
        Self::with_operand(opcode, 0)
    }

    /// Creates an instruction with an operand.
    ///
    /// Tokens are passed as their raw `u32` value, floats as their bit pattern.
    #[must_use]
    pub fn with_operand(opcode: OpCode, operand: i64) -> Self {
        Instruction {
            opcode,
            operand,
            offset: -1,
            original_offset: -1,
            branches: Vec::new(),
            branch_offsets: Vec::new(),
        }
    }

    /// Sets the branch targets of a template as positions within its template list.
    #[must_use]
    pub fn with_targets(mut self, targets: &[usize]) -> Self {
        self.branches = targets.iter().copied().map(InstructionId).collect();
        if self.opcode == OpCode::Switch {
            self.operand = targets.len() as i64;
        }
        self
    }

    /// Offset in the current layout, `-1` until laid out.
    #[must_use]
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Offset in the body as first decoded, `-1` for injected instructions.
    #[must_use]
    pub fn original_offset(&self) -> i64 {
        self.original_offset
    }

    /// Resolved branch targets, in encoding order.
    #[must_use]
    pub fn branches(&self) -> &[InstructionId] {
        &self.branches
    }

    /// Relative displacements matching [`Instruction::branches`] as of the last layout.
    #[must_use]
    pub fn branch_offsets(&self) -> &[i32] {
        &self.branch_offsets
    }

    /// Returns `true` for unconditional and conditional branches, `switch` included.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        self.opcode.is_branch()
    }

    /// Control-flow category of the operation.
    #[must_use]
    pub fn flow(&self) -> FlowType {
        self.opcode.flow()
    }

    /// Static description of the operation.
    #[must_use]
    pub fn operation(&self) -> &'static Operation {
        self.opcode.operation()
    }

    /// Number of `switch` cases, 0 for every other operation.
    #[must_use]
    pub fn case_count(&self) -> usize {
        if self.opcode == OpCode::Switch {
            usize::try_from(self.operand).unwrap_or(0)
        } else {
            0
        }
    }

    /// Encoded size in bytes, including the jump table of a `switch`.
    #[must_use]
    pub fn size(&self) -> usize {
        self.opcode.length() + self.opcode.operand().size() + 4 * self.case_count()
    }

    /// Structural comparison against a template: same operation, same operand, same
    /// branch shape. Layout and identity are ignored, and so are the operands of branches
    /// that have targets, since those only hold a displacement.
    #[must_use]
    pub fn matches(&self, template: &Instruction) -> bool {
        let resolved = self.is_branch() && !self.branches.is_empty();
        self.opcode == template.opcode
            && (resolved || self.operand == template.operand)
            && self.is_branch() == template.is_branch()
            && self.branches.len() == template.branches.len()
    }

    /// Decodes the instruction at the parser position.
    ///
    /// The offset and original offset are set to that position. Branch displacements are
    /// collected in [`Instruction::branch_offsets`]; they are not resolved here.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownOpcode`] for unassigned encodings and
    /// [`crate::Error::OutOfBounds`] if the instruction is truncated.
    pub(crate) fn read(parser: &mut Parser) -> Result<Self> {
        let offset = parser.pos() as i64;

        let first = parser.read_le::<u8>()?;
        let opcode = if first == FE_PREFIX {
            let second = parser.read_le::<u8>()?;
            OpCode::decode(first, Some(second))
                .ok_or(Error::UnknownOpcode(u16::from_be_bytes([first, second])))?
        } else {
            OpCode::decode(first, None).ok_or(Error::UnknownOpcode(u16::from(first)))?
        };

        let kind = opcode.operand();
        let operand = read_operand(parser, kind)?;

        let mut branch_offsets = Vec::new();
        match kind {
            OperandKind::ShortBranch | OperandKind::Branch => {
                #[allow(clippy::cast_possible_truncation)]
                let displacement = operand as i32;
                branch_offsets.push(displacement);
            }
            OperandKind::Switch => {
                let cases = operand as usize;
                if cases > parser.remaining() / 4 {
                    return Err(out_of_bounds_error!());
                }

                branch_offsets.reserve(cases);
                for _ in 0..cases {
                    branch_offsets.push(parser.read_le::<i32>()?);
                }
            }
            _ => {}
        }

        Ok(Instruction {
            opcode,
            operand,
            offset,
            original_offset: offset,
            branches: Vec::new(),
            branch_offsets,
        })
    }

    /// Encodes opcode, operand and, for `switch`, the jump table.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the writer runs out of space.
    pub(crate) fn write(&self, writer: &mut Writer) -> Result<()> {
        match self.operation().encoding {
            Encoding::Pseudo => return Ok(()),
            Encoding::One(code) => writer.write_le(code)?,
            Encoding::Two(code) => {
                writer.write_le(FE_PREFIX)?;
                writer.write_le(code)?;
            }
        }

        write_operand(writer, self.opcode.operand(), self.operand)?;
        if self.opcode == OpCode::Switch {
            for displacement in &self.branch_offsets {
                writer.write_le(*displacement)?;
            }
        }

        Ok(())
    }
}

fn read_operand(parser: &mut Parser, kind: OperandKind) -> Result<i64> {
    Ok(match kind {
        OperandKind::None => 0,
        OperandKind::ShortBranch | OperandKind::ShortInt => i64::from(parser.read_le::<i8>()?),
        OperandKind::ShortVar => i64::from(parser.read_le::<u8>()?),
        OperandKind::Var => i64::from(parser.read_le::<u16>()?),
        OperandKind::Branch | OperandKind::Int => i64::from(parser.read_le::<i32>()?),
        OperandKind::Single | OperandKind::Token | OperandKind::Switch => {
            i64::from(parser.read_le::<u32>()?)
        }
        OperandKind::Long | OperandKind::Double => parser.read_le::<i64>()?,
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn write_operand(writer: &mut Writer, kind: OperandKind, operand: i64) -> Result<()> {
    match kind {
        OperandKind::None => Ok(()),
        OperandKind::ShortBranch | OperandKind::ShortInt => writer.write_le(operand as i8),
        OperandKind::ShortVar => writer.write_le(operand as u8),
        OperandKind::Var => writer.write_le(operand as u16),
        OperandKind::Branch | OperandKind::Int => writer.write_le(operand as i32),
        OperandKind::Single | OperandKind::Token | OperandKind::Switch => {
            writer.write_le(operand as u32)
        }
        OperandKind::Long | OperandKind::Double => writer.write_le(operand),
    }
}

impl fmt::Display for Instruction {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: {}", self.offset, self.opcode)?;

        let end = self.offset + self.size() as i64;
        match self.opcode.operand() {
            OperandKind::None => Ok(()),
            OperandKind::ShortBranch | OperandKind::Branch => match self.branch_offsets.first() {
                Some(displacement) => write!(f, " IL_{:04x}", end + i64::from(*displacement)),
                None => f.write_str(" ?"),
            },
            OperandKind::Switch => {
                f.write_str(" (")?;
                for (index, displacement) in self.branch_offsets.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "IL_{:04x}", end + i64::from(*displacement))?;
                }
                f.write_str(")")
            }
            OperandKind::Token => write!(f, " 0x{:08x}", self.operand as u32),
            OperandKind::Single => write!(f, " {}", f32::from_bits(self.operand as u32)),
            OperandKind::Double => write!(f, " {}", f64::from_bits(self.operand as u64)),
            _ => write!(f, " {}", self.operand),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_short_branch() -> Result<()> {
        let data = [0x2B, 0xFE];
        let mut parser = Parser::new(&data);
        let instruction = Instruction::read(&mut parser)?;

        assert_eq!(instruction.opcode, OpCode::BrS);
        assert_eq!(instruction.operand, -2);
        assert_eq!(instruction.offset(), 0);
        assert_eq!(instruction.original_offset(), 0);
        assert_eq!(instruction.branch_offsets(), &[-2]);
        assert!(instruction.branches().is_empty());
        assert!(instruction.is_branch());
        assert_eq!(instruction.size(), 2);

        Ok(())
    }

    #[test]
    fn read_two_byte_opcode() -> Result<()> {
        let data = [0x00, 0xFE, 0x0C, 0x01, 0x00];
        let mut parser = Parser::new(&data);
        parser.advance_by(1)?;
        let instruction = Instruction::read(&mut parser)?;

        assert_eq!(instruction.opcode, OpCode::Ldloc);
        assert_eq!(instruction.operand, 1);
        assert_eq!(instruction.offset(), 1);
        assert_eq!(instruction.size(), 4);
        assert!(!parser.has_more_data());

        Ok(())
    }

    #[test]
    fn read_switch_table() -> Result<()> {
        let data = [
            0x45, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00,
        ];
        let mut parser = Parser::new(&data);
        let instruction = Instruction::read(&mut parser)?;

        assert_eq!(instruction.case_count(), 2);
        assert_eq!(instruction.branch_offsets(), &[0, 5]);
        assert_eq!(instruction.size(), 13);

        Ok(())
    }

    #[test]
    fn switch_count_beyond_data() {
        let data = [0x45, 0xFF, 0xFF, 0xFF, 0x0F, 0x00, 0x00, 0x00, 0x00];
        let mut parser = Parser::new(&data);
        assert!(matches!(
            Instruction::read(&mut parser),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn unknown_opcodes() {
        let mut parser = Parser::new(&[0x24]);
        assert!(matches!(
            Instruction::read(&mut parser),
            Err(Error::UnknownOpcode(0x24))
        ));

        let mut parser = Parser::new(&[0xFE, 0x1F]);
        assert!(matches!(
            Instruction::read(&mut parser),
            Err(Error::UnknownOpcode(0xFE1F))
        ));
    }

    #[test]
    fn write_matches_read() -> Result<()> {
        #[rustfmt::skip]
        let data = [
            0x1F, 0xF6,                                     // ldc.i4.s -10
            0x21, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x88, // ldc.i8
            0x28, 0x01, 0x00, 0x00, 0x0A,                   // call
            0xFE, 0x12, 0x04,                               // unaligned. 4
            0xFE, 0x09, 0x03, 0x01,                         // ldarg 0x103
        ];

        let mut parser = Parser::new(&data);
        let mut decoded = Vec::new();
        while parser.has_more_data() {
            decoded.push(Instruction::read(&mut parser)?);
        }
        assert_eq!(decoded.len(), 5);
        assert_eq!(decoded[0].operand, -10);
        assert_eq!(decoded[2].operand, 0x0A00_0001);

        let mut buffer = vec![0u8; data.len()];
        let mut writer = Writer::new(&mut buffer);
        for instruction in &decoded {
            instruction.write(&mut writer)?;
        }
        assert_eq!(buffer, data);

        Ok(())
    }

    #[test]
    fn label_has_no_encoding() -> Result<()> {
        let label = Instruction::new(OpCode::Label);
        assert_eq!(label.size(), 0);

        let mut buffer = [0u8; 0];
        let mut writer = Writer::new(&mut buffer);
        label.write(&mut writer)?;
        assert_eq!(writer.pos(), 0);

        Ok(())
    }

    #[test]
    fn template_matching() {
        let template = Instruction::with_operand(OpCode::LdcI4, 3);

        let mut decoded = template.clone();
        decoded.offset = 40;
        decoded.original_offset = 40;
        assert!(decoded.matches(&template));

        assert!(!Instruction::with_operand(OpCode::LdcI4, 4).matches(&template));
        assert!(!Instruction::with_operand(OpCode::LdcI8, 3).matches(&template));

        let branch = Instruction::new(OpCode::Br).with_targets(&[0]);
        assert!(!Instruction::new(OpCode::Br).matches(&branch));
    }

    #[test]
    fn display() {
        let mut call = Instruction::with_operand(OpCode::Call, 0x0600_0002);
        call.offset = 0x10;
        assert_eq!(call.to_string(), "IL_0010: call 0x06000002");

        let mut branch = Instruction::with_operand(OpCode::Br, 3);
        branch.offset = 2;
        branch.branch_offsets = vec![3];
        assert_eq!(branch.to_string(), "IL_0002: br IL_000a");

        let mut constant = Instruction::with_operand(OpCode::LdcR4, i64::from(1.5f32.to_bits()));
        constant.offset = 0;
        assert_eq!(constant.to_string(), "IL_0000: ldc.r4 1.5");
    }
}
