//! Mutable model of a single CIL method body.
//!
//! [`Method`] decodes a raw body (tiny or fat header, code, exception sections) into an
//! instruction list whose branches and exception regions refer to instructions through
//! [`InstructionId`] handles. Probe sequences can then be inserted at any instruction
//! boundary, and the result is encoded back with a fat header and a fat exception section.
//!
//! # Identity contract
//!
//! Instructions live in storage slots; a handle names a slot, and the instruction order is
//! a separate list of handles. Inserting a sequence at an instruction moves that
//! instruction's *content* to the end of the inserted run and gives its slot the first
//! inserted instruction. Every branch or region that named the original slot therefore
//! reaches the inserted sequence first, and the original instruction still follows it.
//! The one exception is the entry of a typed catch handler that starts with `rethrow`;
//! see [`Method::insert_at_offset`].
//!
//! # Usage Examples
//!
//! ```rust
//! use cilprobe::{assembly::{Instruction, OpCode}, rewriter::Method};
//!
//! // tiny header, code: br.s +5; br +0; ret
//! let data = [0x22, 0x2B, 0x05, 0x38, 0x00, 0x00, 0x00, 0x00, 0x2A];
//! let mut method = Method::decode(&data)?;
//! assert_eq!(method.len(), 3);
//!
//! let probe = [
//!     Instruction::with_operand(OpCode::LdcI4, 1),
//!     Instruction::with_operand(OpCode::Call, 0x0A00_0001),
//! ];
//! method.insert_at_original_offset(7, &probe)?;
//!
//! let mut buffer = vec![0u8; method.method_size()];
//! method.write(&mut buffer)?;
//! assert!(Method::decode(&buffer)?.is_instrumented(10, &probe));
//! # Ok::<(), cilprobe::Error>(())
//! ```

mod decode;
mod display;
mod insert;
mod region;

pub use region::ExceptionRegion;

use std::ops::Index;

use crate::{
    assembly::{Instruction, InstructionId, OpCode},
    file::writer::Writer,
    metadata::method::{MethodBody, MethodHeader, SectionFlags, FAT_HEADER_SIZE},
    Result,
};

/// A decoded method body that can be instrumented and encoded again.
#[derive(Debug, Clone)]
pub struct Method {
    header: MethodHeader,
    slots: Vec<Instruction>,
    order: Vec<InstructionId>,
    regions: Vec<ExceptionRegion>,
}

impl Method {
    /// The header as decoded, with the code size of the current layout.
    #[must_use]
    pub fn header(&self) -> &MethodHeader {
        &self.header
    }

    /// Maximum evaluation stack depth that will be written.
    #[must_use]
    pub fn max_stack(&self) -> u16 {
        self.header.max_stack
    }

    /// Raises the maximum stack depth by `extra` slots, saturating at `u16::MAX`.
    pub fn increase_max_stack(&mut self, extra: u16) {
        self.header.max_stack = self.header.max_stack.saturating_add(extra);
    }

    /// Number of instructions, including a trailing label if one was synthesized.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if the method has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Instruction handles in execution order.
    #[must_use]
    pub fn instruction_ids(&self) -> &[InstructionId] {
        &self.order
    }

    /// Instructions in execution order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.order.iter().map(|id| &self.slots[id.0])
    }

    /// Looks up an instruction by handle.
    #[must_use]
    pub fn get(&self, id: InstructionId) -> Option<&Instruction> {
        self.slots.get(id.0)
    }

    /// Exception regions in clause order.
    #[must_use]
    pub fn regions(&self) -> &[ExceptionRegion] {
        &self.regions
    }

    /// Code size of the current layout in bytes.
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.header.code_size as usize
    }

    /// Position of an instruction in execution order.
    #[must_use]
    pub fn position_of(&self, id: InstructionId) -> Option<usize> {
        self.order.iter().position(|candidate| *candidate == id)
    }

    /// Finds the instruction starting at `offset` in the current layout.
    #[must_use]
    pub fn find_by_offset(&self, offset: i64) -> Option<InstructionId> {
        let index = self
            .order
            .partition_point(|id| self.slots[id.0].offset < offset);
        self.order
            .get(index)
            .copied()
            .filter(|id| self.slots[id.0].offset == offset)
    }

    /// Finds the instruction that started at `offset` when the body was decoded.
    #[must_use]
    pub fn find_by_original_offset(&self, offset: i64) -> Option<InstructionId> {
        if offset < 0 {
            return None;
        }

        self.order
            .iter()
            .copied()
            .find(|id| self.slots[id.0].original_offset == offset)
    }

    /// Lays the instructions out again and re-derives every branch displacement.
    ///
    /// The first pass assigns offsets; the second computes each displacement from the
    /// final offset of its target, relative to the end of the branching instruction. For
    /// ordinary branches the single displacement also becomes the operand; for `switch` the
    /// operand becomes the case count.
    pub fn recalculate_offsets(&mut self) {
        let mut position = 0_i64;
        for id in &self.order {
            let instruction = &mut self.slots[id.0];
            instruction.offset = position;
            position += instruction.size() as i64;
        }
        self.header.code_size = u32::try_from(position).unwrap_or(u32::MAX);

        for index in 0..self.order.len() {
            let id = self.order[index];
            let instruction = &self.slots[id.0];
            if !instruction.is_branch() || instruction.branches.is_empty() {
                continue;
            }

            let end = instruction.offset + instruction.size() as i64;
            #[allow(clippy::cast_possible_truncation)]
            let displacements: Vec<i32> = instruction
                .branches
                .iter()
                .map(|target| (self.slots[target.0].offset - end) as i32)
                .collect();

            let instruction = &mut self.slots[id.0];
            if instruction.opcode == OpCode::Switch {
                instruction.operand = displacements.len() as i64;
            } else {
                instruction.operand = i64::from(displacements[0]);
            }
            instruction.branch_offsets = displacements;
        }
    }

    /// Size of the encoded body: fat header, code and, if there are exception regions,
    /// alignment padding plus one fat exception section.
    #[must_use]
    pub fn method_size(&self) -> usize {
        let mut size = FAT_HEADER_SIZE + self.code_size();
        if !self.regions.is_empty() {
            size = (size + 3) & !3;
            size += MethodBody::fat_section_size(self.regions.len());
        }
        size
    }

    /// Encodes the method into `buffer`, which must be exactly [`Method::method_size`] bytes.
    ///
    /// The output always uses the fat header and a single fat exception section, whatever
    /// shapes the input used.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the buffer has the wrong size.
    pub fn write(&self, buffer: &mut [u8]) -> Result<()> {
        let size = self.method_size();
        if buffer.len() != size {
            return Err(malformed_error!(
                "Buffer of {} bytes for a method body of {} bytes",
                buffer.len(),
                size
            ));
        }

        let mut writer = Writer::new(buffer);
        self.header
            .write_fat(&mut writer, self.header.code_size, !self.regions.is_empty())?;

        for id in &self.order {
            self.slots[id.0].write(&mut writer)?;
        }

        if !self.regions.is_empty() {
            writer.align(4)?;

            let section_size = u32::try_from(MethodBody::fat_section_size(self.regions.len()))
                .map_err(|_| malformed_error!("Too many exception regions"))?;
            let flags = SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT;
            writer.write_le((section_size << 8) | u32::from(flags.bits()))?;

            for region in &self.regions {
                region
                    .to_clause(|id| u32::try_from(self.slots[id.0].offset).unwrap_or(0))
                    .write_fat(&mut writer)?;
            }
        }

        Ok(())
    }

    /// Encodes the method into a freshly allocated buffer.
    ///
    /// # Errors
    /// See [`Method::write`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; self.method_size()];
        self.write(&mut buffer)?;
        Ok(buffer)
    }
}

impl Index<InstructionId> for Method {
    type Output = Instruction;

    fn index(&self, id: InstructionId) -> &Instruction {
        &self.slots[id.0]
    }
}
