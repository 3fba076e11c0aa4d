use crate::{
    assembly::{Instruction, InstructionId, OpCode, PENDING_DISPLACEMENT},
    file::parser::Parser,
    metadata::method::{ExceptionHandler, MethodBody},
    rewriter::{ExceptionRegion, Method},
    Error, Result,
};

impl Method {
    /// Decodes a raw method body.
    ///
    /// After the instructions and exception clauses are read, branch displacements are
    /// resolved to instruction handles, every short branch is widened to its long form and
    /// the body is laid out again, so the code size usually grows.
    ///
    /// # Errors
    /// - [`crate::Error::Empty`] for an empty buffer
    /// - [`crate::Error::Malformed`] / [`crate::Error::OutOfBounds`] for a damaged header,
    ///   code stream or data section
    /// - [`crate::Error::UnknownOpcode`] for an unassigned opcode
    /// - [`crate::Error::InstructionNotFound`] if a branch or region boundary does not land
    ///   on an instruction
    pub fn decode(data: &[u8]) -> Result<Method> {
        let body = MethodBody::from(data)?;
        let code = body.code(data)?;

        let mut method = Method {
            header: body.header.clone(),
            slots: Vec::new(),
            order: Vec::new(),
            regions: Vec::with_capacity(body.exception_handlers.len()),
        };

        let mut parser = Parser::new(code);
        while parser.has_more_data() {
            let instruction = Instruction::read(&mut parser)?;
            method.push(instruction);
        }

        for clause in &body.exception_handlers {
            let region = method.bind_region(clause)?;
            method.regions.push(region);
        }

        method.resolve_branches()?;
        method.normalize_branches();
        method.recalculate_offsets();

        log::debug!(
            "Decoded method body: {} instructions, {} exception regions, {} -> {} bytes of code",
            method.len(),
            method.regions.len(),
            code.len(),
            method.code_size()
        );

        Ok(method)
    }

    pub(crate) fn push(&mut self, instruction: Instruction) -> InstructionId {
        let id = InstructionId(self.slots.len());
        self.slots.push(instruction);
        self.order.push(id);
        id
    }

    fn bind_region(&mut self, clause: &ExceptionHandler) -> Result<ExceptionRegion> {
        let Some(kind) = clause.kind() else {
            return Err(malformed_error!(
                "Invalid exception clause flags - 0x{:04X}",
                clause.flags.bits()
            ));
        };

        let try_start = self.resolve_boundary(u64::from(clause.try_offset), false)?;
        let try_end = self.resolve_boundary(clause.try_end(), true)?;
        let handler_start = self.resolve_boundary(u64::from(clause.handler_offset), false)?;
        let handler_end = self.resolve_boundary(clause.handler_end(), true)?;
        let filter_start = match clause.filter_offset() {
            Some(offset) => Some(self.resolve_boundary(u64::from(offset), false)?),
            None => None,
        };

        Ok(ExceptionRegion {
            kind,
            try_start,
            try_end,
            handler_start,
            handler_end,
            filter_start,
            class_token: clause.class_token(),
        })
    }

    /// Resolves a region boundary. An end boundary that lies exactly at the end of the code
    /// is anchored on a label appended for that purpose.
    fn resolve_boundary(&mut self, offset: u64, is_end: bool) -> Result<InstructionId> {
        let Ok(offset) = i64::try_from(offset) else {
            return Err(Error::InstructionNotFound(i64::MAX));
        };

        if let Some(id) = self.find_by_offset(offset) {
            return Ok(id);
        }

        let code_end = i64::from(self.header.code_size);
        if is_end && offset == code_end {
            let mut label = Instruction::new(OpCode::Label);
            label.offset = code_end;
            return Ok(self.push(label));
        }

        Err(Error::InstructionNotFound(offset))
    }

    fn resolve_branches(&mut self) -> Result<()> {
        for index in 0..self.order.len() {
            let id = self.order[index];
            let instruction = &self.slots[id.0];
            if instruction.branch_offsets.is_empty() {
                continue;
            }

            let end = instruction.offset + instruction.size() as i64;
            let targets = instruction
                .branch_offsets
                .iter()
                .map(|displacement| {
                    let target = end + i64::from(*displacement);
                    self.find_by_offset(target)
                        .filter(|target| self.slots[target.0].opcode != OpCode::Label)
                        .ok_or(Error::InstructionNotFound(target))
                })
                .collect::<Result<Vec<_>>>()?;

            self.slots[id.0].branches = targets;
        }

        Ok(())
    }

    fn normalize_branches(&mut self) {
        for instruction in &mut self.slots {
            if let Some(long) = instruction.opcode.long_form() {
                instruction.opcode = long;
                instruction.operand = PENDING_DISPLACEMENT;
            }
            instruction.branch_offsets.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assembly::OperandKind, metadata::method::ExceptionHandlerKind};

    #[test]
    fn tiny_branches() -> Result<()> {
        let data = [0x22, 0x2B, 0x05, 0x38, 0x00, 0x00, 0x00, 0x00, 0x2A];
        let method = Method::decode(&data)?;

        assert_eq!(method.len(), 3);
        let ids = method.instruction_ids();
        let ret = ids[2];
        assert_eq!(method[ret].opcode, OpCode::Ret);
        assert_eq!(method[ids[0]].branches(), &[ret]);
        assert_eq!(method[ids[1]].branches(), &[ret]);

        assert_eq!(method[ids[0]].opcode, OpCode::Br);
        assert_eq!(method[ids[0]].operand, 5);
        assert_eq!(method[ids[1]].operand, 0);
        assert_eq!(method[ret].original_offset(), 7);
        assert_eq!(method[ret].offset(), 10);
        assert_eq!(method.code_size(), 11);

        Ok(())
    }

    #[test]
    fn all_short_branches_widen() -> Result<()> {
        let shorts: Vec<OpCode> = [
            0x2B_u8, 0x2C, 0x2D, 0x2E, 0x2F, 0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37,
            0xDE,
        ]
        .iter()
        .map(|code| OpCode::decode(*code, None).unwrap())
        .collect();

        // every short branch jumps to the final ret
        let mut code = Vec::new();
        for (index, opcode) in shorts.iter().enumerate() {
            let remaining = (shorts.len() - index - 1) * 2;
            code.extend_from_slice(&[code_byte(*opcode), remaining as u8]);
        }
        code.push(0x2A);

        let mut data = vec![((code.len() as u8) << 2) | 0x2];
        data.extend_from_slice(&code);
        let method = Method::decode(&data)?;

        let ret = *method.instruction_ids().last().unwrap();
        for (instruction, short) in method.instructions().zip(&shorts) {
            assert_eq!(Some(instruction.opcode), short.long_form());
            assert_eq!(instruction.opcode.operand(), OperandKind::Branch);
            assert_eq!(instruction.branches(), &[ret]);
        }

        Ok(())
    }

    fn code_byte(opcode: OpCode) -> u8 {
        match opcode.operation().encoding {
            crate::assembly::Encoding::One(code) => code,
            _ => unreachable!(),
        }
    }

    #[test]
    fn switch_resolves_each_case() -> Result<()> {
        #[rustfmt::skip]
        let code = [
            0x02,                                   // 0: ldarg.0
            0x45, 0x02, 0x00, 0x00, 0x00,           // 1: switch (2 cases)
            0x01, 0x00, 0x00, 0x00,                 //    -> 15
            0x02, 0x00, 0x00, 0x00,                 //    -> 16
            0x00,                                   // 14: nop
            0x00,                                   // 15: nop
            0x2A,                                   // 16: ret
        ];
        let mut data = vec![((code.len() as u8) << 2) | 0x2];
        data.extend_from_slice(&code);
        let method = Method::decode(&data)?;

        let ids = method.instruction_ids();
        let switch = &method[ids[1]];
        assert_eq!(switch.opcode, OpCode::Switch);
        assert_eq!(switch.branches(), &[ids[3], ids[4]]);
        assert_eq!(switch.branch_offsets(), &[1, 2]);
        assert_eq!(switch.operand, 2);
        assert_eq!(method.code_size(), code.len());

        Ok(())
    }

    #[test]
    fn branch_into_instruction_fails() {
        // br.s +1 lands inside ldc.i4.s
        let data = [0x12, 0x2B, 0x01, 0x1F, 0x05];
        assert!(matches!(
            Method::decode(&data),
            Err(Error::InstructionNotFound(3))
        ));
    }

    #[test]
    fn region_ending_with_code_gets_label() -> Result<()> {
        #[rustfmt::skip]
        let data = [
            0x0B, 0x30, 0x01, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            // try: nop; leave.s +0 (-> ret) | ret | finally: endfinally
            0x00, 0xDE, 0x00, 0x2A, 0xDC,
            0x00, 0x00, 0x00,
            0x01, 0x10, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x00, 0x03, 0x04, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
        ];
        let method = Method::decode(&data)?;

        assert_eq!(method.len(), 5);
        let ids = method.instruction_ids();
        assert_eq!(method[ids[4]].opcode, OpCode::Label);
        assert_eq!(method[ids[4]].original_offset(), -1);

        let region = &method.regions()[0];
        assert_eq!(region.kind, ExceptionHandlerKind::Finally);
        assert_eq!(region.try_start, ids[0]);
        assert_eq!(region.try_end, ids[2]);
        assert_eq!(region.handler_start, ids[3]);
        assert_eq!(region.handler_end, ids[4]);
        assert_eq!(method[ids[4]].offset(), method.code_size() as i64);

        Ok(())
    }

    #[test]
    fn region_inside_instruction_fails() {
        #[rustfmt::skip]
        let data = [
            0x0B, 0x30, 0x01, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x1F, 0x05, 0x2A,
            0x00,
            0x01, 0x10, 0x00, 0x00,
            0x02, 0x00, 0x01, 0x00, 0x01, 0x02, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
        ];
        assert!(matches!(
            Method::decode(&data),
            Err(Error::InstructionNotFound(1))
        ));
    }

    #[test]
    fn filter_region_survives_write() -> Result<()> {
        #[rustfmt::skip]
        let data = [
            0x0B, 0x30, 0x02, 0x00, 0x0B, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            // try: nop; leave.s -> ret | filter: pop; ldc.i4.1; endfilter | handler: pop; leave.s -> ret | ret
            0x00, 0xDE, 0x07, 0x26, 0x17, 0xFE, 0x11, 0x26, 0xDE, 0x00, 0x2A,
            0x00,
            0x01, 0x10, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x03, 0x07, 0x00, 0x03, 0x03, 0x00, 0x00, 0x00,
        ];
        let method = Method::decode(&data)?;

        let ids = method.instruction_ids().to_vec();
        assert_eq!(ids.len(), 8);
        let region = method.regions()[0].clone();
        assert_eq!(region.kind, ExceptionHandlerKind::Filter);
        assert_eq!(region.filter_start, Some(ids[2]));
        assert_eq!(region.handler_start, ids[5]);
        assert_eq!(region.handler_end, ids[7]);
        assert_eq!(region.class_token, None);
        assert_eq!(method.code_size(), 17);

        let decoded = Method::decode(&method.to_bytes()?)?;
        let region = &decoded.regions()[0];
        assert_eq!(decoded[region.try_end].original_offset(), 6);
        assert_eq!(decoded[region.filter_start.unwrap()].original_offset(), 6);
        assert_eq!(decoded[region.handler_start].original_offset(), 10);
        assert_eq!(decoded[region.handler_end].original_offset(), 16);

        Ok(())
    }
}
