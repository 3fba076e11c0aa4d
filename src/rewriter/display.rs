use std::fmt;

use crate::{assembly::InstructionId, metadata::method::ExceptionHandlerKind, rewriter::Method};

impl Method {
    /// Renders the IL listing of the current layout, as produced by the `Display` impl.
    #[must_use]
    pub fn dump(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            ".maxstack {} // code size {} bytes, locals 0x{:08x}{}",
            self.header.max_stack,
            self.header.code_size,
            self.header.local_var_sig_token,
            if self.header.is_init_local() { ", init" } else { "" }
        )?;

        for instruction in self.instructions() {
            let line = instruction.to_string();
            if instruction.original_offset() >= 0 {
                writeln!(f, "  {line:<48} // was IL_{:04x}", instruction.original_offset())?;
            } else {
                writeln!(f, "  {line:<48} // injected")?;
            }
        }

        for region in &self.regions {
            let offset = |id: InstructionId| self.slots.get(id.0).map_or(-1, |i| i.offset);
            write!(
                f,
                "  .try IL_{:04x} to IL_{:04x}",
                offset(region.try_start),
                offset(region.try_end)
            )?;
            match region.kind {
                ExceptionHandlerKind::Catch => write!(
                    f,
                    " catch {}",
                    region.class_token.unwrap_or_default()
                )?,
                ExceptionHandlerKind::Filter => write!(
                    f,
                    " filter IL_{:04x}",
                    region.filter_start.map_or(-1, offset)
                )?,
                ExceptionHandlerKind::Finally => f.write_str(" finally")?,
                ExceptionHandlerKind::Fault => f.write_str(" fault")?,
            }
            writeln!(
                f,
                " handler IL_{:04x} to IL_{:04x}",
                offset(region.handler_start),
                offset(region.handler_end)
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        assembly::{Instruction, OpCode},
        rewriter::Method,
        Result,
    };

    #[test]
    fn listing() -> Result<()> {
        #[rustfmt::skip]
        let data = [
            0x0B, 0x30, 0x01, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0xDE, 0x00, 0x2A, 0xDC,
            0x00, 0x00, 0x00,
            0x01, 0x10, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x00, 0x03, 0x04, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut method = Method::decode(&data)?;
        method.insert_at_original_offset(3, &[Instruction::with_operand(OpCode::LdcI4, 4)])?;

        let dump = method.dump();
        let lines: Vec<&str> = dump.lines().collect();
        assert!(lines[0].starts_with(".maxstack 1 // code size 13 bytes"));
        assert!(lines[1].contains("IL_0000: nop"));
        assert!(lines[1].ends_with("// was IL_0000"));
        assert!(lines[2].contains("IL_0001: leave IL_0006"));
        assert!(lines[3].contains("IL_0006: ldc.i4 4"));
        assert!(lines[3].ends_with("// injected"));
        assert!(lines[4].ends_with("// was IL_0003"));
        assert_eq!(
            lines.last().copied(),
            Some("  .try IL_0000 to IL_0006 finally handler IL_000c to IL_000d")
        );

        Ok(())
    }
}
