//! Probe instruction sequences.
//!
//! A probe pushes its id and hands it to a collector. Two call shapes are supported:
//!
//! - [`Probe::Managed`]: `ldc.i4 id; call <method>` against a method injected into the module
//! - [`Probe::Unmanaged`]: `ldc.i4 id; ldc.i4|ldc.i8 <fn ptr>; calli <signature>` straight into
//!   a native callback
//!
//! # Usage Examples
//!
//! ```rust
//! use cilprobe::{assembly::OpCode, coverage::Probe, metadata::token::Token};
//!
//! let probe = Probe::Managed { method: Token::new(0x0A00_0010) };
//! let sequence = probe.sequence(42);
//! assert_eq!(sequence[0].opcode, OpCode::LdcI4);
//! assert_eq!(sequence[0].operand, 42);
//! assert_eq!(sequence[1].opcode, OpCode::Call);
//! assert_eq!(probe.stack_depth(), 1);
//! ```

use crate::{
    assembly::{Instruction, OpCode},
    metadata::token::Token,
};

/// Width of a native function pointer in the target process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerWidth {
    /// 32-bit process, pushed with `ldc.i4`
    Bits32,
    /// 64-bit process, pushed with `ldc.i8`
    #[default]
    Bits64,
}

/// Which probe shape a host should hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeStyle {
    /// Call an injected managed method
    #[default]
    Managed,
    /// Call a native callback through a function pointer
    Unmanaged(PointerWidth),
}

/// A resolved probe for one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// `call` to a managed visit method taking the id
    Managed {
        /// Method (`MethodDef` or `MemberRef`) token of the visit method
        method: Token,
    },
    /// `calli` to a native callback taking the id
    Unmanaged {
        /// Address of the callback
        function: u64,
        /// `StandAloneSig` token describing the callback signature
        signature: Token,
        /// Pointer width used to push `function`
        width: PointerWidth,
    },
}

impl Probe {
    /// The instruction sequence that reports `id`.
    #[must_use]
    pub fn sequence(&self, id: u32) -> Vec<Instruction> {
        let push_id = Instruction::with_operand(OpCode::LdcI4, i64::from(id as i32));
        match *self {
            Probe::Managed { method } => {
                vec![push_id, Instruction::with_operand(OpCode::Call, method.into())]
            }
            Probe::Unmanaged {
                function,
                signature,
                width,
            } => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                let push_function = match width {
                    PointerWidth::Bits32 => {
                        Instruction::with_operand(OpCode::LdcI4, i64::from(function as u32 as i32))
                    }
                    PointerWidth::Bits64 => {
                        Instruction::with_operand(OpCode::LdcI8, function as i64)
                    }
                };
                vec![
                    push_id,
                    push_function,
                    Instruction::with_operand(OpCode::Calli, signature.into()),
                ]
            }
        }
    }

    /// Evaluation stack slots the probe needs on top of the method's own.
    #[must_use]
    pub fn stack_depth(&self) -> u16 {
        match self {
            Probe::Managed { .. } => 1,
            Probe::Unmanaged { .. } => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmanaged_widths() {
        let wide = Probe::Unmanaged {
            function: 0x7FF0_1234_5678,
            signature: Token::new(0x1100_0001),
            width: PointerWidth::Bits64,
        };
        let sequence = wide.sequence(3);
        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence[1].opcode, OpCode::LdcI8);
        assert_eq!(sequence[1].operand, 0x7FF0_1234_5678);
        assert_eq!(sequence[2].opcode, OpCode::Calli);
        assert_eq!(sequence[2].operand, 0x1100_0001);
        assert_eq!(wide.stack_depth(), 2);

        let narrow = Probe::Unmanaged {
            function: 0x8000_0010,
            signature: Token::new(0x1100_0001),
            width: PointerWidth::Bits32,
        };
        let sequence = narrow.sequence(3);
        assert_eq!(sequence[1].opcode, OpCode::LdcI4);
        assert_eq!(sequence[1].operand, i64::from(0x8000_0010_u32 as i32));
        assert_eq!(sequence.iter().map(Instruction::size).sum::<usize>(), 15);
    }

    #[test]
    fn large_ids_keep_bit_pattern() {
        let probe = Probe::Managed {
            method: Token::new(0x0600_0001),
        };
        let sequence = probe.sequence(u32::MAX);
        assert_eq!(sequence[0].operand, -1);
        assert!(sequence.iter().all(|i| i.original_offset() == -1));
    }
}
