//! Static CIL operation table (ECMA-335 Partition III).
//!
//! Every opcode the rewriter understands is declared exactly once, in the `operations!`
//! invocation at the bottom of this module. The macro expands that list into the
//! [`crate::assembly::OpCode`] enum and into a static array of
//! [`crate::assembly::Operation`] records indexed by the enum discriminant, so
//! forward lookups are a plain array index.
//!
//! Reverse lookups (raw bytes to opcode) go through two 256-entry tables, one for
//! single-byte opcodes and one for opcodes behind the `0xFE` prefix. They are derived from
//! the same list the first time they are needed and never change afterwards, which makes
//! the table safe to share between compilation threads.
//!
//! # Usage Examples
//!
//! ```rust
//! use cilprobe::assembly::{FlowType, OpCode, OperandKind};
//!
//! let op = OpCode::decode(0x2B, None).unwrap();
//! assert_eq!(op, OpCode::BrS);
//! assert_eq!(op.mnemonic(), "br.s");
//! assert_eq!(op.operand(), OperandKind::ShortBranch);
//! assert_eq!(op.flow(), FlowType::UnconditionalBranch);
//! assert_eq!(op.long_form(), Some(OpCode::Br));
//!
//! let ceq = OpCode::decode(0xFE, Some(0x01)).unwrap();
//! assert_eq!(ceq.mnemonic(), "ceq");
//! assert_eq!(ceq.length(), 2);
//! ```

use std::{fmt, sync::OnceLock};

use strum::{EnumCount, EnumIter, IntoEnumIterator};

/// First byte of every two-byte opcode.
pub const FE_PREFIX: u8 = 0xFE;

/// How an operation is encoded in the code stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Zero-size marker that never appears in a real code stream
    Pseudo,
    /// Single opcode byte
    One(u8),
    /// `0xFE` followed by the given byte
    Two(u8),
}

/// Operand classes, following the `Inline*` names of ECMA-335 II.
///
/// The class decides both the encoded width and how the raw bytes are widened into the
/// 64-bit operand kept by [`crate::assembly::Instruction`]: signed classes are sign
/// extended, unsigned and bit-pattern classes are zero extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand present
    None,
    /// `ShortInlineBrTarget`, signed 8-bit displacement
    ShortBranch,
    /// `InlineBrTarget`, signed 32-bit displacement
    Branch,
    /// `ShortInlineI`, signed 8-bit integer
    ShortInt,
    /// `InlineI`, signed 32-bit integer
    Int,
    /// `InlineI8`, signed 64-bit integer
    Long,
    /// `ShortInlineVar`, unsigned 8-bit argument or local index
    ShortVar,
    /// `InlineVar`, unsigned 16-bit argument or local index
    Var,
    /// `ShortInlineR`, bit pattern of a 32-bit float
    Single,
    /// `InlineR`, bit pattern of a 64-bit float
    Double,
    /// Any metadata token (`InlineMethod`, `InlineField`, `InlineType`, `InlineTok`, `InlineString`, `InlineSig`)
    Token,
    /// `InlineSwitch`, the unsigned case count preceding the jump table
    Switch,
}

impl OperandKind {
    /// Encoded width of the fixed operand in bytes.
    ///
    /// For [`OperandKind::Switch`] this is the width of the case count only; the jump
    /// table that follows is accounted for by [`crate::assembly::Instruction::size`].
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            OperandKind::None => 0,
            OperandKind::ShortBranch | OperandKind::ShortInt | OperandKind::ShortVar => 1,
            OperandKind::Var => 2,
            OperandKind::Branch
            | OperandKind::Int
            | OperandKind::Single
            | OperandKind::Token
            | OperandKind::Switch => 4,
            OperandKind::Long | OperandKind::Double => 8,
        }
    }
}

/// Control-flow category of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to the next instruction
    Sequential,
    /// Debugger break
    Break,
    /// Call to another method
    Call,
    /// Leaves the method, a finally/fault block or a filter
    Return,
    /// Always branches to another location
    UnconditionalBranch,
    /// Branches or falls through; includes `switch`
    ConditionalBranch,
    /// Raises an exception
    Throw,
    /// Prefix modifying the following instruction
    Meta,
}

/// Static description of a single operation.
#[derive(Debug)]
pub struct Operation {
    /// The opcode this record describes
    pub opcode: OpCode,
    /// Display mnemonic as used by ILDasm
    pub mnemonic: &'static str,
    /// Byte encoding
    pub encoding: Encoding,
    /// Operand class
    pub operand: OperandKind,
    /// Control-flow category
    pub flow: FlowType,
}

impl Operation {
    /// Number of opcode bytes (0 for the label pseudo-op).
    #[must_use]
    pub const fn length(&self) -> usize {
        match self.encoding {
            Encoding::Pseudo => 0,
            Encoding::One(_) => 1,
            Encoding::Two(_) => 2,
        }
    }
}

struct ReverseTable {
    single: [Option<OpCode>; 256],
    extended: [Option<OpCode>; 256],
}

static REVERSE: OnceLock<ReverseTable> = OnceLock::new();

fn reverse_table() -> &'static ReverseTable {
    REVERSE.get_or_init(|| {
        let mut table = ReverseTable {
            single: [None; 256],
            extended: [None; 256],
        };

        for opcode in OpCode::iter() {
            match opcode.operation().encoding {
                Encoding::One(code) => table.single[usize::from(code)] = Some(opcode),
                Encoding::Two(code) => table.extended[usize::from(code)] = Some(opcode),
                Encoding::Pseudo => {}
            }
        }

        table
    })
}

impl OpCode {
    /// Returns the static record describing this opcode.
    #[must_use]
    pub fn operation(self) -> &'static Operation {
        &OPERATIONS[self as usize]
    }

    /// Looks up an opcode from its raw encoding.
    ///
    /// `second` must be provided when `first` is [`FE_PREFIX`] and is ignored otherwise.
    /// Returns `None` for unassigned encodings.
    #[must_use]
    pub fn decode(first: u8, second: Option<u8>) -> Option<OpCode> {
        let table = reverse_table();
        if first == FE_PREFIX {
            second.and_then(|code| table.extended[usize::from(code)])
        } else {
            table.single[usize::from(first)]
        }
    }

    /// Display mnemonic.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.operation().mnemonic
    }

    /// Operand class.
    #[must_use]
    pub fn operand(self) -> OperandKind {
        self.operation().operand
    }

    /// Control-flow category.
    #[must_use]
    pub fn flow(self) -> FlowType {
        self.operation().flow
    }

    /// Number of opcode bytes.
    #[must_use]
    pub fn length(self) -> usize {
        self.operation().length()
    }

    /// Returns `true` for unconditional and conditional branches, `switch` included.
    #[must_use]
    pub fn is_branch(self) -> bool {
        matches!(
            self.flow(),
            FlowType::UnconditionalBranch | FlowType::ConditionalBranch
        )
    }

    /// Returns the 4-byte displacement counterpart of a short branch.
    ///
    /// Covers `br.s`, `brfalse.s`, `brtrue.s`, the ten relational short branches and
    /// `leave.s`. Every other opcode yields `None`.
    #[must_use]
    pub fn long_form(self) -> Option<OpCode> {
        let long = match self {
            OpCode::BrS => OpCode::Br,
            OpCode::BrfalseS => OpCode::Brfalse,
            OpCode::BrtrueS => OpCode::Brtrue,
            OpCode::BeqS => OpCode::Beq,
            OpCode::BgeS => OpCode::Bge,
            OpCode::BgtS => OpCode::Bgt,
            OpCode::BleS => OpCode::Ble,
            OpCode::BltS => OpCode::Blt,
            OpCode::BneUnS => OpCode::BneUn,
            OpCode::BgeUnS => OpCode::BgeUn,
            OpCode::BgtUnS => OpCode::BgtUn,
            OpCode::BleUnS => OpCode::BleUn,
            OpCode::BltUnS => OpCode::BltUn,
            OpCode::LeaveS => OpCode::Leave,
            _ => return None,
        };
        Some(long)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

macro_rules! operations {
    ($( $variant:ident = $kind:ident $(($code:literal))?, $mnemonic:literal, $operand:ident, $flow:ident; )*) => {
        /// Every operation of the CIL instruction set, plus the zero-size `Label` marker
        /// used to anchor exception regions that end at the end of the method.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount, EnumIter)]
        #[allow(missing_docs)]
        pub enum OpCode {
            $( $variant, )*
        }

        static OPERATIONS: [Operation; <OpCode as EnumCount>::COUNT] = [
            $(
                Operation {
                    opcode: OpCode::$variant,
                    mnemonic: $mnemonic,
                    encoding: Encoding::$kind $(($code))?,
                    operand: OperandKind::$operand,
                    flow: FlowType::$flow,
                },
            )*
        ];
    };
}

operations! {
    Nop = One(0x00), "nop", None, Sequential;
    Break = One(0x01), "break", None, Break;
    Ldarg0 = One(0x02), "ldarg.0", None, Sequential;
    Ldarg1 = One(0x03), "ldarg.1", None, Sequential;
    Ldarg2 = One(0x04), "ldarg.2", None, Sequential;
    Ldarg3 = One(0x05), "ldarg.3", None, Sequential;
    Ldloc0 = One(0x06), "ldloc.0", None, Sequential;
    Ldloc1 = One(0x07), "ldloc.1", None, Sequential;
    Ldloc2 = One(0x08), "ldloc.2", None, Sequential;
    Ldloc3 = One(0x09), "ldloc.3", None, Sequential;
    Stloc0 = One(0x0A), "stloc.0", None, Sequential;
    Stloc1 = One(0x0B), "stloc.1", None, Sequential;
    Stloc2 = One(0x0C), "stloc.2", None, Sequential;
    Stloc3 = One(0x0D), "stloc.3", None, Sequential;
    LdargS = One(0x0E), "ldarg.s", ShortVar, Sequential;
    LdargaS = One(0x0F), "ldarga.s", ShortVar, Sequential;
    StargS = One(0x10), "starg.s", ShortVar, Sequential;
    LdlocS = One(0x11), "ldloc.s", ShortVar, Sequential;
    LdlocaS = One(0x12), "ldloca.s", ShortVar, Sequential;
    StlocS = One(0x13), "stloc.s", ShortVar, Sequential;
    Ldnull = One(0x14), "ldnull", None, Sequential;
    LdcI4M1 = One(0x15), "ldc.i4.m1", None, Sequential;
    LdcI4_0 = One(0x16), "ldc.i4.0", None, Sequential;
    LdcI4_1 = One(0x17), "ldc.i4.1", None, Sequential;
    LdcI4_2 = One(0x18), "ldc.i4.2", None, Sequential;
    LdcI4_3 = One(0x19), "ldc.i4.3", None, Sequential;
    LdcI4_4 = One(0x1A), "ldc.i4.4", None, Sequential;
    LdcI4_5 = One(0x1B), "ldc.i4.5", None, Sequential;
    LdcI4_6 = One(0x1C), "ldc.i4.6", None, Sequential;
    LdcI4_7 = One(0x1D), "ldc.i4.7", None, Sequential;
    LdcI4_8 = One(0x1E), "ldc.i4.8", None, Sequential;
    LdcI4S = One(0x1F), "ldc.i4.s", ShortInt, Sequential;
    LdcI4 = One(0x20), "ldc.i4", Int, Sequential;
    LdcI8 = One(0x21), "ldc.i8", Long, Sequential;
    LdcR4 = One(0x22), "ldc.r4", Single, Sequential;
    LdcR8 = One(0x23), "ldc.r8", Double, Sequential;
    Dup = One(0x25), "dup", None, Sequential;
    Pop = One(0x26), "pop", None, Sequential;
    Jmp = One(0x27), "jmp", Token, Call;
    Call = One(0x28), "call", Token, Call;
    Calli = One(0x29), "calli", Token, Call;
    Ret = One(0x2A), "ret", None, Return;
    BrS = One(0x2B), "br.s", ShortBranch, UnconditionalBranch;
    BrfalseS = One(0x2C), "brfalse.s", ShortBranch, ConditionalBranch;
    BrtrueS = One(0x2D), "brtrue.s", ShortBranch, ConditionalBranch;
    BeqS = One(0x2E), "beq.s", ShortBranch, ConditionalBranch;
    BgeS = One(0x2F), "bge.s", ShortBranch, ConditionalBranch;
    BgtS = One(0x30), "bgt.s", ShortBranch, ConditionalBranch;
    BleS = One(0x31), "ble.s", ShortBranch, ConditionalBranch;
    BltS = One(0x32), "blt.s", ShortBranch, ConditionalBranch;
    BneUnS = One(0x33), "bne.un.s", ShortBranch, ConditionalBranch;
    BgeUnS = One(0x34), "bge.un.s", ShortBranch, ConditionalBranch;
    BgtUnS = One(0x35), "bgt.un.s", ShortBranch, ConditionalBranch;
    BleUnS = One(0x36), "ble.un.s", ShortBranch, ConditionalBranch;
    BltUnS = One(0x37), "blt.un.s", ShortBranch, ConditionalBranch;
    Br = One(0x38), "br", Branch, UnconditionalBranch;
    Brfalse = One(0x39), "brfalse", Branch, ConditionalBranch;
    Brtrue = One(0x3A), "brtrue", Branch, ConditionalBranch;
    Beq = One(0x3B), "beq", Branch, ConditionalBranch;
    Bge = One(0x3C), "bge", Branch, ConditionalBranch;
    Bgt = One(0x3D), "bgt", Branch, ConditionalBranch;
    Ble = One(0x3E), "ble", Branch, ConditionalBranch;
    Blt = One(0x3F), "blt", Branch, ConditionalBranch;
    BneUn = One(0x40), "bne.un", Branch, ConditionalBranch;
    BgeUn = One(0x41), "bge.un", Branch, ConditionalBranch;
    BgtUn = One(0x42), "bgt.un", Branch, ConditionalBranch;
    BleUn = One(0x43), "ble.un", Branch, ConditionalBranch;
    BltUn = One(0x44), "blt.un", Branch, ConditionalBranch;
    Switch = One(0x45), "switch", Switch, ConditionalBranch;
    LdindI1 = One(0x46), "ldind.i1", None, Sequential;
    LdindU1 = One(0x47), "ldind.u1", None, Sequential;
    LdindI2 = One(0x48), "ldind.i2", None, Sequential;
    LdindU2 = One(0x49), "ldind.u2", None, Sequential;
    LdindI4 = One(0x4A), "ldind.i4", None, Sequential;
    LdindU4 = One(0x4B), "ldind.u4", None, Sequential;
    LdindI8 = One(0x4C), "ldind.i8", None, Sequential;
    LdindI = One(0x4D), "ldind.i", None, Sequential;
    LdindR4 = One(0x4E), "ldind.r4", None, Sequential;
    LdindR8 = One(0x4F), "ldind.r8", None, Sequential;
    LdindRef = One(0x50), "ldind.ref", None, Sequential;
    StindRef = One(0x51), "stind.ref", None, Sequential;
    StindI1 = One(0x52), "stind.i1", None, Sequential;
    StindI2 = One(0x53), "stind.i2", None, Sequential;
    StindI4 = One(0x54), "stind.i4", None, Sequential;
    StindI8 = One(0x55), "stind.i8", None, Sequential;
    StindR4 = One(0x56), "stind.r4", None, Sequential;
    StindR8 = One(0x57), "stind.r8", None, Sequential;
    Add = One(0x58), "add", None, Sequential;
    Sub = One(0x59), "sub", None, Sequential;
    Mul = One(0x5A), "mul", None, Sequential;
    Div = One(0x5B), "div", None, Sequential;
    DivUn = One(0x5C), "div.un", None, Sequential;
    Rem = One(0x5D), "rem", None, Sequential;
    RemUn = One(0x5E), "rem.un", None, Sequential;
    And = One(0x5F), "and", None, Sequential;
    Or = One(0x60), "or", None, Sequential;
    Xor = One(0x61), "xor", None, Sequential;
    Shl = One(0x62), "shl", None, Sequential;
    Shr = One(0x63), "shr", None, Sequential;
    ShrUn = One(0x64), "shr.un", None, Sequential;
    Neg = One(0x65), "neg", None, Sequential;
    Not = One(0x66), "not", None, Sequential;
    ConvI1 = One(0x67), "conv.i1", None, Sequential;
    ConvI2 = One(0x68), "conv.i2", None, Sequential;
    ConvI4 = One(0x69), "conv.i4", None, Sequential;
    ConvI8 = One(0x6A), "conv.i8", None, Sequential;
    ConvR4 = One(0x6B), "conv.r4", None, Sequential;
    ConvR8 = One(0x6C), "conv.r8", None, Sequential;
    ConvU4 = One(0x6D), "conv.u4", None, Sequential;
    ConvU8 = One(0x6E), "conv.u8", None, Sequential;
    Callvirt = One(0x6F), "callvirt", Token, Call;
    Cpobj = One(0x70), "cpobj", Token, Sequential;
    Ldobj = One(0x71), "ldobj", Token, Sequential;
    Ldstr = One(0x72), "ldstr", Token, Sequential;
    Newobj = One(0x73), "newobj", Token, Call;
    Castclass = One(0x74), "castclass", Token, Sequential;
    Isinst = One(0x75), "isinst", Token, Sequential;
    ConvRUn = One(0x76), "conv.r.un", None, Sequential;
    Unbox = One(0x79), "unbox", Token, Sequential;
    Throw = One(0x7A), "throw", None, Throw;
    Ldfld = One(0x7B), "ldfld", Token, Sequential;
    Ldflda = One(0x7C), "ldflda", Token, Sequential;
    Stfld = One(0x7D), "stfld", Token, Sequential;
    Ldsfld = One(0x7E), "ldsfld", Token, Sequential;
    Ldsflda = One(0x7F), "ldsflda", Token, Sequential;
    Stsfld = One(0x80), "stsfld", Token, Sequential;
    Stobj = One(0x81), "stobj", Token, Sequential;
    ConvOvfI1Un = One(0x82), "conv.ovf.i1.un", None, Sequential;
    ConvOvfI2Un = One(0x83), "conv.ovf.i2.un", None, Sequential;
    ConvOvfI4Un = One(0x84), "conv.ovf.i4.un", None, Sequential;
    ConvOvfI8Un = One(0x85), "conv.ovf.i8.un", None, Sequential;
    ConvOvfU1Un = One(0x86), "conv.ovf.u1.un", None, Sequential;
    ConvOvfU2Un = One(0x87), "conv.ovf.u2.un", None, Sequential;
    ConvOvfU4Un = One(0x88), "conv.ovf.u4.un", None, Sequential;
    ConvOvfU8Un = One(0x89), "conv.ovf.u8.un", None, Sequential;
    ConvOvfIUn = One(0x8A), "conv.ovf.i.un", None, Sequential;
    ConvOvfUUn = One(0x8B), "conv.ovf.u.un", None, Sequential;
    Box = One(0x8C), "box", Token, Sequential;
    Newarr = One(0x8D), "newarr", Token, Sequential;
    Ldlen = One(0x8E), "ldlen", None, Sequential;
    Ldelema = One(0x8F), "ldelema", Token, Sequential;
    LdelemI1 = One(0x90), "ldelem.i1", None, Sequential;
    LdelemU1 = One(0x91), "ldelem.u1", None, Sequential;
    LdelemI2 = One(0x92), "ldelem.i2", None, Sequential;
    LdelemU2 = One(0x93), "ldelem.u2", None, Sequential;
    LdelemI4 = One(0x94), "ldelem.i4", None, Sequential;
    LdelemU4 = One(0x95), "ldelem.u4", None, Sequential;
    LdelemI8 = One(0x96), "ldelem.i8", None, Sequential;
    LdelemI = One(0x97), "ldelem.i", None, Sequential;
    LdelemR4 = One(0x98), "ldelem.r4", None, Sequential;
    LdelemR8 = One(0x99), "ldelem.r8", None, Sequential;
    LdelemRef = One(0x9A), "ldelem.ref", None, Sequential;
    StelemI = One(0x9B), "stelem.i", None, Sequential;
    StelemI1 = One(0x9C), "stelem.i1", None, Sequential;
    StelemI2 = One(0x9D), "stelem.i2", None, Sequential;
    StelemI4 = One(0x9E), "stelem.i4", None, Sequential;
    StelemI8 = One(0x9F), "stelem.i8", None, Sequential;
    StelemR4 = One(0xA0), "stelem.r4", None, Sequential;
    StelemR8 = One(0xA1), "stelem.r8", None, Sequential;
    StelemRef = One(0xA2), "stelem.ref", None, Sequential;
    Ldelem = One(0xA3), "ldelem", Token, Sequential;
    Stelem = One(0xA4), "stelem", Token, Sequential;
    UnboxAny = One(0xA5), "unbox.any", Token, Sequential;
    ConvOvfI1 = One(0xB3), "conv.ovf.i1", None, Sequential;
    ConvOvfU1 = One(0xB4), "conv.ovf.u1", None, Sequential;
    ConvOvfI2 = One(0xB5), "conv.ovf.i2", None, Sequential;
    ConvOvfU2 = One(0xB6), "conv.ovf.u2", None, Sequential;
    ConvOvfI4 = One(0xB7), "conv.ovf.i4", None, Sequential;
    ConvOvfU4 = One(0xB8), "conv.ovf.u4", None, Sequential;
    ConvOvfI8 = One(0xB9), "conv.ovf.i8", None, Sequential;
    ConvOvfU8 = One(0xBA), "conv.ovf.u8", None, Sequential;
    Refanyval = One(0xC2), "refanyval", Token, Sequential;
    Ckfinite = One(0xC3), "ckfinite", None, Sequential;
    Mkrefany = One(0xC6), "mkrefany", Token, Sequential;
    Ldtoken = One(0xD0), "ldtoken", Token, Sequential;
    ConvU2 = One(0xD1), "conv.u2", None, Sequential;
    ConvU1 = One(0xD2), "conv.u1", None, Sequential;
    ConvI = One(0xD3), "conv.i", None, Sequential;
    ConvOvfI = One(0xD4), "conv.ovf.i", None, Sequential;
    ConvOvfU = One(0xD5), "conv.ovf.u", None, Sequential;
    AddOvf = One(0xD6), "add.ovf", None, Sequential;
    AddOvfUn = One(0xD7), "add.ovf.un", None, Sequential;
    MulOvf = One(0xD8), "mul.ovf", None, Sequential;
    MulOvfUn = One(0xD9), "mul.ovf.un", None, Sequential;
    SubOvf = One(0xDA), "sub.ovf", None, Sequential;
    SubOvfUn = One(0xDB), "sub.ovf.un", None, Sequential;
    Endfinally = One(0xDC), "endfinally", None, Return;
    Leave = One(0xDD), "leave", Branch, UnconditionalBranch;
    LeaveS = One(0xDE), "leave.s", ShortBranch, UnconditionalBranch;
    StindI = One(0xDF), "stind.i", None, Sequential;
    ConvU = One(0xE0), "conv.u", None, Sequential;
    Arglist = Two(0x00), "arglist", None, Sequential;
    Ceq = Two(0x01), "ceq", None, Sequential;
    Cgt = Two(0x02), "cgt", None, Sequential;
    CgtUn = Two(0x03), "cgt.un", None, Sequential;
    Clt = Two(0x04), "clt", None, Sequential;
    CltUn = Two(0x05), "clt.un", None, Sequential;
    Ldftn = Two(0x06), "ldftn", Token, Sequential;
    Ldvirtftn = Two(0x07), "ldvirtftn", Token, Sequential;
    Ldarg = Two(0x09), "ldarg", Var, Sequential;
    Ldarga = Two(0x0A), "ldarga", Var, Sequential;
    Starg = Two(0x0B), "starg", Var, Sequential;
    Ldloc = Two(0x0C), "ldloc", Var, Sequential;
    Ldloca = Two(0x0D), "ldloca", Var, Sequential;
    Stloc = Two(0x0E), "stloc", Var, Sequential;
    Localloc = Two(0x0F), "localloc", None, Sequential;
    Endfilter = Two(0x11), "endfilter", None, Return;
    Unaligned = Two(0x12), "unaligned.", ShortInt, Meta;
    Volatile = Two(0x13), "volatile.", None, Meta;
    Tail = Two(0x14), "tail.", None, Meta;
    Initobj = Two(0x15), "initobj", Token, Sequential;
    Constrained = Two(0x16), "constrained.", Token, Meta;
    Cpblk = Two(0x17), "cpblk", None, Sequential;
    Initblk = Two(0x18), "initblk", None, Sequential;
    No = Two(0x19), "no.", ShortInt, Meta;
    Rethrow = Two(0x1A), "rethrow", None, Throw;
    Sizeof = Two(0x1C), "sizeof", Token, Sequential;
    Refanytype = Two(0x1D), "refanytype", None, Sequential;
    Readonly = Two(0x1E), "readonly.", None, Meta;
    Label = Pseudo, "label", None, Meta;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_discriminant() {
        for opcode in OpCode::iter() {
            assert_eq!(opcode.operation().opcode, opcode);
        }
    }

    #[test]
    fn reverse_lookup_agrees_with_table() {
        let mut single = 0;
        let mut extended = 0;

        for opcode in OpCode::iter() {
            match opcode.operation().encoding {
                Encoding::One(code) => {
                    single += 1;
                    assert_eq!(OpCode::decode(code, None), Some(opcode));
                }
                Encoding::Two(code) => {
                    extended += 1;
                    assert_eq!(OpCode::decode(FE_PREFIX, Some(code)), Some(opcode));
                }
                Encoding::Pseudo => assert_eq!(opcode, OpCode::Label),
            }
        }

        assert_eq!(single, 191);
        assert_eq!(extended, 28);
    }

    #[test]
    fn unassigned_encodings() {
        assert_eq!(OpCode::decode(0x24, None), None);
        assert_eq!(OpCode::decode(0xA6, None), None);
        assert_eq!(OpCode::decode(0xFE, Some(0x08)), None);
        assert_eq!(OpCode::decode(0xFE, Some(0x1B)), None);
        assert_eq!(OpCode::decode(0xFE, None), None);
    }

    #[test]
    fn short_branches_have_long_forms() {
        let shorts: Vec<OpCode> = OpCode::iter()
            .filter(|op| op.operand() == OperandKind::ShortBranch)
            .collect();
        assert_eq!(shorts.len(), 14);

        for short in shorts {
            let long = short.long_form().unwrap();
            assert_eq!(long.operand(), OperandKind::Branch);
            assert_eq!(long.flow(), short.flow());
            assert_eq!(format!("{}.s", long.mnemonic()), short.mnemonic());
        }

        assert_eq!(OpCode::Br.long_form(), None);
        assert_eq!(OpCode::Switch.long_form(), None);
    }

    #[test]
    fn flow_categories() {
        assert!(OpCode::Switch.is_branch());
        assert!(OpCode::Leave.is_branch());
        assert!(OpCode::BrfalseS.is_branch());
        assert!(!OpCode::Call.is_branch());
        assert!(!OpCode::Ret.is_branch());
        assert_eq!(OpCode::Rethrow.flow(), FlowType::Throw);
        assert_eq!(OpCode::Endfinally.flow(), FlowType::Return);
        assert_eq!(OpCode::Tail.flow(), FlowType::Meta);
    }

    #[test]
    fn sizes() {
        assert_eq!(OpCode::Ret.length(), 1);
        assert_eq!(OpCode::Ceq.length(), 2);
        assert_eq!(OpCode::Label.length(), 0);
        assert_eq!(OpCode::LdcI8.operand().size(), 8);
        assert_eq!(OpCode::Ldarg.operand().size(), 2);
        assert_eq!(OpCode::Switch.operand().size(), 4);
        assert_eq!(OpCode::LdargS.operand().size(), 1);
    }
}
