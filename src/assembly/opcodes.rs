//! CIL opcodes (ECMA-335 Partition III).
//!
//! Every opcode is a variant of [`OpCode`]. The table below is the single source of truth
//! for the encoded value, the mnemonic, the operand shape and the control-flow class of each
//! opcode. Single-byte opcodes encode as `0x00XX`; two-byte opcodes carry the `0xFE` prefix in
//! the high byte (e.g. [`OpCode::Initblk`] = `0xFE18`).
//!
//! Mnemonics round-trip through [`std::str::FromStr`] and [`std::fmt::Display`]:
//!
//! ```rust
//! use cilpatch::assembly::OpCode;
//!
//! let op: OpCode = "ble.un.s".parse().unwrap();
//! assert_eq!(op, OpCode::BleUnS);
//! assert_eq!(op.long_form(), OpCode::BleUn);
//! assert_eq!(OpCode::Initblk.to_string(), "initblk");
//! ```
#![allow(missing_docs)]

use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

use crate::assembly::instruction::{FlowType, OperandKind};

/// Prefix byte shared by all two-byte opcodes.
pub const FE_PREFIX: u8 = 0xFE;

macro_rules! define_opcodes {
    ($( $variant:ident = $value:literal, $mnemonic:tt, $operand:ident, $flow:ident; )*) => {
        /// A CIL opcode.
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Display, EnumString, EnumIter, EnumCount, IntoStaticStr,
        )]
        pub enum OpCode {
            $(
                #[strum(serialize = $mnemonic)]
                $variant,
            )*
        }

        impl OpCode {
            /// Encoded opcode value (`0xFEXX` for two-byte opcodes).
            #[must_use]
            pub const fn value(self) -> u16 {
                match self {
                    $( OpCode::$variant => $value, )*
                }
            }

            /// The instruction mnemonic, e.g. `"ldfld"`.
            #[must_use]
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( OpCode::$variant => $mnemonic, )*
                }
            }

            /// The operand shape this opcode expects.
            #[must_use]
            pub const fn operand_kind(self) -> OperandKind {
                match self {
                    $( OpCode::$variant => OperandKind::$operand, )*
                }
            }

            /// How this opcode affects control flow.
            #[must_use]
            pub const fn flow_type(self) -> FlowType {
                match self {
                    $( OpCode::$variant => FlowType::$flow, )*
                }
            }
        }
    };
}

define_opcodes! {
    // Misc
    Nop = 0x0000, "nop", None, Sequential;
    Break = 0x0001, "break", None, Sequential;

    // Load/store argument and local shorthand
    Ldarg0 = 0x0002, "ldarg.0", None, Sequential;
    Ldarg1 = 0x0003, "ldarg.1", None, Sequential;
    Ldarg2 = 0x0004, "ldarg.2", None, Sequential;
    Ldarg3 = 0x0005, "ldarg.3", None, Sequential;
    Ldloc0 = 0x0006, "ldloc.0", None, Sequential;
    Ldloc1 = 0x0007, "ldloc.1", None, Sequential;
    Ldloc2 = 0x0008, "ldloc.2", None, Sequential;
    Ldloc3 = 0x0009, "ldloc.3", None, Sequential;
    Stloc0 = 0x000A, "stloc.0", None, Sequential;
    Stloc1 = 0x000B, "stloc.1", None, Sequential;
    Stloc2 = 0x000C, "stloc.2", None, Sequential;
    Stloc3 = 0x000D, "stloc.3", None, Sequential;
    LdargS = 0x000E, "ldarg.s", ShortArgument, Sequential;
    LdargaS = 0x000F, "ldarga.s", ShortArgument, Sequential;
    StargS = 0x0010, "starg.s", ShortArgument, Sequential;
    LdlocS = 0x0011, "ldloc.s", ShortLocal, Sequential;
    LdlocaS = 0x0012, "ldloca.s", ShortLocal, Sequential;
    StlocS = 0x0013, "stloc.s", ShortLocal, Sequential;

    // Null / constant loaders
    Ldnull = 0x0014, "ldnull", None, Sequential;
    LdcI4M1 = 0x0015, "ldc.i4.m1", None, Sequential;
    LdcI40 = 0x0016, "ldc.i4.0", None, Sequential;
    LdcI41 = 0x0017, "ldc.i4.1", None, Sequential;
    LdcI42 = 0x0018, "ldc.i4.2", None, Sequential;
    LdcI43 = 0x0019, "ldc.i4.3", None, Sequential;
    LdcI44 = 0x001A, "ldc.i4.4", None, Sequential;
    LdcI45 = 0x001B, "ldc.i4.5", None, Sequential;
    LdcI46 = 0x001C, "ldc.i4.6", None, Sequential;
    LdcI47 = 0x001D, "ldc.i4.7", None, Sequential;
    LdcI48 = 0x001E, "ldc.i4.8", None, Sequential;
    LdcI4S = 0x001F, "ldc.i4.s", Int8, Sequential;
    LdcI4 = 0x0020, "ldc.i4", Int32, Sequential;
    LdcI8 = 0x0021, "ldc.i8", Int64, Sequential;
    LdcR4 = 0x0022, "ldc.r4", Float32, Sequential;
    LdcR8 = 0x0023, "ldc.r8", Float64, Sequential;

    // Stack manipulation
    Dup = 0x0025, "dup", None, Sequential;
    Pop = 0x0026, "pop", None, Sequential;

    // Call / return
    Jmp = 0x0027, "jmp", Method, Call;
    Call = 0x0028, "call", Method, Call;
    Calli = 0x0029, "calli", Signature, Call;
    Ret = 0x002A, "ret", None, Return;

    // Branch (short form)
    BrS = 0x002B, "br.s", ShortBranch, UnconditionalBranch;
    BrfalseS = 0x002C, "brfalse.s", ShortBranch, ConditionalBranch;
    BrtrueS = 0x002D, "brtrue.s", ShortBranch, ConditionalBranch;
    BeqS = 0x002E, "beq.s", ShortBranch, ConditionalBranch;
    BgeS = 0x002F, "bge.s", ShortBranch, ConditionalBranch;
    BgtS = 0x0030, "bgt.s", ShortBranch, ConditionalBranch;
    BleS = 0x0031, "ble.s", ShortBranch, ConditionalBranch;
    BltS = 0x0032, "blt.s", ShortBranch, ConditionalBranch;
    BneUnS = 0x0033, "bne.un.s", ShortBranch, ConditionalBranch;
    BgeUnS = 0x0034, "bge.un.s", ShortBranch, ConditionalBranch;
    BgtUnS = 0x0035, "bgt.un.s", ShortBranch, ConditionalBranch;
    BleUnS = 0x0036, "ble.un.s", ShortBranch, ConditionalBranch;
    BltUnS = 0x0037, "blt.un.s", ShortBranch, ConditionalBranch;

    // Branch (long form)
    Br = 0x0038, "br", Branch, UnconditionalBranch;
    Brfalse = 0x0039, "brfalse", Branch, ConditionalBranch;
    Brtrue = 0x003A, "brtrue", Branch, ConditionalBranch;
    Beq = 0x003B, "beq", Branch, ConditionalBranch;
    Bge = 0x003C, "bge", Branch, ConditionalBranch;
    Bgt = 0x003D, "bgt", Branch, ConditionalBranch;
    Ble = 0x003E, "ble", Branch, ConditionalBranch;
    Blt = 0x003F, "blt", Branch, ConditionalBranch;
    BneUn = 0x0040, "bne.un", Branch, ConditionalBranch;
    BgeUn = 0x0041, "bge.un", Branch, ConditionalBranch;
    BgtUn = 0x0042, "bgt.un", Branch, ConditionalBranch;
    BleUn = 0x0043, "ble.un", Branch, ConditionalBranch;
    BltUn = 0x0044, "blt.un", Branch, ConditionalBranch;

    // Switch
    Switch = 0x0045, "switch", Switch, Switch;

    // Indirect load
    LdindI1 = 0x0046, "ldind.i1", None, Sequential;
    LdindU1 = 0x0047, "ldind.u1", None, Sequential;
    LdindI2 = 0x0048, "ldind.i2", None, Sequential;
    LdindU2 = 0x0049, "ldind.u2", None, Sequential;
    LdindI4 = 0x004A, "ldind.i4", None, Sequential;
    LdindU4 = 0x004B, "ldind.u4", None, Sequential;
    LdindI8 = 0x004C, "ldind.i8", None, Sequential;
    LdindI = 0x004D, "ldind.i", None, Sequential;
    LdindR4 = 0x004E, "ldind.r4", None, Sequential;
    LdindR8 = 0x004F, "ldind.r8", None, Sequential;
    LdindRef = 0x0050, "ldind.ref", None, Sequential;

    // Indirect store
    StindRef = 0x0051, "stind.ref", None, Sequential;
    StindI1 = 0x0052, "stind.i1", None, Sequential;
    StindI2 = 0x0053, "stind.i2", None, Sequential;
    StindI4 = 0x0054, "stind.i4", None, Sequential;
    StindI8 = 0x0055, "stind.i8", None, Sequential;
    StindR4 = 0x0056, "stind.r4", None, Sequential;
    StindR8 = 0x0057, "stind.r8", None, Sequential;

    // Arithmetic
    Add = 0x0058, "add", None, Sequential;
    Sub = 0x0059, "sub", None, Sequential;
    Mul = 0x005A, "mul", None, Sequential;
    Div = 0x005B, "div", None, Sequential;
    DivUn = 0x005C, "div.un", None, Sequential;
    Rem = 0x005D, "rem", None, Sequential;
    RemUn = 0x005E, "rem.un", None, Sequential;

    // Bitwise / logical
    And = 0x005F, "and", None, Sequential;
    Or = 0x0060, "or", None, Sequential;
    Xor = 0x0061, "xor", None, Sequential;
    Shl = 0x0062, "shl", None, Sequential;
    Shr = 0x0063, "shr", None, Sequential;
    ShrUn = 0x0064, "shr.un", None, Sequential;
    Neg = 0x0065, "neg", None, Sequential;
    Not = 0x0066, "not", None, Sequential;

    // Conversion
    ConvI1 = 0x0067, "conv.i1", None, Sequential;
    ConvI2 = 0x0068, "conv.i2", None, Sequential;
    ConvI4 = 0x0069, "conv.i4", None, Sequential;
    ConvI8 = 0x006A, "conv.i8", None, Sequential;
    ConvR4 = 0x006B, "conv.r4", None, Sequential;
    ConvR8 = 0x006C, "conv.r8", None, Sequential;
    ConvU4 = 0x006D, "conv.u4", None, Sequential;
    ConvU8 = 0x006E, "conv.u8", None, Sequential;

    // Object model
    Callvirt = 0x006F, "callvirt", Method, Call;
    Cpobj = 0x0070, "cpobj", Type, Sequential;
    Ldobj = 0x0071, "ldobj", Type, Sequential;
    Ldstr = 0x0072, "ldstr", String, Sequential;
    Newobj = 0x0073, "newobj", Method, Call;
    Castclass = 0x0074, "castclass", Type, Sequential;
    Isinst = 0x0075, "isinst", Type, Sequential;
    ConvRUn = 0x0076, "conv.r.un", None, Sequential;
    Unbox = 0x0079, "unbox", Type, Sequential;
    Throw = 0x007A, "throw", None, Throw;

    // Field access
    Ldfld = 0x007B, "ldfld", Field, Sequential;
    Ldflda = 0x007C, "ldflda", Field, Sequential;
    Stfld = 0x007D, "stfld", Field, Sequential;
    Ldsfld = 0x007E, "ldsfld", Field, Sequential;
    Ldsflda = 0x007F, "ldsflda", Field, Sequential;
    Stsfld = 0x0080, "stsfld", Field, Sequential;
    Stobj = 0x0081, "stobj", Type, Sequential;

    // Overflow conversion (unsigned source)
    ConvOvfI1Un = 0x0082, "conv.ovf.i1.un", None, Sequential;
    ConvOvfI2Un = 0x0083, "conv.ovf.i2.un", None, Sequential;
    ConvOvfI4Un = 0x0084, "conv.ovf.i4.un", None, Sequential;
    ConvOvfI8Un = 0x0085, "conv.ovf.i8.un", None, Sequential;
    ConvOvfU1Un = 0x0086, "conv.ovf.u1.un", None, Sequential;
    ConvOvfU2Un = 0x0087, "conv.ovf.u2.un", None, Sequential;
    ConvOvfU4Un = 0x0088, "conv.ovf.u4.un", None, Sequential;
    ConvOvfU8Un = 0x0089, "conv.ovf.u8.un", None, Sequential;
    ConvOvfIUn = 0x008A, "conv.ovf.i.un", None, Sequential;
    ConvOvfUUn = 0x008B, "conv.ovf.u.un", None, Sequential;

    // Boxing / arrays
    Box = 0x008C, "box", Type, Sequential;
    Newarr = 0x008D, "newarr", Type, Sequential;
    Ldlen = 0x008E, "ldlen", None, Sequential;
    Ldelema = 0x008F, "ldelema", Type, Sequential;
    LdelemI1 = 0x0090, "ldelem.i1", None, Sequential;
    LdelemU1 = 0x0091, "ldelem.u1", None, Sequential;
    LdelemI2 = 0x0092, "ldelem.i2", None, Sequential;
    LdelemU2 = 0x0093, "ldelem.u2", None, Sequential;
    LdelemI4 = 0x0094, "ldelem.i4", None, Sequential;
    LdelemU4 = 0x0095, "ldelem.u4", None, Sequential;
    LdelemI8 = 0x0096, "ldelem.i8", None, Sequential;
    LdelemI = 0x0097, "ldelem.i", None, Sequential;
    LdelemR4 = 0x0098, "ldelem.r4", None, Sequential;
    LdelemR8 = 0x0099, "ldelem.r8", None, Sequential;
    LdelemRef = 0x009A, "ldelem.ref", None, Sequential;
    StelemI = 0x009B, "stelem.i", None, Sequential;
    StelemI1 = 0x009C, "stelem.i1", None, Sequential;
    StelemI2 = 0x009D, "stelem.i2", None, Sequential;
    StelemI4 = 0x009E, "stelem.i4", None, Sequential;
    StelemI8 = 0x009F, "stelem.i8", None, Sequential;
    StelemR4 = 0x00A0, "stelem.r4", None, Sequential;
    StelemR8 = 0x00A1, "stelem.r8", None, Sequential;
    StelemRef = 0x00A2, "stelem.ref", None, Sequential;
    Ldelem = 0x00A3, "ldelem", Type, Sequential;
    Stelem = 0x00A4, "stelem", Type, Sequential;
    UnboxAny = 0x00A5, "unbox.any", Type, Sequential;

    // Overflow conversion (signed source)
    ConvOvfI1 = 0x00B3, "conv.ovf.i1", None, Sequential;
    ConvOvfU1 = 0x00B4, "conv.ovf.u1", None, Sequential;
    ConvOvfI2 = 0x00B5, "conv.ovf.i2", None, Sequential;
    ConvOvfU2 = 0x00B6, "conv.ovf.u2", None, Sequential;
    ConvOvfI4 = 0x00B7, "conv.ovf.i4", None, Sequential;
    ConvOvfU4 = 0x00B8, "conv.ovf.u4", None, Sequential;
    ConvOvfI8 = 0x00B9, "conv.ovf.i8", None, Sequential;
    ConvOvfU8 = 0x00BA, "conv.ovf.u8", None, Sequential;

    // Typed references
    Refanyval = 0x00C2, "refanyval", Type, Sequential;
    Ckfinite = 0x00C3, "ckfinite", None, Sequential;
    Mkrefany = 0x00C6, "mkrefany", Type, Sequential;

    // Token / conversion
    Ldtoken = 0x00D0, "ldtoken", Token, Sequential;
    ConvU2 = 0x00D1, "conv.u2", None, Sequential;
    ConvU1 = 0x00D2, "conv.u1", None, Sequential;
    ConvI = 0x00D3, "conv.i", None, Sequential;
    ConvOvfI = 0x00D4, "conv.ovf.i", None, Sequential;
    ConvOvfU = 0x00D5, "conv.ovf.u", None, Sequential;

    // Overflow arithmetic
    AddOvf = 0x00D6, "add.ovf", None, Sequential;
    AddOvfUn = 0x00D7, "add.ovf.un", None, Sequential;
    MulOvf = 0x00D8, "mul.ovf", None, Sequential;
    MulOvfUn = 0x00D9, "mul.ovf.un", None, Sequential;
    SubOvf = 0x00DA, "sub.ovf", None, Sequential;
    SubOvfUn = 0x00DB, "sub.ovf.un", None, Sequential;

    // Exception handling
    Endfinally = 0x00DC, "endfinally", None, EndFinally;
    Leave = 0x00DD, "leave", Branch, Leave;
    LeaveS = 0x00DE, "leave.s", ShortBranch, Leave;
    StindI = 0x00DF, "stind.i", None, Sequential;
    ConvU = 0x00E0, "conv.u", None, Sequential;

    // Two-byte opcodes (0xFE prefix)
    Arglist = 0xFE00, "arglist", None, Sequential;
    Ceq = 0xFE01, "ceq", None, Sequential;
    Cgt = 0xFE02, "cgt", None, Sequential;
    CgtUn = 0xFE03, "cgt.un", None, Sequential;
    Clt = 0xFE04, "clt", None, Sequential;
    CltUn = 0xFE05, "clt.un", None, Sequential;
    Ldftn = 0xFE06, "ldftn", Method, Sequential;
    Ldvirtftn = 0xFE07, "ldvirtftn", Method, Sequential;
    Ldarg = 0xFE09, "ldarg", Argument, Sequential;
    Ldarga = 0xFE0A, "ldarga", Argument, Sequential;
    Starg = 0xFE0B, "starg", Argument, Sequential;
    Ldloc = 0xFE0C, "ldloc", Local, Sequential;
    Ldloca = 0xFE0D, "ldloca", Local, Sequential;
    Stloc = 0xFE0E, "stloc", Local, Sequential;
    Localloc = 0xFE0F, "localloc", None, Sequential;
    Endfilter = 0xFE11, "endfilter", None, EndFinally;
    Unaligned = 0xFE12, "unaligned.", UInt8, Sequential;
    Volatile = 0xFE13, "volatile.", None, Sequential;
    Tail = 0xFE14, "tail.", None, Sequential;
    Initobj = 0xFE15, "initobj", Type, Sequential;
    Constrained = 0xFE16, "constrained.", Type, Sequential;
    Cpblk = 0xFE17, "cpblk", None, Sequential;
    Initblk = 0xFE18, "initblk", None, Sequential;
    No = 0xFE19, "no.", UInt8, Sequential;
    Rethrow = 0xFE1A, "rethrow", None, Throw;
    Sizeof = 0xFE1C, "sizeof", Type, Sequential;
    Refanytype = 0xFE1D, "refanytype", None, Sequential;
    Readonly = 0xFE1E, "readonly.", None, Sequential;
}

impl OpCode {
    /// Number of bytes the opcode itself occupies (1 or 2).
    #[must_use]
    pub const fn opcode_size(self) -> usize {
        if self.value() >> 8 == FE_PREFIX as u16 {
            2
        } else {
            1
        }
    }

    /// Returns `true` for branch opcodes (conditional, unconditional, `leave`) and `switch`.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(
            self.operand_kind(),
            OperandKind::ShortBranch | OperandKind::Branch | OperandKind::Switch
        )
    }

    /// Returns `true` for the 1-byte displacement branch forms.
    #[must_use]
    pub const fn is_short_branch(self) -> bool {
        matches!(self.operand_kind(), OperandKind::ShortBranch)
    }

    /// Returns `true` for prefix opcodes (`unaligned.`, `volatile.`, `tail.`, ...).
    #[must_use]
    pub const fn is_prefix(self) -> bool {
        matches!(
            self,
            OpCode::Unaligned
                | OpCode::Volatile
                | OpCode::Tail
                | OpCode::Constrained
                | OpCode::No
                | OpCode::Readonly
        )
    }

    /// Returns `true` if the opcode is a call through a method reference.
    #[must_use]
    pub const fn is_call(self) -> bool {
        matches!(self, OpCode::Call | OpCode::Callvirt | OpCode::Newobj)
    }

    /// The 4-byte displacement form of a short branch; any other opcode is returned as is.
    #[must_use]
    pub const fn long_form(self) -> OpCode {
        match self {
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
            other => other,
        }
    }

    /// The 1-byte displacement form of a long branch; any other opcode is returned as is.
    #[must_use]
    pub const fn short_form(self) -> OpCode {
        match self {
            OpCode::Br => OpCode::BrS,
            OpCode::Brfalse => OpCode::BrfalseS,
            OpCode::Brtrue => OpCode::BrtrueS,
            OpCode::Beq => OpCode::BeqS,
            OpCode::Bge => OpCode::BgeS,
            OpCode::Bgt => OpCode::BgtS,
            OpCode::Ble => OpCode::BleS,
            OpCode::Blt => OpCode::BltS,
            OpCode::BneUn => OpCode::BneUnS,
            OpCode::BgeUn => OpCode::BgeUnS,
            OpCode::BgtUn => OpCode::BgtUnS,
            OpCode::BleUn => OpCode::BleUnS,
            OpCode::BltUn => OpCode::BltUnS,
            OpCode::Leave => OpCode::LeaveS,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use strum::IntoEnumIterator;

    #[test]
    fn test_values_are_unique() {
        let mut seen = HashSet::new();
        for op in OpCode::iter() {
            assert!(seen.insert(op.value()), "duplicate value for {op}");
        }
        assert_eq!(seen.len(), OpCode::COUNT);
    }

    #[test]
    fn test_mnemonic_round_trip() {
        for op in OpCode::iter() {
            let parsed: OpCode = op.mnemonic().parse().unwrap();
            assert_eq!(parsed, op);
        }
    }

    #[test]
    fn test_opcode_size() {
        assert_eq!(OpCode::Nop.opcode_size(), 1);
        assert_eq!(OpCode::ConvU.opcode_size(), 1);
        assert_eq!(OpCode::Initblk.opcode_size(), 2);
        assert_eq!(OpCode::Ceq.opcode_size(), 2);
    }

    #[test]
    fn test_short_long_forms_are_inverse() {
        for op in OpCode::iter().filter(|op| op.is_short_branch()) {
            let long = op.long_form();
            assert_ne!(long, op);
            assert_eq!(long.operand_kind(), OperandKind::Branch);
            assert_eq!(long.short_form(), op);
            assert_eq!(long.flow_type(), op.flow_type());
        }
        assert_eq!(OpCode::Nop.long_form(), OpCode::Nop);
        assert_eq!(OpCode::Switch.short_form(), OpCode::Switch);
    }

    #[test]
    fn test_classification() {
        assert!(OpCode::Switch.is_branch());
        assert!(OpCode::LeaveS.is_branch());
        assert!(!OpCode::Call.is_branch());
        assert!(OpCode::Callvirt.is_call());
        assert!(OpCode::Tail.is_prefix());
        assert_eq!(OpCode::Ret.flow_type(), FlowType::Return);
    }
}
