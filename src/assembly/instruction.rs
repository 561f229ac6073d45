//! CIL instruction representation for editable method bodies.
//!
//! Unlike a decoded instruction stream, an editable body never stores byte offsets or
//! absolute branch addresses: offsets are derived on demand from the instruction order, and
//! every branch target is a [`LabelId`] that is bound to an instruction *identity*
//! ([`InstrId`]). Inserting or removing instructions therefore never requires rewriting
//! branch operands.
//!
//! # Key Components
//!
//! - [`Instruction`] - An opcode with its operand
//! - [`Operand`] - Type-safe operand representation
//! - [`OperandKind`] - The operand shape an opcode expects, validated at emit time
//! - [`FlowType`] - Control flow behavior classification
//! - [`MemberRef`] - A by-name reference to a method or field
//! - [`InstrId`] / [`LabelId`] - Stable arena handles
//!
//! # Usage Examples
//!
//! ```rust
//! use cilpatch::assembly::{Instruction, MemberRef, OpCode, Operand};
//!
//! let load = Instruction::new(
//!     OpCode::Ldfld,
//!     Operand::Member(MemberRef::field("Game.Slot", "renamed", "System.Boolean")),
//! )?;
//! assert!(load.is_field_access());
//!
//! // Operand shapes are checked when the instruction is built
//! assert!(Instruction::new(OpCode::Ldfld, Operand::Int32(4)).is_err());
//! # Ok::<(), cilpatch::Error>(())
//! ```

use std::fmt;

use crate::{assembly::opcodes::OpCode, Error, Result};

/// Stable identity of an instruction inside one method body.
///
/// Identities survive insertions and removals around the instruction; only the
/// instruction's position in the executable order changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub u32);

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I_{:04}", self.0)
    }
}

/// Identity of a branch target label inside one method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L_{:04}", self.0)
    }
}

/// The operand shape an opcode expects.
///
/// Sizes follow ECMA-335 Partition III; [`OperandKind::size`] returns `None` for the
/// variable-size `switch` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// No operand present
    None,
    /// Signed 8-bit integer (`ldc.i4.s`)
    Int8,
    /// Unsigned 8-bit integer (`unaligned.`, `no.`)
    UInt8,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// User string
    String,
    /// Method reference
    Method,
    /// Field reference
    Field,
    /// Type reference
    Type,
    /// Any member or type reference (`ldtoken`)
    Token,
    /// Stand-alone call site signature (`calli`)
    Signature,
    /// Branch target with a 1-byte displacement
    ShortBranch,
    /// Branch target with a 4-byte displacement
    Branch,
    /// Switch table
    Switch,
    /// Local variable index encoded in 1 byte
    ShortLocal,
    /// Local variable index encoded in 2 bytes
    Local,
    /// Argument index encoded in 1 byte
    ShortArgument,
    /// Argument index encoded in 2 bytes
    Argument,
}

impl OperandKind {
    /// Returns the size in bytes of this operand kind, or `None` for `switch`.
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            OperandKind::None => Some(0),
            OperandKind::Int8
            | OperandKind::UInt8
            | OperandKind::ShortBranch
            | OperandKind::ShortLocal
            | OperandKind::ShortArgument => Some(1),
            OperandKind::Local | OperandKind::Argument => Some(2),
            OperandKind::Int32
            | OperandKind::Float32
            | OperandKind::String
            | OperandKind::Method
            | OperandKind::Field
            | OperandKind::Type
            | OperandKind::Token
            | OperandKind::Signature
            | OperandKind::Branch => Some(4),
            OperandKind::Int64 | OperandKind::Float64 => Some(8),
            OperandKind::Switch => None,
        }
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing
    Throw,
    /// End of finally or filter block
    EndFinally,
    /// Leave protected region (try/catch/finally)
    Leave,
}

/// Whether a [`MemberRef`] names a method or a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberRefKind {
    /// A method, constructor or property accessor
    Method,
    /// A field
    Field,
}

/// A by-name reference to a method or field, as it appears in an instruction operand.
///
/// References are resolved by name, never by position in the module, so they stay valid
/// while rules rename or add members elsewhere.
///
/// The `signature` is the return type and parameter list for methods
/// (`"System.Void Start(Game.SaveData,System.Int32)"`) and the field type for fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Method or field
    pub kind: MemberRefKind,
    /// Full name of the declaring type (`Namespace.Outer/Nested`)
    pub declaring_type: String,
    /// Simple member name
    pub name: String,
    /// Signature text
    pub signature: String,
}

impl MemberRef {
    /// Creates a method reference.
    #[must_use]
    pub fn method(declaring_type: &str, name: &str, signature: &str) -> Self {
        MemberRef {
            kind: MemberRefKind::Method,
            declaring_type: declaring_type.to_string(),
            name: name.to_string(),
            signature: signature.to_string(),
        }
    }

    /// Creates a field reference.
    #[must_use]
    pub fn field(declaring_type: &str, name: &str, field_type: &str) -> Self {
        MemberRef {
            kind: MemberRefKind::Field,
            declaring_type: declaring_type.to_string(),
            name: name.to_string(),
            signature: field_type.to_string(),
        }
    }

    /// `Declaring.Type::Name`
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.declaring_type, self.name)
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} [{}]", self.declaring_type, self.name, self.signature)
    }
}

/// Instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// 8- or 32-bit integer constant
    Int32(i32),
    /// 64-bit integer constant
    Int64(i64),
    /// 32-bit floating point constant
    Float32(f32),
    /// 64-bit floating point constant
    Float64(f64),
    /// User string literal
    String(String),
    /// Method or field reference
    Member(MemberRef),
    /// Full name of a referenced type
    Type(String),
    /// Stand-alone call site signature
    Signature(String),
    /// Local variable index
    Local(u16),
    /// Method argument index
    Argument(u16),
    /// Branch target
    Label(LabelId),
    /// Switch table targets
    Switch(Vec<LabelId>),
}

impl Operand {
    /// Short description used in error messages.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Operand::None => "none",
            Operand::Int32(_) => "int32",
            Operand::Int64(_) => "int64",
            Operand::Float32(_) => "float32",
            Operand::Float64(_) => "float64",
            Operand::String(_) => "string",
            Operand::Member(m) => match m.kind {
                MemberRefKind::Method => "method reference",
                MemberRefKind::Field => "field reference",
            },
            Operand::Type(_) => "type reference",
            Operand::Signature(_) => "signature",
            Operand::Local(_) => "local",
            Operand::Argument(_) => "argument",
            Operand::Label(_) => "label",
            Operand::Switch(_) => "switch table",
        }
    }

    /// Checks whether this operand fits the given operand shape.
    #[must_use]
    pub fn fits(&self, kind: OperandKind) -> bool {
        match (kind, self) {
            (OperandKind::None, Operand::None) => true,
            (OperandKind::Int8, Operand::Int32(v)) => i8::try_from(*v).is_ok(),
            (OperandKind::UInt8, Operand::Int32(v)) => u8::try_from(*v).is_ok(),
            (OperandKind::Int32, Operand::Int32(_)) => true,
            (OperandKind::Int64, Operand::Int64(_)) => true,
            (OperandKind::Float32, Operand::Float32(_)) => true,
            (OperandKind::Float64, Operand::Float64(_)) => true,
            (OperandKind::String, Operand::String(_)) => true,
            (OperandKind::Method, Operand::Member(m)) => m.kind == MemberRefKind::Method,
            (OperandKind::Field, Operand::Member(m)) => m.kind == MemberRefKind::Field,
            (OperandKind::Type, Operand::Type(_)) => true,
            (OperandKind::Token, Operand::Member(_) | Operand::Type(_)) => true,
            (OperandKind::Signature, Operand::Signature(_)) => true,
            (OperandKind::ShortBranch | OperandKind::Branch, Operand::Label(_)) => true,
            (OperandKind::Switch, Operand::Switch(_)) => true,
            (OperandKind::ShortLocal, Operand::Local(v)) => *v <= u16::from(u8::MAX),
            (OperandKind::Local, Operand::Local(_)) => true,
            (OperandKind::ShortArgument, Operand::Argument(v)) => *v <= u16::from(u8::MAX),
            (OperandKind::Argument, Operand::Argument(_)) => true,
            _ => false,
        }
    }

    /// Returns the member reference, if any.
    #[must_use]
    pub fn as_member(&self) -> Option<&MemberRef> {
        match self {
            Operand::Member(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the referenced type name, if any.
    #[must_use]
    pub fn as_type(&self) -> Option<&str> {
        match self {
            Operand::Type(t) => Some(t),
            _ => None,
        }
    }

    /// Returns the branch label, if any.
    #[must_use]
    pub fn as_label(&self) -> Option<LabelId> {
        match self {
            Operand::Label(l) => Some(*l),
            _ => None,
        }
    }

    /// Returns every label referenced by this operand.
    #[must_use]
    pub fn labels(&self) -> Vec<LabelId> {
        match self {
            Operand::Label(l) => vec![*l],
            Operand::Switch(ls) => ls.clone(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Int32(v) => write!(f, "{v}"),
            Operand::Int64(v) => write!(f, "{v}"),
            Operand::Float32(v) => write!(f, "{v}"),
            Operand::Float64(v) => write!(f, "{v}"),
            Operand::String(s) => write!(f, "{s:?}"),
            Operand::Member(m) => write!(f, "{}", m.full_name()),
            Operand::Type(t) | Operand::Signature(t) => write!(f, "{t}"),
            Operand::Local(l) => write!(f, "V_{l}"),
            Operand::Argument(a) => write!(f, "A_{a}"),
            Operand::Label(l) => write!(f, "{l}"),
            Operand::Switch(targets) => {
                write!(f, "(")?;
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{target}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A single CIL instruction in an editable method body.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The operand data for this instruction
    pub operand: Operand,
}

impl Instruction {
    /// Builds an instruction, validating the operand against the opcode's operand shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperand`] if the operand does not fit.
    pub fn new(opcode: OpCode, operand: Operand) -> Result<Self> {
        let expected = opcode.operand_kind();
        if !operand.fits(expected) {
            return Err(Error::InvalidOperand {
                opcode,
                expected,
                found: operand.describe(),
            });
        }
        Ok(Instruction { opcode, operand })
    }

    /// Builds an instruction without an operand.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperand`] if the opcode requires an operand.
    pub fn simple(opcode: OpCode) -> Result<Self> {
        Self::new(opcode, Operand::None)
    }

    /// Size of the encoded instruction in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        let operand = match (&self.operand, self.opcode.operand_kind().size()) {
            (Operand::Switch(targets), _) => 4 + 4 * targets.len(),
            (_, Some(size)) => size,
            (_, None) => 4,
        };
        self.opcode.opcode_size() + operand
    }

    /// Check if this instruction is a branch or switch.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        self.opcode.is_branch()
    }

    /// Check if this instruction reads or writes a field.
    #[must_use]
    pub fn is_field_access(&self) -> bool {
        self.opcode.operand_kind() == OperandKind::Field
    }

    /// Check if this instruction ends a basic block.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.opcode.flow_type(),
            FlowType::ConditionalBranch
                | FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Switch
                | FlowType::Throw
                | FlowType::Leave
        )
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        if self.operand != Operand::None {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_shape_validation() {
        assert!(Instruction::new(OpCode::LdcI4S, Operand::Int32(127)).is_ok());
        assert!(Instruction::new(OpCode::LdcI4S, Operand::Int32(128)).is_err());
        assert!(Instruction::new(OpCode::Unaligned, Operand::Int32(4)).is_ok());
        assert!(Instruction::new(OpCode::LdlocS, Operand::Local(256)).is_err());
        assert!(Instruction::new(OpCode::Ldloc, Operand::Local(256)).is_ok());
        assert!(Instruction::new(OpCode::BrS, Operand::Label(LabelId(0))).is_ok());
        assert!(Instruction::new(OpCode::Isinst, Operand::String("x".into())).is_err());

        let call = MemberRef::method("Game.Native", "_initblk", "System.Void ()");
        assert!(Instruction::new(OpCode::Call, Operand::Member(call.clone())).is_ok());
        assert!(Instruction::new(OpCode::Ldfld, Operand::Member(call.clone())).is_err());
        assert!(Instruction::new(OpCode::Ldtoken, Operand::Member(call)).is_ok());
    }

    #[test]
    fn test_invalid_operand_error() {
        let err = Instruction::simple(OpCode::Ldfld).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidOperand {
                opcode: OpCode::Ldfld,
                expected: OperandKind::Field,
                found: "none",
            }
        );
    }

    #[test]
    fn test_instruction_sizes() {
        assert_eq!(Instruction::simple(OpCode::Nop).unwrap().size(), 1);
        assert_eq!(Instruction::simple(OpCode::Initblk).unwrap().size(), 2);
        assert_eq!(
            Instruction::new(OpCode::BrS, Operand::Label(LabelId(1)))
                .unwrap()
                .size(),
            2
        );
        assert_eq!(
            Instruction::new(OpCode::Br, Operand::Label(LabelId(1)))
                .unwrap()
                .size(),
            5
        );
        assert_eq!(
            Instruction::new(OpCode::LdcI8, Operand::Int64(1)).unwrap().size(),
            9
        );
        assert_eq!(
            Instruction::new(OpCode::Ldloc, Operand::Local(300)).unwrap().size(),
            4
        );
        let switch = Instruction::new(
            OpCode::Switch,
            Operand::Switch(vec![LabelId(0), LabelId(1), LabelId(2)]),
        )
        .unwrap();
        assert_eq!(switch.size(), 1 + 4 + 12);
    }

    #[test]
    fn test_display() {
        let ldfld = Instruction::new(
            OpCode::Ldfld,
            Operand::Member(MemberRef::field("Game.Slot", "renamed", "System.Boolean")),
        )
        .unwrap();
        assert_eq!(ldfld.to_string(), "ldfld Game.Slot::renamed");
        assert_eq!(Instruction::simple(OpCode::Ret).unwrap().to_string(), "ret");
        assert_eq!(LabelId(7).to_string(), "L_0007");
    }

    #[test]
    fn test_operand_labels() {
        assert_eq!(Operand::Label(LabelId(2)).labels(), vec![LabelId(2)]);
        assert_eq!(
            Operand::Switch(vec![LabelId(0), LabelId(3)]).labels(),
            vec![LabelId(0), LabelId(3)]
        );
        assert!(Operand::None.labels().is_empty());
    }
}
