//! Instruction predicates for cursor searches.
//!
//! Every constructor returns a closure that a search window borrows as a [`Matcher`]:
//!
//! ```rust
//! use cilpatch::assembly::OpCode;
//! use cilpatch::patching::matchers::{self, Matcher};
//!
//! let ldfld = matchers::ldfld("Game.Slot", "renamed");
//! let ble = matchers::opcode_any(&[OpCode::BleUn, OpCode::BleUnS]);
//! let window: [Matcher<'_>; 2] = [&ldfld, &ble];
//! assert_eq!(window.len(), 2);
//! ```
//!
//! Member names are compared by declaring type full name and simple name; an empty declaring
//! type matches any type.

use crate::assembly::{Instruction, MemberRef, MemberRefKind, OpCode, Operand};

/// A borrowed instruction predicate, one per window position.
pub type Matcher<'m> = &'m dyn Fn(&Instruction) -> bool;

/// Matches any instruction.
#[must_use]
pub fn any() -> impl Fn(&Instruction) -> bool {
    |_| true
}

/// Matches one opcode, ignoring the operand.
#[must_use]
pub fn opcode(opcode: OpCode) -> impl Fn(&Instruction) -> bool {
    move |instr| instr.opcode == opcode
}

/// Matches any of the given opcodes.
#[must_use]
pub fn opcode_any(opcodes: &[OpCode]) -> impl Fn(&Instruction) -> bool {
    let opcodes = opcodes.to_vec();
    move |instr| opcodes.contains(&instr.opcode)
}

/// Matches both branch forms of a branch opcode.
#[must_use]
pub fn branch(opcode: OpCode) -> impl Fn(&Instruction) -> bool {
    let (short, long) = (opcode.short_form(), opcode.long_form());
    move |instr| instr.opcode == short || instr.opcode == long
}

/// `call` to `declaring_type::name`.
#[must_use]
pub fn call(declaring_type: &str, name: &str) -> impl Fn(&Instruction) -> bool {
    member_op(&[OpCode::Call], MemberRefKind::Method, declaring_type, name)
}

/// `callvirt` to `declaring_type::name`.
#[must_use]
pub fn callvirt(declaring_type: &str, name: &str) -> impl Fn(&Instruction) -> bool {
    member_op(&[OpCode::Callvirt], MemberRefKind::Method, declaring_type, name)
}

/// `call` or `callvirt` to `declaring_type::name`.
#[must_use]
pub fn call_any(declaring_type: &str, name: &str) -> impl Fn(&Instruction) -> bool {
    member_op(
        &[OpCode::Call, OpCode::Callvirt],
        MemberRefKind::Method,
        declaring_type,
        name,
    )
}

/// `ldfld declaring_type::name`.
#[must_use]
pub fn ldfld(declaring_type: &str, name: &str) -> impl Fn(&Instruction) -> bool {
    member_op(&[OpCode::Ldfld], MemberRefKind::Field, declaring_type, name)
}

/// `ldfld` of any field.
#[must_use]
pub fn ldfld_any() -> impl Fn(&Instruction) -> bool {
    opcode(OpCode::Ldfld)
}

/// `isinst type_name`.
#[must_use]
pub fn isinst(type_name: &str) -> impl Fn(&Instruction) -> bool {
    let type_name = type_name.to_string();
    move |instr| {
        instr.opcode == OpCode::Isinst && instr.operand.as_type() == Some(type_name.as_str())
    }
}

/// `ldc.r4 value`; compared bit for bit.
#[must_use]
pub fn ldc_r4(value: f32) -> impl Fn(&Instruction) -> bool {
    move |instr| {
        instr.opcode == OpCode::LdcR4
            && matches!(instr.operand, Operand::Float32(v) if v.to_bits() == value.to_bits())
    }
}

/// `ldc.r4` with any constant.
#[must_use]
pub fn ldc_r4_any() -> impl Fn(&Instruction) -> bool {
    opcode(OpCode::LdcR4)
}

/// Any form of `ldc.i4` loading `value`.
#[must_use]
pub fn ldc_i4(value: i32) -> impl Fn(&Instruction) -> bool {
    move |instr| int_constant(instr) == Some(value)
}

/// Constant loaded by an `ldc.i4` form, if `instr` is one.
#[must_use]
pub fn int_constant(instr: &Instruction) -> Option<i32> {
    match (instr.opcode, &instr.operand) {
        (OpCode::LdcI4M1, _) => Some(-1),
        (OpCode::LdcI40, _) => Some(0),
        (OpCode::LdcI41, _) => Some(1),
        (OpCode::LdcI42, _) => Some(2),
        (OpCode::LdcI43, _) => Some(3),
        (OpCode::LdcI44, _) => Some(4),
        (OpCode::LdcI45, _) => Some(5),
        (OpCode::LdcI46, _) => Some(6),
        (OpCode::LdcI47, _) => Some(7),
        (OpCode::LdcI48, _) => Some(8),
        (OpCode::LdcI4S | OpCode::LdcI4, Operand::Int32(v)) => Some(*v),
        _ => None,
    }
}

/// Returns `true` if `member` is `declaring_type::name`. `name` may also be the full signature
/// text (`"System.Void Start(Game.SaveData,System.Int32)"`); an empty declaring type matches
/// any type.
#[must_use]
pub fn member_is(member: &MemberRef, declaring_type: &str, name: &str) -> bool {
    (member.name == name || member.signature == name)
        && (declaring_type.is_empty() || member.declaring_type == declaring_type)
}

/// Splits `Type::Member` into its parts; a bare member name yields an empty type.
#[must_use]
pub fn split_qualified(qualified: &str) -> (&str, &str) {
    qualified.rsplit_once("::").unwrap_or(("", qualified))
}

fn member_op(
    opcodes: &[OpCode],
    kind: MemberRefKind,
    declaring_type: &str,
    name: &str,
) -> impl Fn(&Instruction) -> bool {
    let opcodes = opcodes.to_vec();
    let declaring_type = declaring_type.to_string();
    let name = name.to_string();
    move |instr| {
        opcodes.contains(&instr.opcode)
            && instr
                .operand
                .as_member()
                .is_some_and(|m| m.kind == kind && member_is(m, &declaring_type, &name))
    }
}
