//! Shared fixtures for unit tests.

use crate::{
    assembly::{Instruction, LabelId, MemberRef, OpCode, Operand},
    metadata::{
        field::FieldDef,
        method::{MethodBody, MethodDef},
        module::{CilModule, MethodId, TypeId},
    },
};

/// Routes `log` output to the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn op(opcode: OpCode) -> Instruction {
    Instruction::simple(opcode).unwrap()
}

pub fn with(opcode: OpCode, operand: Operand) -> Instruction {
    Instruction::new(opcode, operand).unwrap()
}

pub fn branch(opcode: OpCode, label: LabelId) -> Instruction {
    with(opcode, Operand::Label(label))
}

pub fn ldfld(declaring_type: &str, name: &str, field_type: &str) -> Instruction {
    with(
        OpCode::Ldfld,
        Operand::Member(MemberRef::field(declaring_type, name, field_type)),
    )
}

pub fn call(declaring_type: &str, name: &str) -> Instruction {
    with(
        OpCode::Call,
        Operand::Member(MemberRef::method(declaring_type, name, "System.Void ()")),
    )
}

pub fn callvirt(declaring_type: &str, name: &str) -> Instruction {
    with(
        OpCode::Callvirt,
        Operand::Member(MemberRef::method(declaring_type, name, "System.Void ()")),
    )
}

pub fn isinst(type_name: &str) -> Instruction {
    with(OpCode::Isinst, Operand::Type(type_name.to_string()))
}

/// Adds a method with the given body.
pub fn add_body(module: &mut CilModule, ty: TypeId, name: &str, body: MethodBody) -> MethodId {
    module
        .add_method(ty, MethodDef::new(name, "System.Void").with_body(body))
        .unwrap()
}

/// Opcodes of a method body, in order.
pub fn opcodes(module: &CilModule, method: MethodId) -> Vec<OpCode> {
    module
        .method(method)
        .unwrap()
        .body
        .as_ref()
        .unwrap()
        .iter()
        .map(|instr| instr.opcode)
        .collect()
}

/// The body of a method.
pub fn body(module: &CilModule, method: MethodId) -> &MethodBody {
    module.method(method).unwrap().body.as_ref().unwrap()
}

/// `Game.Slot` with a `fileSelect` field of type `Game.FileSelect`, which has a
/// `detailsEase` float field, and a `highlightEase` float field on the slot itself.
pub fn slot_module() -> (CilModule, TypeId) {
    let mut module = CilModule::new("Game");
    let file_select = module.add_type("Game", "FileSelect");
    module
        .add_field(file_select, FieldDef::new("detailsEase", "System.Single"))
        .unwrap();
    let slot = module.add_type("Game", "Slot");
    module
        .add_field(slot, FieldDef::new("highlightEase", "System.Single"))
        .unwrap();
    module
        .add_field(slot, FieldDef::new("fileSelect", "Game.FileSelect"))
        .unwrap();
    module
        .add_field(slot, FieldDef::new("renamed", "System.Boolean"))
        .unwrap();
    module
        .add_field(slot, FieldDef::new("totalCassettes", "System.Int32"))
        .unwrap();
    module
        .add_field(slot, FieldDef::new("SaveData", "Game.SaveData"))
        .unwrap();
    (module, slot)
}
