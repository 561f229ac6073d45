//! CIL instruction model.
//!
//! This module defines what one instruction of an editable method body is: an [`OpCode`] and
//! an [`Operand`] whose shape is checked against the opcode when the instruction is built.
//! Branch targets are always [`LabelId`]s and instructions are identified by [`InstrId`], so
//! an instruction never stores its own byte offset.
//!
//! # Key Components
//!
//! - [`OpCode`] - The ECMA-335 opcode table with operand shapes and flow classes
//! - [`Instruction`] - An opcode with a validated operand
//! - [`Operand`] / [`OperandKind`] - Operand values and the shapes opcodes expect
//! - [`MemberRef`] - By-name method and field references
//! - [`FlowType`] - Control flow classification
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::assembly::{FlowType, Instruction, OpCode, Operand, OperandKind};
//!
//! assert_eq!(OpCode::BleUn.operand_kind(), OperandKind::Branch);
//! assert_eq!(OpCode::Ret.flow_type(), FlowType::Return);
//!
//! let ret = Instruction::simple(OpCode::Ret)?;
//! assert!(ret.is_terminal());
//! # Ok::<(), cilpatch::Error>(())
//! ```

mod instruction;
mod opcodes;

pub use instruction::{
    FlowType, InstrId, Instruction, LabelId, MemberRef, MemberRefKind, Operand, OperandKind,
};
pub use opcodes::{OpCode, FE_PREFIX};
