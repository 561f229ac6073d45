//! # cilpatch Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the cilpatch library. Import this module to get quick access to the essential
//! types for building a module graph and patching it.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilpatch operations
pub use crate::Error;

/// Error discriminant, with wrapped rule failures unwrapped
pub use crate::ErrorKind;

/// The result type used throughout cilpatch
pub use crate::Result;

// ================================================================================================
// Instructions
// ================================================================================================

/// Opcodes, instructions and their operands
pub use crate::assembly::{
    InstrId, Instruction, LabelId, MemberRef, MemberRefKind, OpCode, Operand, OperandKind,
};

// ================================================================================================
// Module Graph
// ================================================================================================

/// The module index and its ids
pub use crate::metadata::module::{CilModule, FieldId, MemberId, MethodId, TypeId};

/// Members
pub use crate::metadata::{field::FieldDef, method::MethodDef, typedef::TypeDef};

/// Method bodies and exception regions
pub use crate::metadata::method::{
    ExceptionHandler, ExceptionHandlerFlags, LabelState, MethodAttributes, MethodBody,
    RegionBoundary,
};

/// Attributes and patch requests
pub use crate::metadata::customattributes::{
    CustomAttribute, CustomAttributeArgument, PatchRequest,
};

/// External references
pub use crate::metadata::identity::{AssemblyRef, AssemblyVersion, HashAlgorithm, Identity};

// ================================================================================================
// Patching
// ================================================================================================

/// Dispatch
pub use crate::patching::{
    BranchFormPolicy, ConflictLedger, ILContext, MemberContext, ModulePass, PatchConfig,
    PatchDispatcher, PatchReport, PatchRule, RuleRegistry, RuleScope,
};

/// Cursor editing
pub use crate::patching::{
    matchers::{self, Matcher},
    CursorMark, ILCursor, MoveType,
};

/// Built-in rules and passes
pub use crate::patching::rules::{
    DebuggingModes, FixEnumeratorDecompile, FixShortLongOps, ReferenceFilter,
    ReplaceAssemblyRefs, SetDebuggableModes, SyncReferenceVersions,
};
