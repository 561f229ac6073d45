//! Type definitions of the module index.
//!
//! A [`TypeDef`] owns no members directly; it lists the ids of its methods, fields and nested
//! types in declaration order, and the owning [`crate::metadata::module::CilModule`] stores the
//! members themselves. Declaration order is what the dispatcher walks, so the lists are only
//! ever appended to.

use crate::metadata::{
    customattributes::{CustomAttribute, PatchRequest, COMPILER_GENERATED_ATTRIBUTE},
    module::{FieldId, MethodId, TypeId},
};

#[allow(non_snake_case)]
/// All possible flags for `TypeAttributes`
pub mod TypeAttributes {
    /// Use this mask to retrieve visibility information
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    /// Class has no public scope
    pub const NOT_PUBLIC: u32 = 0x0000_0000;
    /// Class has public scope
    pub const PUBLIC: u32 = 0x0000_0001;
    /// Class is nested with public visibility
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    /// Class is nested with private visibility
    pub const NESTED_PRIVATE: u32 = 0x0000_0003;
    /// Type is an interface
    pub const INTERFACE: u32 = 0x0000_0020;
    /// Class is abstract
    pub const ABSTRACT: u32 = 0x0000_0080;
    /// Class cannot be extended
    pub const SEALED: u32 = 0x0000_0100;
    /// Class name is special
    pub const SPECIAL_NAME: u32 = 0x0000_0400;
    /// Initialize the class before first static field access
    pub const BEFORE_FIELD_INIT: u32 = 0x0010_0000;
}

/// Full name of the non-generic enumerator interface.
pub const IENUMERATOR: &str = "System.Collections.IEnumerator";

/// A type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// Namespace; empty for nested types
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// `TypeAttributes` bitmask
    pub flags: u32,
    /// Enclosing type of a nested type
    pub enclosing: Option<TypeId>,
    /// Nested types, in declaration order
    pub nested_types: Vec<TypeId>,
    /// Methods, in declaration order
    pub methods: Vec<MethodId>,
    /// Fields, in declaration order
    pub fields: Vec<FieldId>,
    /// Full names of implemented interfaces
    pub interfaces: Vec<String>,
    /// Custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
    /// Pending patch requests
    pub requests: Vec<PatchRequest>,
}

impl TypeDef {
    pub(crate) fn new(namespace: &str, name: &str, flags: u32, enclosing: Option<TypeId>) -> Self {
        TypeDef {
            namespace: namespace.to_string(),
            name: name.to_string(),
            flags,
            enclosing,
            nested_types: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            interfaces: Vec::new(),
            custom_attributes: Vec::new(),
            requests: Vec::new(),
        }
    }

    /// Returns `true` if an attribute of the given type is attached.
    #[must_use]
    pub fn has_attribute(&self, type_name: &str) -> bool {
        self.custom_attributes
            .iter()
            .any(|attr| attr.type_name == type_name)
    }

    /// Returns `true` if the type implements the named interface.
    #[must_use]
    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }

    /// Returns `true` for types synthesized by the compiler.
    #[must_use]
    pub fn is_compiler_generated(&self) -> bool {
        self.has_attribute(COMPILER_GENERATED_ATTRIBUTE)
    }

    /// Returns `true` for compiler-synthesized iterator state machines.
    #[must_use]
    pub fn is_compiler_generated_enumerator(&self) -> bool {
        self.is_compiler_generated() && self.implements(IENUMERATOR)
    }

    /// Returns `true` if the type is an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags & TypeAttributes::INTERFACE != 0
    }
}
