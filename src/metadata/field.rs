//! Field definitions of the module index.

use crate::metadata::{
    customattributes::{CustomAttribute, PatchRequest},
    module::TypeId,
};

#[allow(non_snake_case)]
/// All possible flags for `FieldAttributes`
pub mod FieldAttributes {
    /// These 3 bits contain one of the following values:
    pub const FIELD_ACCESS_MASK: u32 = 0x0007;
    /// Accessible only by the parent type
    pub const PRIVATE: u32 = 0x0001;
    /// Accessibly by anyone in the Assembly
    pub const ASSEMBLY: u32 = 0x0003;
    /// Accessible only by type and sub-types
    pub const FAMILY: u32 = 0x0004;
    /// Accessibly by anyone who has visibility to this scope field contract attributes
    pub const PUBLIC: u32 = 0x0006;
    /// Defined on type, else per instance
    pub const STATIC: u32 = 0x0010;
    /// Field can only be initialized, not written to after init
    pub const INIT_ONLY: u32 = 0x0020;
    /// Value is compile time constant
    pub const LITERAL: u32 = 0x0040;
}

/// A field definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Simple name
    pub name: String,
    /// Full name of the field type
    pub field_type: String,
    /// `FieldAttributes` bitmask
    pub flags: u32,
    /// Owning type, set when the field is added to a module
    pub declaring_type: TypeId,
    /// Custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
    /// Pending patch requests
    pub requests: Vec<PatchRequest>,
}

impl FieldDef {
    /// Creates a private instance field.
    #[must_use]
    pub fn new(name: &str, field_type: &str) -> Self {
        FieldDef {
            name: name.to_string(),
            field_type: field_type.to_string(),
            flags: FieldAttributes::PRIVATE,
            declaring_type: TypeId(0),
            custom_attributes: Vec::new(),
            requests: Vec::new(),
        }
    }

    /// Replaces the attribute bitmask.
    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Returns `true` for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags & FieldAttributes::STATIC != 0
    }
}
