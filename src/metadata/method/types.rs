//! Method attribute flags for .NET CIL methods.
//!
//! Method attributes are stored as a single `u32` in metadata; this module splits them into
//! the logical groups rules actually reason about.
//!
//! # Key Types
//! - [`MethodAccessFlags`]: Member access
//! - [`MethodVtableFlags`]: Vtable slot layout
//! - [`MethodModifiers`]: Static/virtual/final and friends
//! - [`MethodAttributes`]: The combined attribute word of one method

use bitflags::bitflags;

/// Bitmask for `ACCESS` state extraction
pub const METHOD_ACCESS_MASK: u32 = 0x0007;
/// Bitmask for `VTABLE_LAYOUT` information extraction
pub const METHOD_VTABLE_LAYOUT_MASK: u32 = 0x0100;

// Method attributes split into logical groups
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method access flags
    pub struct MethodAccessFlags: u32 {
        /// Member not referenceable
        const COMPILER_CONTROLLED = 0x0000;
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this Assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessibly by anyone in the Assembly
        const ASSEM = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessibly by sub-types anywhere, plus anyone in assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessibly by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
    }
}

impl MethodAccessFlags {
    /// Extract access flags from raw method attributes
    #[must_use]
    pub fn from_method_flags(flags: u32) -> Self {
        let access = flags & METHOD_ACCESS_MASK;
        Self::from_bits_truncate(access)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method vtable layout flags
    pub struct MethodVtableFlags: u32 {
        /// Method reuses existing slot in vtable
        const REUSE_SLOT = 0x0000;
        /// Method always gets a new slot in the vtable
        const NEW_SLOT = 0x0100;
    }
}

impl MethodVtableFlags {
    /// Extract vtable layout flags from raw method attributes
    #[must_use]
    pub fn from_method_flags(flags: u32) -> Self {
        let vtable = flags & METHOD_VTABLE_LAYOUT_MASK;
        Self::from_bits_truncate(vtable)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method modifiers and properties
    pub struct MethodModifiers: u32 {
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method can only be overriden if also accessible
        const STRICT = 0x0200;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// CLI provides 'special' behavior, dpending upon the name of the method
        const RTSPECIAL_NAME = 0x1000;
    }
}

impl MethodModifiers {
    /// Extract method modifiers from raw method attributes
    #[must_use]
    pub fn from_method_flags(flags: u32) -> Self {
        let modifiers = flags & !METHOD_ACCESS_MASK & !METHOD_VTABLE_LAYOUT_MASK;
        Self::from_bits_truncate(modifiers)
    }
}

/// The attribute word of one method, split into its logical groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodAttributes {
    /// Member access
    pub access: MethodAccessFlags,
    /// Vtable layout
    pub vtable: MethodVtableFlags,
    /// Modifiers
    pub modifiers: MethodModifiers,
}

impl MethodAttributes {
    /// Splits a raw attribute word.
    #[must_use]
    pub fn from_bits(flags: u32) -> Self {
        MethodAttributes {
            access: MethodAccessFlags::from_method_flags(flags),
            vtable: MethodVtableFlags::from_method_flags(flags),
            modifiers: MethodModifiers::from_method_flags(flags),
        }
    }

    /// Recombines the raw attribute word.
    #[must_use]
    pub fn bits(&self) -> u32 {
        self.access.bits() | self.vtable.bits() | self.modifiers.bits()
    }

    /// `public hidebysig` instance method.
    #[must_use]
    pub fn public_instance() -> Self {
        MethodAttributes {
            access: MethodAccessFlags::PUBLIC,
            vtable: MethodVtableFlags::REUSE_SLOT,
            modifiers: MethodModifiers::HIDE_BY_SIG,
        }
    }

    /// Returns `true` if the method is virtual.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.modifiers.contains(MethodModifiers::VIRTUAL)
    }
}

impl Default for MethodAttributes {
    fn default() -> Self {
        Self::public_instance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_and_recombine() {
        // public virtual final hidebysig newslot
        let raw = 0x0006 | 0x0040 | 0x0020 | 0x0080 | 0x0100;
        let attrs = MethodAttributes::from_bits(raw);

        assert_eq!(attrs.access, MethodAccessFlags::PUBLIC);
        assert_eq!(attrs.vtable, MethodVtableFlags::NEW_SLOT);
        assert!(attrs.modifiers.contains(MethodModifiers::VIRTUAL));
        assert!(attrs.modifiers.contains(MethodModifiers::FINAL));
        assert!(attrs.is_virtual());
        assert_eq!(attrs.bits(), raw);
    }

    #[test]
    fn test_default_is_public_instance() {
        let attrs = MethodAttributes::default();
        assert_eq!(attrs.access, MethodAccessFlags::PUBLIC);
        assert!(!attrs.modifiers.contains(MethodModifiers::STATIC));
        assert!(!attrs.is_virtual());
    }
}
