//! Method definitions and their editable bodies.
//!
//! # Key Components
//!
//! - [`MethodDef`] - A method of the module index: name, signature, flags, body
//! - [`MethodBody`] - The instruction arena with labels and exception regions
//! - [`ExceptionHandler`] - A protected region anchored on instruction identities
//! - [`MethodAttributes`] - Access, vtable layout and modifier flags

mod body;
mod exceptions;
mod types;

pub use body::{BranchFormPolicy, LabelState, MethodBody};
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags, RegionBoundary};
pub use types::*;

use crate::metadata::{
    customattributes::{CustomAttribute, PatchRequest},
    module::TypeId,
};

/// A method definition.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// Simple name
    pub name: String,
    /// Full name of the return type
    pub return_type: String,
    /// Full names of the parameter types
    pub params: Vec<String>,
    /// Method flags
    pub attributes: MethodAttributes,
    /// Owning type, set when the method is added to a module
    pub declaring_type: TypeId,
    /// IL body; `None` for abstract and extern methods
    pub body: Option<MethodBody>,
    /// Custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
    /// Pending patch requests
    pub requests: Vec<PatchRequest>,
}

impl MethodDef {
    /// Creates a public instance method without parameters or body.
    #[must_use]
    pub fn new(name: &str, return_type: &str) -> Self {
        MethodDef {
            name: name.to_string(),
            return_type: return_type.to_string(),
            params: Vec::new(),
            attributes: MethodAttributes::default(),
            declaring_type: TypeId(0),
            body: None,
            custom_attributes: Vec::new(),
            requests: Vec::new(),
        }
    }

    /// Sets the parameter types.
    #[must_use]
    pub fn with_params(mut self, params: &[&str]) -> Self {
        self.params = params.iter().map(|p| (*p).to_string()).collect();
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the method flags.
    #[must_use]
    pub fn with_attributes(mut self, attributes: MethodAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// `ReturnType Name(Param1,Param2)`
    #[must_use]
    pub fn signature(&self) -> String {
        format!("{} {}({})", self.return_type, self.name, self.params.join(","))
    }

    /// Matches either the simple name or the full signature text.
    #[must_use]
    pub fn matches(&self, name_or_signature: &str) -> bool {
        self.name == name_or_signature || self.signature() == name_or_signature
    }

    /// Returns `true` if an attribute of the given type is attached.
    #[must_use]
    pub fn has_attribute(&self, type_name: &str) -> bool {
        self.custom_attributes
            .iter()
            .any(|attr| attr.type_name == type_name)
    }

    /// Returns `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.attributes.modifiers.contains(MethodModifiers::STATIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_matching() {
        let method = MethodDef::new("Start", "System.Void").with_params(&["Game.SaveData", "System.Int32"]);
        assert_eq!(method.signature(), "System.Void Start(Game.SaveData,System.Int32)");
        assert!(method.matches("Start"));
        assert!(method.matches("System.Void Start(Game.SaveData,System.Int32)"));
        assert!(!method.matches("System.Void Start()"));
    }
}
