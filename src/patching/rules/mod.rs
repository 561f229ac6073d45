//! Built-in patch rules and module passes.
//!
//! # Per-member rules
//!
//! | Name | Scope | Arguments |
//! |------|-------|-----------|
//! | `MakeEntryPoint` | member | |
//! | `PatchInterface` | member | |
//! | `ForceName` | member | new name |
//! | `PatchInitblk` | IL | |
//! | `SubstituteOpcode` | IL | placeholder method name, opcode mnemonic |
//! | `PatchTypeCheck` | IL | anchor type, extra type |
//! | `PatchOrCondition` | IL | field name, alternate field path (`a.b`) |
//! | `PatchFieldFromGetter` | IL | getter name, replacement field name |
//! | `PatchGuardedCall` | IL | call target, flag field, hook method |
//!
//! # Module passes
//!
//! [`ReplaceAssemblyRefs`], [`SetDebuggableModes`], [`SyncReferenceVersions`],
//! [`FixEnumeratorDecompile`] and [`FixShortLongOps`] are added to a dispatcher with
//! [`crate::patching::PatchDispatcher::add_pass`].

mod branches;
mod debuggable;
mod entrypoint;
mod enumerator;
mod getter;
mod guardedcall;
mod interface;
mod opcode;
mod orcondition;
mod references;
mod rename;
mod typecheck;

use std::sync::Arc;

pub use branches::FixShortLongOps;
pub use debuggable::{DebuggingModes, SetDebuggableModes};
pub use entrypoint::MakeEntryPoint;
pub use enumerator::FixEnumeratorDecompile;
pub use getter::PatchFieldFromGetter;
pub use guardedcall::PatchGuardedCall;
pub use interface::PatchInterface;
pub use opcode::{PatchInitblk, SubstituteOpcode};
pub use orcondition::PatchOrCondition;
pub use references::{ReferenceFilter, ReplaceAssemblyRefs, SyncReferenceVersions};
pub use rename::ForceName;
pub use typecheck::PatchTypeCheck;

use crate::{
    assembly::MemberRef,
    metadata::module::{CilModule, MethodId, TypeId},
    patching::rule::PatchRule,
    Error, Result,
};

/// Every built-in per-member rule.
#[must_use]
pub fn default_rules() -> Vec<Arc<dyn PatchRule>> {
    vec![
        Arc::new(MakeEntryPoint),
        Arc::new(PatchInterface),
        Arc::new(ForceName),
        Arc::new(PatchInitblk),
        Arc::new(SubstituteOpcode),
        Arc::new(PatchTypeCheck),
        Arc::new(PatchOrCondition),
        Arc::new(PatchFieldFromGetter),
        Arc::new(PatchGuardedCall),
    ]
}

/// Declaring type of a method.
fn declaring_type(module: &CilModule, method: MethodId) -> Result<TypeId> {
    Ok(module.method(method)?.declaring_type)
}

/// Resolves a field of `ty` by name into an operand reference.
fn field_of(module: &CilModule, ty: TypeId, name: &str) -> Result<MemberRef> {
    let field = module.find_field(ty, name).ok_or_else(|| {
        Error::MemberNotFound(format!("{}::{}", module.type_full_name(ty), name))
    })?;
    module.field_ref(field)
}

/// Resolves a dotted field path starting at `ty`: `a.b` is field `a` of `ty`, then field `b`
/// of `a`'s type.
fn field_path(module: &CilModule, ty: TypeId, path: &str) -> Result<Vec<MemberRef>> {
    let mut refs: Vec<MemberRef> = Vec::new();
    let mut current = ty;
    for name in path.split('.') {
        if let Some(previous) = refs.last() {
            let type_name = &previous.signature;
            current = module
                .find_type(type_name)
                .ok_or_else(|| Error::MemberNotFound(type_name.clone()))?;
        }
        refs.push(field_of(module, current, name)?);
    }
    Ok(refs)
}

/// Resolves `Type::Method` when qualified, otherwise a method of `ty` by name or signature.
fn method_in_scope(module: &CilModule, ty: TypeId, name: &str) -> Result<MethodId> {
    if name.contains("::") {
        return module.resolve_method(name);
    }
    module.find_method(ty, name).ok_or_else(|| {
        Error::MemberNotFound(format!("{}::{}", module.type_full_name(ty), name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test::slot_module, ErrorKind};

    #[test]
    fn test_field_path() {
        let (module, slot) = slot_module();
        let path = field_path(&module, slot, "fileSelect.detailsEase").unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].full_name(), "Game.Slot::fileSelect");
        assert_eq!(path[1].full_name(), "Game.FileSelect::detailsEase");

        let err = field_path(&module, slot, "fileSelect.missing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MemberNotFound);
        let err = field_path(&module, slot, "highlightEase.x").unwrap_err();
        assert_eq!(err, Error::MemberNotFound("System.Single".to_string()));
    }

    #[test]
    fn test_default_rules_are_unique() {
        let rules = default_rules();
        let mut names: Vec<&str> = rules.iter().map(|r| r.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), rules.len());
    }
}
