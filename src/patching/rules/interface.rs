use crate::{
    metadata::method::{MethodModifiers, MethodVtableFlags},
    patching::rule::{MemberContext, PatchRule, RuleScope},
    Result,
};

/// Marks the annotated method `virtual final newslot`, so it can implement an interface member
/// it was not declared against.
pub struct PatchInterface;

impl PatchRule for PatchInterface {
    fn name(&self) -> &'static str {
        "PatchInterface"
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Member
    }

    fn apply_member(&self, ctx: &mut MemberContext<'_>) -> Result<()> {
        let id = ctx.target_method()?;
        let method = ctx.module.method_mut(id)?;
        method.attributes.modifiers |= MethodModifiers::VIRTUAL | MethodModifiers::FINAL;
        method.attributes.vtable |= MethodVtableFlags::NEW_SLOT;
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Adds virtual, final and newslot to the annotated method"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            customattributes::PatchRequest,
            method::{MethodAttributes, MethodDef},
            module::{CilModule, MemberId},
        },
        patching::{PatchConfig, PatchDispatcher, RuleRegistry},
    };
    use std::sync::Arc;

    #[test]
    fn test_sets_flags_and_keeps_others() {
        let mut module = CilModule::new("Game");
        let ty = module.add_type("Game", "Button");
        let attrs = MethodAttributes::from_bits(0x0006 | 0x0080);
        let id = module
            .add_method(
                ty,
                MethodDef::new("Dispose", "System.Void").with_attributes(attrs),
            )
            .unwrap();
        module
            .request(MemberId::Method(id), PatchRequest::new("PatchInterface"))
            .unwrap();

        let mut registry = RuleRegistry::new();
        registry.register(Arc::new(PatchInterface));
        PatchDispatcher::new(registry, PatchConfig::new())
            .run(&mut module)
            .unwrap();

        let attributes = module.method(id).unwrap().attributes;
        assert!(attributes.is_virtual());
        assert!(attributes.modifiers.contains(MethodModifiers::FINAL));
        assert!(attributes.modifiers.contains(MethodModifiers::HIDE_BY_SIG));
        assert!(attributes.vtable.contains(MethodVtableFlags::NEW_SLOT));
        assert_eq!(attributes.bits(), 0x0006 | 0x0080 | 0x0040 | 0x0020 | 0x0100);
    }
}
