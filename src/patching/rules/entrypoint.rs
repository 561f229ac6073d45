use crate::{
    patching::rule::{MemberContext, PatchRule, RuleScope},
    Result,
};

/// Makes the annotated method the module entry point.
///
/// The entry point is single-valued: a second `MakeEntryPoint` on a different method in the
/// same run is a [`crate::Error::DependencyConflict`].
pub struct MakeEntryPoint;

impl PatchRule for MakeEntryPoint {
    fn name(&self) -> &'static str {
        "MakeEntryPoint"
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Member
    }

    fn apply_member(&self, ctx: &mut MemberContext<'_>) -> Result<()> {
        let method = ctx.target_method()?;
        // overloads and renamed methods share names, ids do not
        let member = ctx.target.to_string();
        ctx.ledger.claim(&ctx.module.name, "entry_point", &member)?;
        ctx.module.entry_point = Some(method);
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Sets the module entry point to the annotated method"
    }
}
