use crate::{
    patching::rule::{MemberContext, PatchRule, RuleScope},
    Error, Result,
};

/// Renames the annotated type, method or field to argument 0.
///
/// A member can only be renamed to one name per run; a second `ForceName` with a different
/// name is a [`Error::DependencyConflict`].
pub struct ForceName;

impl PatchRule for ForceName {
    fn name(&self) -> &'static str {
        "ForceName"
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Member
    }

    fn apply_member(&self, ctx: &mut MemberContext<'_>) -> Result<()> {
        let request = ctx.request;
        let name = request.string_arg(0)?;
        if name.is_empty() {
            return Err(Error::InvalidArgument {
                rule: request.rule.clone(),
                message: "name must not be empty".to_string(),
            });
        }

        let subject = ctx.target_name();
        ctx.ledger.claim_member(ctx.target, &subject, "name", name)?;
        log::debug!("Renaming {} to {}", subject, name);
        ctx.module.rename(ctx.target, name)
    }

    fn description(&self) -> &'static str {
        "Renames the annotated member"
    }
}
