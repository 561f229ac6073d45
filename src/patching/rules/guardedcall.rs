use crate::{
    assembly::{OpCode, Operand},
    patching::{
        cursor::MoveType,
        matchers,
        rule::{ILContext, PatchRule, RuleScope},
    },
    Error, Result,
};

use super::{declaring_type, method_in_scope};

/// Inserts `if (flag) hook();` right after the first call to a target method.
///
/// Arguments: call target (`Type::name` or `Type::<signature>`, type optional), flag field and
/// hook method on the declaring type of the edited method (a hook may also be given as
/// `Type::name`). Instance members are accessed through `this`.
///
/// Labels bound to the instruction after the call stay there, so existing jumps bypass the
/// inserted code.
pub struct PatchGuardedCall;

impl PatchRule for PatchGuardedCall {
    fn name(&self) -> &'static str {
        "PatchGuardedCall"
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Il
    }

    fn apply_il(&self, ctx: &mut ILContext<'_>) -> Result<()> {
        let request = ctx.request;
        let target = request.string_arg(0)?;
        let flag = request.string_arg(1)?;
        let hook = request.string_arg(2)?;

        let module = ctx.module;
        let owner = declaring_type(module, ctx.method)?;
        let flag_id = module.find_field(owner, flag).ok_or_else(|| {
            Error::MemberNotFound(format!("{}::{}", module.type_full_name(owner), flag))
        })?;
        let flag_static = module.field(flag_id)?.is_static();
        let flag_ref = module.field_ref(flag_id)?;
        let hook_id = method_in_scope(module, owner, hook)?;
        let hook_static = module.method(hook_id)?.is_static();
        let hook_ref = module.method_ref(hook_id)?;

        let (target_type, target_name) = matchers::split_qualified(target);
        let call = matchers::call_any(target_type, target_name);

        let mut cursor = ctx.cursor();
        if !cursor.try_goto_next_with(MoveType::After, &[&call]) {
            return Err(Error::PatternNotFound {
                method: cursor.method().to_string(),
                pattern: format!("call {target}"),
            });
        }

        let skip = cursor.define_label();
        if flag_static {
            cursor.emit(OpCode::Ldsfld, Operand::Member(flag_ref))?;
        } else {
            cursor.emit(OpCode::Ldarg0, Operand::None)?;
            cursor.emit(OpCode::Ldfld, Operand::Member(flag_ref))?;
        }
        cursor.emit(OpCode::BrfalseS, Operand::Label(skip))?;
        if !hook_static {
            cursor.emit(OpCode::Ldarg0, Operand::None)?;
        }
        cursor.emit(OpCode::Call, Operand::Member(hook_ref))?;
        cursor.mark_label(skip)?;

        log::debug!(
            "{}: {} guarded by {} after {}",
            cursor.method(),
            hook,
            flag,
            target
        );
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Calls a hook after a target call when a flag field is set"
    }
}
