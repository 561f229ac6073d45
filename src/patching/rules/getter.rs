use crate::{
    assembly::{OpCode, Operand},
    patching::{
        matchers::{self, Matcher},
        rule::{ILContext, PatchRule, RuleScope},
    },
    Error, Result,
};

use super::{declaring_type, field_of};

/// Replaces reads through a getter with a direct field read.
///
/// Every `ldfld <owner>; call|callvirt <getter>` pair becomes `ldfld <field>`, with `field`
/// resolved on the declaring type of the edited method. The `ldfld` keeps its identity, so
/// the `this` it consumes and any jump into the pair are unchanged.
///
/// Arguments: getter name (optionally `Type::name`, or its full signature), field name.
pub struct PatchFieldFromGetter;

impl PatchRule for PatchFieldFromGetter {
    fn name(&self) -> &'static str {
        "PatchFieldFromGetter"
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Il
    }

    fn apply_il(&self, ctx: &mut ILContext<'_>) -> Result<()> {
        let request = ctx.request;
        let getter = request.string_arg(0)?;
        let field = request.string_arg(1)?;

        let module = ctx.module;
        let owner = declaring_type(module, ctx.method)?;
        let replacement = field_of(module, owner, field)?;

        let (getter_type, getter_name) = matchers::split_qualified(getter);
        let load = matchers::ldfld_any();
        let call = matchers::call_any(getter_type, getter_name);
        let window: [Matcher<'_>; 2] = [&load, &call];

        let mut cursor = ctx.cursor();
        let mut replaced = 0;
        while cursor.try_goto_next(&window) {
            cursor.replace(OpCode::Ldfld, Operand::Member(replacement.clone()))?;
            let at = cursor.index();
            cursor.goto_index(at + 1)?;
            cursor.remove()?;
            replaced += 1;
        }

        if replaced == 0 {
            return Err(Error::PatternNotFound {
                method: cursor.method().to_string(),
                pattern: format!("ldfld; call {getter}"),
            });
        }
        log::debug!(
            "{}: {} read(s) of {} now load {}",
            cursor.method(),
            replaced,
            getter,
            replacement.full_name()
        );
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Replaces getter reads through a field with a direct field load"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::MemberRef,
        metadata::{
            customattributes::PatchRequest,
            method::MethodBody,
            module::{CilModule, MemberId, MethodId},
        },
        patching::{PatchConfig, PatchDispatcher, RuleRegistry},
        test::{add_body, body, branch, callvirt, init_logging, ldfld, op, opcodes, slot_module},
        ErrorKind,
    };
    use std::sync::Arc;

    fn save_data() -> crate::assembly::Instruction {
        ldfld("Game.Slot", "SaveData", "Game.SaveData")
    }

    fn run(module: &mut CilModule, id: MethodId, getter: &str) -> crate::Result<()> {
        module
            .request(
                MemberId::Method(id),
                PatchRequest::with_strings("PatchFieldFromGetter", &[getter, "totalCassettes"]),
            )
            .unwrap();
        let mut registry = RuleRegistry::new();
        registry.register(Arc::new(PatchFieldFromGetter));
        PatchDispatcher::new(registry, PatchConfig::new())
            .run(module)
            .map(|_| ())
    }

    #[test]
    fn test_every_read_is_replaced() {
        init_logging();
        let (mut module, slot) = slot_module();
        let mut code = MethodBody::new();
        let again = code.define_label();
        code.push(op(OpCode::Ldarg0));
        let first = code.push(save_data());
        code.push(callvirt("Game.SaveData", "get_TotalCassettes"));
        code.push(op(OpCode::Pop));
        code.push(op(OpCode::Ldarg0));
        code.push(save_data());
        code.push(callvirt("Game.SaveData", "get_TotalCassettes"));
        code.push(branch(OpCode::BrtrueS, again));
        code.push(op(OpCode::Ret));
        code.bind_label(again, first).unwrap();
        let id = add_body(&mut module, slot, "Render", code);

        run(&mut module, id, "Game.SaveData::get_TotalCassettes").unwrap();

        assert_eq!(
            opcodes(&module, id),
            vec![
                OpCode::Ldarg0,
                OpCode::Ldfld,
                OpCode::Pop,
                OpCode::Ldarg0,
                OpCode::Ldfld,
                OpCode::BrtrueS,
                OpCode::Ret,
            ]
        );
        let patched = body(&module, id);
        let expected = MemberRef::field("Game.Slot", "totalCassettes", "System.Int32");
        assert_eq!(patched.instruction_at(1).unwrap().operand.as_member(), Some(&expected));
        assert_eq!(patched.instruction_at(4).unwrap().operand.as_member(), Some(&expected));
        assert_eq!(patched.label_target(again), Some(first));
    }

    #[test]
    fn test_other_getters_are_kept() {
        let (mut module, slot) = slot_module();
        let id = add_body(
            &mut module,
            slot,
            "Render",
            MethodBody::from_instructions(vec![
                op(OpCode::Ldarg0),
                save_data(),
                callvirt("Game.SaveData", "get_TotalStrawberries"),
                op(OpCode::Ret),
            ]),
        );

        let err = run(&mut module, id, "get_TotalCassettes").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PatternNotFound);
    }

    #[test]
    fn test_missing_field() {
        let mut module = CilModule::new("Game");
        let ty = module.add_type("Game", "Other");
        let id = add_body(
            &mut module,
            ty,
            "Render",
            MethodBody::from_instructions(vec![op(OpCode::Ret)]),
        );
        let err = run(&mut module, id, "get_TotalCassettes").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MemberNotFound);
    }
}
