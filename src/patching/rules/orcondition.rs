//! Turning a single float threshold test into an `||` of two.
//!
//! A compiled `if (this.F > c) { ... }` ends its condition in `ldfld F; ldc.r4 c; ble.un L`,
//! where `L` skips the body. The rule rewrites it into `if (this.F > c || this.a.b > c)`:
//!
//! ```text
//! ldfld F                 ldfld F
//! ldc.r4 c                ldc.r4 c
//! ble.un L       ==>      bgt Body
//!                         ldarg.0
//!                         ldfld a
//!                         ldfld b
//!                         ldc.r4 c
//!                         ble.un L
//! <body>            Body: <body>
//! ```

use crate::{
    assembly::{OpCode, Operand},
    patching::{
        matchers::{self, Matcher},
        rule::{ILContext, PatchRule, RuleScope},
    },
    Error, Result,
};

use super::{declaring_type, field_path};

/// Adds `this.<path> > c` as an alternative to the first `this.<field> > c` test.
///
/// Arguments: field name on the declaring type, dotted path of the alternate field. Fields
/// are resolved on the declaring type of the edited method.
pub struct PatchOrCondition;

impl PatchRule for PatchOrCondition {
    fn name(&self) -> &'static str {
        "PatchOrCondition"
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Il
    }

    fn apply_il(&self, ctx: &mut ILContext<'_>) -> Result<()> {
        let request = ctx.request;
        let field = request.string_arg(0)?;
        let alternate = request.string_arg(1)?;

        let module = ctx.module;
        let owner = declaring_type(module, ctx.method)?;
        let owner_name = module.type_full_name(owner);
        let path = field_path(module, owner, alternate)?;

        let load = matchers::ldfld(&owner_name, field);
        let constant = matchers::ldc_r4_any();
        let skip = matchers::branch(OpCode::BleUn);
        let window: [Matcher<'_>; 3] = [&load, &constant, &skip];

        let mut cursor = ctx.cursor();
        if !cursor.try_goto_next(&window) {
            return Err(Error::PatternNotFound {
                method: cursor.method().to_string(),
                pattern: format!("ldfld {owner_name}::{field}; ldc.r4; ble.un"),
            });
        }
        let at = cursor.index();
        let threshold = cursor
            .instruction_at(at + 1)
            .map(|instr| instr.operand.clone())
            .unwrap_or(Operand::Float32(0.0));

        cursor.goto_index(at + 2)?;
        let skip_body = cursor
            .instruction_at(at + 2)
            .cloned()
            .ok_or(Error::CursorOutOfBounds {
                index: at + 2,
                len: cursor.len(),
            })?;
        // keep the compiled branch width; finalization widens what no longer fits
        let accept = if skip_body.opcode.is_short_branch() {
            OpCode::Bgt.short_form()
        } else {
            OpCode::Bgt
        };

        // the old test keeps its identity so jumps into the condition still reach it
        let body_start = cursor.define_label();
        cursor.replace(accept, Operand::Label(body_start))?;
        cursor.goto_index(at + 3)?;
        cursor.emit(OpCode::Ldarg0, Operand::None)?;
        for step in path {
            cursor.emit(OpCode::Ldfld, Operand::Member(step))?;
        }
        cursor.emit(OpCode::LdcR4, threshold)?;
        cursor.emit(skip_body.opcode, skip_body.operand)?;
        cursor.mark_label(body_start)?;

        log::debug!(
            "{}: {} > c now also accepts {} > c",
            cursor.method(),
            field,
            alternate
        );
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Widens a float threshold test into an OR with a second field"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{LabelId, MemberRef},
        metadata::{
            customattributes::PatchRequest,
            method::MethodBody,
            module::{CilModule, MemberId, MethodId},
        },
        patching::{PatchConfig, PatchDispatcher, RuleRegistry},
        test::{add_body, body, branch, init_logging, ldfld, op, opcodes, slot_module, with},
        ErrorKind,
    };
    use std::sync::Arc;

    fn render_body() -> (MethodBody, LabelId) {
        let mut code = MethodBody::new();
        let skip = code.define_label();
        code.push(op(OpCode::Ldarg0));
        code.push(ldfld("Game.Slot", "highlightEase", "System.Single"));
        code.push(with(OpCode::LdcR4, Operand::Float32(0.0)));
        code.push(branch(OpCode::BleUnS, skip));
        code.push(op(OpCode::Nop));
        let ret = code.push(op(OpCode::Ret));
        code.bind_label(skip, ret).unwrap();
        (code, skip)
    }

    fn run(module: &mut CilModule, id: MethodId, field: &str) -> crate::Result<()> {
        module
            .request(
                MemberId::Method(id),
                PatchRequest::with_strings("PatchOrCondition", &[field, "fileSelect.detailsEase"]),
            )
            .unwrap();
        let mut registry = RuleRegistry::new();
        registry.register(Arc::new(PatchOrCondition));
        PatchDispatcher::new(registry, PatchConfig::new())
            .run(module)
            .map(|_| ())
    }

    #[test]
    fn test_or_condition() {
        init_logging();
        let (mut module, slot) = slot_module();
        let (code, skip) = render_body();
        let id = add_body(&mut module, slot, "Render", code);
        run(&mut module, id, "highlightEase").unwrap();

        assert_eq!(
            opcodes(&module, id),
            vec![
                OpCode::Ldarg0,
                OpCode::Ldfld,
                OpCode::LdcR4,
                OpCode::BgtS,
                OpCode::Ldarg0,
                OpCode::Ldfld,
                OpCode::Ldfld,
                OpCode::LdcR4,
                OpCode::BleUnS,
                OpCode::Nop,
                OpCode::Ret,
            ]
        );

        let patched = body(&module, id);
        let nop = patched.id_at(9).unwrap();
        let ret = patched.id_at(10).unwrap();
        let body_start = patched.instruction_at(3).unwrap().operand.as_label().unwrap();
        assert_eq!(patched.label_target(body_start), Some(nop));
        assert_eq!(patched.label_target(skip), Some(ret));
        assert_eq!(
            patched.instruction_at(6).unwrap().operand.as_member(),
            Some(&MemberRef::field(
                "Game.FileSelect",
                "detailsEase",
                "System.Single"
            ))
        );
    }

    #[test]
    fn test_jump_into_test_keeps_its_target() {
        let (mut module, slot) = slot_module();
        let (mut code, _) = render_body();
        let test = code.id_at(3).unwrap();
        let retry = code.define_label();
        code.bind_label(retry, test).unwrap();
        code.push(branch(OpCode::Br, retry));
        let id = add_body(&mut module, slot, "Render", code);
        run(&mut module, id, "highlightEase").unwrap();

        let patched = body(&module, id);
        assert_eq!(patched.label_target(retry), Some(test));
        assert_eq!(patched.index_of(test), Some(3));
        assert_eq!(patched.get(test).unwrap().opcode, OpCode::BgtS);
    }

    #[test]
    fn test_wrong_field_is_not_found() {
        let (mut module, slot) = slot_module();
        let (code, _) = render_body();
        let id = add_body(&mut module, slot, "Render", code);

        let err = run(&mut module, id, "fileSelect").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PatternNotFound);
        assert_eq!(body(&module, id).len(), 6);
    }
}
