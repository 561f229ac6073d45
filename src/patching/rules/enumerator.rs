use crate::{
    assembly::{Instruction, OpCode},
    metadata::module::CilModule,
    patching::{config::PatchConfig, cursor::ILCursor, rule::ModulePass},
    Result,
};

/// Explicit interface methods and `finally` helpers of compiler-generated enumerators.
const DIRECT_TARGETS: [&str; 2] = [
    "System.Collections.IEnumerable.GetEnumerator",
    "System.IDisposable.Dispose",
];
const FINALLY_PREFIX: &str = "<>m__Finally";

/// Turns `callvirt` into `call` for private helpers of compiler-generated enumerators.
///
/// Decompilers cannot resolve a virtual call to an explicitly implemented interface method
/// or a synthesized `finally` helper; a direct call to the same method behaves identically.
pub struct FixEnumeratorDecompile;

impl ModulePass for FixEnumeratorDecompile {
    fn name(&self) -> &'static str {
        "FixEnumeratorDecompile"
    }

    fn run(&self, module: &mut CilModule, _config: &PatchConfig) -> Result<bool> {
        let mut fixed = 0;
        for ty in module.types_depth_first() {
            let type_def = module.type_def(ty)?;
            if !type_def.is_compiler_generated_enumerator() {
                continue;
            }
            for method in type_def.methods.clone() {
                let name = module.method_full_name(method);
                let Some(body) = module.method_mut(method)?.body.as_mut() else {
                    continue;
                };
                let mut cursor = ILCursor::new(body, name);
                while cursor.try_goto_next(&[&is_helper_callvirt]) {
                    if let Some(instr) = cursor.next_mut() {
                        instr.opcode = OpCode::Call;
                        fixed += 1;
                    }
                }
            }
        }

        if fixed > 0 {
            log::debug!("Devirtualized {} enumerator helper call(s)", fixed);
        }
        Ok(fixed > 0)
    }

    fn description(&self) -> &'static str {
        "Replaces callvirt with call for compiler-generated enumerator helpers"
    }
}

fn is_helper_callvirt(instr: &Instruction) -> bool {
    instr.opcode == OpCode::Callvirt
        && instr.operand.as_member().is_some_and(|member| {
            DIRECT_TARGETS.contains(&member.name.as_str())
                || member.name.starts_with(FINALLY_PREFIX)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            customattributes::{CustomAttribute, COMPILER_GENERATED_ATTRIBUTE},
            method::MethodBody,
            module::MemberId,
            typedef::IENUMERATOR,
        },
        test::{add_body, callvirt, op, opcodes},
    };

    #[test]
    fn test_only_enumerator_helpers() {
        let mut module = CilModule::new("Game");
        let outer = module.add_type("Game", "Level");
        let machine = module.add_nested_type(outer, "<Enter>d__3").unwrap();
        module
            .add_custom_attribute(
                MemberId::Type(machine),
                CustomAttribute::new(COMPILER_GENERATED_ATTRIBUTE),
            )
            .unwrap();
        module
            .type_def_mut(machine)
            .unwrap()
            .interfaces
            .push(IENUMERATOR.to_string());

        let calls = || {
            MethodBody::from_instructions(vec![
                callvirt("Game.Level/<Enter>d__3", "System.IDisposable.Dispose"),
                callvirt("Game.Level/<Enter>d__3", "<>m__Finally1"),
                callvirt("Game.Entity", "Update"),
                op(OpCode::Ret),
            ])
        };
        let in_machine = add_body(&mut module, machine, "MoveNext", calls());
        let in_outer = add_body(&mut module, outer, "Update", calls());

        let pass = FixEnumeratorDecompile;
        assert!(pass.run(&mut module, &PatchConfig::new()).unwrap());
        assert_eq!(
            opcodes(&module, in_machine),
            vec![OpCode::Call, OpCode::Call, OpCode::Callvirt, OpCode::Ret]
        );
        assert_eq!(
            opcodes(&module, in_outer),
            vec![OpCode::Callvirt, OpCode::Callvirt, OpCode::Callvirt, OpCode::Ret]
        );

        assert!(!pass.run(&mut module, &PatchConfig::new()).unwrap());
    }

    #[test]
    fn test_plain_compiler_generated_types_are_skipped() {
        let mut module = CilModule::new("Game");
        let closure = module.add_type("Game", "<>c");
        module
            .add_custom_attribute(
                MemberId::Type(closure),
                CustomAttribute::new(COMPILER_GENERATED_ATTRIBUTE),
            )
            .unwrap();
        add_body(
            &mut module,
            closure,
            "Invoke",
            MethodBody::from_instructions(vec![
                callvirt("Game.<>c", "System.IDisposable.Dispose"),
                op(OpCode::Ret),
            ]),
        );
        assert!(!FixEnumeratorDecompile
            .run(&mut module, &PatchConfig::new())
            .unwrap());
    }
}
