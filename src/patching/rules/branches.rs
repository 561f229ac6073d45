use crate::{
    metadata::{
        method::BranchFormPolicy,
        module::{CilModule, MethodId},
    },
    patching::{config::PatchConfig, rule::ModulePass},
    Result,
};

/// Normalizes branch forms in every method body of the module.
///
/// Uses the run's [`PatchConfig::branch_policy`] unless constructed with an explicit
/// policy. [`BranchFormPolicy::Widen`] rewrites every short branch to its long form;
/// [`BranchFormPolicy::Fit`] only widens branches whose target is out of `i8` range.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixShortLongOps {
    policy: Option<BranchFormPolicy>,
}

impl FixShortLongOps {
    /// Follows the configured policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Always applies `policy`.
    #[must_use]
    pub fn with_policy(policy: BranchFormPolicy) -> Self {
        FixShortLongOps {
            policy: Some(policy),
        }
    }
}

impl ModulePass for FixShortLongOps {
    fn name(&self) -> &'static str {
        "FixShortLongOps"
    }

    fn run(&self, module: &mut CilModule, config: &PatchConfig) -> Result<bool> {
        let policy = self.policy.unwrap_or(config.branch_policy);
        let mut widened = 0;
        for index in 0..module.method_count() {
            let Some(body) = module.method_mut(MethodId(index as u32))?.body.as_mut() else {
                continue;
            };
            widened += match policy {
                BranchFormPolicy::Widen => body.widen_branches(),
                BranchFormPolicy::Fit => body.fit_branch_forms(config.max_fixup_iterations)?,
            };
        }

        log::debug!("Widened {} branch(es) ({:?})", widened, policy);
        Ok(widened > 0)
    }

    fn description(&self) -> &'static str {
        "Normalizes short and long branch forms in every body"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::OpCode,
        metadata::method::MethodBody,
        test::{add_body, branch, op, opcodes},
    };

    fn module_with_short_branch() -> (CilModule, MethodId) {
        let mut module = CilModule::new("Game");
        let ty = module.add_type("Game", "Player");
        let mut code = MethodBody::new();
        let end = code.define_label();
        code.push(branch(OpCode::BrS, end));
        code.push(op(OpCode::Nop));
        let ret = code.push(op(OpCode::Ret));
        code.bind_label(end, ret).unwrap();
        let id = add_body(&mut module, ty, "Update", code);
        (module, id)
    }

    #[test]
    fn test_widen() {
        let (mut module, id) = module_with_short_branch();
        let pass = FixShortLongOps::with_policy(BranchFormPolicy::Widen);
        assert!(pass.run(&mut module, &PatchConfig::new()).unwrap());
        assert_eq!(
            opcodes(&module, id),
            vec![OpCode::Br, OpCode::Nop, OpCode::Ret]
        );
        assert!(!pass.run(&mut module, &PatchConfig::new()).unwrap());
    }

    #[test]
    fn test_fit_follows_config() {
        let (mut module, id) = module_with_short_branch();
        assert!(!FixShortLongOps::new()
            .run(&mut module, &PatchConfig::new())
            .unwrap());
        assert_eq!(opcodes(&module, id)[0], OpCode::BrS);

        assert!(FixShortLongOps::new()
            .run(&mut module, &PatchConfig::widen_branches())
            .unwrap());
        assert_eq!(opcodes(&module, id)[0], OpCode::Br);
    }

    #[test]
    fn test_fit_widens_far_targets() {
        let (mut module, id) = module_with_short_branch();
        let body = module.method_mut(id).unwrap().body.as_mut().unwrap();
        for _ in 0..200 {
            body.insert_at(1, op(OpCode::Nop)).unwrap();
        }
        assert!(FixShortLongOps::new()
            .run(&mut module, &PatchConfig::new())
            .unwrap());
        assert_eq!(opcodes(&module, id)[0], OpCode::Br);
    }
}
