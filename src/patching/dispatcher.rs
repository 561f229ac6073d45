//! Request discovery and rule dispatch.
//!
//! [`PatchDispatcher::run`] is a transaction over a [`CilModule`]: it patches a clone and only
//! writes the clone back when every request and every module pass succeeded. The first error
//! ends the run and leaves the caller's module exactly as it was.
//!
//! # Order
//!
//! Types are visited depth first in declaration order. For each type the type's own requests
//! run first, then those of its fields, then those of its methods; nested types follow. Module
//! passes run last, once each, in the order they were added.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::{
    metadata::{
        customattributes::PatchRequest,
        module::{CilModule, MemberId},
    },
    patching::{
        config::PatchConfig,
        result::{AppliedRule, PatchReport},
        rule::{ConflictLedger, ILContext, MemberContext, ModulePass, PatchRule, RuleScope},
        rules,
    },
    Error, Result,
};

/// Name to rule map consulted by the dispatcher.
#[derive(Default, Clone)]
pub struct RuleRegistry {
    rules: FxHashMap<String, Arc<dyn PatchRule>>,
}

impl RuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in rule.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for rule in rules::default_rules() {
            registry.register(rule);
        }
        registry
    }

    /// Registers a rule under its name, returning the rule it replaced.
    pub fn register(&mut self, rule: Arc<dyn PatchRule>) -> Option<Arc<dyn PatchRule>> {
        self.rules.insert(rule.name().to_string(), rule)
    }

    /// Looks a rule up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn PatchRule>> {
        self.rules.get(name)
    }

    /// Returns `true` if a rule is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if no rule is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Routes patch requests to rules and runs module passes.
pub struct PatchDispatcher {
    registry: RuleRegistry,
    config: PatchConfig,
    passes: Vec<Box<dyn ModulePass>>,
}

impl PatchDispatcher {
    /// Creates a dispatcher without module passes.
    #[must_use]
    pub fn new(registry: RuleRegistry, config: PatchConfig) -> Self {
        PatchDispatcher {
            registry,
            config,
            passes: Vec::new(),
        }
    }

    /// Appends a module pass.
    pub fn add_pass(&mut self, pass: impl ModulePass + 'static) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// The rule registry.
    #[must_use]
    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    /// Names of the module passes, in run order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Applies every pending request of `module`, then every module pass.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownRule`] if a request names an unregistered rule
    /// - [`Error::RuleFailed`] wrapping the first handler or module pass error
    /// - body finalization errors, wrapped the same way
    ///
    /// On error `module` is unchanged.
    pub fn run(&self, module: &mut CilModule) -> Result<PatchReport> {
        let mut working = module.clone();
        let mut ledger = ConflictLedger::new();
        let mut report = PatchReport::default();

        if let Err(error) = self.run_passes(&mut working, &mut ledger, &mut report) {
            log::warn!("Patching {} aborted: {}", module.name, error);
            return Err(error);
        }

        *module = working;
        log::debug!(
            "Patched {}: {} rules applied, {} bodies finalized",
            module.name,
            report.rule_count(),
            report.bodies_finalized
        );
        Ok(report)
    }

    fn run_passes(
        &self,
        working: &mut CilModule,
        ledger: &mut ConflictLedger,
        report: &mut PatchReport,
    ) -> Result<()> {
        for ty in working.types_depth_first() {
            self.process_member(working, MemberId::Type(ty), ledger, report)?;

            let (fields, methods) = {
                let def = working.type_def(ty)?;
                (def.fields.clone(), def.methods.clone())
            };
            for field in fields {
                self.process_member(working, MemberId::Field(field), ledger, report)?;
            }
            for method in methods {
                self.process_member(working, MemberId::Method(method), ledger, report)?;
            }
        }

        for pass in &self.passes {
            log::debug!("Running module pass {}", pass.name());
            let changed = pass
                .run(working, &self.config)
                .map_err(|source| Error::RuleFailed {
                    member: working.name.clone(),
                    rule: pass.name().to_string(),
                    source: Box::new(source),
                })?;
            report.module_passes.push((pass.name().to_string(), changed));
        }
        Ok(())
    }

    fn process_member(
        &self,
        working: &mut CilModule,
        member: MemberId,
        ledger: &mut ConflictLedger,
        report: &mut PatchReport,
    ) -> Result<()> {
        let requests = working.requests(member)?.to_vec();
        if requests.is_empty() {
            return Ok(());
        }

        for request in &requests {
            let member_name = working.member_name(member);
            let Some(rule) = self.registry.get(&request.rule) else {
                return Err(Error::UnknownRule {
                    rule: request.rule.clone(),
                    member: member_name,
                });
            };

            log::debug!("Applying {} to {}", request, member_name);
            let redirected_to = self
                .apply(rule.as_ref(), working, member, request, ledger, report)
                .map_err(|source| Error::RuleFailed {
                    member: member_name.clone(),
                    rule: request.rule.clone(),
                    source: Box::new(source),
                })?;

            report.applied.push(AppliedRule {
                rule: request.rule.clone(),
                member: member_name,
                redirected_to,
            });
        }

        if self.config.consume_requests {
            working.requests_mut(member)?.clear();
        }
        Ok(())
    }

    fn apply(
        &self,
        rule: &dyn PatchRule,
        working: &mut CilModule,
        member: MemberId,
        request: &PatchRequest,
        ledger: &mut ConflictLedger,
        report: &mut PatchReport,
    ) -> Result<Option<String>> {
        match rule.scope() {
            RuleScope::Member => {
                let mut ctx = MemberContext {
                    module: working,
                    target: member,
                    request,
                    ledger,
                };
                rule.apply_member(&mut ctx)?;
                Ok(None)
            }
            RuleScope::Il => self.apply_il(rule, working, member, request, report),
        }
    }

    fn apply_il(
        &self,
        rule: &dyn PatchRule,
        working: &mut CilModule,
        member: MemberId,
        request: &PatchRequest,
        report: &mut PatchReport,
    ) -> Result<Option<String>> {
        let MemberId::Method(target) = member else {
            return Err(Error::InvalidTarget {
                rule: request.rule.clone(),
                member: working.member_name(member),
                expected: "method",
            });
        };

        let method = if self.config.follow_state_machines {
            working.resolve_state_machine(target).unwrap_or(target)
        } else {
            target
        };
        let method_name = working.method_full_name(method);
        if method != target {
            log::debug!(
                "{} is a state machine method, editing {}",
                working.method_full_name(target),
                method_name
            );
        }

        let Some(mut body) = working.method_mut(method)?.body.take() else {
            return Err(Error::InvalidTarget {
                rule: request.rule.clone(),
                member: method_name,
                expected: "method with a body",
            });
        };

        let outcome = {
            let mut ctx = ILContext {
                module: working,
                method,
                target,
                request,
                body: &mut body,
            };
            rule.apply_il(&mut ctx)
        };
        let finalized = outcome.and_then(|()| {
            if self.config.finalize_bodies {
                body.finalize(
                    &method_name,
                    self.config.branch_policy,
                    self.config.max_fixup_iterations,
                )
                .map(Some)
            } else {
                Ok(None)
            }
        });
        working.method_mut(method)?.body = Some(body);

        if let Some(widened) = finalized? {
            report.bodies_finalized += 1;
            report.branches_widened += widened;
        }
        Ok((method != target).then_some(method_name))
    }
}
