//! Rule traits and the contexts handlers run in.
//!
//! A [`PatchRule`] is invoked once per [`PatchRequest`] naming it. Its [`RuleScope`] decides
//! what it receives:
//!
//! - [`RuleScope::Member`] rules get a [`MemberContext`] with mutable access to the whole
//!   module, for flag, name and entry point changes.
//! - [`RuleScope::Il`] rules get an [`ILContext`] holding the single mutable borrow of one
//!   method body plus read-only access to the rest of the module. Edits go through
//!   [`ILContext::cursor`].
//!
//! A [`ModulePass`] runs once per dispatch after every per-member rule, independent of any
//! request.

use rustc_hash::FxHashMap;

use crate::{
    metadata::{
        customattributes::PatchRequest,
        method::MethodBody,
        module::{CilModule, MemberId, MethodId},
    },
    patching::{config::PatchConfig, cursor::ILCursor},
    Error, Result,
};

/// What a rule operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    /// Member metadata: names, flags, the module entry point
    Member,
    /// The instruction stream of a method body
    Il,
}

/// A named patch handler.
///
/// Rules must be thread-safe (Send + Sync) so one registry can be shared between
/// dispatchers.
pub trait PatchRule: Send + Sync {
    /// Name under which requests refer to this rule.
    fn name(&self) -> &'static str;

    /// Whether the rule edits member metadata or a method body.
    fn scope(&self) -> RuleScope;

    /// Applies a member-scoped rule.
    ///
    /// # Errors
    ///
    /// Any error aborts the run. The default implementation rejects the call.
    fn apply_member(&self, ctx: &mut MemberContext<'_>) -> Result<()> {
        Err(malformed_error!(
            "Rule '{}' has no member handler (requested on {})",
            self.name(),
            ctx.target_name()
        ))
    }

    /// Applies an IL-scoped rule.
    ///
    /// # Errors
    ///
    /// Any error aborts the run. The default implementation rejects the call.
    fn apply_il(&self, ctx: &mut ILContext<'_>) -> Result<()> {
        Err(malformed_error!(
            "Rule '{}' has no IL handler (requested on {})",
            self.name(),
            ctx.method_name()
        ))
    }

    /// Get a description of what this rule does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}

/// A rule that runs once per dispatch over the whole module.
pub trait ModulePass: Send + Sync {
    /// Unique name for logging and reports.
    fn name(&self) -> &'static str;

    /// Runs the pass. Returns `true` if the module changed.
    ///
    /// Passes must be idempotent: running one over its own output changes nothing.
    ///
    /// # Errors
    ///
    /// Any error aborts the run.
    fn run(&self, module: &mut CilModule, config: &PatchConfig) -> Result<bool>;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}

/// Context of a member-scoped rule.
pub struct MemberContext<'a> {
    /// The working module
    pub module: &'a mut CilModule,
    /// The annotated member
    pub target: MemberId,
    /// The request being served
    pub request: &'a PatchRequest,
    /// Claims on single-valued aspects made so far in this run
    pub ledger: &'a mut ConflictLedger,
}

impl MemberContext<'_> {
    /// Qualified name of the annotated member.
    #[must_use]
    pub fn target_name(&self) -> String {
        self.module.member_name(self.target)
    }

    /// The annotated member as a method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTarget`] if the rule was attached to a type or field.
    pub fn target_method(&self) -> Result<MethodId> {
        match self.target {
            MemberId::Method(id) => Ok(id),
            _ => Err(Error::InvalidTarget {
                rule: self.request.rule.clone(),
                member: self.target_name(),
                expected: "method",
            }),
        }
    }
}

/// Context of an IL-scoped rule.
pub struct ILContext<'a> {
    /// The working module, without the body being edited
    pub module: &'a CilModule,
    /// The method whose body is edited; the state machine's `MoveNext` for iterator methods
    pub method: MethodId,
    /// The annotated method
    pub target: MethodId,
    /// The request being served
    pub request: &'a PatchRequest,
    /// The body being edited
    pub body: &'a mut MethodBody,
}

impl ILContext<'_> {
    /// Qualified name of the method being edited.
    #[must_use]
    pub fn method_name(&self) -> String {
        self.module.method_full_name(self.method)
    }

    /// Returns `true` if edits land in a state machine instead of the annotated method.
    #[must_use]
    pub fn is_redirected(&self) -> bool {
        self.method != self.target
    }

    /// A cursor at index 0 of the body.
    pub fn cursor(&mut self) -> ILCursor<'_> {
        let name = self.method_name();
        ILCursor::new(self.body, name)
    }
}

/// Claims on single-valued aspects of members within one run.
///
/// Two rules asking for different values of the same aspect (two names for one member, two
/// entry points for one module) conflict; asking twice for the same value does not.
#[derive(Debug, Default)]
pub struct ConflictLedger {
    claims: FxHashMap<(String, &'static str), String>,
}

impl ConflictLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `aspect` of `subject` for `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DependencyConflict`] if the aspect was claimed for a different value.
    pub fn claim(&mut self, subject: &str, aspect: &'static str, value: &str) -> Result<()> {
        self.claim_keyed(subject.to_string(), subject, aspect, value)
    }

    /// Claims `aspect` of a member for `value`. The claim follows the member through renames;
    /// `name` is only used in the error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DependencyConflict`] if the aspect was claimed for a different value.
    pub fn claim_member(
        &mut self,
        member: MemberId,
        name: &str,
        aspect: &'static str,
        value: &str,
    ) -> Result<()> {
        self.claim_keyed(member.to_string(), name, aspect, value)
    }

    fn claim_keyed(
        &mut self,
        subject: String,
        name: &str,
        aspect: &'static str,
        value: &str,
    ) -> Result<()> {
        let key = (subject, aspect);
        match self.claims.get(&key) {
            Some(existing) if existing != value => Err(Error::DependencyConflict {
                member: name.to_string(),
                aspect,
                existing: existing.clone(),
                requested: value.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.claims.insert(key, value.to_string());
                Ok(())
            }
        }
    }

    /// The value `aspect` of `subject` was claimed for, if any.
    #[must_use]
    pub fn claimed(&self, subject: &str, aspect: &'static str) -> Option<&str> {
        self.claims
            .get(&(subject.to_string(), aspect))
            .map(String::as_str)
    }

    /// Number of claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Returns `true` if nothing was claimed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}
