//! Outcome of a successful patch run.

use std::fmt;

/// One rule application on one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedRule {
    /// Rule name
    pub rule: String,
    /// Qualified name of the annotated member
    pub member: String,
    /// Qualified name of the method whose body was edited, when it differs from `member`
    /// (state-machine redirection)
    pub redirected_to: Option<String>,
}

/// Statistics and log of a successful patch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Applied per-member rules, in dispatch order
    pub applied: Vec<AppliedRule>,
    /// Module passes that ran, with whether they changed the module
    pub module_passes: Vec<(String, bool)>,
    /// Bodies finalized after an IL rule
    pub bodies_finalized: usize,
    /// Short branches widened during finalization
    pub branches_widened: usize,
}

impl PatchReport {
    /// Number of per-member rules applied.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.applied.len()
    }

    /// Returns `true` if any per-member rule ran or any module pass changed the module.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.applied.is_empty() || self.module_passes.iter().any(|(_, changed)| *changed)
    }

    /// Applications of the named rule.
    pub fn applications_of<'a>(&'a self, rule: &'a str) -> impl Iterator<Item = &'a AppliedRule> {
        self.applied.iter().filter(move |applied| applied.rule == rule)
    }
}

impl fmt::Display for PatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Patch Report")?;
        writeln!(f, "============")?;
        writeln!(f, "Rules applied:     {}", self.applied.len())?;
        writeln!(f, "Bodies finalized:  {}", self.bodies_finalized)?;
        writeln!(f, "Branches widened:  {}", self.branches_widened)?;
        for applied in &self.applied {
            match &applied.redirected_to {
                Some(target) => writeln!(
                    f,
                    "  {} on {} (via {})",
                    applied.rule, applied.member, target
                )?,
                None => writeln!(f, "  {} on {}", applied.rule, applied.member)?,
            }
        }
        for (pass, changed) in &self.module_passes {
            let state = if *changed { "changed" } else { "unchanged" };
            writeln!(f, "  module pass {pass}: {state}")?;
        }
        Ok(())
    }
}
