//! Configuration for the patch dispatcher.

pub use crate::metadata::method::BranchFormPolicy;

/// Configuration for a patch run.
///
/// Controls how IL-scoped rules are routed and how edited bodies are finalized.
#[derive(Debug, Clone)]
pub struct PatchConfig {
    /// Route IL rules on iterator/async methods to the state machine's `MoveNext`
    /// (default: true).
    pub follow_state_machines: bool,

    /// Branch form policy applied when a body is finalized (default: `Fit`).
    pub branch_policy: BranchFormPolicy,

    /// Validate and finalize every body an IL rule edited (default: true).
    pub finalize_bodies: bool,

    /// Remove patch requests from their member once the rule succeeded (default: true).
    pub consume_requests: bool,

    /// Maximum passes of branch form fitting per body (default: 16).
    pub max_fixup_iterations: usize,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            follow_state_machines: true,
            branch_policy: BranchFormPolicy::Fit,
            finalize_bodies: true,
            consume_requests: true,
            max_fixup_iterations: 16,
        }
    }
}

impl PatchConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that rewrites every short branch to its long form, the way
    /// the classic short/long normalization does.
    #[must_use]
    pub fn widen_branches() -> Self {
        Self {
            branch_policy: BranchFormPolicy::Widen,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PatchConfig::new();
        assert!(config.follow_state_machines);
        assert!(config.finalize_bodies);
        assert!(config.consume_requests);
        assert_eq!(config.branch_policy, BranchFormPolicy::Fit);
        assert_eq!(config.max_fixup_iterations, 16);

        assert_eq!(
            PatchConfig::widen_branches().branch_policy,
            BranchFormPolicy::Widen
        );
    }
}
