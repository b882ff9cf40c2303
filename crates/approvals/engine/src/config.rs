//! Engine configuration.

use crate::delegation::DelegationOverlapPolicy;
use approvals_types::FallbackThresholds;
use serde::{Deserialize, Serialize};

/// Configuration for the routing coordinator.
///
/// Hosts load this from their configuration surface; the engine only
/// consumes it. With `use_custom_workflows` off, every organisation routes
/// through the fallback thresholds.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct RoutingConfig {
    /// Thresholds used when no custom workflow applies
    pub fallback: FallbackThresholds,
    /// Whether to consult the workflow store for custom step definitions
    pub use_custom_workflows: bool,
    /// How delegation creation treats overlapping grants
    pub overlap_policy: DelegationOverlapPolicy,
}

impl RoutingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, fallback: FallbackThresholds) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_custom_workflows(mut self, enabled: bool) -> Self {
        self.use_custom_workflows = enabled;
        self
    }

    pub fn with_overlap_policy(mut self, policy: DelegationOverlapPolicy) -> Self {
        self.overlap_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approvals_types::Amount;

    #[test]
    fn test_config_round_trips_through_json() {
        let config = RoutingConfig::new()
            .with_fallback(
                FallbackThresholds::new()
                    .with_auto_approve_below(Amount::new(5_000))
                    .with_ceo_above(Amount::new(15_000)),
            )
            .with_custom_workflows(true)
            .with_overlap_policy(DelegationOverlapPolicy::RejectOverlap);

        let json = serde_json::to_string(&config).unwrap();
        let back: RoutingConfig = serde_json::from_str(&json).unwrap();
        assert!(back.use_custom_workflows);
        assert_eq!(back.overlap_policy, DelegationOverlapPolicy::RejectOverlap);
        assert_eq!(back.fallback.auto_approve_below, Some(Amount::new(5_000)));
    }
}
