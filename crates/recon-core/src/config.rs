use serde::{Deserialize, Serialize};

use crate::geometry::Tolerances;

/// How a node keeps track of the entities it produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    /// Reuse in place when possible, recreate otherwise.
    #[default]
    Reconstruct,
    /// Always create a new entity and delete the previous one.
    Supersede,
    /// Create a new entity every evaluation and track nothing.
    Disabled,
}

/// What a document failure inside a node transaction does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Warn, leave the slot empty and still commit the node.
    Continue,
    /// Roll back the node and carry on with the pass.
    #[default]
    AbortNode,
    /// Roll back the node and skip the rest of the pass.
    AbortPass,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub failure_policy: FailurePolicy,
    pub default_tracking: TrackingMode,
    pub tolerances: Tolerances,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.failure_policy, FailurePolicy::AbortNode);
        assert_eq!(config.default_tracking, TrackingMode::Reconstruct);
        assert_eq!(config.tolerances, Tolerances::default());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"failure_policy":"abort_pass","tolerances":{"vertex":0.01}}"#)
                .unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::AbortPass);
        assert_eq!(config.default_tracking, TrackingMode::Reconstruct);
        assert_eq!(config.tolerances.vertex, 0.01);
        assert_eq!(config.tolerances.short_curve, 0.00256);
    }
}
