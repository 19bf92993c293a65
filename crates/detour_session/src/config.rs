//! Diversion configuration.

use detour_core::TickBudget;
use detour_policy::PolicyConfig;
use serde::{Deserialize, Serialize};

/// Diversion session configuration
///
/// Every step marks the preload library as diverted and locks the syscall
/// buffer; neither is configurable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiversionConfig {
    /// Syscall policy
    pub policy: PolicyConfig,
    /// Tick budget for each resume
    pub tick_budget: TickBudget,
}

impl DiversionConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the policy config
    #[must_use]
    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    /// Set the tick budget
    #[must_use]
    pub fn with_tick_budget(mut self, budget: TickBudget) -> Self {
        self.tick_budget = budget;
        self
    }

    /// Load a config from JSON; missing fields take their defaults
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or names an unknown field
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
