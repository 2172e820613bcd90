use serde::{Deserialize, Serialize};

/// Orchestrator tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Read-apply-write attempts before a conflicting action gives up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl ServiceConfig {
    /// Configured attempts, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
