//! RPC manager configuration with validation.

use crate::domain::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Configuration of one [`RpcManager`](crate::RpcManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Group that authorizes every caller when a function allows it.
    pub wildcard_group: String,
    /// Allowed groups of methods whose descriptor names none.
    pub default_allowed_groups: Vec<String>,
    /// Maximum number of inbound calls executing at once.
    pub max_concurrent_calls: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            wildcard_group: "all".to_string(),
            default_allowed_groups: vec!["all".to_string()],
            max_concurrent_calls: 1024,
        }
    }
}

impl RpcConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wildcard_group.is_empty() {
            return Err(ConfigError::EmptyWildcard);
        }
        if self.max_concurrent_calls == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }

    /// Configuration under which functions without explicit groups are closed.
    #[must_use]
    pub fn closed_by_default() -> Self {
        Self {
            default_allowed_groups: Vec::new(),
            ..Self::default()
        }
    }
}
