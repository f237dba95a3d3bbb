//! Engine configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Dialog engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Idle seconds after which a conversation restarts; unset disables
    /// expiry
    pub expire_after_secs: Option<u64>,

    /// Rust log filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl EngineConfig {
    /// Validate engine configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.expire_after_secs == Some(0) {
            return Err(ValidationError::InvalidExpiryWindow);
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            expire_after_secs: None,
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
