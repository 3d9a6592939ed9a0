use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Correlation protocol settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Wait applied by `send_with_default_timeout`, in milliseconds.
    pub default_timeout_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5_000,
        }
    }
}

impl ProtocolConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_five_seconds() {
        assert_eq!(ProtocolConfig::default().default_timeout(), Duration::from_secs(5));
        let config: ProtocolConfig =
            serde_json::from_str(r#"{"default_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.default_timeout(), Duration::from_millis(250));
    }
}
