//! Coordinator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default debounce window in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Quiet period after the last matching change before a live query re-runs.
    #[serde(rename = "debounce_ms", with = "millis")]
    pub debounce: Duration,
}

impl CoordinatorConfig {
    /// Create a configuration with the default debounce window.
    pub fn new() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }

    /// Set the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the debounce window in milliseconds.
    pub fn with_debounce_ms(self, debounce_ms: u64) -> Self {
        self.with_debounce(Duration::from_millis(debounce_ms))
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Serde helpers for a `Duration` stored as whole milliseconds.
///
/// Use with `#[serde(with = "livequery_core::config::millis")]`.
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as milliseconds.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    /// Deserialize from milliseconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(DEFAULT_DEBOUNCE_MS));
    }

    #[test]
    fn test_config_builder() {
        let config = CoordinatorConfig::new().with_debounce_ms(50);
        assert_eq!(config.debounce, Duration::from_millis(50));

        let config = config.with_debounce(Duration::ZERO);
        assert_eq!(config.debounce, Duration::ZERO);
    }

    #[test]
    fn test_deserialize_millis() {
        let config: CoordinatorConfig = serde_json::from_str(r#"{"debounce_ms": 75}"#).unwrap();
        assert_eq!(config.debounce, Duration::from_millis(75));

        let config: CoordinatorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CoordinatorConfig::default());

        let json = serde_json::to_string(&CoordinatorConfig::new().with_debounce_ms(10)).unwrap();
        assert_eq!(json, r#"{"debounce_ms":10}"#);
    }
}
