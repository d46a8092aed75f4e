use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Poller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Time between poll ticks, in seconds when deserialized.
  #[serde(with = "trellis_workflow::duration_secs")]
  pub poll_interval: Duration,
  /// Upper bound on entries run in one tick.
  pub max_entries_per_tick: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      poll_interval: Duration::from_secs(60),
      max_entries_per_tick: 100,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_fill_missing_fields() {
    let config: EngineConfig = serde_json::from_str(r#"{ "max_entries_per_tick": 5 }"#).unwrap();
    assert_eq!(config.poll_interval, Duration::from_secs(60));
    assert_eq!(config.max_entries_per_tick, 5);
  }
}
