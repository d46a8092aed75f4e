use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the built-in handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
  /// Upper bound on a single outbound HTTP call.
  #[serde(with = "trellis_workflow::duration_secs")]
  pub http_timeout: Duration,
  pub user_agent: String,
}

impl Default for RunnerConfig {
  fn default() -> Self {
    Self {
      http_timeout: Duration::from_secs(30),
      user_agent: concat!("trellis/", env!("CARGO_PKG_VERSION")).to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = RunnerConfig::default();
    assert_eq!(config.http_timeout, Duration::from_secs(30));
    assert!(config.user_agent.starts_with("trellis/"));
  }

  #[test]
  fn test_partial_deserialize() {
    let config: RunnerConfig = serde_json::from_str(r#"{ "http_timeout": 5 }"#).unwrap();
    assert_eq!(config.http_timeout, Duration::from_secs(5));
    assert_eq!(config.user_agent, RunnerConfig::default().user_agent);
  }
}
