use async_trait::async_trait;
use serde::Deserialize;

use crate::actions::ActionHandler;
use crate::error::RunnerError;
use crate::outcome::{DelayModifier, RunOutcome};

/// Longest accepted delay, about a century.
const MAX_HOURS: f64 = 876_000.0;

#[derive(Debug, Deserialize)]
struct DelayConfig {
  hours: f64,
}

/// Produces no side effect. Shifts the next task forward by `hours`.
#[derive(Debug, Clone, Default)]
pub struct DelayAction;

#[async_trait]
impl ActionHandler for DelayAction {
  async fn run(
    &self,
    _payload: &serde_json::Value,
    config: &serde_json::Value,
  ) -> Result<RunOutcome, RunnerError> {
    let config: DelayConfig = serde_json::from_value(config.clone())
      .map_err(|e| RunnerError::invalid_config("delay", e.to_string()))?;

    if !config.hours.is_finite() || config.hours < 0.0 {
      return Err(RunnerError::invalid_config(
        "delay",
        format!("hours must be a non-negative number, got {}", config.hours),
      ));
    }

    if config.hours > MAX_HOURS {
      return Err(RunnerError::invalid_config(
        "delay",
        format!("hours must be at most {}, got {}", MAX_HOURS, config.hours),
      ));
    }

    Ok(RunOutcome {
      result: None,
      pos: None,
      modifier: Some(DelayModifier::hours(config.hours)),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[tokio::test]
  async fn test_delay_returns_modifier_only() {
    let outcome = DelayAction.run(&json!({}), &json!({ "hours": 24 })).await.unwrap();
    assert_eq!(outcome.modifier, Some(DelayModifier::hours(24.0)));
    assert_eq!(outcome.result, None);
    assert_eq!(outcome.pos, None);
  }

  #[tokio::test]
  async fn test_delay_rejects_bad_config() {
    assert!(DelayAction.run(&json!({}), &json!({})).await.is_err());
    assert!(
      DelayAction
        .run(&json!({}), &json!({ "hours": -2 }))
        .await
        .is_err()
    );
  }

  #[tokio::test]
  async fn test_delay_rejects_hours_past_max() {
    let err = DelayAction
      .run(&json!({}), &json!({ "hours": 1e12 }))
      .await
      .unwrap_err();
    assert!(err.to_string().contains("at most"));

    let outcome = DelayAction
      .run(&json!({}), &json!({ "hours": MAX_HOURS }))
      .await
      .unwrap();
    assert_eq!(outcome.modifier, Some(DelayModifier::hours(MAX_HOURS)));
  }
}
