//! Runner output types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shift applied to the trigger time of the next entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayModifier {
  /// Delay in hours.
  pub trigger_delay: f64,
}

impl DelayModifier {
  pub fn hours(hours: f64) -> Self {
    Self {
      trigger_delay: hours,
    }
  }

  pub fn as_duration(&self) -> Duration {
    Duration::try_from_secs_f64(self.trigger_delay.max(0.0) * 3600.0).unwrap_or(Duration::MAX)
  }
}

/// What a handler reports back to the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
  /// Opaque handler output, persisted as the entry's result.
  pub result: Option<serde_json::Value>,
  /// Branch label used to pick a conditional child.
  pub pos: Option<String>,
  /// Delay applied to the next entry.
  pub modifier: Option<DelayModifier>,
}

impl RunOutcome {
  pub fn with_result(result: serde_json::Value) -> Self {
    Self {
      result: Some(result),
      ..Self::default()
    }
  }

  pub fn branch(mut self, pos: Option<String>) -> Self {
    self.pos = pos;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_delay_duration() {
    assert_eq!(DelayModifier::hours(2.0).as_duration(), Duration::from_secs(7200));
    assert_eq!(DelayModifier::hours(0.5).as_duration(), Duration::from_secs(1800));
    assert_eq!(DelayModifier::hours(-1.0).as_duration(), Duration::ZERO);
  }

  #[test]
  fn test_outcome_wire_shape() {
    let outcome = RunOutcome {
      result: None,
      pos: Some("left".to_string()),
      modifier: Some(DelayModifier::hours(3.0)),
    };
    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value["pos"], "left");
    assert_eq!(value["modifier"]["trigger_delay"], 3.0);
    assert!(value["result"].is_null());
  }
}
