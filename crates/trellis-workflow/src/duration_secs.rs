//! Serde adapter for a [`Duration`] stored as whole seconds.
//!
//! ```ignore
//! #[serde(with = "trellis_workflow::duration_secs")]
//! pub poll_interval: Duration,
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
  s.serialize_u64(d.as_secs())
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
  u64::deserialize(d).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
  use serde::{Deserialize, Serialize};

  use super::*;

  #[derive(Debug, PartialEq, Serialize, Deserialize)]
  struct Timeout {
    #[serde(with = "crate::duration_secs")]
    after: Duration,
  }

  #[test]
  fn test_whole_seconds() {
    let parsed: Timeout = serde_json::from_str(r#"{ "after": 90 }"#).unwrap();
    assert_eq!(parsed.after, Duration::from_secs(90));

    let truncated = Timeout {
      after: Duration::from_millis(2500),
    };
    assert_eq!(serde_json::to_string(&truncated).unwrap(), r#"{"after":2}"#);
  }

  #[test]
  fn test_rejects_negative() {
    assert!(serde_json::from_str::<Timeout>(r#"{ "after": -1 }"#).is_err());
  }
}
