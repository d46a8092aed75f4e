//! Template rendering for task config values.
//!
//! String values in a task's config may contain minijinja templates that
//! are rendered against the entry payload:
//!
//! ```json
//! { "to": "{{ user_email }}", "body": "Hi {{ user_name | title }}, welcome to {{ campaign_name }}" }
//! ```
//!
//! Unknown variables render as empty strings.

use minijinja::{Environment, Value};

use crate::error::RunnerError;

/// Render a single template string against the payload.
pub fn render(field: &str, template: &str, payload: &serde_json::Value) -> Result<String, RunnerError> {
  let env = Environment::new();
  let ctx = Value::from_serialize(payload);
  env
    .render_str(template, ctx)
    .map_err(|e| RunnerError::Template {
      field: field.to_string(),
      message: e.to_string(),
    })
}

/// Render every string leaf of a JSON value, leaving other values untouched.
pub fn render_value(
  field: &str,
  value: &serde_json::Value,
  payload: &serde_json::Value,
) -> Result<serde_json::Value, RunnerError> {
  match value {
    serde_json::Value::String(s) => Ok(serde_json::Value::String(render(field, s, payload)?)),
    serde_json::Value::Array(items) => items
      .iter()
      .map(|item| render_value(field, item, payload))
      .collect::<Result<Vec<_>, _>>()
      .map(serde_json::Value::Array),
    serde_json::Value::Object(map) => {
      let mut rendered = serde_json::Map::with_capacity(map.len());
      for (key, item) in map {
        rendered.insert(key.clone(), render_value(field, item, payload)?);
      }
      Ok(serde_json::Value::Object(rendered))
    }
    other => Ok(other.clone()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_render_against_payload() {
    let payload = json!({ "user_name": "ada lovelace", "campaign_name": "Spring" });
    let out = render("body", "Hi {{ user_name | title }} ({{ campaign_name }})", &payload).unwrap();
    assert_eq!(out, "Hi Ada Lovelace (Spring)");
  }

  #[test]
  fn test_missing_variable_renders_empty() {
    let out = render("to", "[{{ user_email }}]", &json!({})).unwrap();
    assert_eq!(out, "[]");
  }

  #[test]
  fn test_syntax_error() {
    let err = render("body", "{{ unclosed", &json!({})).unwrap_err();
    assert!(matches!(err, RunnerError::Template { field, .. } if field == "body"));
  }

  #[test]
  fn test_render_value_nested() {
    let payload = json!({ "enrolment_id": "e1" });
    let body = json!({ "id": "{{ enrolment_id }}", "tags": ["x-{{ enrolment_id }}"], "n": 3 });
    let out = render_value("body", &body, &payload).unwrap();
    assert_eq!(out, json!({ "id": "e1", "tags": ["x-e1"], "n": 3 }));
  }
}
