use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use tracing::debug;

use crate::actions::ActionHandler;
use crate::error::RunnerError;
use crate::outcome::RunOutcome;
use crate::template::{render, render_value};

/// Expected config for `call-external-api` tasks.
#[derive(Debug, Deserialize)]
struct HttpConfig {
  #[serde(default = "default_method")]
  method: String,
  url: String,
  #[serde(default)]
  headers: HashMap<String, String>,
  #[serde(default)]
  body: Option<serde_json::Value>,
  /// Branch label reported for a 2xx response.
  #[serde(default)]
  on_success: Option<String>,
  /// Branch label reported for any other status.
  #[serde(default)]
  on_failure: Option<String>,
}

fn default_method() -> String {
  "POST".to_string()
}

/// Calls an outside HTTP endpoint with templated url, headers and body.
///
/// The client carries the runner's timeout, so a hung endpoint surfaces
/// as a failure instead of stalling the dispatcher.
#[derive(Debug, Clone)]
pub struct HttpAction {
  client: Client,
}

impl HttpAction {
  pub fn new(client: Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl ActionHandler for HttpAction {
  async fn run(
    &self,
    payload: &serde_json::Value,
    config: &serde_json::Value,
  ) -> Result<RunOutcome, RunnerError> {
    let config: HttpConfig = serde_json::from_value(config.clone())
      .map_err(|e| RunnerError::invalid_config("call-external-api", e.to_string()))?;

    let method = parse_method(&config.method)?;
    let url = render("url", &config.url, payload)?;

    let mut request = self.client.request(method, &url);
    for (key, value) in &config.headers {
      request = request.header(key, render("headers", value, payload)?);
    }
    if let Some(body) = &config.body {
      request = request.json(&render_value("body", body, payload)?);
    }

    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;

    debug!(url = %url, status = status.as_u16(), "external api responded");

    // Try to parse body as JSON, fall back to string
    let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

    let pos = if status.is_success() {
      config.on_success
    } else {
      config.on_failure
    };

    Ok(
      RunOutcome::with_result(serde_json::json!({
        "url": url,
        "status": status.as_u16(),
        "body": body,
      }))
      .branch(pos),
    )
  }
}

fn parse_method(method: &str) -> Result<Method, RunnerError> {
  match method.to_uppercase().as_str() {
    "GET" => Ok(Method::GET),
    "POST" => Ok(Method::POST),
    "PUT" => Ok(Method::PUT),
    "DELETE" => Ok(Method::DELETE),
    "PATCH" => Ok(Method::PATCH),
    _ => Err(RunnerError::invalid_config(
      "call-external-api",
      format!("unsupported HTTP method: {}", method),
    )),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse_method() {
    assert_eq!(parse_method("get").unwrap(), Method::GET);
    assert_eq!(parse_method("Patch").unwrap(), Method::PATCH);
    assert!(parse_method("BREW").is_err());
  }

  #[tokio::test]
  async fn test_missing_url_is_config_error() {
    let action = HttpAction::new(Client::new());
    let err = action.run(&json!({}), &json!({ "method": "GET" })).await.unwrap_err();
    assert!(matches!(err, RunnerError::InvalidConfig { .. }));
  }

  #[tokio::test]
  async fn test_unreachable_endpoint_is_runner_failure() {
    let action = HttpAction::new(Client::new());
    let err = action
      .run(
        &json!({ "enrolment_id": "e1" }),
        &json!({ "method": "GET", "url": "http://127.0.0.1:9/hooks/{{ enrolment_id }}" }),
      )
      .await
      .unwrap_err();
    assert!(matches!(err, RunnerError::Http(_)));
  }
}
