//! Action registry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument, warn};
use trellis_workflow::Action;

use crate::actions::{
  ActionHandler, DelayAction, HttpAction, MessageAction, MessageSender, NoopAction,
};
use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::outcome::RunOutcome;

/// Maps action tags to handlers.
///
/// Tags without a handler run as a no-op so a workflow containing an
/// action this build does not know still advances.
#[derive(Clone, Default)]
pub struct TaskRunner {
  handlers: HashMap<Action, Arc<dyn ActionHandler>>,
}

impl TaskRunner {
  /// An empty registry. Every action runs as a no-op.
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry with `delay`, `call-external-api` and `send-message`.
  pub fn with_defaults(
    config: &RunnerConfig,
    sender: Arc<dyn MessageSender>,
  ) -> Result<Self, RunnerError> {
    let client = reqwest::Client::builder()
      .timeout(config.http_timeout)
      .user_agent(config.user_agent.clone())
      .build()
      .map_err(|e| RunnerError::Client {
        message: e.to_string(),
      })?;

    Ok(
      Self::new()
        .register(Action::Delay, Arc::new(DelayAction))
        .register(Action::CallExternalApi, Arc::new(HttpAction::new(client)))
        .register(Action::SendMessage, Arc::new(MessageAction::new(sender))),
    )
  }

  /// Register a handler, replacing any existing one for the tag.
  pub fn register(mut self, action: Action, handler: Arc<dyn ActionHandler>) -> Self {
    self.handlers.insert(action, handler);
    self
  }

  pub fn handles(&self, action: &Action) -> bool {
    self.handlers.contains_key(action)
  }

  #[instrument(skip(self, payload, config), fields(action = %action))]
  pub async fn run(
    &self,
    action: &Action,
    payload: &serde_json::Value,
    config: &serde_json::Value,
  ) -> Result<RunOutcome, RunnerError> {
    match self.handlers.get(action) {
      Some(handler) => {
        debug!("running action handler");
        handler.run(payload, config).await
      }
      None => {
        warn!("no handler registered, treating as no-op");
        NoopAction.run(payload, config).await
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::actions::LogSender;
  use crate::outcome::DelayModifier;
  use async_trait::async_trait;
  use serde_json::json;

  struct Fixed(&'static str);

  #[async_trait]
  impl ActionHandler for Fixed {
    async fn run(
      &self,
      _payload: &serde_json::Value,
      _config: &serde_json::Value,
    ) -> Result<RunOutcome, RunnerError> {
      Ok(RunOutcome::default().branch(Some(self.0.to_string())))
    }
  }

  #[tokio::test]
  async fn test_unknown_action_is_noop() {
    let runner = TaskRunner::new();
    let outcome = runner
      .run(&Action::from("webhook"), &json!({}), &json!({}))
      .await
      .unwrap();
    assert_eq!(outcome, RunOutcome::default());
  }

  #[tokio::test]
  async fn test_defaults_are_registered() {
    let runner = TaskRunner::with_defaults(&RunnerConfig::default(), Arc::new(LogSender)).unwrap();
    assert!(runner.handles(&Action::Delay));
    assert!(runner.handles(&Action::CallExternalApi));
    assert!(runner.handles(&Action::SendMessage));

    let outcome = runner
      .run(&Action::Delay, &json!({}), &json!({ "hours": 1.5 }))
      .await
      .unwrap();
    assert_eq!(outcome.modifier, Some(DelayModifier::hours(1.5)));
  }

  #[tokio::test]
  async fn test_register_overrides() {
    let runner = TaskRunner::with_defaults(&RunnerConfig::default(), Arc::new(LogSender))
      .unwrap()
      .register(Action::Delay, Arc::new(Fixed("left")));

    let outcome = runner.run(&Action::Delay, &json!({}), &json!({})).await.unwrap();
    assert_eq!(outcome.pos.as_deref(), Some("left"));
    assert_eq!(outcome.modifier, None);
  }
}
