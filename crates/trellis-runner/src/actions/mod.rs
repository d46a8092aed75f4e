//! Built-in action handlers.

mod delay;
mod http;
mod message;

use async_trait::async_trait;

use crate::error::RunnerError;
use crate::outcome::RunOutcome;

pub use delay::DelayAction;
pub use http::HttpAction;
pub use message::{Channel, DeliveryError, LogSender, Message, MessageAction, MessageSender};

/// Executes one task against an entry payload.
///
/// Handlers never see the queue. They report a result, an optional branch
/// label and an optional delay, and the dispatcher persists and routes.
#[async_trait]
pub trait ActionHandler: Send + Sync {
  async fn run(
    &self,
    payload: &serde_json::Value,
    config: &serde_json::Value,
  ) -> Result<RunOutcome, RunnerError>;
}

/// Handler for action tags with no registered implementation.
#[derive(Debug, Clone, Default)]
pub struct NoopAction;

#[async_trait]
impl ActionHandler for NoopAction {
  async fn run(
    &self,
    _payload: &serde_json::Value,
    _config: &serde_json::Value,
  ) -> Result<RunOutcome, RunnerError> {
    Ok(RunOutcome::default())
  }
}
