use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::actions::ActionHandler;
use crate::error::RunnerError;
use crate::outcome::RunOutcome;
use crate::template::render;

/// Delivery channel for a templated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
  Email,
  Sms,
  Whatsapp,
}

impl Channel {
  /// Payload field used as the recipient when the config names none.
  fn default_recipient(&self) -> &'static str {
    match self {
      Channel::Email => "{{ user_email }}",
      Channel::Sms | Channel::Whatsapp => "{{ user_contact }}",
    }
  }
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
  pub channel: Channel,
  pub to: String,
  pub subject: Option<String>,
  pub body: String,
}

/// Delivery failure reported by a [`MessageSender`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DeliveryError(pub String);

/// Mail, SMS and WhatsApp delivery collaborator.
#[async_trait]
pub trait MessageSender: Send + Sync {
  async fn send(&self, message: &Message) -> Result<(), DeliveryError>;
}

/// Sender that only records the message in the log.
#[derive(Debug, Clone, Default)]
pub struct LogSender;

#[async_trait]
impl MessageSender for LogSender {
  async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
    info!(
      channel = ?message.channel,
      to = %message.to,
      subject = ?message.subject,
      "message dispatched"
    );
    Ok(())
  }
}

#[derive(Debug, Deserialize)]
struct MessageConfig {
  channel: Channel,
  #[serde(default)]
  to: Option<String>,
  #[serde(default)]
  subject: Option<String>,
  body: String,
  /// Branch label reported when delivery succeeds.
  #[serde(default)]
  on_delivered: Option<String>,
  /// Branch label reported when delivery fails.
  #[serde(default)]
  on_failed: Option<String>,
}

/// Renders a message against the payload and hands it to a sender.
///
/// Delivery failures are folded into the result rather than raised.
#[derive(Clone)]
pub struct MessageAction {
  sender: Arc<dyn MessageSender>,
}

impl MessageAction {
  pub fn new(sender: Arc<dyn MessageSender>) -> Self {
    Self { sender }
  }
}

#[async_trait]
impl ActionHandler for MessageAction {
  async fn run(
    &self,
    payload: &serde_json::Value,
    config: &serde_json::Value,
  ) -> Result<RunOutcome, RunnerError> {
    let config: MessageConfig = serde_json::from_value(config.clone())
      .map_err(|e| RunnerError::invalid_config("send-message", e.to_string()))?;

    let to_template = config
      .to
      .as_deref()
      .unwrap_or(config.channel.default_recipient());
    let message = Message {
      channel: config.channel,
      to: render("to", to_template, payload)?.trim().to_string(),
      subject: config
        .subject
        .as_deref()
        .map(|s| render("subject", s, payload))
        .transpose()?,
      body: render("body", &config.body, payload)?,
    };

    let delivery = if message.to.is_empty() {
      Err(DeliveryError("no recipient".to_string()))
    } else {
      self.sender.send(&message).await
    };

    let (delivered, error, pos) = match delivery {
      Ok(()) => (true, None, config.on_delivered),
      Err(e) => (false, Some(e.to_string()), config.on_failed),
    };

    Ok(
      RunOutcome::with_result(serde_json::json!({
        "channel": message.channel,
        "to": message.to,
        "delivered": delivered,
        "error": error,
      }))
      .branch(pos),
    )
  }
}
