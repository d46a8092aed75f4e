//! Runner error types.

/// Errors raised by an action handler. Any of these marks the entry failed.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
  /// The task's config does not fit its action.
  #[error("invalid config for '{action}': {message}")]
  InvalidConfig { action: String, message: String },

  /// A template in the task's config failed to render.
  #[error("template rendering failed for '{field}': {message}")]
  Template { field: String, message: String },

  /// The HTTP client could not be built.
  #[error("failed to build http client: {message}")]
  Client { message: String },

  /// An outbound request failed before a response arrived.
  #[error("http request failed: {0}")]
  Http(#[from] reqwest::Error),
}

impl RunnerError {
  pub(crate) fn invalid_config(action: &str, message: impl Into<String>) -> Self {
    RunnerError::InvalidConfig {
      action: action.to_string(),
      message: message.into(),
    }
  }
}
