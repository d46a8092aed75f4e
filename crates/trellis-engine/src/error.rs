//! Engine error types.

use trellis_workflow::WorkflowError;

/// A manual trigger that cannot fire. Reported to the caller as a
/// validation failure; no queue entries are created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
  #[error("workflow has no tasks")]
  NoTasks,

  #[error("campaign has no eligible enrolments")]
  NoEnrolments,

  #[error("campaign binding is disabled")]
  BindingDisabled,

  #[error("campaign has no bound workflow")]
  NotBound,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  #[error("store error: {0}")]
  Store(#[from] trellis_store::Error),

  /// The task tree is invalid.
  #[error("workflow error: {0}")]
  Workflow(#[from] WorkflowError),

  #[error("precondition failed: {0}")]
  Precondition(#[from] PreconditionError),

  /// An action handler failed. The entry has been marked failed.
  #[error("task failed on entry {entry_id}: {message}")]
  TaskFailed { entry_id: String, message: String },
}
