use thiserror::Error;

/// Definition errors: raised before any queue entry is created.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
  #[error("task not found: {0}")]
  TaskNotFound(String),

  #[error("task '{task_id}' references unknown parent '{parent_id}'")]
  UnknownParent { task_id: String, parent_id: String },

  #[error("task '{task_id}' belongs to workflow '{workflow_id}'")]
  CrossWorkflowTask {
    task_id: String,
    workflow_id: String,
  },

  #[error("task submitted more than once: {0}")]
  DuplicateTask(String),

  #[error("task tree contains a cycle through '{0}'")]
  Cycle(String),
}
