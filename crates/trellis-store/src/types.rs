use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use trellis_workflow::{Action, TaskNode};

/// Status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum QueueStatus {
  Pending,
  Completed,
  Failed,
  Skipped,
}

/// One scheduled or executed occurrence of a task, as stored in the database.
///
/// The task's action, config and parent are copied at creation time so
/// later edits to the definition never reach entries already in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct QueueEntry {
  pub id: String,
  pub task_id: String,
  /// Definition parent of the task.
  pub task_parent_id: Option<String>,
  /// Runtime predecessor that spawned this entry.
  pub parent_queue_id: Option<String>,
  pub grand_parent_queue_id: Option<String>,
  pub task_action: String,
  /// Branch label of the task.
  pub task_pos: Option<String>,
  /// Business payload carried unchanged through the whole run.
  pub task_data: Json<serde_json::Value>,
  pub task_config: Json<serde_json::Value>,
  pub workflow_id: String,
  pub status: QueueStatus,
  pub result_obj: Option<Json<serde_json::Value>>,
  pub error_message: Option<String>,
  pub retry_count: i32,
  /// Earliest time the entry may run.
  pub trigger_at: DateTime<Utc>,
  /// When the entry actually ran. `None` until it is picked up.
  pub execute_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
}

impl QueueEntry {
  /// Materialize a pending entry for `task`.
  pub fn pending(
    id: String,
    task: &TaskNode,
    payload: serde_json::Value,
    parent: Option<&QueueEntry>,
    trigger_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
  ) -> Self {
    Self {
      id,
      task_id: task.task_id.clone(),
      task_parent_id: task.parent_id.clone(),
      parent_queue_id: parent.map(|p| p.id.clone()),
      grand_parent_queue_id: parent.and_then(|p| p.parent_queue_id.clone()),
      task_action: task.action.to_string(),
      task_pos: task.branch_label.clone(),
      task_data: Json(payload),
      task_config: Json(task.config.clone()),
      workflow_id: task.workflow_id.clone(),
      status: QueueStatus::Pending,
      result_obj: None,
      error_message: None,
      retry_count: 0,
      trigger_at,
      execute_at: None,
      created_at,
    }
  }

  pub fn action(&self) -> Action {
    Action::from(self.task_action.as_str())
  }

  pub fn payload(&self) -> &serde_json::Value {
    &self.task_data.0
  }
}

/// Terminal write for a queue entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryOutcome {
  pub status: QueueStatus,
  pub result: Option<serde_json::Value>,
  pub error_message: Option<String>,
}

impl EntryOutcome {
  pub fn completed(result: Option<serde_json::Value>) -> Self {
    Self {
      status: QueueStatus::Completed,
      result,
      error_message: None,
    }
  }

  pub fn failed(message: impl Into<String>) -> Self {
    Self {
      status: QueueStatus::Failed,
      result: None,
      error_message: Some(message.into()),
    }
  }

  pub fn skipped(reason: impl Into<String>) -> Self {
    Self {
      status: QueueStatus::Skipped,
      result: None,
      error_message: Some(reason.into()),
    }
  }
}

/// Read-only view of an enrolment joined with its campaign and user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Enrolment {
  pub enrolment_id: String,
  pub status: String,
  pub campaign_id: String,
  pub campaign_name: String,
  pub user_id: String,
  pub user_name: String,
  pub user_email: Option<String>,
  pub user_contact: Option<String>,
}

impl Enrolment {
  pub fn is_rejected(&self) -> bool {
    self.status.eq_ignore_ascii_case("rejected")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn task() -> TaskNode {
    TaskNode {
      task_id: "t1".to_string(),
      workflow_id: "wf".to_string(),
      action: Action::Delay,
      config: json!({ "hours": 3 }),
      parent_id: Some("t0".to_string()),
      branch_label: Some("left".to_string()),
    }
  }

  #[test]
  fn test_pending_copies_task_and_lineage() {
    let now = Utc::now();
    let root = QueueEntry::pending("q1".to_string(), &task(), json!({}), None, now, now);
    let child = QueueEntry::pending(
      "q2".to_string(),
      &task(),
      json!({ "enrolment_id": "e1" }),
      Some(&root),
      now,
      now,
    );
    let grandchild = QueueEntry::pending("q3".to_string(), &task(), json!({}), Some(&child), now, now);

    assert_eq!(root.parent_queue_id, None);
    assert_eq!(child.parent_queue_id.as_deref(), Some("q1"));
    assert_eq!(child.grand_parent_queue_id, None);
    assert_eq!(grandchild.grand_parent_queue_id.as_deref(), Some("q1"));

    assert_eq!(child.task_action, "delay");
    assert_eq!(child.task_pos.as_deref(), Some("left"));
    assert_eq!(child.task_parent_id.as_deref(), Some("t0"));
    assert_eq!(child.status, QueueStatus::Pending);
    assert_eq!(child.execute_at, None);
    assert_eq!(child.payload()["enrolment_id"], "e1");
    assert_eq!(child.task_config.0, task().config);
  }

  #[test]
  fn test_rejected_enrolment() {
    let enrolment = Enrolment {
      enrolment_id: "e1".to_string(),
      status: "Rejected".to_string(),
      campaign_id: "c1".to_string(),
      campaign_name: "Spring".to_string(),
      user_id: "u1".to_string(),
      user_name: "Sam".to_string(),
      user_email: None,
      user_contact: None,
    };
    assert!(enrolment.is_rejected());
  }
}
