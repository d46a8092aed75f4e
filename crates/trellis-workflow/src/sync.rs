//! Task-tree editing.
//!
//! An edit submits the complete desired tree. Submitted tasks that already
//! belong to the workflow are updated in place, everything else becomes a
//! new node with a freshly minted id, and previously existing tasks missing
//! from the submission are deleted.
//!
//! A submitted id that is unknown to the workflow acts as a client-side key:
//! other submissions may name it as their `parent_task_id` and the reference
//! is rewritten to the minted id.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::task::{Action, TaskNode};
use crate::tree::TaskTree;

/// One node of a submitted task tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSubmission {
  #[serde(default)]
  pub task_id: Option<String>,
  pub action: Action,
  #[serde(default)]
  pub config: serde_json::Value,
  #[serde(default)]
  pub parent_task_id: Option<String>,
  #[serde(default)]
  pub branch_label: Option<String>,
}

/// The writes needed to make a workflow's tree match a submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncPlan {
  pub workflow_id: String,
  /// Every submitted node with its final id, in submission order.
  pub upserts: Vec<TaskNode>,
  /// Ids of the upserts that did not exist before.
  pub created: Vec<String>,
  /// Previously existing tasks absent from the submission.
  pub deletes: Vec<String>,
}

/// Compute the writes for a task-tree edit.
///
/// `previous` is the workflow's current tree. `foreign` maps submitted ids
/// that already exist elsewhere to their owning workflow; any hit is
/// rejected. The resulting tree is validated (parents present, acyclic)
/// before the plan is returned.
pub fn plan_sync(
  workflow_id: &str,
  submitted: &[TaskSubmission],
  previous: &[TaskNode],
  foreign: &HashMap<String, String>,
) -> Result<SyncPlan, WorkflowError> {
  let previous_ids: HashSet<&str> = previous.iter().map(|t| t.task_id.as_str()).collect();

  // submitted key -> final id
  let mut ids: HashMap<&str, String> = HashMap::new();
  let mut final_ids = Vec::with_capacity(submitted.len());
  let mut created = Vec::new();

  for submission in submitted {
    let final_id = match submission.task_id.as_deref() {
      Some(key) => {
        if let Some(owner) = foreign.get(key) {
          return Err(WorkflowError::CrossWorkflowTask {
            task_id: key.to_string(),
            workflow_id: owner.clone(),
          });
        }
        if ids.contains_key(key) {
          return Err(WorkflowError::DuplicateTask(key.to_string()));
        }
        let final_id = if previous_ids.contains(key) {
          key.to_string()
        } else {
          let minted = uuid::Uuid::new_v4().to_string();
          created.push(minted.clone());
          minted
        };
        ids.insert(key, final_id.clone());
        final_id
      }
      None => {
        let minted = uuid::Uuid::new_v4().to_string();
        created.push(minted.clone());
        minted
      }
    };
    final_ids.push(final_id);
  }

  let mut upserts = Vec::with_capacity(submitted.len());
  for (submission, task_id) in submitted.iter().zip(final_ids) {
    let parent_id = match submission.parent_task_id.as_deref() {
      Some(parent_key) => Some(ids.get(parent_key).cloned().ok_or_else(|| {
        WorkflowError::UnknownParent {
          task_id: submission
            .task_id
            .clone()
            .unwrap_or_else(|| task_id.clone()),
          parent_id: parent_key.to_string(),
        }
      })?),
      None => None,
    };

    upserts.push(TaskNode {
      task_id,
      workflow_id: workflow_id.to_string(),
      action: submission.action.clone(),
      config: submission.config.clone(),
      parent_id,
      branch_label: submission.branch_label.clone(),
    });
  }

  let tree = TaskTree::new(upserts);
  tree.validate()?;

  let kept: HashSet<&str> = tree.iter().map(|t| t.task_id.as_str()).collect();
  let deletes = previous
    .iter()
    .filter(|t| !kept.contains(t.task_id.as_str()))
    .map(|t| t.task_id.clone())
    .collect();

  Ok(SyncPlan {
    workflow_id: workflow_id.to_string(),
    upserts: tree.iter().cloned().collect(),
    created,
    deletes,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn existing(id: &str, parent: Option<&str>) -> TaskNode {
    TaskNode {
      task_id: id.to_string(),
      workflow_id: "wf".to_string(),
      action: Action::Delay,
      config: json!({ "hours": 1 }),
      parent_id: parent.map(str::to_string),
      branch_label: None,
    }
  }

  fn submit(id: Option<&str>, parent: Option<&str>, label: Option<&str>) -> TaskSubmission {
    TaskSubmission {
      task_id: id.map(str::to_string),
      action: Action::SendMessage,
      config: json!({}),
      parent_task_id: parent.map(str::to_string),
      branch_label: label.map(str::to_string),
    }
  }

  #[test]
  fn test_updates_keep_ids_and_deletes_missing() {
    let previous = vec![existing("a", None), existing("b", Some("a"))];
    let plan = plan_sync("wf", &[submit(Some("a"), None, None)], &previous, &HashMap::new())
      .unwrap();

    assert_eq!(plan.upserts.len(), 1);
    assert_eq!(plan.upserts[0].task_id, "a");
    assert_eq!(plan.upserts[0].action, Action::SendMessage);
    assert!(plan.created.is_empty());
    assert_eq!(plan.deletes, vec!["b".to_string()]);
  }

  #[test]
  fn test_new_nodes_get_minted_ids_and_parent_keys_are_rewritten() {
    let previous = vec![existing("a", None)];
    let submitted = vec![
      submit(Some("a"), None, None),
      submit(Some("tmp-1"), Some("a"), Some("left")),
      submit(None, Some("tmp-1"), None),
    ];
    let plan = plan_sync("wf", &submitted, &previous, &HashMap::new()).unwrap();

    assert_eq!(plan.created.len(), 2);
    let branch = &plan.upserts[1];
    assert_ne!(branch.task_id, "tmp-1");
    assert_eq!(branch.parent_id.as_deref(), Some("a"));
    assert_eq!(branch.branch_label.as_deref(), Some("left"));
    assert_eq!(plan.upserts[2].parent_id.as_deref(), Some(branch.task_id.as_str()));
    assert!(plan.deletes.is_empty());
  }

  #[test]
  fn test_rejects_foreign_task_id() {
    let mut foreign = HashMap::new();
    foreign.insert("x".to_string(), "other-wf".to_string());
    let err = plan_sync("wf", &[submit(Some("x"), None, None)], &[], &foreign).unwrap_err();
    assert_eq!(
      err,
      WorkflowError::CrossWorkflowTask {
        task_id: "x".to_string(),
        workflow_id: "other-wf".to_string(),
      }
    );
  }

  #[test]
  fn test_rejects_parent_outside_submission() {
    // "b" is about to be deleted, so it cannot be a parent.
    let previous = vec![existing("a", None), existing("b", Some("a"))];
    let err = plan_sync(
      "wf",
      &[submit(Some("a"), None, None), submit(None, Some("b"), None)],
      &previous,
      &HashMap::new(),
    )
    .unwrap_err();
    assert!(matches!(err, WorkflowError::UnknownParent { parent_id, .. } if parent_id == "b"));
  }

  #[test]
  fn test_rejects_duplicate_ids() {
    let err = plan_sync(
      "wf",
      &[submit(Some("a"), None, None), submit(Some("a"), None, None)],
      &[existing("a", None)],
      &HashMap::new(),
    )
    .unwrap_err();
    assert_eq!(err, WorkflowError::DuplicateTask("a".to_string()));
  }

  #[test]
  fn test_rejects_cycles() {
    let previous = vec![existing("a", None), existing("b", Some("a"))];
    let err = plan_sync(
      "wf",
      &[submit(Some("a"), Some("b"), None), submit(Some("b"), Some("a"), None)],
      &previous,
      &HashMap::new(),
    )
    .unwrap_err();
    assert!(matches!(err, WorkflowError::Cycle(_)));
  }
}
