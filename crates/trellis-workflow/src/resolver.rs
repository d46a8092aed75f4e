//! Next-task resolution.
//!
//! Given the task that just ran and the branch outcome its runner reported,
//! decide which task (if any) runs next. Rules are tried in order:
//!
//! 1. **Branch**: a child whose `branch_label` equals the outcome.
//! 2. **Continue**: a child with no `branch_label` (the trunk edge).
//! 3. **Resume**: the current node ends a conditional arm. Take the nearest
//!    node in its lineage carrying a `branch_label` (the arm's root), then
//!    pick an unlabelled child of that root's parent outside the lineage.
//!
//! Anything else ends the run.

use std::collections::HashSet;

use crate::error::WorkflowError;
use crate::task::TaskNode;
use crate::tree::TaskTree;

/// Which rule selected the next task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NextTask<'a> {
  /// A conditional child matching the outcome.
  Branch(&'a TaskNode),
  /// The unlabelled child of the current task.
  Continue(&'a TaskNode),
  /// The trunk sibling that follows an exhausted conditional arm.
  Resume(&'a TaskNode),
  /// Nothing left to run for this chain.
  End,
}

impl<'a> NextTask<'a> {
  pub fn task(&self) -> Option<&'a TaskNode> {
    match *self {
      NextTask::Branch(t) | NextTask::Continue(t) | NextTask::Resume(t) => Some(t),
      NextTask::End => None,
    }
  }

  pub fn rule(&self) -> &'static str {
    match self {
      NextTask::Branch(_) => "branch",
      NextTask::Continue(_) => "continue",
      NextTask::Resume(_) => "resume",
      NextTask::End => "end",
    }
  }
}

/// Resolve the task that follows `current_id`.
pub fn resolve_next<'a>(
  tree: &'a TaskTree,
  current_id: &str,
  outcome: Option<&str>,
) -> Result<NextTask<'a>, WorkflowError> {
  if tree.get(current_id).is_none() {
    return Err(WorkflowError::TaskNotFound(current_id.to_string()));
  }

  if let Some(outcome) = outcome {
    let matched = tree
      .children(current_id)
      .find(|c| c.branch_label.as_deref() == Some(outcome));
    if let Some(child) = matched {
      return Ok(NextTask::Branch(child));
    }
  }

  if let Some(child) = tree.children(current_id).find(|c| c.branch_label.is_none()) {
    return Ok(NextTask::Continue(child));
  }

  resume_trunk(tree, current_id)
}

/// Rule 3: find where the trunk picks up after a conditional arm.
fn resume_trunk<'a>(tree: &'a TaskTree, current_id: &str) -> Result<NextTask<'a>, WorkflowError> {
  let lineage = tree.lineage(current_id)?;

  let Some(arm_root) = lineage.iter().find(|n| n.is_conditional()) else {
    return Ok(NextTask::End);
  };
  let Some(parent_id) = arm_root.parent_id.as_deref() else {
    return Ok(NextTask::End);
  };

  let in_lineage: HashSet<&str> = lineage.iter().map(|n| n.task_id.as_str()).collect();

  Ok(
    tree
      .children(parent_id)
      .find(|c| c.branch_label.is_none() && !in_lineage.contains(c.task_id.as_str()))
      .map(NextTask::Resume)
      .unwrap_or(NextTask::End),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::task::Action;

  fn node(id: &str, parent: Option<&str>, label: Option<&str>) -> TaskNode {
    TaskNode {
      task_id: id.to_string(),
      workflow_id: "wf".to_string(),
      action: Action::Other("noop".to_string()),
      config: serde_json::Value::Null,
      parent_id: parent.map(str::to_string),
      branch_label: label.map(str::to_string),
    }
  }

  /// A with conditional children B (left), C (right) and trunk child D.
  fn if_else_tree() -> TaskTree {
    TaskTree::new(vec![
      node("a", None, None),
      node("b", Some("a"), Some("left")),
      node("c", Some("a"), Some("right")),
      node("d", Some("a"), None),
    ])
  }

  fn next_id(tree: &TaskTree, current: &str, outcome: Option<&str>) -> Option<String> {
    resolve_next(tree, current, outcome)
      .unwrap()
      .task()
      .map(|t| t.task_id.clone())
  }

  #[test]
  fn test_branch_selected_by_outcome() {
    let tree = if_else_tree();
    let next = resolve_next(&tree, "a", Some("left")).unwrap();
    assert!(matches!(next, NextTask::Branch(t) if t.task_id == "b"));
    assert_eq!(next_id(&tree, "a", Some("right")).as_deref(), Some("c"));
  }

  #[test]
  fn test_unmatched_outcome_falls_back_to_trunk() {
    let tree = if_else_tree();
    let next = resolve_next(&tree, "a", Some("middle")).unwrap();
    assert!(matches!(next, NextTask::Continue(t) if t.task_id == "d"));
    assert_eq!(next_id(&tree, "a", None).as_deref(), Some("d"));
  }

  #[test]
  fn test_exhausted_branch_resumes_trunk() {
    let tree = if_else_tree();
    let next = resolve_next(&tree, "b", None).unwrap();
    assert!(matches!(next, NextTask::Resume(t) if t.task_id == "d"));
    assert_eq!(next_id(&tree, "c", None).as_deref(), Some("d"));
  }

  #[test]
  fn test_resume_never_selects_sibling_arm() {
    let tree = TaskTree::new(vec![
      node("a", None, None),
      node("b", Some("a"), Some("left")),
      node("c", Some("a"), Some("right")),
    ]);
    assert_eq!(resolve_next(&tree, "b", None).unwrap(), NextTask::End);
    assert_eq!(resolve_next(&tree, "c", Some("left")).unwrap(), NextTask::End);
  }

  #[test]
  fn test_deep_arm_leaf_resumes_nearest_trunk() {
    // a -> b(left) -> e -> f ; a -> d
    let tree = TaskTree::new(vec![
      node("a", None, None),
      node("b", Some("a"), Some("left")),
      node("e", Some("b"), None),
      node("f", Some("e"), None),
      node("d", Some("a"), None),
    ]);
    assert_eq!(next_id(&tree, "b", None).as_deref(), Some("e"));
    assert_eq!(next_id(&tree, "e", None).as_deref(), Some("f"));
    assert_eq!(next_id(&tree, "f", None).as_deref(), Some("d"));
  }

  #[test]
  fn test_nested_arms_resume_inner_trunk_first() {
    // a -> b(left) -> x(yes) ; b -> g ; a -> d
    let tree = TaskTree::new(vec![
      node("a", None, None),
      node("b", Some("a"), Some("left")),
      node("x", Some("b"), Some("yes")),
      node("g", Some("b"), None),
      node("d", Some("a"), None),
    ]);
    assert_eq!(next_id(&tree, "b", Some("yes")).as_deref(), Some("x"));
    assert_eq!(next_id(&tree, "x", None).as_deref(), Some("g"));
    assert_eq!(next_id(&tree, "g", None).as_deref(), Some("d"));
  }

  #[test]
  fn test_trunk_leaf_ends_run() {
    let tree = if_else_tree();
    assert_eq!(resolve_next(&tree, "d", None).unwrap(), NextTask::End);
  }

  #[test]
  fn test_at_most_one_branch_child_selected() {
    let tree = TaskTree::new(vec![
      node("a", None, None),
      node("b", Some("a"), Some("left")),
      node("b2", Some("a"), Some("left")),
    ]);
    assert_eq!(next_id(&tree, "a", Some("left")).as_deref(), Some("b"));
  }

  #[test]
  fn test_unknown_task() {
    let tree = if_else_tree();
    assert_eq!(
      resolve_next(&tree, "nope", None),
      Err(WorkflowError::TaskNotFound("nope".to_string()))
    );
  }

  #[test]
  fn test_cycle_fails_fast() {
    let tree = TaskTree::new(vec![
      node("x", Some("y"), Some("left")),
      node("y", Some("x"), None),
    ]);
    // y's only child is labelled and no outcome matches, so the resolver
    // ascends and meets the cycle.
    assert!(matches!(
      resolve_next(&tree, "y", None),
      Err(WorkflowError::Cycle(_))
    ));
  }
}
