use std::collections::{HashMap, HashSet};

use crate::error::WorkflowError;
use crate::task::TaskNode;

/// Flat, index-addressed view of one workflow's task forest.
///
/// Nodes live in an arena in definition order; edges are resolved through
/// id lookups only, so a corrupted `parent_id` chain can be detected rather
/// than followed forever.
#[derive(Debug, Clone, Default)]
pub struct TaskTree {
  /// Arena of nodes, in definition order.
  nodes: Vec<TaskNode>,
  /// task_id -> arena index.
  index: HashMap<String, usize>,
  /// parent task_id -> child arena indexes, in definition order.
  children: HashMap<String, Vec<usize>>,
  /// Arena indexes of nodes without a parent.
  roots: Vec<usize>,
}

impl TaskTree {
  /// Build a tree from a workflow's task rows.
  pub fn new(nodes: Vec<TaskNode>) -> Self {
    let mut index = HashMap::with_capacity(nodes.len());
    let mut children: HashMap<String, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();

    for (i, node) in nodes.iter().enumerate() {
      index.insert(node.task_id.clone(), i);
      match &node.parent_id {
        Some(parent_id) => children.entry(parent_id.clone()).or_default().push(i),
        None => roots.push(i),
      }
    }

    Self {
      nodes,
      index,
      children,
      roots,
    }
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Get a node by ID.
  pub fn get(&self, task_id: &str) -> Option<&TaskNode> {
    self.index.get(task_id).map(|&i| &self.nodes[i])
  }

  /// Nodes with no parent, the entry points of a triggered run.
  pub fn roots(&self) -> impl Iterator<Item = &TaskNode> {
    self.roots.iter().map(|&i| &self.nodes[i])
  }

  /// Direct children of a node, in definition order.
  pub fn children(&self, task_id: &str) -> impl Iterator<Item = &TaskNode> {
    self
      .children
      .get(task_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
      .iter()
      .map(|&i| &self.nodes[i])
  }

  pub fn iter(&self) -> impl Iterator<Item = &TaskNode> {
    self.nodes.iter()
  }

  /// The node itself followed by its ancestors, nearest first.
  ///
  /// Fails with [`WorkflowError::Cycle`] as soon as a node repeats.
  pub fn lineage(&self, task_id: &str) -> Result<Vec<&TaskNode>, WorkflowError> {
    let mut current = self
      .get(task_id)
      .ok_or_else(|| WorkflowError::TaskNotFound(task_id.to_string()))?;
    let mut visited = HashSet::new();
    let mut lineage = Vec::new();

    loop {
      if !visited.insert(current.task_id.as_str()) {
        return Err(WorkflowError::Cycle(current.task_id.clone()));
      }
      lineage.push(current);

      match current.parent_id.as_deref() {
        Some(parent_id) => {
          current = self
            .get(parent_id)
            .ok_or_else(|| WorkflowError::UnknownParent {
              task_id: current.task_id.clone(),
              parent_id: parent_id.to_string(),
            })?;
        }
        None => return Ok(lineage),
      }
    }
  }

  /// Check that every parent exists in the same workflow and that the
  /// parent graph is acyclic.
  pub fn validate(&self) -> Result<(), WorkflowError> {
    for node in &self.nodes {
      if let Some(parent_id) = &node.parent_id {
        let parent = self
          .get(parent_id)
          .ok_or_else(|| WorkflowError::UnknownParent {
            task_id: node.task_id.clone(),
            parent_id: parent_id.clone(),
          })?;
        if parent.workflow_id != node.workflow_id {
          return Err(WorkflowError::CrossWorkflowTask {
            task_id: parent.task_id.clone(),
            workflow_id: parent.workflow_id.clone(),
          });
        }
      }
    }

    // Every node must reach a root. Nodes already proven to reach one are
    // skipped, so each chain is walked once.
    let mut reaches_root: HashSet<&str> = HashSet::new();
    for node in &self.nodes {
      let mut path: HashSet<&str> = HashSet::new();
      let mut current = node;
      loop {
        if reaches_root.contains(current.task_id.as_str()) {
          break;
        }
        if !path.insert(current.task_id.as_str()) {
          return Err(WorkflowError::Cycle(current.task_id.clone()));
        }
        match current.parent_id.as_deref().and_then(|p| self.get(p)) {
          Some(parent) => current = parent,
          None => break,
        }
      }
      reaches_root.extend(path);
    }

    Ok(())
  }
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

  #[test]
  fn test_roots_and_children() {
    let tree = TaskTree::new(vec![
      node("a", None, None),
      node("b", Some("a"), Some("left")),
      node("c", Some("a"), Some("right")),
      node("z", None, None),
    ]);

    let roots: Vec<_> = tree.roots().map(|n| n.task_id.as_str()).collect();
    assert_eq!(roots, vec!["a", "z"]);

    let children: Vec<_> = tree.children("a").map(|n| n.task_id.as_str()).collect();
    assert_eq!(children, vec!["b", "c"]);
    assert_eq!(tree.children("b").count(), 0);
  }

  #[test]
  fn test_lineage() {
    let tree = TaskTree::new(vec![
      node("a", None, None),
      node("b", Some("a"), Some("left")),
      node("e", Some("b"), None),
    ]);

    let lineage: Vec<_> = tree
      .lineage("e")
      .unwrap()
      .into_iter()
      .map(|n| n.task_id.as_str())
      .collect();
    assert_eq!(lineage, vec!["e", "b", "a"]);
  }

  #[test]
  fn test_lineage_detects_cycle() {
    let tree = TaskTree::new(vec![node("a", Some("b"), None), node("b", Some("a"), None)]);
    assert!(matches!(tree.lineage("a"), Err(WorkflowError::Cycle(_))));
  }

  #[test]
  fn test_validate_ok() {
    let tree = TaskTree::new(vec![
      node("a", None, None),
      node("b", Some("a"), None),
      node("c", Some("b"), None),
    ]);
    assert!(tree.validate().is_ok());
  }

  #[test]
  fn test_validate_unknown_parent() {
    let tree = TaskTree::new(vec![node("a", Some("ghost"), None)]);
    assert_eq!(
      tree.validate(),
      Err(WorkflowError::UnknownParent {
        task_id: "a".to_string(),
        parent_id: "ghost".to_string(),
      })
    );
  }

  #[test]
  fn test_validate_self_parent() {
    let tree = TaskTree::new(vec![node("a", Some("a"), None)]);
    assert_eq!(tree.validate(), Err(WorkflowError::Cycle("a".to_string())));
  }

  #[test]
  fn test_validate_cycle_below_root() {
    let tree = TaskTree::new(vec![
      node("root", None, None),
      node("x", Some("y"), None),
      node("y", Some("x"), None),
    ]);
    assert!(matches!(tree.validate(), Err(WorkflowError::Cycle(_))));
  }
}
