use std::fmt;

use serde::{Deserialize, Serialize};

/// Capability tag selecting the runner strategy for a task.
///
/// Stored and transmitted as its string tag. Tags without a built-in
/// handler are kept verbatim in [`Action::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
  /// Shift the next task forward in time.
  Delay,
  /// Call an outside HTTP endpoint.
  CallExternalApi,
  /// Render and deliver a templated message (mail, SMS, WhatsApp).
  SendMessage,
  Other(String),
}

impl Action {
  pub fn as_str(&self) -> &str {
    match self {
      Action::Delay => "delay",
      Action::CallExternalApi => "call-external-api",
      Action::SendMessage => "send-message",
      Action::Other(tag) => tag,
    }
  }
}

impl From<&str> for Action {
  fn from(tag: &str) -> Self {
    match tag {
      "delay" => Action::Delay,
      "call-external-api" => Action::CallExternalApi,
      "send-message" => Action::SendMessage,
      other => Action::Other(other.to_string()),
    }
  }
}

impl From<String> for Action {
  fn from(tag: String) -> Self {
    Action::from(tag.as_str())
  }
}

impl From<Action> for String {
  fn from(action: Action) -> Self {
    action.as_str().to_string()
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A definition-time node of a workflow's task forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
  pub task_id: String,
  pub workflow_id: String,
  pub action: Action,
  #[serde(default)]
  pub config: serde_json::Value,
  /// Tree edge. `None` marks a root task.
  #[serde(default)]
  pub parent_id: Option<String>,
  /// Non-null marks this node as one arm of a conditional fan-out.
  #[serde(default)]
  pub branch_label: Option<String>,
}

impl TaskNode {
  pub fn is_root(&self) -> bool {
    self.parent_id.is_none()
  }

  /// Whether this node sits on a conditional arm rather than the trunk.
  pub fn is_conditional(&self) -> bool {
    self.branch_label.is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_action_tags() {
    assert_eq!(Action::from("delay"), Action::Delay);
    assert_eq!(Action::from("call-external-api"), Action::CallExternalApi);
    assert_eq!(Action::from("send-message"), Action::SendMessage);
    assert_eq!(
      Action::from("noop"),
      Action::Other("noop".to_string())
    );
    assert_eq!(Action::SendMessage.to_string(), "send-message");
  }

  #[test]
  fn test_task_node_serde() {
    let node: TaskNode = serde_json::from_value(serde_json::json!({
      "task_id": "a",
      "workflow_id": "wf",
      "action": "delay",
      "config": { "hours": 2 },
      "branch_label": "left"
    }))
    .unwrap();

    assert_eq!(node.action, Action::Delay);
    assert!(node.is_root());
    assert!(node.is_conditional());

    let value = serde_json::to_value(&node).unwrap();
    assert_eq!(value["action"], "delay");
  }
}
