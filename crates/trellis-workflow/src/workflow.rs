use serde::{Deserialize, Serialize};

/// A named container for a task forest. Carries no execution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub workflow_id: String,
  pub name: String,
  /// Owning vendor. `None` for global workflows.
  #[serde(default)]
  pub vendor_id: Option<String>,
  #[serde(default)]
  pub created_by: Option<String>,
}

/// Business event that fires a bound workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
  OnEnrolment,
}

impl TriggerKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      TriggerKind::OnEnrolment => "on_enrolment",
    }
  }
}

/// Links one workflow to one campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignBinding {
  pub binding_id: String,
  pub campaign_id: String,
  pub workflow_id: String,
  pub trigger: TriggerKind,
  pub enable: bool,
  /// Number of times the binding has fired. Only ever increases.
  pub count: i64,
}
