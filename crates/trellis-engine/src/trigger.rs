//! Trigger entry points.
//!
//! Business events seed root queue entries. Each root runs as its own
//! chain; a failing root is logged and counted out but never undoes the
//! roots already dispatched.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use trellis_store::Enrolment;
use trellis_workflow::{CampaignBinding, TaskTree};

use crate::Store;
use crate::dispatcher::DispatchMeta;
use crate::engine::Engine;
use crate::error::{EngineError, PreconditionError};

/// Result of a manual campaign trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CampaignTrigger {
  /// Enrolments that had at least one root dispatched.
  pub enrolments: usize,
  /// Roots dispatched across all enrolments.
  pub roots: usize,
}

/// The payload every entry of a run carries.
pub fn enrolment_payload(enrolment: &Enrolment) -> serde_json::Value {
  serde_json::json!({
    "enrolment_id": enrolment.enrolment_id,
    "campaign_id": enrolment.campaign_id,
    "campaign_name": enrolment.campaign_name,
    "user_id": enrolment.user_id,
    "user_name": enrolment.user_name,
    "user_email": enrolment.user_email,
    "user_contact": enrolment.user_contact,
  })
}

impl<S: Store> Engine<S> {
  /// Dispatch every root of the workflow bound to the enrolment's campaign.
  ///
  /// Returns the number of roots whose chain ran without failing. An
  /// unbound or disabled campaign dispatches nothing.
  #[instrument(skip(self))]
  pub async fn trigger_by_enrolment(&self, enrolment_id: &str) -> Result<usize, EngineError> {
    let enrolment = self.store().get_enrolment(enrolment_id).await?;
    if enrolment.is_rejected() {
      info!(enrolment_id, "enrolment_rejected");
      return Ok(0);
    }

    let Some(binding) = self
      .store()
      .binding_for_campaign(&enrolment.campaign_id)
      .await?
    else {
      info!(campaign_id = %enrolment.campaign_id, "campaign_not_bound");
      return Ok(0);
    };
    if !binding.enable {
      info!(binding_id = %binding.binding_id, "binding_disabled");
      return Ok(0);
    }

    let tree = TaskTree::new(self.store().list_tasks(&binding.workflow_id).await?);
    self.fan_out(&binding, &tree, &enrolment, Utc::now()).await
  }

  /// Fire a binding for every non-rejected enrolment of its campaign.
  #[instrument(skip(self))]
  pub async fn trigger_by_campaign(
    &self,
    binding_id: &str,
  ) -> Result<CampaignTrigger, EngineError> {
    let binding = self.store().get_binding(binding_id).await?;
    self.fire_binding(&binding).await
  }

  /// Like [`Engine::trigger_by_campaign`], addressed by campaign.
  pub async fn trigger_campaign(&self, campaign_id: &str) -> Result<CampaignTrigger, EngineError> {
    let binding = self
      .store()
      .binding_for_campaign(campaign_id)
      .await?
      .ok_or(PreconditionError::NotBound)?;
    self.fire_binding(&binding).await
  }

  async fn fire_binding(&self, binding: &CampaignBinding) -> Result<CampaignTrigger, EngineError> {
    if !binding.enable {
      return Err(PreconditionError::BindingDisabled.into());
    }

    let tree = TaskTree::new(self.store().list_tasks(&binding.workflow_id).await?);
    if tree.is_empty() {
      return Err(PreconditionError::NoTasks.into());
    }

    let enrolments = self
      .store()
      .list_active_enrolments(&binding.campaign_id)
      .await?;
    if enrolments.is_empty() {
      return Err(PreconditionError::NoEnrolments.into());
    }

    let now = Utc::now();
    let mut report = CampaignTrigger::default();
    for enrolment in &enrolments {
      match self.fan_out(binding, &tree, enrolment, now).await {
        Ok(0) => {}
        Ok(roots) => {
          report.enrolments += 1;
          report.roots += roots;
        }
        Err(e) => {
          error!(enrolment_id = %enrolment.enrolment_id, error = %e, "enrolment_trigger_failed");
        }
      }
    }

    info!(
      binding_id = %binding.binding_id,
      enrolments = report.enrolments,
      roots = report.roots,
      "campaign_triggered"
    );
    Ok(report)
  }

  /// Dispatch each root for one enrolment.
  async fn fan_out(
    &self,
    binding: &CampaignBinding,
    tree: &TaskTree,
    enrolment: &Enrolment,
    now: DateTime<Utc>,
  ) -> Result<usize, EngineError> {
    let payload = enrolment_payload(enrolment);
    let mut dispatched = 0;

    for root in tree.roots() {
      match self
        .dispatcher()
        .dispatch_at(root, payload.clone(), DispatchMeta::default(), now)
        .await
      {
        Ok(_) => dispatched += 1,
        Err(e) => {
          warn!(
            enrolment_id = %enrolment.enrolment_id,
            task_id = %root.task_id,
            error = %e,
            "root_dispatch_failed"
          );
        }
      }
    }

    // Roots have already run and are reported even if the bump fails.
    if dispatched > 0 {
      let bumped = self
        .store()
        .increment_binding_count(&binding.binding_id)
        .await;
      if let Err(e) = bumped {
        warn!(
          binding_id = %binding.binding_id,
          error = %e,
          "binding_count_failed"
        );
      }
    }

    info!(
      enrolment_id = %enrolment.enrolment_id,
      workflow_id = %binding.workflow_id,
      dispatched,
      "enrolment_triggered"
    );
    Ok(dispatched)
  }
}
