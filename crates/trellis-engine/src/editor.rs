//! Task-tree editing.

use std::collections::HashMap;

use tracing::{info, instrument};
use trellis_workflow::{SyncPlan, TaskSubmission, plan_sync};

use crate::Store;
use crate::engine::Engine;
use crate::error::EngineError;

impl<S: Store> Engine<S> {
  /// Replace a workflow's task tree with `submitted`.
  ///
  /// Entries already queued keep their copy of the task, so deleting a
  /// task only stops it from being scheduled again.
  #[instrument(skip(self, submitted), fields(tasks = submitted.len()))]
  pub async fn sync_tasks(
    &self,
    workflow_id: &str,
    submitted: &[TaskSubmission],
  ) -> Result<SyncPlan, EngineError> {
    self.store().get_workflow(workflow_id).await?;
    let previous = self.store().list_tasks(workflow_id).await?;

    let ids: Vec<String> = submitted.iter().filter_map(|s| s.task_id.clone()).collect();
    let foreign: HashMap<String, String> = self
      .store()
      .task_owners(&ids)
      .await?
      .into_iter()
      .filter(|(_, owner)| owner != workflow_id)
      .collect();

    let plan = plan_sync(workflow_id, submitted, &previous, &foreign)?;
    self.store().apply_sync(&plan).await?;

    info!(
      workflow_id,
      created = plan.created.len(),
      updated = plan.upserts.len() - plan.created.len(),
      deleted = plan.deletes.len(),
      "tasks_synced"
    );
    Ok(plan)
  }
}
