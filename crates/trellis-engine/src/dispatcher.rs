//! Queue entry dispatch.
//!
//! A chain starts from one pending entry and follows the task tree: run the
//! entry, persist the outcome, resolve the next task, enqueue it, repeat.
//! The chain stops at the first entry whose `trigger_at` is still in the
//! future; the poller picks that entry up later through [`Dispatcher::run_entry`],
//! which re-enters the same loop.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, instrument, warn};
use trellis_runner::{DelayModifier, TaskRunner};
use trellis_store::{EntryOutcome, QueueEntry};
use trellis_workflow::{TaskNode, TaskTree, resolve_next};

use crate::Store;
use crate::error::EngineError;

/// Where a dispatched task sits in its run.
#[derive(Debug, Clone, Default)]
pub struct DispatchMeta {
  /// The runtime predecessor, `None` for a root.
  pub parent: Option<QueueEntry>,
  /// Earliest execution time. Defaults to now.
  pub trigger_at: Option<DateTime<Utc>>,
}

/// What one chain did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainReport {
  /// Entries run to completion, in order.
  pub completed: Vec<String>,
  /// Entry left pending for the poller.
  pub deferred: Option<String>,
}

/// Creates queue entries and drives them through the runner.
pub struct Dispatcher<S> {
  store: Arc<S>,
  runner: Arc<TaskRunner>,
}

impl<S> Clone for Dispatcher<S> {
  fn clone(&self) -> Self {
    Self {
      store: self.store.clone(),
      runner: self.runner.clone(),
    }
  }
}

impl<S: Store> Dispatcher<S> {
  pub fn new(store: Arc<S>, runner: Arc<TaskRunner>) -> Self {
    Self { store, runner }
  }

  pub fn store(&self) -> &Arc<S> {
    &self.store
  }

  /// Enqueue `task` and run its chain.
  pub async fn dispatch(
    &self,
    task: &TaskNode,
    payload: serde_json::Value,
    meta: DispatchMeta,
  ) -> Result<ChainReport, EngineError> {
    self.dispatch_at(task, payload, meta, Utc::now()).await
  }

  #[instrument(
    skip(self, task, payload, meta),
    fields(task_id = %task.task_id, workflow_id = %task.workflow_id)
  )]
  pub async fn dispatch_at(
    &self,
    task: &TaskNode,
    payload: serde_json::Value,
    meta: DispatchMeta,
    now: DateTime<Utc>,
  ) -> Result<ChainReport, EngineError> {
    let trigger_at = meta.trigger_at.unwrap_or(now);
    let entry = self
      .enqueue(task, payload, meta.parent.as_ref(), trigger_at, now)
      .await?;
    self.run_chain(entry, now).await
  }

  /// Resume the chain at an existing pending entry.
  pub async fn run_entry(&self, entry: QueueEntry) -> Result<ChainReport, EngineError> {
    self.run_entry_at(entry, Utc::now()).await
  }

  #[instrument(
    skip(self, entry),
    fields(entry_id = %entry.id, workflow_id = %entry.workflow_id)
  )]
  pub async fn run_entry_at(
    &self,
    entry: QueueEntry,
    now: DateTime<Utc>,
  ) -> Result<ChainReport, EngineError> {
    self.run_chain(entry, now).await
  }

  async fn enqueue(
    &self,
    task: &TaskNode,
    payload: serde_json::Value,
    parent: Option<&QueueEntry>,
    trigger_at: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> Result<QueueEntry, EngineError> {
    let entry = QueueEntry::pending(
      uuid::Uuid::new_v4().to_string(),
      task,
      payload,
      parent,
      trigger_at,
      now,
    );
    self.store.create_entry(&entry).await?;

    info!(
      entry_id = %entry.id,
      task_id = %entry.task_id,
      action = %entry.task_action,
      trigger_at = %entry.trigger_at,
      "entry_created"
    );
    Ok(entry)
  }

  async fn run_chain(
    &self,
    first: QueueEntry,
    now: DateTime<Utc>,
  ) -> Result<ChainReport, EngineError> {
    let tree = TaskTree::new(self.store.list_tasks(&first.workflow_id).await?);
    let mut report = ChainReport::default();
    let mut pending = Some(first);

    while let Some(entry) = pending.take() {
      if entry.trigger_at > now {
        info!(entry_id = %entry.id, trigger_at = %entry.trigger_at, "entry_deferred");
        report.deferred = Some(entry.id);
        break;
      }

      if !self.store.claim_entry(&entry.id, now).await? {
        debug!(entry_id = %entry.id, "entry_claim_lost");
        break;
      }

      let outcome = match self
        .runner
        .run(&entry.action(), entry.payload(), &entry.task_config.0)
        .await
      {
        Ok(outcome) => outcome,
        Err(e) => {
          let message = e.to_string();
          warn!(
            entry_id = %entry.id,
            task_id = %entry.task_id,
            error = %message,
            "entry_failed"
          );
          self
            .store
            .finish_entry(&entry.id, &EntryOutcome::failed(message.clone()), now)
            .await?;
          return Err(EngineError::TaskFailed {
            entry_id: entry.id,
            message,
          });
        }
      };

      self
        .store
        .finish_entry(&entry.id, &EntryOutcome::completed(outcome.result.clone()), now)
        .await?;
      info!(entry_id = %entry.id, task_id = %entry.task_id, "entry_completed");
      report.completed.push(entry.id.clone());

      // Deleted from the definition after this entry was created.
      if tree.get(&entry.task_id).is_none() {
        warn!(task_id = %entry.task_id, "task_removed");
        break;
      }

      let next = resolve_next(&tree, &entry.task_id, outcome.pos.as_deref())?;
      let Some(task) = next.task() else {
        debug!(entry_id = %entry.id, "chain_ended");
        break;
      };
      debug!(next_task_id = %task.task_id, rule = next.rule(), "next_task_resolved");

      let trigger_at = match &outcome.modifier {
        Some(delay) => match shift(entry.trigger_at, delay) {
          Some(at) => at,
          None => {
            warn!(entry_id = %entry.id, hours = delay.trigger_delay, "delay_out_of_range");
            break;
          }
        },
        None => entry.trigger_at,
      };

      pending = Some(
        self
          .enqueue(task, entry.payload().clone(), Some(&entry), trigger_at, now)
          .await?,
      );
    }

    Ok(report)
  }
}

/// Move `from` forward by the delay.
fn shift(from: DateTime<Utc>, delay: &DelayModifier) -> Option<DateTime<Utc>> {
  let delta = TimeDelta::from_std(delay.as_duration()).ok()?;
  from.checked_add_signed(delta)
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_shift() {
    let from = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    assert_eq!(
      shift(from, &DelayModifier::hours(1.5)),
      Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap())
    );
    assert_eq!(shift(from, &DelayModifier::hours(0.0)), Some(from));
    assert_eq!(shift(from, &DelayModifier::hours(1e18)), None);
  }
}
