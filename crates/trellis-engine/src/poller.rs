//! Poller for delayed entries.
//!
//! Each tick drains eligible pending entries (`trigger_at <= now`, not yet
//! claimed) and resumes their chains. Entries of a workflow whose binding
//! is disabled or gone are finalized as skipped instead.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use trellis_store::EntryOutcome;

use crate::Store;
use crate::engine::Engine;
use crate::error::EngineError;

/// What one poll tick did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollReport {
  /// Entries picked up from the queue.
  pub picked: usize,
  /// Entries run to completion, including chained successors.
  pub completed: usize,
  /// Chains that failed.
  pub failed: usize,
  /// Chains that stopped at a new delayed entry.
  pub deferred: usize,
  /// Entries finalized without running.
  pub skipped: usize,
}

impl<S: Store> Engine<S> {
  pub async fn poll_once(&self) -> Result<PollReport, EngineError> {
    self.poll_once_at(Utc::now()).await
  }

  #[instrument(skip(self))]
  pub async fn poll_once_at(&self, now: DateTime<Utc>) -> Result<PollReport, EngineError> {
    let mut report = PollReport::default();

    while report.picked < self.config().max_entries_per_tick {
      let Some(entry) = self.store().next_eligible_entry(now).await? else {
        break;
      };
      report.picked += 1;

      if !self.binding_enabled(&entry.workflow_id).await? {
        if self.store().claim_entry(&entry.id, now).await? {
          self
            .store()
            .finish_entry(&entry.id, &EntryOutcome::skipped("binding disabled"), now)
            .await?;
          info!(entry_id = %entry.id, "entry_skipped");
          report.skipped += 1;
        }
        continue;
      }

      match self.dispatcher().run_entry_at(entry, now).await {
        Ok(chain) => {
          report.completed += chain.completed.len();
          if chain.deferred.is_some() {
            report.deferred += 1;
          }
        }
        Err(EngineError::Store(e)) => return Err(EngineError::Store(e)),
        Err(e) => {
          warn!(error = %e, "entry_chain_failed");
          report.failed += 1;
        }
      }
    }

    debug!(
      picked = report.picked,
      completed = report.completed,
      failed = report.failed,
      skipped = report.skipped,
      "poll_tick"
    );
    Ok(report)
  }

  /// Poll on an interval until cancelled.
  pub async fn run(&self, cancel: CancellationToken) {
    let period = self.config().poll_interval.max(Duration::from_secs(1));
    info!(interval_secs = period.as_secs(), "starting poller");

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
      tokio::select! {
          _ = cancel.cancelled() => {
              info!("poller cancelled");
              break;
          }
          _ = interval.tick() => {
              if let Err(e) = self.poll_once().await {
                  error!(error = %e, "poll_tick_failed");
              }
          }
      }
    }
  }

  async fn binding_enabled(&self, workflow_id: &str) -> Result<bool, EngineError> {
    let binding = self.store().binding_for_workflow(workflow_id).await?;
    Ok(binding.is_some_and(|b| b.enable))
  }
}
