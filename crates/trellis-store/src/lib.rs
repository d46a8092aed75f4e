//! Trellis Store
//!
//! Storage traits and the SQLite implementation for trellis.
//!
//! - [`TaskStore`]: workflows, their task trees and campaign bindings
//! - [`QueueStore`]: runtime queue entries, including the atomic claim and
//!   finalize writes the dispatcher and poller rely on
//! - [`EnrolmentDirectory`]: read-only access to enrolments with their
//!   campaign and user

mod sqlite;
mod types;

use std::collections::HashMap;

pub use sqlite::SqliteStore;
pub use types::{Enrolment, EntryOutcome, QueueEntry, QueueStatus};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use trellis_workflow::{CampaignBinding, SyncPlan, TaskNode, Workflow};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A terminal write hit an entry that is no longer pending.
  #[error("queue entry already finalized: {0}")]
  AlreadyFinal(String),

  /// A stored value could not be mapped to its domain type.
  #[error("invalid stored value: {0}")]
  Decode(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Storage for workflow definitions.
#[async_trait]
pub trait TaskStore: Send + Sync {
  /// Create a new workflow.
  async fn create_workflow(&self, workflow: &Workflow) -> Result<(), Error>;

  /// Get a workflow by ID.
  async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, Error>;

  /// List all workflows.
  async fn list_workflows(&self) -> Result<Vec<Workflow>, Error>;

  /// Delete a workflow together with its tasks and binding.
  async fn delete_workflow(&self, workflow_id: &str) -> Result<(), Error>;

  /// List a workflow's tasks in definition order.
  async fn list_tasks(&self, workflow_id: &str) -> Result<Vec<TaskNode>, Error>;

  /// Map each of the given task ids that exists to its owning workflow.
  async fn task_owners(&self, task_ids: &[String]) -> Result<HashMap<String, String>, Error>;

  /// Apply a task-tree edit in a single transaction.
  async fn apply_sync(&self, plan: &SyncPlan) -> Result<(), Error>;

  /// Bind a workflow to a campaign.
  async fn create_binding(&self, binding: &CampaignBinding) -> Result<(), Error>;

  /// Get a binding by ID.
  async fn get_binding(&self, binding_id: &str) -> Result<CampaignBinding, Error>;

  /// Get the binding for a campaign, if any.
  async fn binding_for_campaign(&self, campaign_id: &str)
  -> Result<Option<CampaignBinding>, Error>;

  /// Get the binding for a workflow, if any.
  async fn binding_for_workflow(&self, workflow_id: &str)
  -> Result<Option<CampaignBinding>, Error>;

  /// Enable or disable a binding.
  async fn set_binding_enabled(&self, binding_id: &str, enable: bool) -> Result<(), Error>;

  /// Remove a binding, leaving the workflow unbound.
  async fn delete_binding(&self, binding_id: &str) -> Result<(), Error>;

  /// Bump a binding's fire count.
  async fn increment_binding_count(&self, binding_id: &str) -> Result<(), Error>;
}

/// Storage for runtime queue entries.
#[async_trait]
pub trait QueueStore: Send + Sync {
  /// Persist a new pending entry.
  async fn create_entry(&self, entry: &QueueEntry) -> Result<(), Error>;

  /// Get an entry by ID.
  async fn get_entry(&self, entry_id: &str) -> Result<QueueEntry, Error>;

  /// Stamp `execute_at` on a pending, unclaimed entry.
  ///
  /// Returns `false` when the entry was already claimed or finalized, in
  /// which case the caller must not run it.
  async fn claim_entry(&self, entry_id: &str, at: DateTime<Utc>) -> Result<bool, Error>;

  /// Write status, result and error message in one statement.
  ///
  /// Fails with [`Error::AlreadyFinal`] if the entry is no longer pending.
  async fn finish_entry(
    &self,
    entry_id: &str,
    outcome: &EntryOutcome,
    at: DateTime<Utc>,
  ) -> Result<(), Error>;

  /// The earliest pending, unclaimed entry whose `trigger_at <= now`.
  async fn next_eligible_entry(&self, now: DateTime<Utc>) -> Result<Option<QueueEntry>, Error>;

  /// List a workflow's entries, oldest first.
  async fn list_entries(&self, workflow_id: &str) -> Result<Vec<QueueEntry>, Error>;
}

/// Read-only access to enrolments.
#[async_trait]
pub trait EnrolmentDirectory: Send + Sync {
  /// Get an enrolment with its campaign and user.
  async fn get_enrolment(&self, enrolment_id: &str) -> Result<Enrolment, Error>;

  /// List a campaign's enrolments that were not rejected.
  async fn list_active_enrolments(&self, campaign_id: &str) -> Result<Vec<Enrolment>, Error>;
}
