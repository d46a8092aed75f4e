use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
  SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;
use trellis_workflow::{Action, CampaignBinding, SyncPlan, TaskNode, TriggerKind, Workflow};

use crate::{
  Enrolment, EnrolmentDirectory, EntryOutcome, Error, QueueEntry, QueueStore, TaskStore,
};

const ENTRY_COLUMNS: &str = "id, task_id, task_parent_id, parent_queue_id, grand_parent_queue_id, \
  task_action, task_pos, task_data, task_config, workflow_id, status, result_obj, error_message, \
  retry_count, trigger_at, execute_at, created_at";

const ENROLMENT_SELECT: &str = "SELECT e.enrolment_id, e.status, c.campaign_id, c.name AS campaign_name, \
  u.user_id, u.name AS user_name, u.email AS user_email, u.contact AS user_contact \
  FROM enrolments e \
  JOIN campaigns c ON c.campaign_id = e.campaign_id \
  JOIN users u ON u.user_id = e.user_id";

#[derive(FromRow)]
struct WorkflowRow {
  workflow_id: String,
  name: String,
  vendor_id: Option<String>,
  created_by: Option<String>,
}

impl From<WorkflowRow> for Workflow {
  fn from(row: WorkflowRow) -> Self {
    Workflow {
      workflow_id: row.workflow_id,
      name: row.name,
      vendor_id: row.vendor_id,
      created_by: row.created_by,
    }
  }
}

#[derive(FromRow)]
struct TaskRow {
  task_id: String,
  workflow_id: String,
  action: String,
  config: Json<serde_json::Value>,
  parent_id: Option<String>,
  branch_label: Option<String>,
}

impl From<TaskRow> for TaskNode {
  fn from(row: TaskRow) -> Self {
    TaskNode {
      task_id: row.task_id,
      workflow_id: row.workflow_id,
      action: Action::from(row.action),
      config: row.config.0,
      parent_id: row.parent_id,
      branch_label: row.branch_label,
    }
  }
}

#[derive(FromRow)]
struct BindingRow {
  binding_id: String,
  campaign_id: String,
  workflow_id: String,
  trigger_kind: String,
  enable: bool,
  count: i64,
}

impl TryFrom<BindingRow> for CampaignBinding {
  type Error = Error;

  fn try_from(row: BindingRow) -> Result<Self, Self::Error> {
    let trigger = match row.trigger_kind.as_str() {
      "on_enrolment" => TriggerKind::OnEnrolment,
      other => return Err(Error::Decode(format!("unknown trigger kind '{}'", other))),
    };
    Ok(CampaignBinding {
      binding_id: row.binding_id,
      campaign_id: row.campaign_id,
      workflow_id: row.workflow_id,
      trigger,
      enable: row.enable,
      count: row.count,
    })
  }
}

/// Extract the file path from a sqlite URL, if it points at a file.
fn sqlite_file_path(database_url: &str) -> Option<PathBuf> {
  let raw = database_url
    .strip_prefix("sqlite://")
    .or_else(|| database_url.strip_prefix("sqlite:"))?;
  let path = raw.split('?').next().unwrap_or(raw);
  if path.is_empty() || path == ":memory:" || path.starts_with("file:") {
    return None;
  }
  Some(PathBuf::from(path))
}

/// SQLite-based store implementation.
#[derive(Clone)]
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Connect to a database URL, creating the file and its directory if needed.
  pub async fn connect(database_url: &str) -> Result<Self, Error> {
    let file = sqlite_file_path(database_url);
    if let Some(parent) = file.as_ref().and_then(|p| p.parent()) {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent).map_err(|e| Error::Database(sqlx::Error::Io(e)))?;
      }
    }

    let mut options = SqliteConnectOptions::from_str(database_url)?
      .create_if_missing(true)
      .foreign_keys(true);
    if file.is_some() {
      options = options
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);
    }

    let pool = SqlitePoolOptions::new()
      .max_connections(5)
      .acquire_timeout(Duration::from_secs(5))
      .connect_with(options)
      .await?;

    Ok(Self::new(pool))
  }

  /// A private in-memory database on a single long-lived connection.
  pub async fn in_memory() -> Result<Self, Error> {
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .idle_timeout(None)
      .max_lifetime(None)
      .connect("sqlite::memory:")
      .await?;
    sqlx::query("PRAGMA foreign_keys = ON;")
      .execute(&pool)
      .await?;
    Ok(Self::new(pool))
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), Error> {
    sqlx::migrate!("./migrations").run(&self.pool).await?;
    Ok(())
  }

  /// Insert or replace a campaign row.
  pub async fn upsert_campaign(&self, campaign_id: &str, name: &str) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO campaigns (campaign_id, name) VALUES (?, ?)
            ON CONFLICT (campaign_id) DO UPDATE SET name = excluded.name
            "#,
    )
    .bind(campaign_id)
    .bind(name)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  /// Insert or replace a user row.
  pub async fn upsert_user(
    &self,
    user_id: &str,
    name: &str,
    email: Option<&str>,
    contact: Option<&str>,
  ) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO users (user_id, name, email, contact) VALUES (?, ?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE
            SET name = excluded.name, email = excluded.email, contact = excluded.contact
            "#,
    )
    .bind(user_id)
    .bind(name)
    .bind(email)
    .bind(contact)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  /// Insert or replace an enrolment row.
  pub async fn upsert_enrolment(
    &self,
    enrolment_id: &str,
    campaign_id: &str,
    user_id: &str,
    status: &str,
  ) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO enrolments (enrolment_id, campaign_id, user_id, status) VALUES (?, ?, ?, ?)
            ON CONFLICT (enrolment_id) DO UPDATE
            SET campaign_id = excluded.campaign_id, user_id = excluded.user_id, status = excluded.status
            "#,
    )
    .bind(enrolment_id)
    .bind(campaign_id)
    .bind(user_id)
    .bind(status)
    .execute(&self.pool)
    .await?;
    Ok(())
  }
}

#[async_trait]
impl TaskStore for SqliteStore {
  async fn create_workflow(&self, workflow: &Workflow) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO workflows (workflow_id, name, vendor_id, created_by)
            VALUES (?, ?, ?, ?)
            "#,
    )
    .bind(&workflow.workflow_id)
    .bind(&workflow.name)
    .bind(&workflow.vendor_id)
    .bind(&workflow.created_by)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, Error> {
    let row: Option<WorkflowRow> = sqlx::query_as(
      r#"
            SELECT workflow_id, name, vendor_id, created_by
            FROM workflows
            WHERE workflow_id = ?
            "#,
    )
    .bind(workflow_id)
    .fetch_optional(&self.pool)
    .await?;

    row
      .map(Workflow::from)
      .ok_or_else(|| Error::NotFound(format!("workflow {}", workflow_id)))
  }

  async fn list_workflows(&self) -> Result<Vec<Workflow>, Error> {
    let rows: Vec<WorkflowRow> = sqlx::query_as(
      r#"
            SELECT workflow_id, name, vendor_id, created_by
            FROM workflows
            ORDER BY name ASC
            "#,
    )
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(Workflow::from).collect())
  }

  async fn delete_workflow(&self, workflow_id: &str) -> Result<(), Error> {
    let mut tx = self.pool.begin().await?;

    sqlx::query("DELETE FROM campaign_workflows WHERE workflow_id = ?")
      .bind(workflow_id)
      .execute(&mut *tx)
      .await?;
    sqlx::query("DELETE FROM tasks WHERE workflow_id = ?")
      .bind(workflow_id)
      .execute(&mut *tx)
      .await?;
    let deleted = sqlx::query("DELETE FROM workflows WHERE workflow_id = ?")
      .bind(workflow_id)
      .execute(&mut *tx)
      .await?
      .rows_affected();

    if deleted == 0 {
      return Err(Error::NotFound(format!("workflow {}", workflow_id)));
    }

    tx.commit().await?;
    Ok(())
  }

  async fn list_tasks(&self, workflow_id: &str) -> Result<Vec<TaskNode>, Error> {
    let rows: Vec<TaskRow> = sqlx::query_as(
      r#"
            SELECT task_id, workflow_id, action, config, parent_id, branch_label
            FROM tasks
            WHERE workflow_id = ?
            ORDER BY rowid ASC
            "#,
    )
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(TaskNode::from).collect())
  }

  async fn task_owners(&self, task_ids: &[String]) -> Result<HashMap<String, String>, Error> {
    let mut owners = HashMap::new();
    for task_id in task_ids {
      let owner: Option<(String,)> =
        sqlx::query_as("SELECT workflow_id FROM tasks WHERE task_id = ?")
          .bind(task_id)
          .fetch_optional(&self.pool)
          .await?;
      if let Some((workflow_id,)) = owner {
        owners.insert(task_id.clone(), workflow_id);
      }
    }
    Ok(owners)
  }

  async fn apply_sync(&self, plan: &SyncPlan) -> Result<(), Error> {
    let mut tx = self.pool.begin().await?;

    for task in &plan.upserts {
      sqlx::query(
        r#"
            INSERT INTO tasks (task_id, workflow_id, action, config, parent_id, branch_label)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (task_id) DO UPDATE
            SET action = excluded.action,
                config = excluded.config,
                parent_id = excluded.parent_id,
                branch_label = excluded.branch_label
            WHERE tasks.workflow_id = excluded.workflow_id
            "#,
      )
      .bind(&task.task_id)
      .bind(&plan.workflow_id)
      .bind(task.action.as_str())
      .bind(Json(&task.config))
      .bind(&task.parent_id)
      .bind(&task.branch_label)
      .execute(&mut *tx)
      .await?;
    }

    for task_id in &plan.deletes {
      sqlx::query("DELETE FROM tasks WHERE task_id = ? AND workflow_id = ?")
        .bind(task_id)
        .bind(&plan.workflow_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    debug!(
      workflow_id = %plan.workflow_id,
      upserted = plan.upserts.len(),
      deleted = plan.deletes.len(),
      "task tree synced"
    );
    Ok(())
  }

  async fn create_binding(&self, binding: &CampaignBinding) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO campaign_workflows (binding_id, campaign_id, workflow_id, trigger_kind, enable, count)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&binding.binding_id)
    .bind(&binding.campaign_id)
    .bind(&binding.workflow_id)
    .bind(binding.trigger.as_str())
    .bind(binding.enable)
    .bind(binding.count)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_binding(&self, binding_id: &str) -> Result<CampaignBinding, Error> {
    let row: Option<BindingRow> = sqlx::query_as(
      r#"
            SELECT binding_id, campaign_id, workflow_id, trigger_kind, enable, count
            FROM campaign_workflows
            WHERE binding_id = ?
            "#,
    )
    .bind(binding_id)
    .fetch_optional(&self.pool)
    .await?;

    row
      .ok_or_else(|| Error::NotFound(format!("binding {}", binding_id)))?
      .try_into()
  }

  async fn binding_for_campaign(
    &self,
    campaign_id: &str,
  ) -> Result<Option<CampaignBinding>, Error> {
    let row: Option<BindingRow> = sqlx::query_as(
      r#"
            SELECT binding_id, campaign_id, workflow_id, trigger_kind, enable, count
            FROM campaign_workflows
            WHERE campaign_id = ?
            "#,
    )
    .bind(campaign_id)
    .fetch_optional(&self.pool)
    .await?;

    row.map(CampaignBinding::try_from).transpose()
  }

  async fn binding_for_workflow(
    &self,
    workflow_id: &str,
  ) -> Result<Option<CampaignBinding>, Error> {
    let row: Option<BindingRow> = sqlx::query_as(
      r#"
            SELECT binding_id, campaign_id, workflow_id, trigger_kind, enable, count
            FROM campaign_workflows
            WHERE workflow_id = ?
            "#,
    )
    .bind(workflow_id)
    .fetch_optional(&self.pool)
    .await?;

    row.map(CampaignBinding::try_from).transpose()
  }

  async fn set_binding_enabled(&self, binding_id: &str, enable: bool) -> Result<(), Error> {
    let updated = sqlx::query("UPDATE campaign_workflows SET enable = ? WHERE binding_id = ?")
      .bind(enable)
      .bind(binding_id)
      .execute(&self.pool)
      .await?
      .rows_affected();

    if updated == 0 {
      return Err(Error::NotFound(format!("binding {}", binding_id)));
    }
    Ok(())
  }

  async fn delete_binding(&self, binding_id: &str) -> Result<(), Error> {
    let deleted = sqlx::query("DELETE FROM campaign_workflows WHERE binding_id = ?")
      .bind(binding_id)
      .execute(&self.pool)
      .await?
      .rows_affected();

    if deleted == 0 {
      return Err(Error::NotFound(format!("binding {}", binding_id)));
    }
    Ok(())
  }

  async fn increment_binding_count(&self, binding_id: &str) -> Result<(), Error> {
    let updated =
      sqlx::query("UPDATE campaign_workflows SET count = count + 1 WHERE binding_id = ?")
        .bind(binding_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

    if updated == 0 {
      return Err(Error::NotFound(format!("binding {}", binding_id)));
    }
    Ok(())
  }
}

#[async_trait]
impl QueueStore for SqliteStore {
  async fn create_entry(&self, entry: &QueueEntry) -> Result<(), Error> {
    sqlx::query(&format!(
      "INSERT INTO queue_entries ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
      ENTRY_COLUMNS
    ))
    .bind(&entry.id)
    .bind(&entry.task_id)
    .bind(&entry.task_parent_id)
    .bind(&entry.parent_queue_id)
    .bind(&entry.grand_parent_queue_id)
    .bind(&entry.task_action)
    .bind(&entry.task_pos)
    .bind(&entry.task_data)
    .bind(&entry.task_config)
    .bind(&entry.workflow_id)
    .bind(entry.status)
    .bind(&entry.result_obj)
    .bind(&entry.error_message)
    .bind(entry.retry_count)
    .bind(entry.trigger_at)
    .bind(entry.execute_at)
    .bind(entry.created_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_entry(&self, entry_id: &str) -> Result<QueueEntry, Error> {
    let entry: Option<QueueEntry> = sqlx::query_as(&format!(
      "SELECT {} FROM queue_entries WHERE id = ?",
      ENTRY_COLUMNS
    ))
    .bind(entry_id)
    .fetch_optional(&self.pool)
    .await?;

    entry.ok_or_else(|| Error::NotFound(format!("queue entry {}", entry_id)))
  }

  async fn claim_entry(&self, entry_id: &str, at: DateTime<Utc>) -> Result<bool, Error> {
    let claimed = sqlx::query(
      r#"
            UPDATE queue_entries
            SET execute_at = ?
            WHERE id = ? AND status = 'pending' AND execute_at IS NULL
            "#,
    )
    .bind(at)
    .bind(entry_id)
    .execute(&self.pool)
    .await?
    .rows_affected();

    Ok(claimed == 1)
  }

  async fn finish_entry(
    &self,
    entry_id: &str,
    outcome: &EntryOutcome,
    at: DateTime<Utc>,
  ) -> Result<(), Error> {
    let updated = sqlx::query(
      r#"
            UPDATE queue_entries
            SET status = ?, result_obj = ?, error_message = ?, execute_at = COALESCE(execute_at, ?)
            WHERE id = ? AND status = 'pending'
            "#,
    )
    .bind(outcome.status)
    .bind(outcome.result.as_ref().map(Json))
    .bind(&outcome.error_message)
    .bind(at)
    .bind(entry_id)
    .execute(&self.pool)
    .await?
    .rows_affected();

    if updated == 0 {
      // Distinguish a missing entry from one that already finished.
      self.get_entry(entry_id).await?;
      return Err(Error::AlreadyFinal(entry_id.to_string()));
    }
    Ok(())
  }

  async fn next_eligible_entry(&self, now: DateTime<Utc>) -> Result<Option<QueueEntry>, Error> {
    let entry = sqlx::query_as(&format!(
      "SELECT {} FROM queue_entries \
       WHERE status = 'pending' AND execute_at IS NULL AND trigger_at <= ? \
       ORDER BY trigger_at ASC, created_at ASC \
       LIMIT 1",
      ENTRY_COLUMNS
    ))
    .bind(now)
    .fetch_optional(&self.pool)
    .await?;

    Ok(entry)
  }

  async fn list_entries(&self, workflow_id: &str) -> Result<Vec<QueueEntry>, Error> {
    let entries = sqlx::query_as(&format!(
      "SELECT {} FROM queue_entries WHERE workflow_id = ? ORDER BY created_at ASC, rowid ASC",
      ENTRY_COLUMNS
    ))
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(entries)
  }
}

#[async_trait]
impl EnrolmentDirectory for SqliteStore {
  async fn get_enrolment(&self, enrolment_id: &str) -> Result<Enrolment, Error> {
    let enrolment: Option<Enrolment> =
      sqlx::query_as(&format!("{} WHERE e.enrolment_id = ?", ENROLMENT_SELECT))
        .bind(enrolment_id)
        .fetch_optional(&self.pool)
        .await?;

    enrolment.ok_or_else(|| Error::NotFound(format!("enrolment {}", enrolment_id)))
  }

  async fn list_active_enrolments(&self, campaign_id: &str) -> Result<Vec<Enrolment>, Error> {
    let enrolments = sqlx::query_as(&format!(
      "{} WHERE e.campaign_id = ? AND LOWER(e.status) <> 'rejected' ORDER BY e.rowid ASC",
      ENROLMENT_SELECT
    ))
    .bind(campaign_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(enrolments)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sqlite_file_path() {
    assert_eq!(
      sqlite_file_path("sqlite:///tmp/trellis/db.sqlite"),
      Some(PathBuf::from("/tmp/trellis/db.sqlite"))
    );
    assert_eq!(
      sqlite_file_path("sqlite:data.db?mode=rwc"),
      Some(PathBuf::from("data.db"))
    );
    assert_eq!(sqlite_file_path("sqlite::memory:"), None);
    assert_eq!(sqlite_file_path("postgres://localhost/db"), None);
  }
}
