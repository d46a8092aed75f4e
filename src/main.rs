use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trellis_engine::{Engine, EngineConfig};
use trellis_runner::{LogSender, RunnerConfig, TaskRunner};
use trellis_store::{QueueStore, SqliteStore, TaskStore};
use trellis_workflow::{CampaignBinding, TaskSubmission, TriggerKind, Workflow};

/// Trellis - campaign workflows as branching task trees
#[derive(Parser)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.trellis)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Database URL (default: sqlite://<data_dir>/trellis.db)
  #[arg(long, global = true, env = "TRELLIS_DATABASE_URL")]
  database_url: Option<String>,

  /// Seconds between poll ticks
  #[arg(long, global = true, default_value_t = 60)]
  poll_interval_secs: u64,

  /// Timeout for call-external-api tasks, in seconds
  #[arg(long, global = true, default_value_t = 30)]
  http_timeout_secs: u64,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Apply database migrations
  Migrate,

  /// Create, list and delete workflows
  Workflow {
    #[command(subcommand)]
    command: WorkflowCommand,
  },

  /// Edit a workflow's task tree
  Tasks {
    #[command(subcommand)]
    command: TasksCommand,
  },

  /// Attach workflows to campaigns
  Binding {
    #[command(subcommand)]
    command: BindingCommand,
  },

  /// Fire a workflow
  Trigger {
    #[command(subcommand)]
    command: TriggerCommand,
  },

  /// Run delayed entries as they become due
  Poll {
    /// Run a single tick and exit
    #[arg(long)]
    once: bool,
  },

  /// Inspect queue entries
  Entries {
    #[command(subcommand)]
    command: EntriesCommand,
  },
}

#[derive(Subcommand)]
enum WorkflowCommand {
  Create {
    name: String,

    /// Workflow ID (default: generated)
    #[arg(long)]
    id: Option<String>,

    #[arg(long)]
    vendor: Option<String>,

    #[arg(long)]
    created_by: Option<String>,
  },
  List,
  Show {
    workflow_id: String,
  },
  Delete {
    workflow_id: String,
  },
}

#[derive(Subcommand)]
enum TasksCommand {
  /// Replace the tree with a JSON array of tasks
  Sync {
    workflow_id: String,

    /// Path to the JSON file (default: stdin)
    file: Option<PathBuf>,
  },
  List {
    workflow_id: String,
  },
}

#[derive(Subcommand)]
enum BindingCommand {
  Create {
    workflow_id: String,
    campaign_id: String,

    /// Create the binding disabled
    #[arg(long)]
    disabled: bool,
  },
  Show {
    binding_id: String,
  },
  Enable {
    binding_id: String,
  },
  Disable {
    binding_id: String,
  },
  Delete {
    binding_id: String,
  },
}

#[derive(Subcommand)]
enum TriggerCommand {
  /// Dispatch the roots bound to an enrolment's campaign
  Enrolment { enrolment_id: String },

  /// Dispatch a binding for every eligible enrolment
  Campaign { binding_id: String },
}

#[derive(Subcommand)]
enum EntriesCommand {
  List { workflow_id: String },
  Show { entry_id: String },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
    .with_writer(io::stderr)
    .init();

  let Some(command) = cli.command else {
    println!("trellis - use --help to see available commands");
    return Ok(());
  };

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".trellis"),
  };
  let database_url = cli
    .database_url
    .unwrap_or_else(|| format!("sqlite://{}", data_dir.join("trellis.db").display()));

  let engine_config = EngineConfig {
    poll_interval: Duration::from_secs(cli.poll_interval_secs),
    ..EngineConfig::default()
  };
  let runner_config = RunnerConfig {
    http_timeout: Duration::from_secs(cli.http_timeout_secs),
    ..RunnerConfig::default()
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run(command, &database_url, engine_config, runner_config).await })
}

async fn run(
  command: Commands,
  database_url: &str,
  engine_config: EngineConfig,
  runner_config: RunnerConfig,
) -> Result<()> {
  let store = SqliteStore::connect(database_url)
    .await
    .with_context(|| format!("failed to open database: {}", database_url))?;
  store
    .migrate()
    .await
    .context("failed to apply migrations")?;

  let runner = TaskRunner::with_defaults(&runner_config, Arc::new(LogSender))
    .context("failed to build task runner")?;
  let engine = Engine::new(Arc::new(store), Arc::new(runner), engine_config);
  let store = engine.store();

  match command {
    Commands::Migrate => {
      eprintln!("Migrations applied to {}", database_url);
    }

    Commands::Workflow { command } => match command {
      WorkflowCommand::Create {
        name,
        id,
        vendor,
        created_by,
      } => {
        let workflow = Workflow {
          workflow_id: id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
          name,
          vendor_id: vendor,
          created_by,
        };
        store
          .create_workflow(&workflow)
          .await
          .context("failed to create workflow")?;
        print_json(&workflow)?;
      }
      WorkflowCommand::List => {
        print_json(&store.list_workflows().await?)?;
      }
      WorkflowCommand::Show { workflow_id } => {
        let workflow = store.get_workflow(&workflow_id).await?;
        let tasks = store.list_tasks(&workflow_id).await?;
        let binding = store.binding_for_workflow(&workflow_id).await?;
        print_json(&json!({
          "workflow": workflow,
          "tasks": tasks,
          "binding": binding,
        }))?;
      }
      WorkflowCommand::Delete { workflow_id } => {
        store
          .delete_workflow(&workflow_id)
          .await
          .with_context(|| format!("failed to delete workflow '{}'", workflow_id))?;
        eprintln!("Deleted workflow {}", workflow_id);
      }
    },

    Commands::Tasks { command } => match command {
      TasksCommand::Sync { workflow_id, file } => {
        let submitted = read_submissions(file)?;
        let plan = engine
          .sync_tasks(&workflow_id, &submitted)
          .await
          .context("failed to sync tasks")?;
        eprintln!(
          "Synced {} tasks ({} created, {} deleted)",
          plan.upserts.len(),
          plan.created.len(),
          plan.deletes.len()
        );
        print_json(&plan)?;
      }
      TasksCommand::List { workflow_id } => {
        print_json(&store.list_tasks(&workflow_id).await?)?;
      }
    },

    Commands::Binding { command } => match command {
      BindingCommand::Create {
        workflow_id,
        campaign_id,
        disabled,
      } => {
        let binding = CampaignBinding {
          binding_id: uuid::Uuid::new_v4().to_string(),
          campaign_id,
          workflow_id,
          trigger: TriggerKind::OnEnrolment,
          enable: !disabled,
          count: 0,
        };
        store
          .create_binding(&binding)
          .await
          .context("failed to bind workflow")?;
        print_json(&binding)?;
      }
      BindingCommand::Show { binding_id } => {
        print_json(&store.get_binding(&binding_id).await?)?;
      }
      BindingCommand::Enable { binding_id } => {
        store.set_binding_enabled(&binding_id, true).await?;
        eprintln!("Enabled binding {}", binding_id);
      }
      BindingCommand::Disable { binding_id } => {
        store.set_binding_enabled(&binding_id, false).await?;
        eprintln!("Disabled binding {}", binding_id);
      }
      BindingCommand::Delete { binding_id } => {
        store.delete_binding(&binding_id).await?;
        eprintln!("Deleted binding {}", binding_id);
      }
    },

    Commands::Trigger { command } => match command {
      TriggerCommand::Enrolment { enrolment_id } => {
        let dispatched = engine
          .trigger_by_enrolment(&enrolment_id)
          .await
          .context("enrolment trigger failed")?;
        print_json(&json!({ "enrolment_id": enrolment_id, "roots": dispatched }))?;
      }
      TriggerCommand::Campaign { binding_id } => {
        let report = engine
          .trigger_by_campaign(&binding_id)
          .await
          .context("campaign trigger failed")?;
        print_json(&report)?;
      }
    },

    Commands::Poll { once } => {
      if once {
        let report = engine.poll_once().await.context("poll tick failed")?;
        print_json(&report)?;
      } else {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
          if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
          }
        });
        engine.run(cancel).await;
        info!("poller stopped");
      }
    }

    Commands::Entries { command } => match command {
      EntriesCommand::List { workflow_id } => {
        print_json(&store.list_entries(&workflow_id).await?)?;
      }
      EntriesCommand::Show { entry_id } => {
        print_json(&store.get_entry(&entry_id).await?)?;
      }
    },
  }

  Ok(())
}

/// Read a JSON array of task submissions from a file, or stdin.
fn read_submissions(file: Option<PathBuf>) -> Result<Vec<TaskSubmission>> {
  let content = match file {
    Some(path) => std::fs::read_to_string(&path)
      .with_context(|| format!("failed to read task file: {}", path.display()))?,
    None => {
      let mut input = String::new();
      io::stdin()
        .read_to_string(&mut input)
        .context("failed to read tasks from stdin")?;
      input
    }
  };

  serde_json::from_str(&content).context("failed to parse tasks as a JSON array")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
