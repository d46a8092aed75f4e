//! Trellis Workflow
//!
//! Definition-side types for trellis: workflows, their task forests and the
//! campaign bindings that fire them.
//!
//! - [`TaskTree`] is an id-indexed arena over a workflow's task rows.
//! - [`resolve_next`] decides which task follows a completed one.
//! - [`plan_sync`] turns a submitted tree into the writes that apply it.

pub mod duration_secs;
mod error;
mod resolver;
mod sync;
mod task;
mod tree;
mod workflow;

pub use error::WorkflowError;
pub use resolver::{NextTask, resolve_next};
pub use sync::{SyncPlan, TaskSubmission, plan_sync};
pub use task::{Action, TaskNode};
pub use tree::TaskTree;
pub use workflow::{CampaignBinding, TriggerKind, Workflow};
