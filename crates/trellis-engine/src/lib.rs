//! Trellis Engine
//!
//! Drives task trees through the queue.
//!
//! ```text
//! trigger_by_enrolment / trigger_by_campaign      poll_once / run
//!                 │                                      │
//!                 ▼                                      ▼
//!        Dispatcher::dispatch ───────────────► Dispatcher::run_entry
//!                 │  create entry                        │
//!                 ▼                                      │
//!     claim ─► TaskRunner::run ─► finish ─► resolve_next ┘
//!                                              │
//!                                              ▼
//!                              next entry, or stop when delayed
//! ```

mod config;
mod dispatcher;
mod editor;
mod engine;
mod error;
mod poller;
mod trigger;

use trellis_store::{EnrolmentDirectory, QueueStore, TaskStore};

pub use config::EngineConfig;
pub use dispatcher::{ChainReport, DispatchMeta, Dispatcher};
pub use engine::Engine;
pub use error::{EngineError, PreconditionError};
pub use poller::PollReport;
pub use trigger::{CampaignTrigger, enrolment_payload};

/// Everything the engine reads and writes.
pub trait Store: TaskStore + QueueStore + EnrolmentDirectory + 'static {}

impl<T: TaskStore + QueueStore + EnrolmentDirectory + 'static> Store for T {}
