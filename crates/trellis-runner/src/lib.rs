//! Trellis task runner.
//!
//! A [`TaskRunner`] maps each task's action tag to an [`ActionHandler`].
//! Handlers take the entry payload and the task config and return a
//! [`RunOutcome`]:
//!
//! - `result` is persisted on the queue entry
//! - `pos` picks a conditional child by branch label
//! - `modifier` delays the next entry by `trigger_delay` hours
//!
//! String values in task configs are minijinja templates rendered against
//! the payload.

pub mod actions;
mod config;
mod error;
mod outcome;
mod runner;
mod template;

pub use actions::{
  ActionHandler, Channel, DelayAction, DeliveryError, HttpAction, LogSender, Message,
  MessageAction, MessageSender, NoopAction,
};
pub use config::RunnerConfig;
pub use error::RunnerError;
pub use outcome::{DelayModifier, RunOutcome};
pub use runner::TaskRunner;
pub use template::{render, render_value};
