//! The trellis engine.
//!
//! [`Engine`] bundles a store, a [`Dispatcher`] and the poller settings.
//! Trigger entry points, the poller and the task-tree editor are
//! implemented on it in their own modules.

use std::sync::Arc;

use trellis_runner::TaskRunner;

use crate::Store;
use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;

pub struct Engine<S> {
  dispatcher: Dispatcher<S>,
  config: EngineConfig,
}

impl<S> Clone for Engine<S> {
  fn clone(&self) -> Self {
    Self {
      dispatcher: self.dispatcher.clone(),
      config: self.config.clone(),
    }
  }
}

impl<S: Store> Engine<S> {
  pub fn new(store: Arc<S>, runner: Arc<TaskRunner>, config: EngineConfig) -> Self {
    Self {
      dispatcher: Dispatcher::new(store, runner),
      config,
    }
  }

  pub fn dispatcher(&self) -> &Dispatcher<S> {
    &self.dispatcher
  }

  pub fn store(&self) -> &Arc<S> {
    self.dispatcher.store()
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }
}
