//! Shared service state.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::PageRevisionEngine;
use crate::store::PageStore;

/// Shared service state.
///
/// Holds the revision engine; cloning is cheap.
pub struct ServiceState<S: PageStore + 'static> {
    /// The engine every handler dispatches into.
    pub engine: PageRevisionEngine<S>,
}

impl<S: PageStore + 'static> ServiceState<S> {
    /// Create service state around a configured engine.
    pub fn new(engine: PageRevisionEngine<S>) -> Self {
        Self { engine }
    }

    /// Create service state with the default compiler and access policy.
    pub fn from_store(store: S, config: EngineConfig) -> Self {
        Self::new(PageRevisionEngine::new(Arc::new(store), config))
    }

    /// Create service state with configuration read from the environment.
    pub fn from_env(store: S) -> Self {
        Self::from_store(store, EngineConfig::from_env())
    }
}

impl<S: PageStore + 'static> Clone for ServiceState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}
