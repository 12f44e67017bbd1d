//! Session-owned store of loaded traces
//!
//! A [`TraceRegistry`] belongs to one application session. Traces enter it
//! with [`add`](TraceRegistry::add) once loading has finished and leave with
//! [`remove`](TraceRegistry::remove); there is no process-wide registry.
//! Handed-out traces are `Arc`s, so a removed trace stays readable until its
//! last reader drops it.

use crate::trace::Trace;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Opaque identifier of a trace within a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(Uuid);

impl TraceId {
    /// Create a new random TraceId using UUID v4
    ///
    /// # Examples
    ///
    /// ```
    /// use tracelens_engine::registry::TraceId;
    ///
    /// assert_ne!(TraceId::new(), TraceId::new());
    /// ```
    pub fn new() -> Self {
        TraceId(Uuid::new_v4())
    }

    /// Get raw bytes representation
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Loaded traces of one session, keyed by [`TraceId`]
///
/// Safe to share between threads; readers never block each other.
#[derive(Debug, Default)]
pub struct TraceRegistry {
    traces: RwLock<FxHashMap<TraceId, Arc<Trace>>>,
}

impl TraceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a trace and return its new id
    pub fn add(&self, trace: Trace) -> TraceId {
        let id = TraceId::new();
        info!("Registered trace {} as {}", trace.name(), id);
        self.traces.write().insert(id, Arc::new(trace));
        id
    }

    /// Look up a trace
    pub fn get(&self, id: TraceId) -> Option<Arc<Trace>> {
        self.traces.read().get(&id).cloned()
    }

    /// Unregister a trace, returning it if it was present
    pub fn remove(&self, id: TraceId) -> Option<Arc<Trace>> {
        let removed = self.traces.write().remove(&id);
        match &removed {
            Some(trace) => info!("Unloaded trace {} ({})", trace.name(), id),
            None => debug!("Unload of unknown trace {}", id),
        }
        removed
    }

    /// Check if an id is registered
    pub fn contains(&self, id: TraceId) -> bool {
        self.traces.read().contains_key(&id)
    }

    /// Ids of all registered traces, in no particular order
    pub fn ids(&self) -> Vec<TraceId> {
        self.traces.read().keys().copied().collect()
    }

    /// Number of registered traces
    pub fn len(&self) -> usize {
        self.traces.read().len()
    }

    /// Check if no trace is registered
    pub fn is_empty(&self) -> bool {
        self.traces.read().is_empty()
    }
}
