//! Session entry point for tracelens.
//!
//! A [`Session`] owns the traces a user has loaded. It is the explicit
//! replacement for a global trace table: traces enter with
//! [`load`](Session::load) and leave with [`unload`](Session::unload).

use crate::error::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tracelens_core::TraceError;
use tracelens_engine::{
    dump_to_path, spawn_load, ExportOptions, InstructionCountOracle, LoadHandle, LoaderOptions,
    ProgressEvent, Trace, TraceId, TraceLoader, TraceRegistry, TraceSummary,
};

/// A set of loaded traces sharing one loader configuration.
///
/// # Example
///
/// ```ignore
/// use tracelens::prelude::*;
///
/// let session = Session::new();
/// let id = session.load("run.trace")?;
/// let trace = session.get(id)?;
/// println!("{}", session.summary(id, &binary_instruction_count)?);
/// session.unload(id)?;
/// ```
#[derive(Debug, Default)]
pub struct Session {
    registry: TraceRegistry,
    options: LoaderOptions,
}

impl Session {
    /// Create a session with default loader options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for session configuration.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Loader options used by this session.
    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Load a trace file and register it.
    ///
    /// If a chunk is corrupt or unreadable, the chunks before it are still
    /// registered and the returned [`Error::Corrupt`] or
    /// [`Error::Interrupted`] carries the new trace id.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<TraceId> {
        self.load_with_progress(path, |_| {})
    }

    /// Load a trace file, calling `on_progress` after every chunk.
    pub fn load_with_progress<F>(&self, path: impl AsRef<Path>, mut on_progress: F) -> Result<TraceId>
    where
        F: FnMut(&ProgressEvent),
    {
        let mut loader = TraceLoader::open(path, self.options.clone())?;
        for progress in loader.by_ref() {
            match progress {
                Ok(progress) => on_progress(&progress),
                Err(_) => break,
            }
        }
        self.register(loader.into_trace())
    }

    /// Start loading on a worker thread.
    ///
    /// Pass the joined trace to [`register`](Self::register) when done.
    pub fn spawn_load(&self, path: impl AsRef<Path>) -> Result<LoadHandle> {
        Ok(spawn_load(path, self.options.clone())?)
    }

    /// Register an already loaded trace.
    ///
    /// Fails like [`load`](Self::load) if the trace stopped at a corrupt
    /// chunk or a read error; the trace is registered either way and the
    /// error carries its id.
    pub fn register(&self, trace: Trace) -> Result<TraceId> {
        let outcome = trace.load_result();
        let id = self.registry.add(trace);
        match outcome {
            Ok(()) => Ok(id),
            Err(TraceError::TraceLoadFailed {
                chunk_index,
                offset,
                reason,
            }) => Err(Error::Corrupt {
                trace: Some(id),
                chunk_index,
                offset,
                reason,
            }),
            Err(TraceError::LoadInterrupted {
                chunk_index,
                message,
            }) => Err(Error::Interrupted {
                trace: Some(id),
                chunk_index,
                message,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Get a registered trace.
    pub fn get(&self, id: TraceId) -> Result<Arc<Trace>> {
        self.registry
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("trace {}", id)))
    }

    /// Unregister a trace.
    ///
    /// Readers still holding the `Arc` keep a valid trace.
    pub fn unload(&self, id: TraceId) -> Result<()> {
        self.registry
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("trace {}", id)))
    }

    /// Ids of every registered trace.
    pub fn ids(&self) -> Vec<TraceId> {
        self.registry.ids()
    }

    /// Number of registered traces.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Check if no trace is registered.
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Summary of a registered trace.
    pub fn summary<O: InstructionCountOracle + ?Sized>(
        &self,
        id: TraceId,
        oracle: &O,
    ) -> Result<TraceSummary> {
        Ok(TraceSummary::new(&*self.get(id)?, oracle))
    }

    /// Dump a registered trace to a new file, returning the line count.
    pub fn dump(&self, id: TraceId, path: impl AsRef<Path>, options: ExportOptions) -> Result<u64> {
        Ok(dump_to_path(&*self.get(id)?, path, options)?)
    }
}

/// Builder for [`Session`].
#[derive(Debug, Default)]
pub struct SessionBuilder {
    options: LoaderOptions,
}

impl SessionBuilder {
    /// Replace all loader options.
    pub fn loader_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Enable or disable chunk checksum verification.
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.options.verify_checksums = verify;
        self
    }

    /// Largest chunk payload accepted, in bytes.
    pub fn max_chunk_size(mut self, max: u32) -> Self {
        self.options.max_chunk_size = max;
        self
    }

    /// Build the session.
    pub fn build(self) -> Session {
        Session {
            registry: TraceRegistry::new(),
            options: self.options,
        }
    }
}
