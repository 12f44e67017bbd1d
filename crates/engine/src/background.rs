//! Loading on a worker thread
//!
//! [`spawn_load`] opens the file on the calling thread (so a bad path fails
//! immediately) and drives the [`TraceLoader`] on a dedicated thread. The
//! caller receives [`ProgressEvent`]s over a channel and collects the trace
//! with [`LoadHandle::join`].
//!
//! Dropping or abandoning the handle closes the channel; the worker stops at
//! its next send and drops the loader, releasing the file.

use crate::loader::{LoaderOptions, ProgressEvent, TraceLoader};
use crate::trace::Trace;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};
use tracelens_core::{Result, TraceError};
use tracing::debug;

const WORKER_NAME: &str = "tracelens-loader";

/// Handle to a load running on a worker thread
pub struct LoadHandle {
    progress: Receiver<ProgressEvent>,
    worker: JoinHandle<Trace>,
}

/// Start loading a trace file on a worker thread
///
/// Fails with `InvalidTraceSource` before spawning if the path is not a
/// regular file.
pub fn spawn_load(path: impl AsRef<Path>, options: LoaderOptions) -> Result<LoadHandle> {
    let mut loader = TraceLoader::open(path, options)?;
    let (tx, rx) = mpsc::channel();

    let worker = thread::Builder::new()
        .name(WORKER_NAME.to_string())
        .spawn(move || {
            while let Some(step) = loader.next() {
                // errors are recorded in the trace status
                let Ok(progress) = step else { break };
                if tx.send(progress).is_err() {
                    debug!("Progress receiver dropped, stopping load");
                    break;
                }
            }
            loader.into_trace()
        })?;

    Ok(LoadHandle {
        progress: rx,
        worker,
    })
}

impl LoadHandle {
    /// Blocking iterator over progress events; ends when the worker stops
    pub fn progress(&self) -> impl Iterator<Item = ProgressEvent> + '_ {
        self.progress.iter()
    }

    /// Next progress event if one is ready
    ///
    /// Returns `None` both when nothing is pending and when the worker has
    /// stopped; use [`is_finished`](Self::is_finished) to tell them apart.
    pub fn try_progress(&self) -> Option<ProgressEvent> {
        match self.progress.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Check if the worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the worker and take the trace
    ///
    /// The trace carries its own [`LoadStatus`](crate::LoadStatus): a
    /// corrupt chunk does not make `join` fail.
    pub fn join(self) -> Result<Trace> {
        let LoadHandle { progress, worker } = self;
        // drain so the worker never sees a closed channel; ends when it exits
        for _ in progress.iter() {}
        worker.join().map_err(|_| TraceError::LoaderPanicked)
    }

    /// Stop the load and take whatever was decoded
    ///
    /// The worker finishes the chunk it is decoding, then stops; the trace
    /// is marked abandoned unless it had already reached the end.
    pub fn abandon(self) -> Result<Trace> {
        let LoadHandle { progress, worker } = self;
        drop(progress);
        worker.join().map_err(|_| TraceError::LoaderPanicked)
    }
}
