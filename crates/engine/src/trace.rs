//! A loaded trace
//!
//! [`Trace`] couples a [`TraceIndex`] with where it came from and how its
//! load ended. Only the loader mutates a trace; once handed out it is
//! read-only and can be shared behind an `Arc`.

use crate::index::TraceIndex;
use std::path::{Path, PathBuf};
use tracelens_core::{CorruptChunk, InstructionRecord, Result, SeqId, TraceError, TraceEvent};

/// How loading of a trace ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// Loader still running
    Loading,
    /// Every chunk decoded
    Complete,
    /// Stopped at a corrupt chunk; earlier chunks are kept
    Failed {
        /// Chunk that failed to decode
        chunk_index: u64,
        /// File offset of that chunk
        offset: u64,
        /// Decoder failure
        reason: CorruptChunk,
    },
    /// Stopped by a read error or a rejected append; earlier chunks are kept
    Interrupted {
        /// Chunk being read
        chunk_index: u64,
        /// Error message
        message: String,
    },
    /// Consumer stopped before the end of the file
    Abandoned {
        /// Chunks decoded before stopping
        chunks_loaded: u64,
    },
}

impl LoadStatus {
    /// Check if the whole file was loaded
    pub fn is_complete(&self) -> bool {
        matches!(self, LoadStatus::Complete)
    }

    /// Check if loading stopped on an error
    pub fn is_failed(&self) -> bool {
        matches!(self, LoadStatus::Failed { .. } | LoadStatus::Interrupted { .. })
    }
}

/// An execution trace loaded from one file
#[derive(Debug)]
pub struct Trace {
    path: PathBuf,
    index: TraceIndex,
    status: LoadStatus,
    chunks_loaded: u64,
    bytes_loaded: u64,
}

impl Trace {
    pub(crate) fn new(path: PathBuf) -> Self {
        Trace {
            path,
            index: TraceIndex::new(),
            status: LoadStatus::Loading,
            chunks_loaded: 0,
            bytes_loaded: 0,
        }
    }

    /// Build a trace around an index that was filled elsewhere
    pub fn from_index(path: impl Into<PathBuf>, index: TraceIndex) -> Self {
        Trace {
            path: path.into(),
            index,
            status: LoadStatus::Complete,
            chunks_loaded: 0,
            bytes_loaded: 0,
        }
    }

    pub(crate) fn index_mut(&mut self) -> &mut TraceIndex {
        &mut self.index
    }

    pub(crate) fn record_chunk(&mut self, bytes: u64) {
        self.chunks_loaded += 1;
        self.bytes_loaded += bytes;
    }

    pub(crate) fn set_status(&mut self, status: LoadStatus) {
        self.status = status;
    }

    /// File the trace was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name component of the path
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// The instruction index
    pub fn index(&self) -> &TraceIndex {
        &self.index
    }

    /// How loading ended
    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    /// Check if the whole file was loaded
    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    /// Chunks decoded into this trace
    pub fn chunks_loaded(&self) -> u64 {
        self.chunks_loaded
    }

    /// File bytes consumed by decoded chunks
    pub fn bytes_loaded(&self) -> u64 {
        self.bytes_loaded
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the trace holds no instructions
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Instruction at a sequence id
    pub fn get(&self, seq_id: SeqId) -> Result<&InstructionRecord> {
        self.index.get(seq_id)
    }

    /// Events emitted before the instruction at `seq_id`
    pub fn events_at(&self, seq_id: SeqId) -> &[TraceEvent] {
        self.index.events_at(seq_id)
    }

    /// Error for a failed load, or `Ok` for complete and abandoned loads
    pub fn load_result(&self) -> Result<()> {
        match &self.status {
            LoadStatus::Failed {
                chunk_index,
                offset,
                reason,
            } => Err(TraceError::TraceLoadFailed {
                chunk_index: *chunk_index,
                offset: *offset,
                reason: reason.clone(),
            }),
            LoadStatus::Interrupted {
                chunk_index,
                message,
            } => Err(TraceError::LoadInterrupted {
                chunk_index: *chunk_index,
                message: message.clone(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_path() {
        let trace = Trace::new(PathBuf::from("/tmp/runs/sample.trace"));
        assert_eq!(trace.name(), "sample.trace");
        assert_eq!(trace.status(), &LoadStatus::Loading);
        assert!(trace.is_empty());
    }

    #[test]
    fn test_load_result_reports_failure() {
        let mut trace = Trace::new(PathBuf::from("x.trace"));
        trace.set_status(LoadStatus::Failed {
            chunk_index: 1,
            offset: 40,
            reason: CorruptChunk::DanglingEvents { count: 1 },
        });

        assert!(trace.status().is_failed());
        let err = trace.load_result().unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_load_result_reports_interruption() {
        let mut trace = Trace::new(PathBuf::from("x.trace"));
        trace.set_status(LoadStatus::Interrupted {
            chunk_index: 2,
            message: "Input/output error (os error 5)".into(),
        });

        let err = trace.load_result().unwrap_err();
        assert!(matches!(err, TraceError::LoadInterrupted { chunk_index: 2, .. }));
        assert_eq!(
            err.to_string(),
            "trace load interrupted at chunk 2: Input/output error (os error 5)"
        );
    }

    #[test]
    fn test_abandoned_is_not_an_error() {
        let mut trace = Trace::new(PathBuf::from("x.trace"));
        trace.set_status(LoadStatus::Abandoned { chunks_loaded: 3 });
        assert!(trace.load_result().is_ok());
        assert!(!trace.is_complete());
    }
}
