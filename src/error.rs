//! Unified error types for tracelens.
//!
//! This module wraps the engine's error taxonomy and presents a consistent
//! interface to users of the [`Session`](crate::Session) API.

use std::path::PathBuf;
use thiserror::Error;
use tracelens_core::{CorruptChunk, TraceError};
use tracelens_engine::TraceId;

/// All tracelens errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Trace path missing or not a regular file
    #[error("invalid trace source: {0}")]
    InvalidSource(String),

    /// A chunk failed to decode
    ///
    /// When raised by [`Session::load`](crate::Session::load), `trace` holds
    /// the id of the partially loaded trace, which stays registered.
    #[error("corrupt chunk {chunk_index} at offset {offset}: {reason}")]
    Corrupt {
        /// Registered partial trace, if any
        trace: Option<TraceId>,
        /// Chunk that failed
        chunk_index: u64,
        /// File offset of that chunk
        offset: u64,
        /// Decoder failure
        reason: CorruptChunk,
    },

    /// Loading stopped on a read error
    ///
    /// Like [`Error::Corrupt`], `trace` holds the id of the partial trace
    /// left registered by [`Session::load`](crate::Session::load).
    #[error("load interrupted at chunk {chunk_index}: {message}")]
    Interrupted {
        /// Registered partial trace, if any
        trace: Option<TraceId>,
        /// Chunk being read
        chunk_index: u64,
        /// What stopped the loader
        message: String,
    },

    /// Trace, instruction, or other entity not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Dump destination already exists
    #[error("refusing to overwrite {}", .0.display())]
    DumpTargetExists(PathBuf),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for tracelens operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if this is a corrupt-input error.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Error::Corrupt { .. })
    }

    /// Id of the partial trace left registered by a failed load.
    pub fn partial_trace(&self) -> Option<TraceId> {
        match self {
            Error::Corrupt { trace, .. } | Error::Interrupted { trace, .. } => *trace,
            _ => None,
        }
    }

    /// Check if this is a serious/unrecoverable error.
    pub fn is_serious(&self) -> bool {
        matches!(self, Error::Internal(_))
    }
}

// Convert from engine errors
impl From<TraceError> for Error {
    fn from(e: TraceError) -> Self {
        match e {
            TraceError::InvalidTraceSource { path, reason } => {
                Error::InvalidSource(format!("{}: {}", path.display(), reason))
            }
            TraceError::CorruptChunk(reason) => Error::Corrupt {
                trace: None,
                chunk_index: 0,
                offset: 0,
                reason,
            },
            TraceError::TraceLoadFailed {
                chunk_index,
                offset,
                reason,
            } => Error::Corrupt {
                trace: None,
                chunk_index,
                offset,
                reason,
            },
            TraceError::LoadInterrupted {
                chunk_index,
                message,
            } => Error::Interrupted {
                trace: None,
                chunk_index,
                message,
            },
            TraceError::NotFound(seq_id) => {
                Error::NotFound(format!("instruction at sequence id {}", seq_id))
            }
            TraceError::DumpTargetExists(path) => Error::DumpTargetExists(path),
            TraceError::Io(e) => Error::Io(e),
            e @ (TraceError::SequenceGap { .. } | TraceError::LoaderPanicked) => {
                Error::Internal(e.to_string())
            }
        }
    }
}
