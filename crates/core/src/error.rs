//! Error types for trace decoding and querying
//!
//! | Error | Meaning | Recovery |
//! |-------|---------|----------|
//! | InvalidTraceSource | Path missing or not a regular file | Report, nothing loaded |
//! | CorruptChunk | Malformed chunk encoding | Chunk discarded whole |
//! | TraceLoadFailed | Loading stopped at a corrupt chunk | Earlier chunks stay queryable |
//! | LoadInterrupted | Loading stopped by a read error | Earlier chunks stay queryable |
//! | NotFound | No record at a sequence id | Treat as "no data" |

use crate::types::SeqId;
use std::path::PathBuf;
use thiserror::Error;

/// Reasons a chunk failed to decode
///
/// A corrupt chunk is never partially applied: none of its records reach
/// the index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorruptChunk {
    /// Buffer ended before a field was complete
    #[error("truncated at offset {offset}: need {needed} bytes, have {available}")]
    Truncated {
        /// Offset within the chunk where the read started
        offset: usize,
        /// Bytes the field required
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },

    /// Length prefix is unusable (zero-sized header, over the limit)
    #[error("bad length prefix {length}: {reason}")]
    BadLength {
        /// Declared payload length
        length: u64,
        /// Why the length was rejected
        reason: String,
    },

    /// Stored CRC32 does not match the payload
    #[error("checksum mismatch: stored {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum stored in the chunk header
        expected: u32,
        /// Checksum computed over the payload
        actual: u32,
    },

    /// Record tag byte is not an instruction or event
    #[error("unknown record tag {tag:#04x} at offset {offset}")]
    UnknownRecordTag {
        /// The tag byte
        tag: u8,
        /// Offset of the tag within the chunk
        offset: usize,
    },

    /// A field holds a value outside its domain
    #[error("invalid field `{field}` at offset {offset}: {reason}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Offset of the field within the chunk
        offset: usize,
        /// What was wrong with it
        reason: String,
    },

    /// Bytes remain after the declared record count
    #[error("{count} trailing bytes after the last record")]
    TrailingBytes {
        /// Number of unread bytes
        count: usize,
    },

    /// Events at the end of a chunk with no instruction to attach to
    #[error("{count} events have no following instruction in the chunk")]
    DanglingEvents {
        /// Number of orphaned events
        count: usize,
    },
}

/// Trace engine errors
#[derive(Debug, Error)]
pub enum TraceError {
    /// Path does not exist or is not a regular file
    #[error("invalid trace source {}: {reason}", path.display())]
    InvalidTraceSource {
        /// Path that was opened
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// A single chunk failed to decode
    #[error("corrupt chunk: {0}")]
    CorruptChunk(#[from] CorruptChunk),

    /// Loading stopped at a corrupt chunk
    ///
    /// Records from earlier chunks were kept.
    #[error("trace load failed at chunk {chunk_index} (file offset {offset}): {reason}")]
    TraceLoadFailed {
        /// Index of the chunk that failed
        chunk_index: u64,
        /// File offset of the chunk's length prefix
        offset: u64,
        /// Decoder failure
        #[source]
        reason: CorruptChunk,
    },

    /// Loading stopped by a read error or a rejected append
    ///
    /// Records from earlier chunks were kept.
    #[error("trace load interrupted at chunk {chunk_index}: {message}")]
    LoadInterrupted {
        /// Index of the chunk being read
        chunk_index: u64,
        /// What stopped the loader
        message: String,
    },

    /// Append would break sequence id contiguity
    #[error("sequence gap: expected id {expected}, found {found}")]
    SequenceGap {
        /// Next free sequence id
        expected: SeqId,
        /// Id carried by the offending record or event
        found: SeqId,
    },

    /// No instruction record at this sequence id
    #[error("no instruction at sequence id {0}")]
    NotFound(SeqId),

    /// Dump destination already exists
    #[error("dump target already exists: {}", .0.display())]
    DumpTargetExists(PathBuf),

    /// Background loader thread panicked
    #[error("loader thread panicked")]
    LoaderPanicked,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for trace operations
pub type Result<T> = std::result::Result<T, TraceError>;

impl TraceError {
    /// Create an invalid-source error
    pub fn invalid_source(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TraceError::InvalidTraceSource {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, TraceError::NotFound(_))
    }

    /// Check if this error came from a malformed chunk
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            TraceError::CorruptChunk(_) | TraceError::TraceLoadFailed { .. }
        )
    }

    /// Check if loading stopped early and left a partial trace
    pub fn is_partial_load(&self) -> bool {
        matches!(
            self,
            TraceError::TraceLoadFailed { .. } | TraceError::LoadInterrupted { .. }
        )
    }

    /// The decoder failure behind this error, if any
    pub fn corrupt_reason(&self) -> Option<&CorruptChunk> {
        match self {
            TraceError::CorruptChunk(reason) | TraceError::TraceLoadFailed { reason, .. } => {
                Some(reason)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_not_found_predicate() {
        assert!(TraceError::NotFound(4).is_not_found());
        assert!(!TraceError::LoaderPanicked.is_not_found());
    }

    #[test]
    fn test_load_failed_keeps_reason() {
        let reason = CorruptChunk::TrailingBytes { count: 3 };
        let err = TraceError::TraceLoadFailed {
            chunk_index: 2,
            offset: 128,
            reason: reason.clone(),
        };

        assert!(err.is_corrupt());
        assert_eq!(err.corrupt_reason(), Some(&reason));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("chunk 2"));
    }

    #[test]
    fn test_invalid_source_message() {
        let err = TraceError::invalid_source("/tmp/nope.trace", "does not exist");
        assert_eq!(
            err.to_string(),
            "invalid trace source /tmp/nope.trace: does not exist"
        );
        assert!(!err.is_corrupt());
    }
}
