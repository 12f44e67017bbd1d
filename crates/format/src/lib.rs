//! Trace file format for tracelens
//!
//! A trace file is a sequence of length-prefixed chunks. Each chunk decodes
//! on its own:
//! - [`RecordDecoder`]: chunk bytes to instruction and event records
//! - [`ChunkEncoder`] / [`TraceWriter`]: records to chunk bytes
//! - [`wire`]: layout constants

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decode;
pub mod encode;
pub mod wire;

pub use decode::{DecodedChunk, RecordDecoder};
pub use encode::{ChunkEncoder, EncodeError, TraceWriter};
pub use wire::{CHUNK_PREFIX_LEN, DEFAULT_MAX_CHUNK_SIZE, PAYLOAD_HEADER_LEN};
