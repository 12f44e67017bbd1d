//! Core types for tracelens
//!
//! This crate defines the data model shared by the decoder and the engine:
//! - Instruction records and their operand accesses
//! - Trace events (wave, exception, module, unknown)
//! - The error taxonomy for loading and querying traces

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod event;
pub mod types;

pub use error::{CorruptChunk, Result, TraceError};
pub use event::TraceEvent;
pub use types::{
    AccessKind, Address, InstructionRecord, Libcall, MemoryAccess, RegisterAccess, SeqId, Syscall,
};
