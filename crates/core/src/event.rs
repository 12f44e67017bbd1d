//! Event records attached to sequence ids
//!
//! Events are markers emitted by the instrumentation tool between
//! instructions. An event stored at sequence id `k` is rendered before the
//! instruction at `k`.

use crate::types::Address;
use serde::{Deserialize, Serialize};

/// A trace event
///
/// Kinds the decoder does not recognise are kept as [`TraceEvent::Unknown`]
/// rather than rejected, so newer producers stay loadable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEvent {
    /// Start of a new execution wave
    WaveStart {
        /// Wave number
        wave: u32,
    },
    /// Exception raised by the traced program
    Exception {
        /// Exception type code
        kind: u32,
        /// Address of the handler that received it
        handler: Address,
    },
    /// Module mapped into the traced process
    ModuleLoad {
        /// Module name or path
        name: String,
    },
    /// Event kind this version does not understand
    Unknown {
        /// Raw kind byte from the wire
        kind: u8,
    },
}

impl TraceEvent {
    /// Stable tag used by the text dump
    pub fn tag(&self) -> &'static str {
        match self {
            TraceEvent::WaveStart { .. } => "wave",
            TraceEvent::Exception { .. } => "exception",
            TraceEvent::ModuleLoad { .. } => "module",
            TraceEvent::Unknown { .. } => "unknown",
        }
    }

    /// Wave number, if this is a wave start
    pub fn wave(&self) -> Option<u32> {
        match self {
            TraceEvent::WaveStart { wave } => Some(*wave),
            _ => None,
        }
    }

    /// Check if this is a wave start
    pub fn is_wave_start(&self) -> bool {
        matches!(self, TraceEvent::WaveStart { .. })
    }
}
