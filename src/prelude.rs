//! Convenient imports for tracelens.
//!
//! ```ignore
//! use tracelens::prelude::*;
//!
//! let session = Session::new();
//! let id = session.load("run.trace")?;
//! ```

// Main entry point
pub use crate::session::{Session, SessionBuilder};

// Error handling
pub use crate::error::{Error, Result};

// Records and events
pub use tracelens_core::{
    AccessKind, Address, InstructionRecord, Libcall, MemoryAccess, RegisterAccess, SeqId,
    Syscall, TraceEvent,
};

// Loading
pub use tracelens_engine::{
    spawn_load, LoadHandle, LoadStatus, LoaderOptions, ProgressEvent, Trace, TraceId,
    TraceIndex, TraceLoader,
};

// Analytics and export
pub use tracelens_engine::{
    compute_color_steps, coverage, ExportOptions, Heatmap, TextExporter, TraceSummary,
};

// Host integration
pub use tracelens_engine::{HostCodeDatabase, InstructionCountOracle};
