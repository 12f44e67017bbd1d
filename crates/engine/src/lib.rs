//! Trace engine for tracelens
//!
//! This crate turns a trace file into a queryable in-memory index and
//! derives analytics from it:
//! - Index: sequential instruction store with coverage accumulators
//! - Loader: pull-based chunk loader with progress events
//! - Background: the loader on a worker thread
//! - Analytics: coverage ratio and heatmap color steps
//! - Export: canonical text lines and file dump
//! - Host: operations driving an external disassembler
//! - Registry: session-owned store of loaded traces

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analytics;
pub mod background;
pub mod export;
pub mod host;
pub mod index;
pub mod loader;
pub mod registry;
pub mod trace;
pub mod view;

pub use analytics::{compute_color_steps, coverage, rgb, Heatmap, COVERAGE_UNKNOWN, WHITE};
pub use background::{spawn_load, LoadHandle};
pub use export::{dump_to_path, parse_instruction_line, ExportOptions, TextExporter};
pub use host::{
    colorize_trace, disassemble_from_trace, heatmap_trace, routine_names, DisassemblyReport,
    HostCodeDatabase, InstructionCountOracle, WaveStop, TRACE_COLOR,
};
pub use index::TraceIndex;
pub use loader::{LoaderOptions, ProgressEvent, TraceLoader};
pub use registry::{TraceId, TraceRegistry};
pub use trace::{LoadStatus, Trace};
pub use view::{InstructionDetails, OperandRow, TraceSummary};
