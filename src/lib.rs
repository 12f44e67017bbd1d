//! # tracelens
//!
//! Streaming engine for recorded execution traces.
//!
//! A trace file is a sequence of independently decodable chunks. tracelens
//! loads it chunk by chunk into a randomly addressable instruction index,
//! tracks address coverage and hit counts while loading, and derives
//! coverage ratios, heatmap colors, and a canonical text dump from it.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tracelens::prelude::*;
//!
//! let session = Session::new();
//! let id = session.load("run.trace")?;
//! let trace = session.get(id)?;
//!
//! let record = trace.get(0)?;
//! println!("{:#x} {}", record.address, record.opcode);
//! println!("{}", session.summary(id, &4096u64)?);
//! ```
//!
//! ## Layers
//!
//! | Crate | Contents |
//! |-------|----------|
//! | `tracelens-core` | records, events, error taxonomy |
//! | `tracelens-format` | chunk decoder and encoder |
//! | `tracelens-engine` | index, loader, analytics, export, host operations |
//!
//! Lower-level access (pull-based loading, custom hosts) goes through the
//! re-exported crates.

#![warn(missing_docs)]

mod error;
mod session;

pub mod prelude;

pub use error::{Error, Result};
pub use session::{Session, SessionBuilder};

pub use tracelens_core;
pub use tracelens_engine;
pub use tracelens_format;
