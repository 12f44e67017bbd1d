//! Operations that annotate a host code database from a trace
//!
//! The engine never disassembles anything itself. A disassembler front end
//! implements [`HostCodeDatabase`] and these functions drive it from a
//! loaded [`Trace`]:
//!
//! | Operation | Host calls |
//! |-----------|-----------|
//! | [`disassemble_from_trace`] | `is_address_decoded`, `decode_at`, `comment_at` |
//! | [`colorize_trace`] | `is_address_decoded`, `set_display_color` |
//! | [`heatmap_trace`] | `is_address_decoded`, `set_display_color` |
//! | [`routine_names`] | `function_name_at` |
//!
//! Painting touches each distinct address once, in ascending order.

use crate::analytics::{Heatmap, WHITE};
use crate::trace::Trace;
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracelens_core::{Address, SeqId};
use tracing::{debug, info, warn};

/// Color used to mark executed instructions
pub const TRACE_COLOR: u32 = 0x98_FF_98;

/// Code database of the host disassembler
pub trait HostCodeDatabase {
    /// Check if the host already treats `address` as an instruction
    fn is_address_decoded(&self, address: Address) -> bool;

    /// Ask the host to decode an instruction at `address`
    ///
    /// Returns `false` if the host could not decode it.
    fn decode_at(&mut self, address: Address) -> bool;

    /// Set the background color of the item at `address`
    fn set_display_color(&mut self, address: Address, color: u32);

    /// Attach a comment to `address`
    fn comment_at(&mut self, address: Address, text: &str);

    /// Name of the function containing `address`, if any
    fn function_name_at(&self, address: Address) -> Option<String>;
}

/// Source of the instruction count of the analysed binary
pub trait InstructionCountOracle {
    /// Total number of instructions in the binary
    fn total_instructions_in_binary(&self) -> u64;
}

impl InstructionCountOracle for u64 {
    fn total_instructions_in_binary(&self) -> u64 {
        *self
    }
}

/// Where a disassembly pass stopped on a wave boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaveStop {
    /// Wave number from the event
    pub wave: u32,
    /// Sequence id the event is attached to
    pub seq_id: SeqId,
    /// Address of the instruction at that id
    pub address: Address,
}

/// Outcome of [`disassemble_from_trace`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisassemblyReport {
    /// Addresses the host decoded on request
    pub decoded: Vec<Address>,
    /// Addresses the host failed to decode
    pub failed: Vec<Address>,
    /// Instructions visited that were already decoded
    pub already_decoded: usize,
    /// Set if the pass stopped at a wave start
    pub stopped_at: Option<WaveStop>,
}

impl DisassemblyReport {
    /// Check if every visited address was already decoded
    pub fn nothing_to_do(&self) -> bool {
        self.decoded.is_empty() && self.failed.is_empty()
    }
}

/// Make the host decode every address executed in the first wave
///
/// Instructions are walked in sequence order. At the first wave-start event
/// the pass stops and the instruction before it is commented with
/// `Jump into Wave N`. Each undecoded address is submitted once.
pub fn disassemble_from_trace<H: HostCodeDatabase + ?Sized>(
    trace: &Trace,
    host: &mut H,
) -> DisassemblyReport {
    let index = trace.index();
    let mut report = DisassemblyReport::default();
    let mut attempted = FxHashSet::default();

    for (record, events) in index.iter_with_events() {
        if let Some(wave) = events.iter().find_map(|e| e.wave()) {
            info!(
                "Wave {} encountered at ({}, {:#x}), stopping",
                wave, record.seq_id, record.address
            );
            if let Some(prev) = record.seq_id.checked_sub(1).and_then(|id| index.get(id).ok()) {
                host.comment_at(prev.address, &format!("Jump into Wave {}", wave));
            }
            report.stopped_at = Some(WaveStop {
                wave,
                seq_id: record.seq_id,
                address: record.address,
            });
            return report;
        }

        if host.is_address_decoded(record.address) {
            report.already_decoded += 1;
            continue;
        }
        if !attempted.insert(record.address) {
            continue;
        }

        debug!("Address {:#x} not decoded as an instruction", record.address);
        if host.decode_at(record.address) {
            debug!("Instruction decoded at {:#x}", record.address);
            report.decoded.push(record.address);
        } else {
            warn!("Failed to decode at {:#x}", record.address);
            report.failed.push(record.address);
        }
    }

    if report.nothing_to_do() {
        info!("All instructions of {} are already decoded", trace.name());
    } else {
        info!(
            "Disassembly from {}: {} decoded, {} failed",
            trace.name(),
            report.decoded.len(),
            report.failed.len()
        );
    }
    report
}

/// Paint every decoded executed address with [`TRACE_COLOR`], or reset it
///
/// Returns the number of addresses painted.
pub fn colorize_trace<H: HostCodeDatabase + ?Sized>(trace: &Trace, host: &mut H, on: bool) -> usize {
    let color = if on { TRACE_COLOR } else { WHITE };
    paint(trace, host, |_| color)
}

/// Paint every decoded executed address by its hit count, or reset it
///
/// Returns the number of addresses painted.
pub fn heatmap_trace<H: HostCodeDatabase + ?Sized>(trace: &Trace, host: &mut H, on: bool) -> usize {
    if !on {
        return paint(trace, host, |_| WHITE);
    }
    let heatmap = Heatmap::from_index(trace.index());
    debug!("Heatmap steps: {:?}", heatmap.steps());
    paint(trace, host, |address| heatmap.color_of(address))
}

fn paint<H, F>(trace: &Trace, host: &mut H, color_of: F) -> usize
where
    H: HostCodeDatabase + ?Sized,
    F: Fn(Address) -> u32,
{
    let mut addresses: Vec<Address> = trace.index().addresses_covered().collect();
    addresses.sort_unstable();

    let mut painted = 0;
    for address in addresses {
        if host.is_address_decoded(address) {
            host.set_display_color(address, color_of(address));
            painted += 1;
        }
    }
    painted
}

/// Containing function name for every instruction, in sequence order
pub fn routine_names<H: HostCodeDatabase + ?Sized>(
    trace: &Trace,
    host: &H,
) -> Vec<(SeqId, Option<String>)> {
    trace
        .index()
        .instructions()
        .iter()
        .map(|record| (record.seq_id, host.function_name_at(record.address)))
        .collect()
}
