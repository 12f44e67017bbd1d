//! Read-only views for an info pane

use crate::analytics::coverage;
use crate::host::InstructionCountOracle;
use crate::trace::Trace;
use serde::Serialize;
use std::fmt;
use tracelens_core::{AccessKind, Address, InstructionRecord, Libcall};

/// Headline numbers for a loaded trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceSummary {
    /// File name of the trace
    pub name: String,
    /// Number of instructions
    pub length: usize,
    /// Distinct instruction addresses
    pub unique_instructions: usize,
    /// Coverage percentage, `-1` if unknown
    pub coverage: i64,
}

impl TraceSummary {
    /// Summarise a trace against the binary's instruction count
    pub fn new<O: InstructionCountOracle + ?Sized>(trace: &Trace, oracle: &O) -> Self {
        let unique_instructions = trace.index().unique_address_count();
        TraceSummary {
            name: trace.name(),
            length: trace.len(),
            unique_instructions,
            coverage: coverage(unique_instructions, oracle.total_instructions_in_binary()),
        }
    }
}

impl fmt::Display for TraceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Name:{}", self.name)?;
        writeln!(f, "Length:{}", self.length)?;
        writeln!(f, "Unique instr:{}", self.unique_instructions)?;
        write!(f, "Coverage:{}%", self.coverage)
    }
}

/// One operand row: register name or `@[addr]`, and its value in hex
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperandRow {
    /// Register name or memory location
    pub location: String,
    /// Value as hex
    pub value: String,
}

/// Operands and auxiliary fields of one instruction, split for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstructionDetails {
    /// Sequence id
    pub seq_id: u64,
    /// Instruction address
    pub address: Address,
    /// Opcode text
    pub opcode: String,
    /// Registers then memory cells read
    pub reads: Vec<OperandRow>,
    /// Registers then memory cells written
    pub writes: Vec<OperandRow>,
    /// Address executed next
    pub next_address: Option<Address>,
    /// Wave the instruction belongs to
    pub wave: Option<u32>,
    /// System call number
    pub syscall: Option<u32>,
    /// Library call
    pub libcall: Option<Libcall>,
    /// Free-text comment
    pub comment: Option<String>,
}

impl InstructionDetails {
    /// Build the view for a record
    pub fn new(record: &InstructionRecord) -> Self {
        let mut reads = Vec::new();
        let mut writes = Vec::new();

        for access in &record.registers {
            let row = OperandRow {
                location: access.name.clone(),
                value: format!("{:#x}", access.value),
            };
            match access.kind {
                AccessKind::Read => reads.push(row),
                AccessKind::Write => writes.push(row),
            }
        }
        for access in &record.memories {
            let row = OperandRow {
                location: format!("@[{:x}]", access.address),
                value: access.hex_bytes(),
            };
            match access.kind {
                AccessKind::Read => reads.push(row),
                AccessKind::Write => writes.push(row),
            }
        }

        InstructionDetails {
            seq_id: record.seq_id,
            address: record.address,
            opcode: record.opcode.clone(),
            reads,
            writes,
            next_address: record.next_address,
            wave: record.wave,
            syscall: record.syscall.map(|s| s.id),
            libcall: record.libcall.clone(),
            comment: record.comment.clone(),
        }
    }
}

impl fmt::Display for InstructionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {:#x} {}", self.seq_id, self.address, self.opcode)?;
        for (title, rows) in [("Reads", &self.reads), ("Writes", &self.writes)] {
            if rows.is_empty() {
                continue;
            }
            writeln!(f, "{}:", title)?;
            for row in rows {
                writeln!(f, "  {} {}", row.location, row.value)?;
            }
        }
        if let Some(next) = self.next_address {
            writeln!(f, "Next addr:{:#x}", next)?;
        }
        if let Some(wave) = self.wave {
            writeln!(f, "Wave: {}", wave)?;
        }
        if let Some(syscall) = self.syscall {
            writeln!(f, "Syscall:{}", syscall)?;
        }
        if let Some(libcall) = &self.libcall {
            writeln!(f, "Libcall:{}", libcall.func_name)?;
            writeln!(f, "  at:{:#x}", libcall.func_addr)?;
            writeln!(f, "  traced: {}", libcall.is_traced)?;
        }
        if let Some(comment) = &self.comment {
            writeln!(f, "Comment:{}", comment)?;
        }
        Ok(())
    }
}
