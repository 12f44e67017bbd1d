//! Core types for decoded traces
//!
//! This module defines the record types produced by the chunk decoder and
//! stored by the trace index:
//! - [`InstructionRecord`]: One executed instruction, keyed by [`SeqId`]
//! - [`RegisterAccess`] / [`MemoryAccess`]: Operand reads and writes
//! - [`Syscall`] / [`Libcall`]: Optional call descriptors

use serde::{Deserialize, Serialize};

/// Position of an instruction within a trace.
///
/// Sequence ids start at zero and increase by one per instruction, in decode
/// order. They are unrelated to the instruction's memory address.
pub type SeqId = u64;

/// Memory address in the traced program.
pub type Address = u64;

/// Direction of an operand access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessKind {
    /// Operand was read
    Read,
    /// Operand was written
    Write,
}

impl AccessKind {
    /// Single-letter tag used in textual dumps (`R` / `W`)
    pub fn tag(&self) -> char {
        match self {
            AccessKind::Read => 'R',
            AccessKind::Write => 'W',
        }
    }
}

/// A register read or written by an instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterAccess {
    /// Read or write
    pub kind: AccessKind,
    /// Register name (e.g. "eax")
    pub name: String,
    /// Register value at the time of access
    pub value: u64,
}

impl RegisterAccess {
    /// Create a register read
    pub fn read(name: impl Into<String>, value: u64) -> Self {
        Self {
            kind: AccessKind::Read,
            name: name.into(),
            value,
        }
    }

    /// Create a register write
    pub fn write(name: impl Into<String>, value: u64) -> Self {
        Self {
            kind: AccessKind::Write,
            name: name.into(),
            value,
        }
    }
}

/// A memory range read or written by an instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryAccess {
    /// Read or write
    pub kind: AccessKind,
    /// Start address of the access
    pub address: Address,
    /// Bytes transferred
    pub bytes: Vec<u8>,
}

impl MemoryAccess {
    /// Create a memory read
    pub fn read(address: Address, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: AccessKind::Read,
            address,
            bytes: bytes.into(),
        }
    }

    /// Create a memory write
    pub fn write(address: Address, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: AccessKind::Write,
            address,
            bytes: bytes.into(),
        }
    }

    /// Bytes rendered as lowercase hex without separators
    pub fn hex_bytes(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// System call issued by an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Syscall {
    /// System call number
    pub id: u32,
}

/// Library call issued by an instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Libcall {
    /// Name of the called function
    pub func_name: String,
    /// Entry address of the called function
    pub func_addr: Address,
    /// Whether the callee's body was traced as well
    pub is_traced: bool,
}

/// One executed instruction
///
/// Records are immutable once decoded. Operand accesses keep their original
/// order; use [`register_reads`](Self::register_reads) and friends to split
/// them by direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionRecord {
    /// Position within the trace
    pub seq_id: SeqId,
    /// Address the instruction executed at
    pub address: Address,
    /// Disassembled instruction text
    pub opcode: String,
    /// Register operands, in access order
    pub registers: Vec<RegisterAccess>,
    /// Memory operands, in access order
    pub memories: Vec<MemoryAccess>,
    /// Address executed after this instruction, when recorded
    pub next_address: Option<Address>,
    /// Wave this instruction belongs to
    pub wave: Option<u32>,
    /// System call made by this instruction
    pub syscall: Option<Syscall>,
    /// Library call made by this instruction
    pub libcall: Option<Libcall>,
    /// Free-text annotation from the instrumentation tool
    pub comment: Option<String>,
}

impl InstructionRecord {
    /// Create a record with no operands or auxiliary data
    pub fn new(seq_id: SeqId, address: Address, opcode: impl Into<String>) -> Self {
        Self {
            seq_id,
            address,
            opcode: opcode.into(),
            registers: Vec::new(),
            memories: Vec::new(),
            next_address: None,
            wave: None,
            syscall: None,
            libcall: None,
            comment: None,
        }
    }

    /// Append a register access
    pub fn with_register(mut self, access: RegisterAccess) -> Self {
        self.registers.push(access);
        self
    }

    /// Append a memory access
    pub fn with_memory(mut self, access: MemoryAccess) -> Self {
        self.memories.push(access);
        self
    }

    /// Set the next executed address
    pub fn with_next_address(mut self, next: Address) -> Self {
        self.next_address = Some(next);
        self
    }

    /// Set the wave id
    pub fn with_wave(mut self, wave: u32) -> Self {
        self.wave = Some(wave);
        self
    }

    /// Set the syscall descriptor
    pub fn with_syscall(mut self, id: u32) -> Self {
        self.syscall = Some(Syscall { id });
        self
    }

    /// Set the libcall descriptor
    pub fn with_libcall(mut self, libcall: Libcall) -> Self {
        self.libcall = Some(libcall);
        self
    }

    /// Set the comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Registers read by this instruction
    pub fn register_reads(&self) -> impl Iterator<Item = &RegisterAccess> {
        self.registers
            .iter()
            .filter(|r| r.kind == AccessKind::Read)
    }

    /// Registers written by this instruction
    pub fn register_writes(&self) -> impl Iterator<Item = &RegisterAccess> {
        self.registers
            .iter()
            .filter(|r| r.kind == AccessKind::Write)
    }

    /// Memory ranges read by this instruction
    pub fn memory_reads(&self) -> impl Iterator<Item = &MemoryAccess> {
        self.memories.iter().filter(|m| m.kind == AccessKind::Read)
    }

    /// Memory ranges written by this instruction
    pub fn memory_writes(&self) -> impl Iterator<Item = &MemoryAccess> {
        self.memories.iter().filter(|m| m.kind == AccessKind::Write)
    }

    /// Whether any optional field beyond address and opcode is set
    pub fn has_details(&self) -> bool {
        self.next_address.is_some()
            || self.wave.is_some()
            || self.syscall.is_some()
            || self.libcall.is_some()
            || self.comment.is_some()
    }
}
