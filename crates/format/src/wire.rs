//! Trace file wire constants
//!
//! ```text
//! file        := chunk*
//! chunk       := len:u32 payload[len]
//! payload     := crc:u32 count:u32 record[count]   crc32 over count + records
//! record      := 0x01 instruction | 0x02 event
//! instruction := address:u64 opcode:str16
//!                nregs:u16 (kind:u8 name:str16 value:u64)*
//!                nmems:u16 (kind:u8 addr:u64 len:u32 bytes)*
//!                flags:u8 [next:u64] [wave:u32] [syscall:u32]
//!                [libcall: name:str16 addr:u64 traced:u8] [comment:str32]
//! event       := kind:u8 (0 wave:u32 | 1 type:u32 handler:u64 | 2 name:str16 | other)
//! ```
//!
//! All integers are little-endian. Events attach to the next instruction
//! record in the same chunk.

/// Size of the chunk length prefix
pub const CHUNK_PREFIX_LEN: usize = 4;

/// Size of the payload header (checksum + record count)
pub const PAYLOAD_HEADER_LEN: usize = 8;

/// Default upper bound on a single chunk payload (64 MiB)
pub const DEFAULT_MAX_CHUNK_SIZE: u32 = 64 * 1024 * 1024;

/// Record tag: instruction
pub const TAG_INSTRUCTION: u8 = 0x01;
/// Record tag: event
pub const TAG_EVENT: u8 = 0x02;

/// Access kind byte: read
pub const ACCESS_READ: u8 = 0;
/// Access kind byte: write
pub const ACCESS_WRITE: u8 = 1;

/// Event kind byte: wave start
pub const EVENT_WAVE: u8 = 0;
/// Event kind byte: exception
pub const EVENT_EXCEPTION: u8 = 1;
/// Event kind byte: module load
pub const EVENT_MODULE: u8 = 2;

/// Instruction flag: `next_address` present
pub const FLAG_NEXT_ADDRESS: u8 = 1 << 0;
/// Instruction flag: `wave` present
pub const FLAG_WAVE: u8 = 1 << 1;
/// Instruction flag: `syscall` present
pub const FLAG_SYSCALL: u8 = 1 << 2;
/// Instruction flag: `libcall` present
pub const FLAG_LIBCALL: u8 = 1 << 3;
/// Instruction flag: `comment` present
pub const FLAG_COMMENT: u8 = 1 << 4;
/// Union of all defined instruction flags
pub const FLAG_ALL: u8 = FLAG_NEXT_ADDRESS | FLAG_WAVE | FLAG_SYSCALL | FLAG_LIBCALL | FLAG_COMMENT;
