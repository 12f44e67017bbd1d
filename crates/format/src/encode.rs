//! Chunk encoding
//!
//! The inverse of [`crate::decode`]: used by producers writing trace files
//! and by tests building fixtures.

use crate::wire::*;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;
use thiserror::Error;
use tracelens_core::{AccessKind, InstructionRecord, TraceEvent};

/// Encoding errors
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A length-prefixed field does not fit its prefix
    #[error("field `{field}` is {len} bytes (max {max})")]
    FieldTooLong {
        /// Field name
        field: &'static str,
        /// Actual length
        len: usize,
        /// Largest encodable length
        max: usize,
    },

    /// Too many operands or records for the count field
    #[error("too many `{field}` entries: {count}")]
    TooMany {
        /// Field name
        field: &'static str,
        /// Actual count
        count: usize,
    },

    /// Unknown event kinds that collide with a defined kind
    #[error("unknown event kind {0} collides with a defined kind")]
    AmbiguousEventKind(u8),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builder for one chunk
///
/// Records are written in push order. Events pushed before an instruction
/// attach to that instruction when decoded.
#[derive(Debug, Default)]
pub struct ChunkEncoder {
    body: Vec<u8>,
    count: u32,
    instructions: usize,
}

impl ChunkEncoder {
    /// Create an empty chunk
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records pushed (instructions and events)
    pub fn record_count(&self) -> u32 {
        self.count
    }

    /// Number of instruction records pushed
    pub fn instruction_count(&self) -> usize {
        self.instructions
    }

    /// Check if nothing was pushed
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append an instruction record
    ///
    /// The record's `seq_id` is not encoded; the decoder assigns ids.
    pub fn push_instruction(&mut self, record: &InstructionRecord) -> Result<(), EncodeError> {
        let mut buf = Vec::with_capacity(32 + record.opcode.len());
        buf.write_u8(TAG_INSTRUCTION)?;
        buf.write_u64::<LittleEndian>(record.address)?;
        write_str16(&mut buf, "opcode", &record.opcode)?;

        buf.write_u16::<LittleEndian>(count16("registers", record.registers.len())?)?;
        for access in &record.registers {
            buf.write_u8(access_byte(access.kind))?;
            write_str16(&mut buf, "register_name", &access.name)?;
            buf.write_u64::<LittleEndian>(access.value)?;
        }

        buf.write_u16::<LittleEndian>(count16("memories", record.memories.len())?)?;
        for access in &record.memories {
            buf.write_u8(access_byte(access.kind))?;
            buf.write_u64::<LittleEndian>(access.address)?;
            let len = u32::try_from(access.bytes.len()).map_err(|_| EncodeError::FieldTooLong {
                field: "memory_bytes",
                len: access.bytes.len(),
                max: u32::MAX as usize,
            })?;
            buf.write_u32::<LittleEndian>(len)?;
            buf.write_all(&access.bytes)?;
        }

        let mut flags = 0u8;
        if record.next_address.is_some() {
            flags |= FLAG_NEXT_ADDRESS;
        }
        if record.wave.is_some() {
            flags |= FLAG_WAVE;
        }
        if record.syscall.is_some() {
            flags |= FLAG_SYSCALL;
        }
        if record.libcall.is_some() {
            flags |= FLAG_LIBCALL;
        }
        if record.comment.is_some() {
            flags |= FLAG_COMMENT;
        }
        buf.write_u8(flags)?;

        if let Some(next) = record.next_address {
            buf.write_u64::<LittleEndian>(next)?;
        }
        if let Some(wave) = record.wave {
            buf.write_u32::<LittleEndian>(wave)?;
        }
        if let Some(syscall) = record.syscall {
            buf.write_u32::<LittleEndian>(syscall.id)?;
        }
        if let Some(libcall) = &record.libcall {
            write_str16(&mut buf, "libcall_name", &libcall.func_name)?;
            buf.write_u64::<LittleEndian>(libcall.func_addr)?;
            buf.write_u8(libcall.is_traced as u8)?;
        }
        if let Some(comment) = &record.comment {
            let len = u32::try_from(comment.len()).map_err(|_| EncodeError::FieldTooLong {
                field: "comment",
                len: comment.len(),
                max: u32::MAX as usize,
            })?;
            buf.write_u32::<LittleEndian>(len)?;
            buf.write_all(comment.as_bytes())?;
        }

        self.push_record(buf)?;
        self.instructions += 1;
        Ok(())
    }

    /// Append an event; it attaches to the next pushed instruction
    pub fn push_event(&mut self, event: &TraceEvent) -> Result<(), EncodeError> {
        let mut buf = Vec::with_capacity(16);
        buf.write_u8(TAG_EVENT)?;
        match event {
            TraceEvent::WaveStart { wave } => {
                buf.write_u8(EVENT_WAVE)?;
                buf.write_u32::<LittleEndian>(*wave)?;
            }
            TraceEvent::Exception { kind, handler } => {
                buf.write_u8(EVENT_EXCEPTION)?;
                buf.write_u32::<LittleEndian>(*kind)?;
                buf.write_u64::<LittleEndian>(*handler)?;
            }
            TraceEvent::ModuleLoad { name } => {
                buf.write_u8(EVENT_MODULE)?;
                write_str16(&mut buf, "module_name", name)?;
            }
            TraceEvent::Unknown { kind } => {
                if matches!(*kind, EVENT_WAVE | EVENT_EXCEPTION | EVENT_MODULE) {
                    return Err(EncodeError::AmbiguousEventKind(*kind));
                }
                buf.write_u8(*kind)?;
            }
        }
        self.push_record(buf)
    }

    fn push_record(&mut self, record: Vec<u8>) -> Result<(), EncodeError> {
        self.count = self.count.checked_add(1).ok_or(EncodeError::TooMany {
            field: "records",
            count: self.count as usize + 1,
        })?;
        self.body.extend_from_slice(&record);
        Ok(())
    }

    /// Finish the chunk and return it framed with its length prefix
    pub fn finish(self) -> Result<Vec<u8>, EncodeError> {
        let payload_len = PAYLOAD_HEADER_LEN + self.body.len();
        let length = u32::try_from(payload_len).map_err(|_| EncodeError::FieldTooLong {
            field: "chunk",
            len: payload_len,
            max: u32::MAX as usize,
        })?;

        let count_bytes = self.count.to_le_bytes();
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&count_bytes);
        hasher.update(&self.body);
        let crc = hasher.finalize();

        let mut out = Vec::with_capacity(CHUNK_PREFIX_LEN + payload_len);
        out.write_u32::<LittleEndian>(length)?;
        out.write_u32::<LittleEndian>(crc)?;
        out.write_all(&count_bytes)?;
        out.write_all(&self.body)?;
        Ok(out)
    }
}

/// Streams finished chunks into a writer
///
/// ```ignore
/// let mut writer = TraceWriter::new(File::create("run.trace")?);
/// let mut chunk = ChunkEncoder::new();
/// chunk.push_instruction(&record)?;
/// writer.write_chunk(chunk)?;
/// writer.flush()?;
/// ```
#[derive(Debug)]
pub struct TraceWriter<W: Write> {
    inner: W,
    chunks_written: u64,
    bytes_written: u64,
}

impl<W: Write> TraceWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        TraceWriter {
            inner,
            chunks_written: 0,
            bytes_written: 0,
        }
    }

    /// Encode and write one chunk, returning its framed size
    pub fn write_chunk(&mut self, chunk: ChunkEncoder) -> Result<usize, EncodeError> {
        let bytes = chunk.finish()?;
        self.inner.write_all(&bytes)?;
        self.chunks_written += 1;
        self.bytes_written += bytes.len() as u64;
        Ok(bytes.len())
    }

    /// Chunks written so far
    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }

    /// Bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> Result<(), EncodeError> {
        self.inner.flush()?;
        Ok(())
    }

    /// Unwrap the underlying writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn access_byte(kind: AccessKind) -> u8 {
    match kind {
        AccessKind::Read => ACCESS_READ,
        AccessKind::Write => ACCESS_WRITE,
    }
}

fn count16(field: &'static str, count: usize) -> Result<u16, EncodeError> {
    u16::try_from(count).map_err(|_| EncodeError::TooMany { field, count })
}

fn write_str16(buf: &mut Vec<u8>, field: &'static str, value: &str) -> Result<(), EncodeError> {
    let len = u16::try_from(value.len()).map_err(|_| EncodeError::FieldTooLong {
        field,
        len: value.len(),
        max: u16::MAX as usize,
    })?;
    buf.write_u16::<LittleEndian>(len)?;
    buf.write_all(value.as_bytes())?;
    Ok(())
}
