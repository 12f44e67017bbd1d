//! Chunk decoding
//!
//! [`RecordDecoder`] turns one length-prefixed chunk into instruction and
//! event records. Decoding is all-or-nothing: any malformed field rejects
//! the whole chunk with a [`CorruptChunk`].

use crate::wire::*;
use byteorder::{ByteOrder, LittleEndian};
use tracelens_core::{
    AccessKind, CorruptChunk, InstructionRecord, Libcall, MemoryAccess, RegisterAccess, SeqId,
    Syscall, TraceEvent,
};

/// Records decoded from one chunk
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedChunk {
    /// Instruction records with sequence ids already assigned
    pub instructions: Vec<InstructionRecord>,
    /// Events keyed by the sequence id they precede, in wire order
    pub events: Vec<(SeqId, TraceEvent)>,
    /// Framed size of the chunk (length prefix + payload)
    pub bytes_consumed: usize,
}

impl DecodedChunk {
    /// Number of instruction records in the chunk
    pub fn record_count(&self) -> usize {
        self.instructions.len()
    }
}

/// Decoder for single chunks
///
/// Holds no state between chunks; the caller supplies the first sequence id
/// for every call.
#[derive(Debug, Clone, Copy)]
pub struct RecordDecoder {
    verify_checksums: bool,
    max_chunk_size: u32,
}

impl Default for RecordDecoder {
    fn default() -> Self {
        RecordDecoder {
            verify_checksums: true,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

impl RecordDecoder {
    /// Create a decoder with checksum verification and the default size limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable CRC32 verification
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Set the largest payload accepted
    pub fn max_chunk_size(mut self, max: u32) -> Self {
        self.max_chunk_size = max;
        self
    }

    /// Validate a length prefix before the payload is read
    pub fn check_length(&self, length: u32) -> Result<(), CorruptChunk> {
        if (length as usize) < PAYLOAD_HEADER_LEN {
            return Err(CorruptChunk::BadLength {
                length: length as u64,
                reason: format!("shorter than the {}-byte chunk header", PAYLOAD_HEADER_LEN),
            });
        }
        if length > self.max_chunk_size {
            return Err(CorruptChunk::BadLength {
                length: length as u64,
                reason: format!("exceeds the {}-byte chunk limit", self.max_chunk_size),
            });
        }
        Ok(())
    }

    /// Decode a framed chunk from the front of `buf`
    ///
    /// Bytes after the chunk are left untouched; `bytes_consumed` in the
    /// result says where the next chunk starts.
    pub fn decode_chunk(
        &self,
        buf: &[u8],
        first_seq_id: SeqId,
    ) -> Result<DecodedChunk, CorruptChunk> {
        let mut reader = ByteReader::new(buf);
        let length = reader.u32()?;
        self.check_length(length)?;
        let payload = reader.take(length as usize)?;
        self.decode_payload(payload, first_seq_id)
    }

    /// Decode a chunk payload whose length prefix was already consumed
    pub fn decode_payload(
        &self,
        payload: &[u8],
        first_seq_id: SeqId,
    ) -> Result<DecodedChunk, CorruptChunk> {
        let mut reader = ByteReader::new(payload);
        let expected = reader.u32()?;
        if self.verify_checksums {
            let actual = crc32fast::hash(reader.rest());
            if actual != expected {
                return Err(CorruptChunk::ChecksumMismatch { expected, actual });
            }
        }

        let count = reader.u32()?;
        // count is untrusted; every record needs at least one byte
        let capacity = (count as usize).min(reader.remaining());
        let mut instructions = Vec::with_capacity(capacity);
        let mut events = Vec::new();
        let mut pending: Vec<TraceEvent> = Vec::new();
        let mut next_seq = first_seq_id;

        for _ in 0..count {
            let offset = reader.position();
            match reader.u8()? {
                TAG_INSTRUCTION => {
                    let record = decode_instruction(&mut reader, next_seq)?;
                    events.extend(pending.drain(..).map(|event| (next_seq, event)));
                    instructions.push(record);
                    next_seq += 1;
                }
                TAG_EVENT => pending.push(decode_event(&mut reader)?),
                tag => return Err(CorruptChunk::UnknownRecordTag { tag, offset }),
            }
        }

        if !pending.is_empty() {
            return Err(CorruptChunk::DanglingEvents {
                count: pending.len(),
            });
        }
        if reader.remaining() > 0 {
            return Err(CorruptChunk::TrailingBytes {
                count: reader.remaining(),
            });
        }

        Ok(DecodedChunk {
            instructions,
            events,
            bytes_consumed: CHUNK_PREFIX_LEN + payload.len(),
        })
    }
}

fn decode_instruction(
    reader: &mut ByteReader<'_>,
    seq_id: SeqId,
) -> Result<InstructionRecord, CorruptChunk> {
    let address = reader.u64()?;
    let opcode = reader.str16("opcode")?;
    let mut record = InstructionRecord::new(seq_id, address, opcode);

    let nregs = reader.u16()?;
    for _ in 0..nregs {
        let kind = reader.access_kind()?;
        let name = reader.str16("register_name")?;
        let value = reader.u64()?;
        record.registers.push(RegisterAccess { kind, name, value });
    }

    let nmems = reader.u16()?;
    for _ in 0..nmems {
        let kind = reader.access_kind()?;
        let address = reader.u64()?;
        let len = reader.u32()? as usize;
        let bytes = reader.take(len)?.to_vec();
        record.memories.push(MemoryAccess {
            kind,
            address,
            bytes,
        });
    }

    let flags_offset = reader.position();
    let flags = reader.u8()?;
    if flags & !FLAG_ALL != 0 {
        return Err(CorruptChunk::InvalidField {
            field: "flags",
            offset: flags_offset,
            reason: format!("undefined bits set in {:#04x}", flags),
        });
    }

    if flags & FLAG_NEXT_ADDRESS != 0 {
        record.next_address = Some(reader.u64()?);
    }
    if flags & FLAG_WAVE != 0 {
        record.wave = Some(reader.u32()?);
    }
    if flags & FLAG_SYSCALL != 0 {
        record.syscall = Some(Syscall { id: reader.u32()? });
    }
    if flags & FLAG_LIBCALL != 0 {
        let func_name = reader.str16("libcall_name")?;
        let func_addr = reader.u64()?;
        let is_traced = reader.bool("libcall_traced")?;
        record.libcall = Some(Libcall {
            func_name,
            func_addr,
            is_traced,
        });
    }
    if flags & FLAG_COMMENT != 0 {
        record.comment = Some(reader.str32("comment")?);
    }

    Ok(record)
}

fn decode_event(reader: &mut ByteReader<'_>) -> Result<TraceEvent, CorruptChunk> {
    let event = match reader.u8()? {
        EVENT_WAVE => TraceEvent::WaveStart {
            wave: reader.u32()?,
        },
        EVENT_EXCEPTION => TraceEvent::Exception {
            kind: reader.u32()?,
            handler: reader.u64()?,
        },
        EVENT_MODULE => TraceEvent::ModuleLoad {
            name: reader.str16("module_name")?,
        },
        kind => TraceEvent::Unknown { kind },
    };
    Ok(event)
}

/// Bounds-checked little-endian cursor over a chunk
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CorruptChunk> {
        if self.remaining() < n {
            return Err(CorruptChunk::Truncated {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, CorruptChunk> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CorruptChunk> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn u32(&mut self) -> Result<u32, CorruptChunk> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn u64(&mut self) -> Result<u64, CorruptChunk> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    fn bool(&mut self, field: &'static str) -> Result<bool, CorruptChunk> {
        let offset = self.pos;
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CorruptChunk::InvalidField {
                field,
                offset,
                reason: format!("expected 0 or 1, got {}", other),
            }),
        }
    }

    fn access_kind(&mut self) -> Result<AccessKind, CorruptChunk> {
        let offset = self.pos;
        match self.u8()? {
            ACCESS_READ => Ok(AccessKind::Read),
            ACCESS_WRITE => Ok(AccessKind::Write),
            other => Err(CorruptChunk::InvalidField {
                field: "access_kind",
                offset,
                reason: format!("unknown access kind {}", other),
            }),
        }
    }

    fn str16(&mut self, field: &'static str) -> Result<String, CorruptChunk> {
        let len = self.u16()? as usize;
        self.utf8(field, len)
    }

    fn str32(&mut self, field: &'static str) -> Result<String, CorruptChunk> {
        let len = self.u32()? as usize;
        self.utf8(field, len)
    }

    fn utf8(&mut self, field: &'static str, len: usize) -> Result<String, CorruptChunk> {
        let offset = self.pos;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| CorruptChunk::InvalidField {
                field,
                offset,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::ChunkEncoder;

    fn sample_record(seq_id: SeqId) -> InstructionRecord {
        InstructionRecord::new(seq_id, 0x401000 + seq_id, "add eax, 1")
            .with_register(RegisterAccess::read("eax", 41))
            .with_register(RegisterAccess::write("eax", 42))
            .with_memory(MemoryAccess::read(0x7fff_0000, vec![1, 2, 3, 4]))
            .with_next_address(0x401003)
            .with_wave(1)
            .with_syscall(60)
            .with_libcall(Libcall {
                func_name: "printf".into(),
                func_addr: 0x7f00_1000,
                is_traced: false,
            })
            .with_comment("loop head")
    }

    fn framed(records: &[InstructionRecord], events_before_first: &[TraceEvent]) -> Vec<u8> {
        let mut encoder = ChunkEncoder::new();
        for event in events_before_first {
            encoder.push_event(event).unwrap();
        }
        for record in records {
            encoder.push_instruction(record).unwrap();
        }
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decode_full_record() {
        let record = sample_record(0);
        let buf = framed(std::slice::from_ref(&record), &[]);

        let chunk = RecordDecoder::new().decode_chunk(&buf, 0).unwrap();

        assert_eq!(chunk.instructions, vec![record]);
        assert!(chunk.events.is_empty());
        assert_eq!(chunk.bytes_consumed, buf.len());
    }

    #[test]
    fn test_sequence_ids_continue_from_caller() {
        let records = vec![
            InstructionRecord::new(0, 0x10, "nop"),
            InstructionRecord::new(0, 0x11, "nop"),
        ];
        let buf = framed(&records, &[]);

        let chunk = RecordDecoder::new().decode_chunk(&buf, 40).unwrap();

        let ids: Vec<_> = chunk.instructions.iter().map(|r| r.seq_id).collect();
        assert_eq!(ids, vec![40, 41]);
    }

    #[test]
    fn test_events_attach_to_following_instruction() {
        let mut encoder = ChunkEncoder::new();
        encoder
            .push_instruction(&InstructionRecord::new(0, 0x10, "jmp 0x20"))
            .unwrap();
        encoder.push_event(&TraceEvent::WaveStart { wave: 1 }).unwrap();
        encoder
            .push_event(&TraceEvent::ModuleLoad {
                name: "ntdll.dll".into(),
            })
            .unwrap();
        encoder
            .push_instruction(&InstructionRecord::new(0, 0x20, "ret"))
            .unwrap();
        let buf = encoder.finish().unwrap();

        let chunk = RecordDecoder::new().decode_chunk(&buf, 7).unwrap();

        assert_eq!(
            chunk.events,
            vec![
                (8, TraceEvent::WaveStart { wave: 1 }),
                (
                    8,
                    TraceEvent::ModuleLoad {
                        name: "ntdll.dll".into()
                    }
                ),
            ]
        );
    }

    #[test]
    fn test_unknown_event_kind_is_kept() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&2u32.to_le_bytes());
        payload.extend_from_slice(&[TAG_EVENT, 0x7f]);
        payload.push(TAG_INSTRUCTION);
        payload.extend_from_slice(&0x10u64.to_le_bytes());
        payload.extend_from_slice(&3u16.to_le_bytes());
        payload.extend_from_slice(b"nop");
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.push(0);
        let mut body = crc32fast::hash(&payload).to_le_bytes().to_vec();
        body.extend_from_slice(&payload);

        let chunk = RecordDecoder::new().decode_payload(&body, 0).unwrap();

        assert_eq!(chunk.events, vec![(0, TraceEvent::Unknown { kind: 0x7f })]);
    }

    #[test]
    fn test_empty_chunk() {
        let buf = ChunkEncoder::new().finish().unwrap();
        let chunk = RecordDecoder::new().decode_chunk(&buf, 3).unwrap();
        assert_eq!(chunk.record_count(), 0);
        assert_eq!(chunk.bytes_consumed, CHUNK_PREFIX_LEN + PAYLOAD_HEADER_LEN);
    }

    #[test]
    fn test_truncated_mid_record() {
        let buf = framed(&[sample_record(0)], &[]);
        let payload = &buf[CHUNK_PREFIX_LEN..buf.len() - 5];

        let err = RecordDecoder::new()
            .verify_checksums(false)
            .decode_payload(payload, 0)
            .unwrap_err();

        assert!(matches!(err, CorruptChunk::Truncated { .. }));
    }

    #[test]
    fn test_truncated_frame() {
        let buf = framed(&[sample_record(0)], &[]);
        let err = RecordDecoder::new()
            .decode_chunk(&buf[..buf.len() - 1], 0)
            .unwrap_err();
        assert!(matches!(err, CorruptChunk::Truncated { .. }));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut buf = framed(&[sample_record(0)], &[]);
        let last = buf.len() - 1;
        buf[last] ^= 0xff;

        let err = RecordDecoder::new().decode_chunk(&buf, 0).unwrap_err();
        assert!(matches!(err, CorruptChunk::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_bad_length_prefix() {
        let decoder = RecordDecoder::new().max_chunk_size(1024);
        assert!(matches!(
            decoder.check_length(4),
            Err(CorruptChunk::BadLength { length: 4, .. })
        ));
        assert!(matches!(
            decoder.check_length(4096),
            Err(CorruptChunk::BadLength { length: 4096, .. })
        ));
        assert!(decoder.check_length(512).is_ok());
    }

    #[test]
    fn test_dangling_event_rejected() {
        let mut encoder = ChunkEncoder::new();
        encoder
            .push_instruction(&InstructionRecord::new(0, 0x10, "nop"))
            .unwrap();
        encoder.push_event(&TraceEvent::WaveStart { wave: 2 }).unwrap();
        let buf = encoder.finish().unwrap();

        let err = RecordDecoder::new().decode_chunk(&buf, 0).unwrap_err();
        assert_eq!(err, CorruptChunk::DanglingEvents { count: 1 });
    }

    #[test]
    fn test_unknown_record_tag() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.push(0x09);
        let mut body = crc32fast::hash(&payload).to_le_bytes().to_vec();
        body.extend_from_slice(&payload);

        let err = RecordDecoder::new().decode_payload(&body, 0).unwrap_err();
        assert_eq!(
            err,
            CorruptChunk::UnknownRecordTag {
                tag: 0x09,
                offset: 8
            }
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&[0xaa, 0xbb]);
        let mut body = crc32fast::hash(&payload).to_le_bytes().to_vec();
        body.extend_from_slice(&payload);

        let err = RecordDecoder::new().decode_payload(&body, 0).unwrap_err();
        assert_eq!(err, CorruptChunk::TrailingBytes { count: 2 });
    }

    #[test]
    fn test_invalid_flags_rejected() {
        let buf = framed(&[InstructionRecord::new(0, 0x10, "nop")], &[]);
        let mut payload = buf[CHUNK_PREFIX_LEN..].to_vec();
        // flags is the final byte of a bare instruction
        let last = payload.len() - 1;
        payload[last] = 0x80;

        let err = RecordDecoder::new()
            .verify_checksums(false)
            .decode_payload(&payload, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            CorruptChunk::InvalidField { field: "flags", .. }
        ));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decoding_arbitrary_bytes_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
                let _ = RecordDecoder::new().decode_chunk(&bytes, 0);
                let _ = RecordDecoder::new().verify_checksums(false).decode_payload(&bytes, 0);
            }

            #[test]
            fn every_truncation_is_rejected(cut in 1usize..40) {
                let buf = framed(&[sample_record(0), sample_record(1)], &[]);
                let cut = cut.min(buf.len() - 1);
                let result = RecordDecoder::new().decode_chunk(&buf[..buf.len() - cut], 0);
                prop_assert!(result.is_err());
            }
        }
    }
}
