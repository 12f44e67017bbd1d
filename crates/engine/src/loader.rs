//! Streaming trace loader
//!
//! [`TraceLoader`] reads a trace file chunk by chunk and appends each chunk
//! to the [`Trace`] it owns. It is an iterator of [`ProgressEvent`]s: every
//! `next()` decodes exactly one chunk.
//!
//! ## Load Sequence
//!
//! 1. Validate the path (exists, regular file)
//! 2. Read a length prefix, check it against the size limit and the file
//! 3. Read and decode the payload
//! 4. Append to the index, yield progress
//!
//! ## Failure
//!
//! A corrupt chunk ends the sequence with `TraceLoadFailed` and a read error
//! with `LoadInterrupted`; chunks decoded before either stay in the trace. The file handle is dropped as soon as the
//! sequence ends, and also when the loader itself is dropped mid-load.
//!
//! ## Usage
//!
//! ```ignore
//! let mut loader = TraceLoader::open("run.trace", LoaderOptions::default())?;
//! for progress in loader.by_ref() {
//!     let progress = progress?;
//!     bar.set_position(progress.bytes_consumed);
//! }
//! let trace = loader.into_trace();
//! ```

use crate::trace::{LoadStatus, Trace};
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::iter::FusedIterator;
use std::path::Path;
use std::time::Instant;
use tracelens_core::{CorruptChunk, Result, SeqId, TraceError};
use tracelens_format::{RecordDecoder, CHUNK_PREFIX_LEN, DEFAULT_MAX_CHUNK_SIZE};
use tracing::{debug, info, warn};

// ============================================================================
// Loader Options
// ============================================================================

/// Loader options
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Largest chunk payload accepted, in bytes
    pub max_chunk_size: u32,
    /// Whether to verify each chunk's CRC32
    pub verify_checksums: bool,
    /// Whether to log every chunk at info level (debug otherwise)
    pub log_progress: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        LoaderOptions {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            verify_checksums: true,
            log_progress: false,
        }
    }
}

impl LoaderOptions {
    /// Strict options - verify everything, log every chunk
    pub fn strict() -> Self {
        LoaderOptions {
            verify_checksums: true,
            log_progress: true,
            ..Default::default()
        }
    }

    /// Permissive options - skip checksums, accept any chunk size
    pub fn permissive() -> Self {
        LoaderOptions {
            max_chunk_size: u32::MAX,
            verify_checksums: false,
            log_progress: false,
        }
    }

    fn decoder(&self) -> RecordDecoder {
        RecordDecoder::new()
            .verify_checksums(self.verify_checksums)
            .max_chunk_size(self.max_chunk_size)
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Progress after one decoded chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// Zero-based chunk number
    pub chunk_index: u64,
    /// Instruction records in this chunk
    pub chunk_record_count: usize,
    /// First sequence id assigned by this chunk
    pub first_seq_id: SeqId,
    /// One past the last sequence id assigned by this chunk
    pub last_seq_id_exclusive: SeqId,
    /// File bytes this chunk occupied (length prefix included)
    pub bytes_consumed: u64,
}

// ============================================================================
// Loader
// ============================================================================

/// Single-pass loader for one trace file
///
/// Owns the trace under construction, so no other writer can exist while it
/// runs. Loading again requires a fresh [`open`](Self::open).
pub struct TraceLoader {
    reader: Option<BufReader<File>>,
    trace: Trace,
    decoder: RecordDecoder,
    options: LoaderOptions,
    file_size: u64,
    offset: u64,
    chunk_index: u64,
    started: Instant,
}

enum FrameError {
    Corrupt(CorruptChunk),
    Io(std::io::Error),
}

impl From<CorruptChunk> for FrameError {
    fn from(e: CorruptChunk) -> Self {
        FrameError::Corrupt(e)
    }
}

impl TraceLoader {
    /// Open a trace file for loading
    ///
    /// Fails with `InvalidTraceSource` if the path does not exist or is not
    /// a regular file. Nothing is decoded until the loader is iterated.
    pub fn open(path: impl AsRef<Path>, options: LoaderOptions) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TraceError::invalid_source(path, "does not exist"),
            _ => TraceError::invalid_source(path, e.to_string()),
        })?;
        if !metadata.is_file() {
            return Err(TraceError::invalid_source(path, "not a regular file"));
        }

        let file = File::open(path).map_err(|e| TraceError::invalid_source(path, e.to_string()))?;
        info!("Opened trace {} ({} bytes)", path.display(), metadata.len());

        Ok(TraceLoader {
            reader: Some(BufReader::new(file)),
            trace: Trace::new(path.to_path_buf()),
            decoder: options.decoder(),
            options,
            file_size: metadata.len(),
            offset: 0,
            chunk_index: 0,
            started: Instant::now(),
        })
    }

    /// The trace as loaded so far
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Size of the file at open time
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes consumed by decoded chunks so far
    pub fn bytes_consumed(&self) -> u64 {
        self.offset
    }

    /// Check if the sequence has ended (complete or failed)
    pub fn is_finished(&self) -> bool {
        self.reader.is_none()
    }

    /// Stop loading and take the trace
    ///
    /// If chunks remain unread the trace is marked abandoned; its records
    /// stay valid.
    pub fn into_trace(mut self) -> Trace {
        if self.reader.take().is_some() {
            debug!(
                "Abandoning load of {} after {} chunks",
                self.trace.path().display(),
                self.chunk_index
            );
            self.trace.set_status(LoadStatus::Abandoned {
                chunks_loaded: self.chunk_index,
            });
        }
        self.trace
    }

    /// Load every remaining chunk and take the trace
    ///
    /// Never fails: the outcome is recorded in [`Trace::status`].
    pub fn finish(mut self) -> Trace {
        for _ in self.by_ref() {}
        self.into_trace()
    }

    /// Load every remaining chunk, failing if any chunk is corrupt or
    /// unreadable
    ///
    /// Use [`finish`](Self::finish) instead to keep the partial trace.
    pub fn load_all(self) -> Result<Trace> {
        let trace = self.finish();
        trace.load_result()?;
        Ok(trace)
    }

    fn read_frame(&mut self) -> std::result::Result<Option<Vec<u8>>, FrameError> {
        let remaining = self.file_size.saturating_sub(self.offset);
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        if reader.fill_buf().map_err(FrameError::Io)?.is_empty() {
            return Ok(None);
        }

        let length = match reader.read_u32::<LittleEndian>() {
            Ok(length) => length,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(FrameError::Corrupt(CorruptChunk::Truncated {
                    offset: 0,
                    needed: CHUNK_PREFIX_LEN,
                    available: remaining as usize,
                }))
            }
            Err(e) => return Err(FrameError::Io(e)),
        };
        self.decoder.check_length(length)?;

        let available = remaining.saturating_sub(CHUNK_PREFIX_LEN as u64);
        if length as u64 > available {
            return Err(FrameError::Corrupt(CorruptChunk::Truncated {
                offset: CHUNK_PREFIX_LEN,
                needed: length as usize,
                available: available as usize,
            }));
        }

        let mut payload = vec![0u8; length as usize];
        match reader.read_exact(&mut payload) {
            Ok(()) => Ok(Some(payload)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(FrameError::Corrupt(CorruptChunk::Truncated {
                    offset: CHUNK_PREFIX_LEN,
                    needed: length as usize,
                    available: available as usize,
                }))
            }
            Err(e) => Err(FrameError::Io(e)),
        }
    }

    fn complete(&mut self) {
        self.reader = None;
        self.trace.set_status(LoadStatus::Complete);

        let index = self.trace.index();
        info!(
            "Loaded {}: {} chunks, {} instructions, {} events, {} unique addresses, {:.2}ms",
            self.trace.name(),
            self.chunk_index,
            index.len(),
            index.event_count(),
            index.unique_address_count(),
            self.started.elapsed().as_micros() as f64 / 1000.0
        );
        if self.offset != self.file_size {
            warn!(
                "Trace {} changed size while loading: consumed {} of {} bytes",
                self.trace.name(),
                self.offset,
                self.file_size
            );
        }
    }

    fn fail_corrupt(&mut self, chunk_offset: u64, reason: CorruptChunk) -> TraceError {
        self.reader = None;
        warn!(
            "Corrupt chunk {} at offset {} in {}: {}. Keeping {} instructions from earlier chunks",
            self.chunk_index,
            chunk_offset,
            self.trace.name(),
            reason,
            self.trace.len()
        );
        self.trace.set_status(LoadStatus::Failed {
            chunk_index: self.chunk_index,
            offset: chunk_offset,
            reason: reason.clone(),
        });
        TraceError::TraceLoadFailed {
            chunk_index: self.chunk_index,
            offset: chunk_offset,
            reason,
        }
    }

    fn interrupt(&mut self, error: TraceError) -> TraceError {
        self.reader = None;
        let message = match error {
            TraceError::Io(e) => e.to_string(),
            other => other.to_string(),
        };
        warn!(
            "Loading {} stopped at chunk {}: {}",
            self.trace.name(),
            self.chunk_index,
            message
        );
        self.trace.set_status(LoadStatus::Interrupted {
            chunk_index: self.chunk_index,
            message: message.clone(),
        });
        TraceError::LoadInterrupted {
            chunk_index: self.chunk_index,
            message,
        }
    }
}

impl Iterator for TraceLoader {
    type Item = Result<ProgressEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.as_ref()?;
        let chunk_offset = self.offset;

        let payload = match self.read_frame() {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                self.complete();
                return None;
            }
            Err(FrameError::Corrupt(reason)) => {
                return Some(Err(self.fail_corrupt(chunk_offset, reason)))
            }
            Err(FrameError::Io(e)) => return Some(Err(self.interrupt(TraceError::Io(e)))),
        };

        let first_seq_id = self.trace.index().next_seq_id();
        let chunk = match self.decoder.decode_payload(&payload, first_seq_id) {
            Ok(chunk) => chunk,
            Err(reason) => return Some(Err(self.fail_corrupt(chunk_offset, reason))),
        };

        let bytes = chunk.bytes_consumed as u64;
        let record_count = chunk.record_count();
        let range = match self.trace.index_mut().append_chunk(chunk) {
            Ok(range) => range,
            Err(e) => return Some(Err(self.interrupt(e))),
        };

        let progress = ProgressEvent {
            chunk_index: self.chunk_index,
            chunk_record_count: record_count,
            first_seq_id: range.start,
            last_seq_id_exclusive: range.end,
            bytes_consumed: bytes,
        };
        self.offset += bytes;
        self.chunk_index += 1;
        self.trace.record_chunk(bytes);

        if self.options.log_progress {
            info!(
                "Chunk {}: {} instructions, ids {}..{}, {}/{} bytes",
                progress.chunk_index,
                record_count,
                range.start,
                range.end,
                self.offset,
                self.file_size
            );
        } else {
            debug!(
                "Chunk {}: {} instructions, ids {}..{}",
                progress.chunk_index, record_count, range.start, range.end
            );
        }

        Some(Ok(progress))
    }
}

impl FusedIterator for TraceLoader {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tracelens_core::{Address, InstructionRecord, TraceEvent};
    use tracelens_format::ChunkEncoder;

    fn chunk(addresses: &[Address]) -> Vec<u8> {
        let mut encoder = ChunkEncoder::new();
        for address in addresses {
            encoder
                .push_instruction(&InstructionRecord::new(0, *address, "nop"))
                .unwrap();
        }
        encoder.finish().unwrap()
    }

    fn write_file(dir: &TempDir, name: &str, chunks: &[Vec<u8>]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, chunks.concat()).unwrap();
        path
    }

    #[test]
    fn test_options_presets() {
        let defaults = LoaderOptions::default();
        assert!(defaults.verify_checksums);
        assert_eq!(defaults.max_chunk_size, DEFAULT_MAX_CHUNK_SIZE);

        assert!(LoaderOptions::strict().log_progress);

        let permissive = LoaderOptions::permissive();
        assert!(!permissive.verify_checksums);
        assert_eq!(permissive.max_chunk_size, u32::MAX);
    }

    #[test]
    fn test_open_missing_path() {
        let dir = TempDir::new().unwrap();
        let err = TraceLoader::open(dir.path().join("absent.trace"), LoaderOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, TraceError::InvalidTraceSource { .. }));
    }

    #[test]
    fn test_open_directory() {
        let dir = TempDir::new().unwrap();
        let err = TraceLoader::open(dir.path(), LoaderOptions::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[test]
    fn test_progress_per_chunk() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "three.trace",
            &[
                chunk(&[0x10, 0x10]),
                chunk(&[0x20, 0x30, 0x20]),
                chunk(&[0x40]),
            ],
        );
        let file_size = std::fs::metadata(&path).unwrap().len();

        let mut loader = TraceLoader::open(&path, LoaderOptions::default()).unwrap();
        let events: Vec<ProgressEvent> = loader.by_ref().map(|p| p.unwrap()).collect();

        let counts: Vec<_> = events.iter().map(|e| e.chunk_record_count).collect();
        assert_eq!(counts, vec![2, 3, 1]);
        let ranges: Vec<_> = events
            .iter()
            .map(|e| (e.first_seq_id, e.last_seq_id_exclusive))
            .collect();
        assert_eq!(ranges, vec![(0, 2), (2, 5), (5, 6)]);
        let indices: Vec<_> = events.iter().map(|e| e.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(
            events.iter().map(|e| e.bytes_consumed).sum::<u64>(),
            file_size
        );
        assert!(loader.is_finished());

        let trace = loader.into_trace();
        assert!(trace.is_complete());
        assert_eq!(trace.len(), 6);
        assert_eq!(trace.chunks_loaded(), 3);
        assert_eq!(trace.bytes_loaded(), file_size);
    }

    #[test]
    fn test_empty_file_is_complete() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "empty.trace", &[]);

        let mut loader = TraceLoader::open(&path, LoaderOptions::default()).unwrap();
        assert!(loader.next().is_none());
        let trace = loader.into_trace();
        assert!(trace.is_complete());
        assert!(trace.is_empty());
    }

    #[test]
    fn test_truncated_chunk_keeps_earlier_chunks() {
        let dir = TempDir::new().unwrap();
        let mut last = chunk(&[0x30, 0x40]);
        last.truncate(last.len() - 3);
        let path = write_file(&dir, "cut.trace", &[chunk(&[0x10]), chunk(&[0x20]), last]);

        let mut loader = TraceLoader::open(&path, LoaderOptions::default()).unwrap();
        assert!(loader.next().unwrap().is_ok());
        assert!(loader.next().unwrap().is_ok());
        let err = loader.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            TraceError::TraceLoadFailed {
                chunk_index: 2,
                reason: CorruptChunk::Truncated { .. },
                ..
            }
        ));
        assert!(loader.next().is_none());

        let trace = loader.into_trace();
        assert!(trace.status().is_failed());
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.get(1).unwrap().address, 0x20);
        assert!(trace.get(2).unwrap_err().is_not_found());
    }

    #[test]
    fn test_partial_length_prefix() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "prefix.trace", &[chunk(&[0x10]), vec![0x05, 0x00]]);

        let trace = TraceLoader::open(&path, LoaderOptions::default())
            .unwrap()
            .finish();

        assert_eq!(trace.len(), 1);
        assert!(matches!(
            trace.status(),
            LoadStatus::Failed {
                chunk_index: 1,
                reason: CorruptChunk::Truncated { needed: 4, .. },
                ..
            }
        ));
    }

    #[test]
    fn test_checksum_failure_mid_file() {
        let dir = TempDir::new().unwrap();
        let mut bad = chunk(&[0x20]);
        // record ends with opcode "nop", nregs:u16, nmems:u16, flags:u8
        let opcode_tail = bad.len() - 6;
        bad[opcode_tail] ^= 0x01;
        let first = chunk(&[0x10]);
        let first_len = first.len() as u64;
        let path = write_file(&dir, "crc.trace", &[first, bad, chunk(&[0x30])]);

        let err = TraceLoader::open(&path, LoaderOptions::default())
            .unwrap()
            .load_all()
            .unwrap_err();
        match err {
            TraceError::TraceLoadFailed {
                chunk_index,
                offset,
                reason,
            } => {
                assert_eq!(chunk_index, 1);
                assert_eq!(offset, first_len);
                assert!(matches!(reason, CorruptChunk::ChecksumMismatch { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }

        // same file decodes when checksums are skipped
        let trace = TraceLoader::open(&path, LoaderOptions::permissive())
            .unwrap()
            .load_all()
            .unwrap();
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.get(1).unwrap().opcode, "noq");
    }

    #[test]
    fn test_chunk_over_limit() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "big.trace", &[chunk(&[1, 2, 3, 4, 5, 6, 7, 8])]);
        let options = LoaderOptions {
            max_chunk_size: 16,
            ..Default::default()
        };

        let trace = TraceLoader::open(&path, options).unwrap().finish();
        assert!(matches!(
            trace.status(),
            LoadStatus::Failed {
                reason: CorruptChunk::BadLength { .. },
                ..
            }
        ));
        assert!(trace.is_empty());
    }

    #[test]
    fn test_early_abandon() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "long.trace", &[chunk(&[1, 2]), chunk(&[3]), chunk(&[4])]);

        let mut loader = TraceLoader::open(&path, LoaderOptions::default()).unwrap();
        let first = loader.next().unwrap().unwrap();
        assert_eq!(first.chunk_record_count, 2);
        assert_eq!(loader.bytes_consumed(), first.bytes_consumed);

        let trace = loader.into_trace();
        assert_eq!(trace.status(), &LoadStatus::Abandoned { chunks_loaded: 1 });
        assert_eq!(trace.len(), 2);
    }

    #[cfg(target_os = "linux")]
    fn open_handles(path: &std::path::Path) -> usize {
        let target = std::fs::canonicalize(path).unwrap();
        std::fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(|entry| std::fs::read_link(entry.ok()?.path()).ok())
            .filter(|link| *link == target)
            .count()
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_drop_mid_load_closes_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "held.trace", &[chunk(&[1]), chunk(&[2]), chunk(&[3])]);

        let mut loader = TraceLoader::open(&path, LoaderOptions::default()).unwrap();
        loader.next().unwrap().unwrap();
        assert_eq!(open_handles(&path), 1);

        drop(loader);
        assert_eq!(open_handles(&path), 0);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_failed_chunk_closes_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "stop.trace", &[chunk(&[1]), vec![0xff, 0xff, 0xff]]);

        let mut loader = TraceLoader::open(&path, LoaderOptions::default()).unwrap();
        loader.next().unwrap().unwrap();
        assert!(loader.next().unwrap().is_err());
        assert_eq!(open_handles(&path), 0);
        assert_eq!(loader.trace().len(), 1);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_read_error_interrupts_load() {
        // regular file whose first read fails with EIO
        let mut loader = TraceLoader::open("/proc/self/mem", LoaderOptions::default()).unwrap();

        let err = loader.next().unwrap().unwrap_err();
        assert!(matches!(err, TraceError::LoadInterrupted { chunk_index: 0, .. }));
        assert!(!err.to_string().contains("I/O error"));
        assert!(loader.next().is_none());

        let trace = loader.into_trace();
        assert!(matches!(
            trace.status(),
            LoadStatus::Interrupted { chunk_index: 0, .. }
        ));
        assert!(trace.load_result().is_err());
    }

    #[test]
    fn test_events_loaded_with_chunk() {
        let dir = TempDir::new().unwrap();
        let mut encoder = ChunkEncoder::new();
        encoder.push_event(&TraceEvent::WaveStart { wave: 0 }).unwrap();
        encoder
            .push_instruction(&InstructionRecord::new(0, 0x10, "nop"))
            .unwrap();
        let path = write_file(&dir, "events.trace", &[chunk(&[0x1]), encoder.finish().unwrap()]);

        let trace = TraceLoader::open(&path, LoaderOptions::default())
            .unwrap()
            .load_all()
            .unwrap();
        assert_eq!(trace.events_at(1), &[TraceEvent::WaveStart { wave: 0 }]);
        assert!(trace.events_at(0).is_empty());
    }
}
