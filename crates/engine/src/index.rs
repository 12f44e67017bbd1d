//! In-memory instruction index
//!
//! [`TraceIndex`] stores instruction records in sequence order, the events
//! attached to each sequence id, and the coverage accumulators.
//!
//! # Design
//!
//! - Instructions: `Vec` indexed by sequence id (ids are contiguous from 0)
//! - Events: FxHashMap keyed by sequence id, SmallVec per id (usually 0-1)
//! - Coverage: FxHashSet of addresses plus FxHashMap of hit counts,
//!   updated on every append and never rebuilt
//!
//! Appends are validated before anything is written, so a rejected batch
//! leaves the index untouched.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::ops::Range;
use tracelens_core::{Address, InstructionRecord, Result, SeqId, TraceError, TraceEvent};
use tracelens_format::DecodedChunk;

type EventList = SmallVec<[TraceEvent; 2]>;

/// Sequential instruction store with coverage accumulators
#[derive(Debug, Default)]
pub struct TraceIndex {
    instructions: Vec<InstructionRecord>,
    events: FxHashMap<SeqId, EventList>,
    event_count: usize,
    addresses_covered: FxHashSet<Address>,
    hit_count: FxHashMap<Address, u64>,
}

impl TraceIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch of instructions and events
    ///
    /// Records must carry the next contiguous sequence ids, starting at
    /// [`next_seq_id`](Self::next_seq_id). Events may reference any id up to
    /// the last record of the batch. Returns the id range that was added.
    pub fn append(
        &mut self,
        records: Vec<InstructionRecord>,
        events: Vec<(SeqId, TraceEvent)>,
    ) -> Result<Range<SeqId>> {
        let start = self.next_seq_id();
        let end = start + records.len() as u64;

        for (expected, record) in (start..end).zip(&records) {
            if record.seq_id != expected {
                return Err(TraceError::SequenceGap {
                    expected,
                    found: record.seq_id,
                });
            }
        }
        if let Some((seq_id, _)) = events.iter().find(|(seq_id, _)| *seq_id >= end) {
            return Err(TraceError::SequenceGap {
                expected: end,
                found: *seq_id,
            });
        }

        for record in &records {
            self.addresses_covered.insert(record.address);
            *self.hit_count.entry(record.address).or_insert(0) += 1;
        }
        self.instructions.extend(records);

        self.event_count += events.len();
        for (seq_id, event) in events {
            self.events.entry(seq_id).or_default().push(event);
        }

        Ok(start..end)
    }

    /// Append everything decoded from one chunk
    pub fn append_chunk(&mut self, chunk: DecodedChunk) -> Result<Range<SeqId>> {
        self.append(chunk.instructions, chunk.events)
    }

    /// Get the instruction at a sequence id
    pub fn get(&self, seq_id: SeqId) -> Result<&InstructionRecord> {
        usize::try_from(seq_id)
            .ok()
            .and_then(|i| self.instructions.get(i))
            .ok_or(TraceError::NotFound(seq_id))
    }

    /// Check if an instruction exists at a sequence id
    pub fn contains(&self, seq_id: SeqId) -> bool {
        seq_id < self.next_seq_id()
    }

    /// Events emitted before the instruction at `seq_id`, in insertion order
    pub fn events_at(&self, seq_id: SeqId) -> &[TraceEvent] {
        self.events
            .get(&seq_id)
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    /// Number of instruction records stored
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Check if no instruction has been stored
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Sequence id the next appended instruction will receive
    pub fn next_seq_id(&self) -> SeqId {
        self.instructions.len() as SeqId
    }

    /// Total number of events stored
    pub fn event_count(&self) -> usize {
        self.event_count
    }

    /// Number of distinct instruction addresses seen
    pub fn unique_address_count(&self) -> usize {
        self.addresses_covered.len()
    }

    /// Number of times an address was executed (0 if never)
    pub fn hit_count_of(&self, address: Address) -> u64 {
        self.hit_count.get(&address).copied().unwrap_or(0)
    }

    /// Check if an address was executed at least once
    pub fn is_covered(&self, address: Address) -> bool {
        self.addresses_covered.contains(&address)
    }

    /// Distinct addresses seen, in no particular order
    pub fn addresses_covered(&self) -> impl Iterator<Item = Address> + '_ {
        self.addresses_covered.iter().copied()
    }

    /// `(address, hit count)` pairs, in no particular order
    pub fn hit_counts(&self) -> impl Iterator<Item = (Address, u64)> + '_ {
        self.hit_count.iter().map(|(address, count)| (*address, *count))
    }

    /// Distinct hit-count values across all covered addresses
    pub fn distinct_hit_counts(&self) -> BTreeSet<u64> {
        self.hit_count.values().copied().collect()
    }

    /// All instructions in sequence order
    pub fn instructions(&self) -> &[InstructionRecord] {
        &self.instructions
    }

    /// Instructions in a sequence id range, clamped to what is stored
    pub fn range(&self, range: Range<SeqId>) -> &[InstructionRecord] {
        let len = self.instructions.len();
        let start = (range.start.min(len as u64)) as usize;
        let end = (range.end.min(len as u64)) as usize;
        if start >= end {
            return &[];
        }
        &self.instructions[start..end]
    }

    /// Instructions paired with the events that precede them
    pub fn iter_with_events(
        &self,
    ) -> impl Iterator<Item = (&InstructionRecord, &[TraceEvent])> + '_ {
        self.instructions
            .iter()
            .map(move |record| (record, self.events_at(record.seq_id)))
    }
}
