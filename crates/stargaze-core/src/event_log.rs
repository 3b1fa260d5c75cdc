// ── Sequence-numbered ring buffer ──
//
// Runs at each agent. One producer pushes; any number of HTTP handlers
// read concurrently. Slots are `ArcSwapOption`s and the published height
// is a single atomic, so neither side ever takes a lock: a reader works
// against the height it observed at call time and notices (and skips) any
// slot the producer overwrote underneath it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use serde::Serialize;

use crate::model::TrafficEvent;

/// A traffic event plus the sequence number the log assigned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedEvent {
    pub seq: u64,
    pub event: TrafficEvent,
}

/// Result of a cursor read.
#[derive(Debug, Clone, Default)]
pub struct ReadResult {
    /// Increasing by `seq`, at most `limit` long.
    pub events: Vec<Arc<BufferedEvent>>,
    /// The cursor referenced data already evicted.
    pub gap_detected: bool,
}

impl ReadResult {
    pub fn first_seq(&self) -> u64 {
        self.events.first().map_or(0, |e| e.seq)
    }

    pub fn last_seq(&self) -> u64 {
        self.events.last().map_or(0, |e| e.seq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub size: u64,
    pub capacity: u64,
    /// 0 when empty.
    pub oldest_seq: u64,
    /// 0 when empty.
    pub newest_seq: u64,
}

/// Fixed-capacity, newest-C-retaining event log with resumable reads.
///
/// Sequence numbers start at 1 and strictly increase. Exactly one task may
/// call [`push`](Self::push); reads are safe from anywhere.
pub struct EventLog {
    slots: Box<[ArcSwapOption<BufferedEvent>]>,
    capacity: u64,
    /// Sequence the next push will receive. Published with `Release` after
    /// the slot store so an `Acquire` load sees every slot below it.
    next_seq: AtomicU64,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl EventLog {
    /// A log holding the newest `capacity` events. Zero is bumped to 1.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots = (0..capacity).map(|_| ArcSwapOption::empty()).collect();
        Self {
            slots,
            capacity: u64::try_from(capacity).unwrap_or(u64::MAX),
            next_seq: AtomicU64::new(1),
        }
    }

    fn slot(&self, seq: u64) -> &ArcSwapOption<BufferedEvent> {
        let idx = usize::try_from((seq - 1) % self.capacity).unwrap_or_default();
        &self.slots[idx]
    }

    // ── Producer ─────────────────────────────────────────────────────

    /// Append an event, overwriting the oldest once full. Returns its sequence.
    pub fn push(&self, event: TrafficEvent) -> u64 {
        let seq = self.next_seq.load(Ordering::Relaxed);
        self.slot(seq).store(Some(Arc::new(BufferedEvent { seq, event })));
        self.next_seq.store(seq + 1, Ordering::Release);
        seq
    }

    // ── Readers ──────────────────────────────────────────────────────

    fn newest_seq_acquire(&self) -> u64 {
        self.next_seq.load(Ordering::Acquire) - 1
    }

    /// Events with `seq > since`, oldest first, capped at `limit`.
    ///
    /// `gap_detected` is set when `since` is non-zero and points before
    /// the oldest retained event, or when the producer lapped this read.
    pub fn read_since(&self, since: u64, limit: usize) -> ReadResult {
        let newest = self.newest_seq_acquire();
        let size = newest.min(self.capacity);
        if size == 0 {
            return ReadResult::default();
        }
        let oldest = newest - size + 1;
        let mut gap_detected = since > 0 && since < oldest - 1;

        let start = since.saturating_add(1).max(oldest);
        let limit = u64::try_from(limit).unwrap_or(u64::MAX);
        if limit == 0 || start > newest {
            return ReadResult {
                events: Vec::new(),
                gap_detected,
            };
        }
        let end = newest.min(start.saturating_add(limit - 1));

        let mut events = Vec::with_capacity(usize::try_from(end - start + 1).unwrap_or_default());
        for seq in start..=end {
            match self.slot(seq).load_full() {
                Some(buffered) if buffered.seq == seq => events.push(buffered),
                // Overwritten after we read the height.
                _ => gap_detected = true,
            }
        }

        ReadResult {
            events,
            gap_detected,
        }
    }

    /// Same as `read_since(0, limit)`.
    pub fn read_all(&self, limit: usize) -> ReadResult {
        self.read_since(0, limit)
    }

    pub fn stats(&self) -> LogStats {
        let newest = self.newest_seq_acquire();
        let size = newest.min(self.capacity);
        LogStats {
            size,
            capacity: self.capacity,
            oldest_seq: if size == 0 { 0 } else { newest - size + 1 },
            newest_seq: newest,
        }
    }

    pub fn len(&self) -> u64 {
        self.newest_seq_acquire().min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn newest_seq(&self) -> u64 {
        self.newest_seq_acquire()
    }
}
