use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Fixed-capacity circular history of the most recent lines.
///
/// Slots are claimed by `write_count mod capacity`. A `None` slot has never
/// been written; it is skipped on replay, so an empty line is still a line.
pub struct HistoryRing {
    slots: Mutex<Vec<Option<String>>>,
    /// Total number of accepted lines, never decremented
    write_count: AtomicU64,
    capacity: usize,
}

impl HistoryRing {
    /// Create a ring holding up to `capacity` lines.
    ///
    /// `capacity` must be at least 1; callers validate it beforehand.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "history capacity must be positive");
        Self {
            slots: Mutex::new(vec![None; capacity]),
            write_count: AtomicU64::new(0),
            capacity,
        }
    }

    /// Store a line in the next slot, overwriting the oldest one once full.
    ///
    /// Returns the sequence number of the stored line (0 for the first line).
    pub fn push(&self, line: String) -> u64 {
        let mut slots = self.lock();
        let seq = self.write_count.fetch_add(1, Ordering::AcqRel);
        slots[self.slot_index(seq)] = Some(line);
        seq
    }

    /// The most recent `n` lines, oldest first.
    ///
    /// `n` is clamped to the capacity and to the number of lines ever written.
    pub fn recent(&self, n: usize) -> Vec<String> {
        let slots = self.lock();
        let count = self.write_count.load(Ordering::Acquire);
        let available = usize::try_from(count).unwrap_or(usize::MAX).min(self.capacity);
        let n = n.min(available) as u64;

        (count - n..count)
            .filter_map(|seq| slots[self.slot_index(seq)].clone())
            .collect()
    }

    /// All retained lines, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        self.recent(self.capacity)
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn slot_index(&self, seq: u64) -> usize {
        (seq % self.capacity as u64) as usize
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<String>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
