//! Slot-ordered release buffer.
//!
//! Results arrive from parallel workers in completion order; downstream
//! consumers need submission order. Each submitted item (utterance or
//! control event) reserves a monotonically increasing slot at submission
//! time, and the buffer releases values only once every earlier slot has
//! resolved.

use std::collections::BTreeMap;

#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: u64,
    pending: BTreeMap<u64, T>,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    /// The slot the buffer is currently waiting on.
    pub fn next_slot(&self) -> u64 {
        self.next
    }

    /// Whether any out-of-order values are held back waiting on `next_slot`.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Resolve `slot` with `value`. Returns every value now releasable in
    /// slot order; empty if `slot` is still ahead of the release point.
    ///
    /// Slots below the release point are already resolved and are ignored.
    pub fn push(&mut self, slot: u64, value: T) -> Vec<T> {
        if slot < self.next {
            return Vec::new();
        }
        self.pending.insert(slot, value);

        let mut released = Vec::new();
        while let Some(value) = self.pending.remove(&self.next) {
            released.push(value);
            self.next += 1;
        }
        released
    }

    /// Drain everything still held, in slot order, advancing past any
    /// unresolved gaps. Used when no more results can arrive.
    pub fn drain(&mut self) -> Vec<T> {
        if let Some((&last, _)) = self.pending.iter().next_back() {
            self.next = last + 1;
        }
        std::mem::take(&mut self.pending).into_values().collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
