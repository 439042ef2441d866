//! Pipeline counters for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters, incremented from the segmentation and dispatch tasks.
#[derive(Debug, Default)]
pub struct EngineStats {
    utterances: AtomicU64,
    transcripts: AtomicU64,
    discarded: AtomicU64,
    actions_applied: AtomicU64,
    actions_failed: AtomicU64,
    actions_suppressed: AtomicU64,
    toggles: AtomicU64,
    device_faults: AtomicU64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_utterance(&self) {
        self.utterances.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transcript(&self) {
        self.transcripts.fetch_add(1, Ordering::Relaxed);
    }

    /// A transcript that produced no actions (failed or low confidence).
    pub fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_action_applied(&self) {
        self.actions_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_action_failed(&self) {
        self.actions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_action_suppressed(&self) {
        self.actions_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_toggle(&self) {
        self.toggles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_fault(&self) {
        self.device_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            utterances: self.utterances.load(Ordering::Relaxed),
            transcripts: self.transcripts.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            actions_applied: self.actions_applied.load(Ordering::Relaxed),
            actions_failed: self.actions_failed.load(Ordering::Relaxed),
            actions_suppressed: self.actions_suppressed.load(Ordering::Relaxed),
            toggles: self.toggles.load(Ordering::Relaxed),
            device_faults: self.device_faults.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub utterances: u64,
    pub transcripts: u64,
    pub discarded: u64,
    pub actions_applied: u64,
    pub actions_failed: u64,
    pub actions_suppressed: u64,
    pub toggles: u64,
    pub device_faults: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = EngineStats::new();
        stats.record_utterance();
        stats.record_utterance();
        stats.record_action_applied();
        stats.record_action_failed();

        let snap = stats.snapshot();
        assert_eq!(snap.utterances, 2);
        assert_eq!(snap.actions_applied, 1);
        assert_eq!(snap.actions_failed, 1);
        assert_eq!(snap.transcripts, 0);
    }
}
