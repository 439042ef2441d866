//! Output side of the pipeline.
//!
//! The sink consumes actions synchronously and in order. Sink failures are
//! per-action: the caller counts them and keeps going.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::info;

use murmur_core::error::{MurmurError, Result};
use murmur_core::types::Action;

/// Destination for classified actions (keystroke injection in a full
/// deployment).
pub trait ActionSink: Send + Sync {
    fn apply(&self, action: &Action) -> Result<()>;
}

/// Records every applied action; can be told to fail on demand.
#[derive(Debug, Default)]
pub struct RecordingSink {
    actions: Mutex<Vec<Action>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn recorded(&self) -> Vec<Action> {
        self.actions
            .lock()
            .expect("recording sink lock poisoned")
            .clone()
    }
}

impl ActionSink for RecordingSink {
    fn apply(&self, action: &Action) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MurmurError::Injection("injection unavailable".to_string()));
        }
        self.actions
            .lock()
            .expect("recording sink lock poisoned")
            .push(action.clone());
        Ok(())
    }
}

/// Logs actions instead of injecting them. Used when no injection backend
/// is wired up, or when `inject_keystrokes` is off.
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

impl ActionSink for LogSink {
    fn apply(&self, action: &Action) -> Result<()> {
        info!(action = %action, "Action");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
