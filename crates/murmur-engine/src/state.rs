//! Engine state machine.
//!
//! Owned by the dispatch task alone; everyone else sees copies of the
//! state, delivered in-band with the event stream. Three effective phases:
//! idle (not dictating), active, and active with persistent command mode.
//! The one-shot command word is resolved inside a single classification and
//! never persists here.

use tracing::info;

use murmur_core::types::{Action, EngineState};

#[derive(Debug, Default)]
pub struct EngineStateMachine {
    state: EngineState,
}

impl EngineStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> EngineState {
        self.state
    }

    pub fn phase(&self) -> &'static str {
        match (self.state.dictation_active, self.state.command_mode) {
            (false, _) => "idle",
            (true, false) => "active",
            (true, true) => "command",
        }
    }

    /// Hotkey toggle: flips dictation on/off. Deactivating also leaves
    /// command mode so the next session starts clean.
    pub fn toggle(&mut self) -> EngineState {
        self.state.dictation_active = !self.state.dictation_active;
        if !self.state.dictation_active {
            self.state.command_mode = false;
        }
        info!(phase = self.phase(), "Dictation toggled");
        self.state
    }

    /// Apply a state-changing action. Returns `false` for output actions,
    /// which this machine does not handle.
    pub fn apply(&mut self, action: &Action) -> bool {
        match action {
            Action::SetDictationActive(on) => {
                self.state.dictation_active = *on;
                if !on {
                    self.state.command_mode = false;
                }
            }
            Action::EnterCommandMode => self.state.command_mode = true,
            Action::ExitCommandMode => self.state.command_mode = false,
            Action::InsertText(_) | Action::PressKeyCombo(_) => return false,
        }
        info!(phase = self.phase(), "Engine state changed");
        true
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        let machine = EngineStateMachine::new();
        assert!(!machine.snapshot().dictation_active);
        assert_eq!(machine.phase(), "idle");
    }

    #[test]
    fn test_toggle_flips_activity() {
        let mut machine = EngineStateMachine::new();
        assert!(machine.toggle().dictation_active);
        assert!(!machine.toggle().dictation_active);
    }

    #[test]
    fn test_deactivation_clears_command_mode() {
        let mut machine = EngineStateMachine::new();
        machine.toggle();
        machine.apply(&Action::EnterCommandMode);
        assert_eq!(machine.phase(), "command");

        machine.apply(&Action::SetDictationActive(false));
        let state = machine.snapshot();
        assert!(!state.dictation_active);
        assert!(!state.command_mode);
    }

    #[test]
    fn test_output_actions_are_not_state_changes() {
        let mut machine = EngineStateMachine::new();
        assert!(!machine.apply(&Action::InsertText("x".to_string())));
        assert!(machine.apply(&Action::SetDictationActive(true)));
    }
}
