//! Voice command table.
//!
//! Built once from configuration into a sorted, immutable table. Lookup is
//! longest-prefix: when several configured phrases are prefixes of each
//! other ("select" vs "select all"), the longest one wins.

use std::collections::BTreeMap;

use murmur_core::error::{MurmurError, Result};
use murmur_core::types::{Action, Key};

/// What a matched command phrase does.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandAction {
    /// One or more key combos pressed in sequence.
    Keys(Vec<Vec<Key>>),
    StartDictation,
    StopDictation,
    CommandModeOn,
    CommandModeOff,
}

impl CommandAction {
    /// Parse an action string from configuration: a system action token or
    /// a comma-separated list of key combos (`KEY_CTRL+KEY_A`).
    pub fn parse(spec: &str) -> Result<Self> {
        match spec.trim() {
            "START_DICTATION" => Ok(Self::StartDictation),
            "STOP_DICTATION" => Ok(Self::StopDictation),
            "COMMAND_MODE_ON" => Ok(Self::CommandModeOn),
            "COMMAND_MODE_OFF" => Ok(Self::CommandModeOff),
            "" => Err(MurmurError::Config("empty command action".to_string())),
            keys => {
                let combos = keys
                    .split(',')
                    .map(|combo| Key::parse_combo(combo.trim()))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::Keys(combos))
            }
        }
    }

    /// Expand into pipeline actions.
    pub fn to_actions(&self) -> Vec<Action> {
        match self {
            Self::Keys(combos) => combos
                .iter()
                .map(|combo| Action::PressKeyCombo(combo.clone()))
                .collect(),
            Self::StartDictation => vec![Action::SetDictationActive(true)],
            Self::StopDictation => vec![Action::SetDictationActive(false)],
            Self::CommandModeOn => vec![Action::EnterCommandMode],
            Self::CommandModeOff => vec![Action::ExitCommandMode],
        }
    }
}

/// Phrase table with longest-prefix lookup over word tokens.
#[derive(Debug, Clone)]
pub struct CommandTable {
    /// Sorted by token count, longest first.
    entries: Vec<(Vec<String>, CommandAction)>,
}

impl CommandTable {
    /// Build from the configured phrase -> action-string map. Phrases are
    /// matched case-insensitively on word tokens.
    pub fn from_config(commands: &BTreeMap<String, String>) -> Result<Self> {
        let mut entries = Vec::with_capacity(commands.len());
        for (phrase, spec) in commands {
            let tokens: Vec<String> = phrase
                .to_lowercase()
                .split_whitespace()
                .map(str::to_string)
                .collect();
            if tokens.is_empty() {
                return Err(MurmurError::Config("empty command phrase".to_string()));
            }
            let action = CommandAction::parse(spec).map_err(|err| {
                MurmurError::Config(format!("command '{phrase}': {err}"))
            })?;
            entries.push((tokens, action));
        }
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Ok(Self { entries })
    }

    /// Longest command phrase that is a prefix of `tokens`, with the number
    /// of tokens it consumes.
    pub fn lookup(&self, tokens: &[&str]) -> Option<(&CommandAction, usize)> {
        self.entries.iter().find_map(|(phrase, action)| {
            let matches = phrase.len() <= tokens.len()
                && phrase.iter().zip(tokens).all(|(p, t)| p == t);
            matches.then_some((action, phrase.len()))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
