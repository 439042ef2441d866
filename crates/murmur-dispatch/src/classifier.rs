//! Transcript classification policy.
//!
//! `classify` is a pure function of the transcript and the engine state
//! snapshot: the same inputs always produce the same action list. Priority
//! order:
//!
//! 1. confidence gate (below threshold -> no actions)
//! 2. one-shot command word at the start of the utterance
//! 3. persistent command mode
//! 4. longest-prefix command lookup, repeated across the utterance
//! 5. literal dictation with auto-punctuation substitution

use tracing::{debug, trace};

use murmur_core::config::DictationConfig;
use murmur_core::error::Result;
use murmur_core::types::{Action, EngineState, Key, TranscriptResult};

use crate::command_table::CommandTable;

/// Multi-word punctuation triggers, longest first so "question mark" beats
/// "question".
#[derive(Debug, Clone)]
struct PunctuationMatcher {
    triggers: Vec<(Vec<String>, Key)>,
}

impl PunctuationMatcher {
    fn new(config: &DictationConfig) -> Self {
        let mut triggers = Vec::new();
        let groups = [
            (&config.sentence_end_words, Key::Period),
            (&config.comma_words, Key::Comma),
            (&config.question_words, Key::QuestionMark),
        ];
        for (words, key) in groups {
            for word in words {
                let tokens: Vec<String> = word
                    .to_lowercase()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                if !tokens.is_empty() {
                    triggers.push((tokens, key));
                }
            }
        }
        triggers.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { triggers }
    }

    /// Trigger starting at the front of `tokens`, with consumed length.
    fn lookup(&self, tokens: &[&str]) -> Option<(Key, usize)> {
        self.triggers.iter().find_map(|(trigger, key)| {
            let matches = trigger.len() <= tokens.len()
                && trigger.iter().zip(tokens).all(|(t, w)| t == w);
            matches.then_some((*key, trigger.len()))
        })
    }
}

/// Stateless transcript classifier. Engine state is passed in per call;
/// state-changing actions come back out as `Action`s for the engine to
/// apply.
#[derive(Debug, Clone)]
pub struct TextClassifier {
    command_mode_word: String,
    confidence_threshold: f32,
    auto_punctuation: bool,
    table: CommandTable,
    punctuation: PunctuationMatcher,
}

impl TextClassifier {
    pub fn new(config: &DictationConfig) -> Result<Self> {
        Ok(Self {
            command_mode_word: config.command_mode_word.to_lowercase(),
            confidence_threshold: config.confidence_threshold,
            auto_punctuation: config.auto_punctuation,
            table: CommandTable::from_config(&config.commands)?,
            punctuation: PunctuationMatcher::new(config),
        })
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn command_table(&self) -> &CommandTable {
        &self.table
    }

    /// Classify one transcript into an ordered action list.
    pub fn classify(&self, result: &TranscriptResult, state: EngineState) -> Vec<Action> {
        if result.is_failure() || result.confidence < self.confidence_threshold {
            debug!(
                seq = result.seq,
                confidence = result.confidence,
                threshold = self.confidence_threshold,
                "Discarding low-confidence transcript"
            );
            return Vec::new();
        }

        // Tokens keep their original casing for insertion; matching is done
        // on the lowercased form. Consecutive duplicate words (a common
        // recognizer stutter) are collapsed.
        let mut original: Vec<&str> = Vec::new();
        let mut lowered: Vec<String> = Vec::new();
        for word in result.text.split_whitespace() {
            let lower = word.to_lowercase();
            if lowered.last() == Some(&lower) {
                continue;
            }
            original.push(word);
            lowered.push(lower);
        }
        if original.is_empty() {
            return Vec::new();
        }
        let lowered_refs: Vec<&str> = lowered.iter().map(String::as_str).collect();

        if lowered_refs[0] == self.command_mode_word {
            // One-shot activation: the rest of this utterance is commands.
            // Never persists past the utterance; the bare word with no
            // remainder does nothing. Persistent mode is entered only via
            // the configured COMMAND_MODE_ON phrase.
            trace!(seq = result.seq, "Command word prefix");
            return self.classify_commands(&original[1..], &lowered_refs[1..]);
        }

        if state.command_mode {
            return self.classify_commands(&original, &lowered_refs);
        }

        self.classify_dictation(&original, &lowered_refs)
    }

    /// Match commands from the front of the token list; anything after the
    /// first non-command token falls through to literal dictation.
    fn classify_commands(&self, original: &[&str], lowered: &[&str]) -> Vec<Action> {
        let mut actions = Vec::new();
        let mut i = 0;
        while i < lowered.len() {
            match self.table.lookup(&lowered[i..]) {
                Some((command, consumed)) => {
                    actions.extend(command.to_actions());
                    i += consumed;
                }
                None => {
                    actions.extend(self.classify_dictation(&original[i..], &lowered[i..]));
                    break;
                }
            }
        }
        actions
    }

    /// Literal dictation: punctuation trigger words become key presses, the
    /// rest becomes text with a trailing space for continuity with the next
    /// utterance.
    fn classify_dictation(&self, original: &[&str], lowered: &[&str]) -> Vec<Action> {
        let mut actions = Vec::new();
        let mut words: Vec<&str> = Vec::new();
        let mut i = 0;

        let flush = |words: &mut Vec<&str>, actions: &mut Vec<Action>| {
            if !words.is_empty() {
                actions.push(Action::InsertText(format!("{} ", words.join(" "))));
                words.clear();
            }
        };

        while i < lowered.len() {
            if self.auto_punctuation {
                if let Some((key, consumed)) = self.punctuation.lookup(&lowered[i..]) {
                    flush(&mut words, &mut actions);
                    actions.push(Action::PressKeyCombo(vec![key]));
                    i += consumed;
                    continue;
                }
            }
            words.push(original[i]);
            i += 1;
        }
        flush(&mut words, &mut actions);
        actions
    }
}

// =============================================================================
// Tests
// =============================================================================
