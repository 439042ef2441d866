//! Shared data types for the murmur dictation pipeline.
//!
//! Everything that crosses a stage boundary lives here: PCM frames,
//! segmented utterances, transcription results, output actions, and the
//! engine state snapshot. All of these are plain values — stages own them
//! exclusively and hand them downstream exactly once.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MurmurError, Result};

// =============================================================================
// Audio
// =============================================================================

/// Sample rate and channel layout of a PCM stream.
///
/// The segmenter locks onto the format of the first frame it sees; a
/// mid-stream change is a fatal `ConfigMismatch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Samples per second per channel (e.g. 16000).
    pub sample_rate: u32,
    /// Interleaved channel count (1 = mono).
    pub channels: u16,
}

impl AudioFormat {
    /// Total interleaved samples per second of audio.
    pub fn samples_per_sec(&self) -> usize {
        self.sample_rate as usize * self.channels as usize
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz/{}ch", self.sample_rate, self.channels)
    }
}

/// A fixed-size block of PCM samples delivered by the audio collaborator.
///
/// Samples are f32 values in [-1.0, 1.0], interleaved by channel.
/// Immutable once captured; consumed exactly once by the segmenter.
#[derive(Debug, Clone)]
pub struct Frame {
    pub samples: Vec<f32>,
    pub format: AudioFormat,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(samples: Vec<f32>, format: AudioFormat) -> Self {
        Self {
            samples,
            format,
            captured_at: Utc::now(),
        }
    }

    /// Root-mean-square energy of the frame, used for silence detection.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum / self.samples.len() as f32).sqrt()
    }

    /// Frame duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.format.samples_per_sec() as f32
    }
}

/// A bounded segment of captured audio between detected silence boundaries.
///
/// The first `overlap_prefix` samples are duplicated from the tail of the
/// previous utterance so word fragments at cut points are not lost.
/// Sequence numbers are strictly increasing and gapless.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Monotonic, gapless sequence number assigned at emission.
    pub seq: u64,
    /// PCM samples: overlap prefix followed by the captured speech.
    pub samples: Vec<f32>,
    pub format: AudioFormat,
    /// When the first speech frame of this utterance was captured.
    pub started_at: DateTime<Utc>,
    /// Total duration of `samples` in seconds (overlap included).
    pub duration_secs: f32,
    /// Number of leading samples shared with the previous utterance.
    pub overlap_prefix: usize,
}

// =============================================================================
// Transcription
// =============================================================================

/// The transcription of one utterance.
///
/// Produced by a transcription worker, delivered to the classifier strictly
/// in utterance sequence order. A failed or timed-out worker yields an empty
/// text with confidence 0.0 rather than stalling the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptResult {
    pub seq: u64,
    pub text: String,
    /// Model confidence in [0.0, 1.0]. 0.0 marks a recovered failure.
    pub confidence: f32,
    pub language: String,
    pub model: String,
}

impl TranscriptResult {
    /// A zero-confidence placeholder for a failed or missing transcription.
    pub fn failed(seq: u64) -> Self {
        Self {
            seq,
            text: String::new(),
            confidence: 0.0,
            language: String::new(),
            model: String::new(),
        }
    }

    /// Whether this result stands in for a failed worker.
    pub fn is_failure(&self) -> bool {
        self.text.is_empty() && self.confidence == 0.0
    }
}

// =============================================================================
// Keys and actions
// =============================================================================

/// A single key token in a key combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Enter,
    Space,
    Tab,
    Escape,
    Backspace,
    Delete,
    Period,
    Comma,
    Semicolon,
    Colon,
    QuestionMark,
    ExclamationMark,
    Ctrl,
    Shift,
    Alt,
    Super,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
}

impl Key {
    /// Parse a single key token.
    ///
    /// Accepts the `KEY_*` spelling used in command tables ("KEY_CTRL",
    /// "KEY_DOT") as well as bare names ("ctrl", "enter") and single
    /// alphanumeric characters, case-insensitively.
    pub fn parse(token: &str) -> Result<Self> {
        let name = token.trim();
        let name = name
            .strip_prefix("KEY_")
            .or_else(|| name.strip_prefix("key_"))
            .unwrap_or(name)
            .to_ascii_lowercase();

        let key = match name.as_str() {
            "enter" | "return" => Key::Enter,
            "space" => Key::Space,
            "tab" => Key::Tab,
            "esc" | "escape" => Key::Escape,
            "backspace" => Key::Backspace,
            "delete" => Key::Delete,
            "dot" | "period" => Key::Period,
            "comma" => Key::Comma,
            "semicolon" => Key::Semicolon,
            "colon" => Key::Colon,
            "question" | "questionmark" => Key::QuestionMark,
            "exclamation" | "exclamationmark" => Key::ExclamationMark,
            "ctrl" | "leftctrl" => Key::Ctrl,
            "shift" | "leftshift" => Key::Shift,
            "alt" | "leftalt" => Key::Alt,
            "super" | "meta" | "leftmeta" => Key::Super,
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            "home" => Key::Home,
            "end" => Key::End,
            "pageup" => Key::PageUp,
            "pagedown" => Key::PageDown,
            _ => {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphanumeric() => Key::Char(c),
                    _ => {
                        if let Some(n) = name.strip_prefix('f') {
                            if let Ok(n) = n.parse::<u8>() {
                                if (1..=12).contains(&n) {
                                    return Ok(Key::F(n));
                                }
                            }
                        }
                        return Err(MurmurError::Config(format!(
                            "Unknown key token: '{}'",
                            token
                        )));
                    }
                }
            }
        };
        Ok(key)
    }

    /// Parse a `+`-joined key combination, e.g. "KEY_CTRL+KEY_A".
    pub fn parse_combo(combo: &str) -> Result<Vec<Key>> {
        let keys: Result<Vec<Key>> = combo.split('+').map(Key::parse).collect();
        let keys = keys?;
        if keys.is_empty() {
            return Err(MurmurError::Config(format!("Empty key combo: '{}'", combo)));
        }
        Ok(keys)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{}", c),
            Key::Enter => write!(f, "enter"),
            Key::Space => write!(f, "space"),
            Key::Tab => write!(f, "tab"),
            Key::Escape => write!(f, "escape"),
            Key::Backspace => write!(f, "backspace"),
            Key::Delete => write!(f, "delete"),
            Key::Period => write!(f, "period"),
            Key::Comma => write!(f, "comma"),
            Key::Semicolon => write!(f, "semicolon"),
            Key::Colon => write!(f, "colon"),
            Key::QuestionMark => write!(f, "question"),
            Key::ExclamationMark => write!(f, "exclamation"),
            Key::Ctrl => write!(f, "ctrl"),
            Key::Shift => write!(f, "shift"),
            Key::Alt => write!(f, "alt"),
            Key::Super => write!(f, "super"),
            Key::Up => write!(f, "up"),
            Key::Down => write!(f, "down"),
            Key::Left => write!(f, "left"),
            Key::Right => write!(f, "right"),
            Key::Home => write!(f, "home"),
            Key::End => write!(f, "end"),
            Key::PageUp => write!(f, "pageup"),
            Key::PageDown => write!(f, "pagedown"),
            Key::F(n) => write!(f, "f{}", n),
        }
    }
}

/// One output operation, consumed in strict order by the action sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Type literal text into the focused application.
    InsertText(String),
    /// Press the given keys simultaneously.
    PressKeyCombo(Vec<Key>),
    /// Turn dictation on or off (handled by the engine state machine).
    SetDictationActive(bool),
    /// Enter persistent command mode.
    EnterCommandMode,
    /// Leave persistent command mode.
    ExitCommandMode,
}

impl Action {
    /// Whether this action mutates engine state rather than producing output.
    pub fn is_state_action(&self) -> bool {
        matches!(
            self,
            Action::SetDictationActive(_) | Action::EnterCommandMode | Action::ExitCommandMode
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::InsertText(text) => write!(f, "insert {:?}", text),
            Action::PressKeyCombo(keys) => {
                write!(f, "press ")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, "+")?;
                    }
                    write!(f, "{}", key)?;
                }
                Ok(())
            }
            Action::SetDictationActive(on) => write!(f, "set-dictation {}", on),
            Action::EnterCommandMode => write!(f, "enter-command-mode"),
            Action::ExitCommandMode => write!(f, "exit-command-mode"),
        }
    }
}

// =============================================================================
// Engine state and control
// =============================================================================

/// A control message interleaved with the utterance stream.
///
/// Toggles are never applied mid-utterance; the pipeline defers them to the
/// next utterance boundary and threads them through the coordinator so they
/// stay ordered relative to transcripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Flip dictation on/off (hotkey collaborator).
    Toggle,
}

/// Read-only snapshot of the engine state, passed to the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineState {
    /// Whether dictation output is currently enabled.
    pub dictation_active: bool,
    /// Whether persistent command mode is active.
    pub command_mode: bool,
}

// =============================================================================
// Tests
// =============================================================================
