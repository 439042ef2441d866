use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MurmurError, Result};

/// Top-level configuration for the murmur dictation system.
///
/// Loaded from `~/.murmur/config.toml` by default. Each section
/// corresponds to one pipeline stage or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MurmurConfig {
    pub audio: AudioConfig,
    pub segmenter: SegmenterConfig,
    pub transcriber: TranscriberConfig,
    pub dictation: DictationConfig,
    pub output: OutputConfig,
}

impl MurmurConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MurmurConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Validate structural constraints before the pipeline starts.
    ///
    /// Errors name the offending field so a bad config is diagnosable
    /// without reading source.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(MurmurError::Config(
                "audio.sample_rate must be positive".into(),
            ));
        }
        if self.audio.channels == 0 || self.audio.channels > 2 {
            return Err(MurmurError::Config("audio.channels must be 1 or 2".into()));
        }
        if self.audio.frame_size == 0 {
            return Err(MurmurError::Config(
                "audio.frame_size must be positive".into(),
            ));
        }
        if self.segmenter.pause_duration_secs <= 0.0 {
            return Err(MurmurError::Config(
                "segmenter.pause_duration_secs must be positive".into(),
            ));
        }
        if self.segmenter.min_utterance_secs <= 0.0 {
            return Err(MurmurError::Config(
                "segmenter.min_utterance_secs must be positive".into(),
            ));
        }
        if self.segmenter.overlap_secs < 0.0 {
            return Err(MurmurError::Config(
                "segmenter.overlap_secs must not be negative".into(),
            ));
        }
        if self.segmenter.max_latency_secs <= self.segmenter.pause_duration_secs {
            return Err(MurmurError::Config(
                "segmenter.max_latency_secs must exceed pause_duration_secs".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.dictation.confidence_threshold) {
            return Err(MurmurError::Config(
                "dictation.confidence_threshold must be between 0 and 1".into(),
            ));
        }
        if self.dictation.command_mode_word.trim().is_empty() {
            return Err(MurmurError::Config(
                "dictation.command_mode_word must not be empty".into(),
            ));
        }
        if self.transcriber.workers == 0 {
            return Err(MurmurError::Config(
                "transcriber.workers must be at least 1".into(),
            ));
        }
        if self.transcriber.pending_limit == 0 {
            return Err(MurmurError::Config(
                "transcriber.pending_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Audio capture settings declared by the device collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count (mono recommended).
    pub channels: u16,
    /// Samples per delivered frame (1600 = 100 ms at 16 kHz mono).
    pub frame_size: usize,
    /// Bounded frame-queue capacity, in frames.
    pub queue_capacity: usize,
    /// Device name hint, passed through to the capture collaborator.
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            frame_size: 1600,
            queue_capacity: 64,
            device: None,
        }
    }
}

/// Utterance segmentation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Cumulative silence that closes an utterance.
    pub pause_duration_secs: f32,
    /// Speech shorter than this is discarded as noise.
    pub min_utterance_secs: f32,
    /// Audio duplicated across consecutive utterance boundaries.
    pub overlap_secs: f32,
    /// Hard cap forcing emission without a detected pause.
    pub max_latency_secs: f32,
    /// RMS energy above which a frame counts as speech.
    pub energy_threshold: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            pause_duration_secs: 1.0,
            min_utterance_secs: 0.7,
            overlap_secs: 0.2,
            max_latency_secs: 10.0,
            energy_threshold: 0.01,
        }
    }
}

/// Transcription coordinator and model-collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    /// Model identifier, forwarded to the transcription collaborator.
    pub model: String,
    /// Language code for transcription (e.g. "en").
    pub language: String,
    /// Beam width forwarded to the model.
    pub beam_size: u32,
    /// Optional prompt seeding the model's decoding context.
    pub initial_prompt: String,
    /// Parallel transcription workers.
    pub workers: usize,
    /// Bound on buffered results awaiting in-order release.
    pub pending_limit: usize,
    /// Per-utterance transcription timeout.
    pub worker_timeout_secs: f32,
    /// How long the in-order release waits for a missing result before
    /// treating it as failed and advancing.
    pub result_wait_secs: f32,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            model: "small".to_string(),
            language: "en".to_string(),
            beam_size: 5,
            initial_prompt: String::new(),
            workers: 2,
            pending_limit: 8,
            worker_timeout_secs: 30.0,
            result_wait_secs: 5.0,
        }
    }
}

/// Classification policy: confidence gate, command mode, punctuation
/// cues, and the voice-command table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DictationConfig {
    /// Transcripts below this confidence are discarded.
    pub confidence_threshold: f32,
    /// Leading word that turns the rest of an utterance into a command.
    pub command_mode_word: String,
    /// Whether punctuation trigger words are substituted in dictation.
    pub auto_punctuation: bool,
    /// Words replaced by a period keystroke.
    pub sentence_end_words: Vec<String>,
    /// Words replaced by a comma keystroke.
    pub comma_words: Vec<String>,
    /// Words replaced by a question-mark keystroke.
    pub question_words: Vec<String>,
    /// Voice command table: phrase -> action string.
    ///
    /// Action strings are either a system action (`START_DICTATION`,
    /// `STOP_DICTATION`, `COMMAND_MODE_ON`, `COMMAND_MODE_OFF`) or a
    /// comma-separated sequence of key combos (`KEY_CTRL+KEY_A`).
    pub commands: BTreeMap<String, String>,
}

impl Default for DictationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            command_mode_word: "computer".to_string(),
            auto_punctuation: true,
            sentence_end_words: vec![
                "period".to_string(),
                "full stop".to_string(),
                "dot".to_string(),
            ],
            comma_words: vec!["comma".to_string(), "pause".to_string()],
            question_words: vec!["question mark".to_string(), "question".to_string()],
            commands: default_commands(),
        }
    }
}

/// The stock command table.
fn default_commands() -> BTreeMap<String, String> {
    let entries = [
        ("new line", "KEY_ENTER"),
        ("new paragraph", "KEY_ENTER,KEY_ENTER"),
        ("tab key", "KEY_TAB"),
        ("delete word", "KEY_CTRL+KEY_BACKSPACE"),
        ("scratch that", "KEY_CTRL+KEY_Z"),
        ("undo that", "KEY_CTRL+KEY_Z"),
        ("select all", "KEY_CTRL+KEY_A"),
        ("copy that", "KEY_CTRL+KEY_C"),
        ("paste that", "KEY_CTRL+KEY_V"),
        ("start dictation", "START_DICTATION"),
        ("start listening", "START_DICTATION"),
        ("stop dictation", "STOP_DICTATION"),
        ("stop listening", "STOP_DICTATION"),
        ("command mode", "COMMAND_MODE_ON"),
        ("dictation mode", "COMMAND_MODE_OFF"),
    ];
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Output-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Whether actions are forwarded to the keystroke-injection collaborator.
    pub inject_keystrokes: bool,
    /// Optional transcript log, one line per accepted utterance.
    pub transcript_file: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            inject_keystrokes: true,
            transcript_file: None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MurmurConfig::default();
        config.validate().unwrap();
    }

    #[test]
    fn test_default_values() {
        let config = MurmurConfig::default();
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.channels, 1);
        assert!((config.segmenter.pause_duration_secs - 1.0).abs() < f32::EPSILON);
        assert!((config.segmenter.min_utterance_secs - 0.7).abs() < f32::EPSILON);
        assert!((config.segmenter.overlap_secs - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.dictation.command_mode_word, "computer");
        assert!(config.dictation.auto_punctuation);
        assert!(config
            .dictation
            .sentence_end_words
            .contains(&"period".to_string()));
    }

    #[test]
    fn test_default_commands_present() {
        let config = DictationConfig::default();
        assert_eq!(config.commands.get("new line").unwrap(), "KEY_ENTER");
        assert_eq!(
            config.commands.get("stop dictation").unwrap(),
            "STOP_DICTATION"
        );
    }

    #[test]
    fn test_validate_rejects_zero_sample_rate() {
        let mut config = MurmurConfig::default();
        config.audio.sample_rate = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sample_rate"));
    }

    #[test]
    fn test_validate_rejects_bad_channels() {
        let mut config = MurmurConfig::default();
        config.audio.channels = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_confidence_out_of_range() {
        let mut config = MurmurConfig::default();
        config.dictation.confidence_threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("confidence_threshold"));
    }

    #[test]
    fn test_validate_rejects_latency_below_pause() {
        let mut config = MurmurConfig::default();
        config.segmenter.max_latency_secs = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_command_word() {
        let mut config = MurmurConfig::default();
        config.dictation.command_mode_word = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = MurmurConfig::default();
        config.transcriber.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = MurmurConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: MurmurConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.audio.sample_rate, config.audio.sample_rate);
        assert_eq!(parsed.dictation.commands, config.dictation.commands);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            [segmenter]
            pause_duration_secs = 0.5
        "#;
        let config: MurmurConfig = toml::from_str(toml_str).unwrap();
        assert!((config.segmenter.pause_duration_secs - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.dictation.command_mode_word, "computer");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = MurmurConfig::default();
        config.transcriber.workers = 4;
        config.save(&path).unwrap();

        let loaded = MurmurConfig::load(&path).unwrap();
        assert_eq!(loaded.transcriber.workers, 4);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = MurmurConfig::load(Path::new("/nonexistent/murmur.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default_falls_back() {
        let config = MurmurConfig::load_or_default(Path::new("/nonexistent/murmur.toml"));
        assert_eq!(config.audio.sample_rate, 16000);
    }
}
