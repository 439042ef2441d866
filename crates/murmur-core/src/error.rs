use thiserror::Error;

use crate::types::AudioFormat;

/// Top-level error type for the murmur system.
///
/// The taxonomy mirrors the pipeline's fault model: `Device`, `Model`, and
/// `Injection` faults are recoverable and converted into typed results that
/// flow downstream; `ConfigMismatch` is fatal because continuing would
/// corrupt segmentation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MurmurError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio device fault: {0}")]
    Device(String),

    #[error("Transcription model fault: {0}")]
    Model(String),

    #[error("Keystroke injection fault: {0}")]
    Injection(String),

    #[error("Audio format mismatch: expected {expected}, got {got}")]
    ConfigMismatch {
        expected: AudioFormat,
        got: AudioFormat,
    },

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for MurmurError {
    fn from(err: toml::de::Error) -> Self {
        MurmurError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for MurmurError {
    fn from(err: toml::ser::Error) -> Self {
        MurmurError::Config(err.to_string())
    }
}

/// A specialized `Result` type for murmur operations.
pub type Result<T> = std::result::Result<T, MurmurError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MurmurError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_config_mismatch_display() {
        let err = MurmurError::ConfigMismatch {
            expected: AudioFormat {
                sample_rate: 16000,
                channels: 1,
            },
            got: AudioFormat {
                sample_rate: 44100,
                channels: 2,
            },
        };
        assert_eq!(
            err.to_string(),
            "Audio format mismatch: expected 16000Hz/1ch, got 44100Hz/2ch"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MurmurError = io_err.into();
        assert!(matches!(err, MurmurError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let bad_toml = "invalid = [[[";
        let parsed: std::result::Result<toml::Value, _> = toml::from_str(bad_toml);
        assert!(parsed.is_err());
        let err: MurmurError = parsed.unwrap_err().into();
        assert!(matches!(err, MurmurError::Config(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let _value = io_result?;
            Ok("success".to_string())
        }

        assert_eq!(inner().unwrap(), "success");
    }

    #[test]
    fn test_recoverable_variants() {
        let errors = [
            MurmurError::Device("stream stalled".into()),
            MurmurError::Model("inference failed".into()),
            MurmurError::Injection("permission denied".into()),
        ];
        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }
}
