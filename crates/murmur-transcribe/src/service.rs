//! Transcription backend abstraction.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use murmur_core::error::{MurmurError, Result};
use murmur_core::types::Utterance;

/// Raw model output for one utterance, before sequencing metadata is
/// attached.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub text: String,
    pub confidence: f32,
    pub language: String,
    pub model: String,
}

/// A speech-to-text backend. Implementations must tolerate concurrent
/// calls; the coordinator runs up to `workers` transcriptions in parallel.
pub trait TranscriptionService {
    fn transcribe(&self, utterance: Utterance) -> impl Future<Output = Result<ModelOutput>> + Send;
}

// =============================================================================
// Mock implementation
// =============================================================================

/// Scripted behavior for one utterance, keyed by sequence number.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub text: String,
    pub confidence: f32,
    pub delay: Duration,
    pub fail: bool,
    pub panic: bool,
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            confidence: 0.9,
            delay: Duration::ZERO,
            fail: false,
            panic: false,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing() -> Self {
        let mut resp = Self::text("");
        resp.fail = true;
        resp
    }

    /// Simulates a worker that dies without reporting back.
    pub fn panicking() -> Self {
        let mut resp = Self::text("");
        resp.panic = true;
        resp
    }
}

/// In-memory transcription service for tests. Unscripted utterances get a
/// deterministic placeholder so ordering tests stay readable.
#[derive(Debug, Default)]
pub struct MockTranscriptionService {
    scripts: Mutex<HashMap<u64, MockResponse>>,
    calls: AtomicU64,
}

impl MockTranscriptionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, seq: u64, response: MockResponse) {
        self.scripts
            .lock()
            .expect("mock script lock poisoned")
            .insert(seq, response);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TranscriptionService for MockTranscriptionService {
    async fn transcribe(&self, utterance: Utterance) -> Result<ModelOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .scripts
            .lock()
            .expect("mock script lock poisoned")
            .get(&utterance.seq)
            .cloned()
            .unwrap_or_else(|| MockResponse::text(&format!("utterance {}", utterance.seq)));

        if !response.delay.is_zero() {
            tokio::time::sleep(response.delay).await;
        }
        if response.panic {
            panic!("scripted worker loss for seq {}", utterance.seq);
        }
        if response.fail {
            return Err(MurmurError::Model(format!(
                "scripted failure for seq {}",
                utterance.seq
            )));
        }

        Ok(ModelOutput {
            text: response.text,
            confidence: response.confidence,
            language: "en".to_string(),
            model: "mock".to_string(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use murmur_core::types::AudioFormat;

    fn utterance(seq: u64) -> Utterance {
        Utterance {
            seq,
            samples: vec![0.0; 1600],
            format: AudioFormat::default(),
            started_at: Utc::now(),
            duration_secs: 0.1,
            overlap_prefix: 0,
        }
    }

    #[tokio::test]
    async fn test_mock_returns_scripted_text() {
        let service = MockTranscriptionService::new();
        service.script(3, MockResponse::text("hello world").with_confidence(0.8));

        let out = service.transcribe(utterance(3)).await.unwrap();
        assert_eq!(out.text, "hello world");
        assert!((out.confidence - 0.8).abs() < f32::EPSILON);
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_default_response() {
        let service = MockTranscriptionService::new();
        let out = service.transcribe(utterance(7)).await.unwrap();
        assert_eq!(out.text, "utterance 7");
    }

    #[tokio::test]
    async fn test_mock_scripted_failure() {
        let service = MockTranscriptionService::new();
        service.script(0, MockResponse::failing());
        let err = service.transcribe(utterance(0)).await.unwrap_err();
        assert!(matches!(err, MurmurError::Model(_)));
    }
}
