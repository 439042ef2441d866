//! Silence-based utterance segmentation.
//!
//! The segmenter consumes fixed-size PCM frames and slices the continuous
//! stream into bounded utterances. A rolling RMS energy estimate classifies
//! each frame as speech or silence; an utterance closes after
//! `pause_duration_secs` of cumulative trailing silence, or is force-closed
//! at `max_latency_secs` to bound worst-case latency. Each emitted utterance
//! carries the tail of its predecessor as an overlap prefix so word
//! fragments at cut points are not lost.
//!
//! Single-threaded by design: one pipeline instance segments one utterance
//! at a time, so no locking is needed here.

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use murmur_core::config::SegmenterConfig;
use murmur_core::error::{MurmurError, Result};
use murmur_core::types::{AudioFormat, Frame, Utterance};

/// Streaming utterance segmenter.
///
/// `push` consumes one frame and returns at most one utterance. Sequence
/// numbers are assigned at emission and are strictly increasing with no
/// gaps; discarded (too-short) speech does not consume a number.
#[derive(Debug)]
pub struct UtteranceSegmenter {
    config: SegmenterConfig,
    /// Locked from the first frame; a change mid-stream is fatal.
    format: Option<AudioFormat>,
    speaking: bool,
    /// Speech samples accumulated since entering the speaking state.
    buffer: Vec<f32>,
    /// Length of the silence run at the end of `buffer`, in samples.
    trailing_silence: usize,
    /// Tail of the last emitted utterance, prepended to the next one.
    overlap_tail: Vec<f32>,
    started_at: Option<DateTime<Utc>>,
    next_seq: u64,
}

impl UtteranceSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            format: None,
            speaking: false,
            buffer: Vec::new(),
            trailing_silence: 0,
            overlap_tail: Vec::new(),
            started_at: None,
            next_seq: 0,
        }
    }

    /// Whether the segmenter is mid-utterance. The pipeline defers toggle
    /// events while this is true.
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Number of utterances emitted so far (also the next sequence number).
    pub fn emitted(&self) -> u64 {
        self.next_seq
    }

    /// Consume one frame; emit at most one utterance.
    ///
    /// Returns `ConfigMismatch` if the frame's format differs from the
    /// first frame seen — continuing would corrupt segmentation.
    pub fn push(&mut self, frame: &Frame) -> Result<Option<Utterance>> {
        let format = match self.format {
            Some(format) => {
                if format != frame.format {
                    error!(expected = %format, got = %frame.format, "Frame format changed mid-stream");
                    return Err(MurmurError::ConfigMismatch {
                        expected: format,
                        got: frame.format,
                    });
                }
                format
            }
            None => {
                self.format = Some(frame.format);
                frame.format
            }
        };

        let loud = frame.rms() > self.config.energy_threshold;

        if !self.speaking {
            if loud {
                self.speaking = true;
                self.started_at = Some(frame.captured_at);
                self.buffer.extend_from_slice(&frame.samples);
                self.trailing_silence = 0;
            }
            return Ok(None);
        }

        self.buffer.extend_from_slice(&frame.samples);
        if loud {
            self.trailing_silence = 0;
        } else {
            self.trailing_silence += frame.samples.len();
        }

        let sps = format.samples_per_sec() as f32;
        let pause_samples = (self.config.pause_duration_secs * sps) as usize;

        if self.trailing_silence >= pause_samples {
            // Pause boundary: close the utterance minus its trailing silence.
            let speech_len = self.buffer.len().saturating_sub(self.trailing_silence);
            let started_at = self.started_at.take().unwrap_or(frame.captured_at);
            let utterance = self.close_utterance(format, started_at, speech_len);
            self.speaking = false;
            self.buffer.clear();
            self.trailing_silence = 0;
            return Ok(utterance);
        }

        let max_samples = (self.config.max_latency_secs * sps) as usize;
        if self.buffer.len() >= max_samples {
            // Latency cap: force emission without a pause. Stay in the
            // speaking state; subsequent frames open the next utterance.
            debug!(
                buffered_secs = self.buffer.len() as f32 / sps,
                "Max latency reached, forcing utterance emission"
            );
            let started_at = self.started_at.unwrap_or(frame.captured_at);
            let utterance = self.close_utterance(format, started_at, self.buffer.len());
            self.buffer.clear();
            self.trailing_silence = 0;
            self.started_at = Some(frame.captured_at);
            return Ok(utterance);
        }

        Ok(None)
    }

    /// Emit any buffered speech, e.g. at shutdown. The minimum-duration
    /// filter still applies.
    pub fn flush(&mut self) -> Option<Utterance> {
        if !self.speaking || self.buffer.is_empty() {
            return None;
        }
        let format = self.format?;
        let speech_len = self.buffer.len().saturating_sub(self.trailing_silence);
        let started_at = self.started_at.take().unwrap_or_else(Utc::now);
        let utterance = self.close_utterance(format, started_at, speech_len);
        self.speaking = false;
        self.buffer.clear();
        self.trailing_silence = 0;
        utterance
    }

    /// Build an utterance from the first `speech_len` buffered samples plus
    /// the stored overlap prefix, and save the new overlap tail.
    ///
    /// Returns `None` (and leaves the overlap tail untouched) if the speech
    /// is shorter than the configured minimum.
    fn close_utterance(
        &mut self,
        format: AudioFormat,
        started_at: DateTime<Utc>,
        speech_len: usize,
    ) -> Option<Utterance> {
        let sps = format.samples_per_sec() as f32;
        let speech_secs = speech_len as f32 / sps;

        if speech_secs < self.config.min_utterance_secs {
            debug!(
                speech_secs,
                min_secs = self.config.min_utterance_secs,
                "Discarding short speech segment as noise"
            );
            return None;
        }

        let mut samples = Vec::with_capacity(self.overlap_tail.len() + speech_len);
        samples.extend_from_slice(&self.overlap_tail);
        samples.extend_from_slice(&self.buffer[..speech_len]);
        let overlap_prefix = self.overlap_tail.len();

        // The next utterance's prefix is the tail of this one's audio,
        // overlap included.
        let tail_len = (self.config.overlap_secs * sps).round() as usize;
        let tail_start = samples.len().saturating_sub(tail_len);
        self.overlap_tail = samples[tail_start..].to_vec();

        let seq = self.next_seq;
        self.next_seq += 1;
        let duration_secs = samples.len() as f32 / sps;

        debug!(seq, duration_secs, overlap_prefix, "Utterance emitted");

        Some(Utterance {
            seq,
            samples,
            format,
            started_at,
            duration_secs,
            overlap_prefix,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
