//! Murmur audio crate - frame queue, capture-service boundary, and
//! silence-based utterance segmentation.
//!
//! Raw audio device access lives outside this system; a capture
//! collaborator implements [`AudioCaptureService`] and delivers fixed-size
//! PCM frames into the bounded [`queue`]. The [`UtteranceSegmenter`]
//! consumes those frames and emits bounded utterances with overlap.

pub mod capture;
pub mod queue;
pub mod segmenter;

pub use capture::{AudioCaptureService, MockCaptureService};
pub use queue::{input_queue, InputReceiver, InputSender, PipelineInput};
pub use segmenter::UtteranceSegmenter;
