//! Transcription coordination: a bounded pool of model workers plus a
//! collector that re-establishes utterance order before delivery.

pub mod coordinator;
pub mod reorder;
pub mod service;

pub use coordinator::{PipelineEvent, TranscriptionCoordinator};
pub use reorder::ReorderBuffer;
pub use service::{MockResponse, MockTranscriptionService, ModelOutput, TranscriptionService};
