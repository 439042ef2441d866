//! Engine assembly: wires the audio queue, segmenter, transcription
//! coordinator, classifier, and action sink into one running pipeline.

pub mod pipeline;
pub mod state;
pub mod stats;

pub use pipeline::DictationPipeline;
pub use state::EngineStateMachine;
pub use stats::{EngineStats, StatsSnapshot};
