//! Pipeline assembly and task wiring.
//!
//! Two long-lived tasks run per pipeline: a segmentation task that turns
//! queued frames into utterances and hands them to the transcription
//! coordinator, and a dispatch task that consumes the coordinator's ordered
//! event stream, classifies transcripts, and drives the action sink. The
//! engine state machine lives inside the dispatch task; nothing else
//! mutates it.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use murmur_audio::queue::{input_queue, InputReceiver, InputSender, PipelineInput};
use murmur_audio::segmenter::UtteranceSegmenter;
use murmur_core::config::{MurmurConfig, OutputConfig};
use murmur_core::error::{MurmurError, Result};
use murmur_core::types::ControlEvent;
use murmur_dispatch::classifier::TextClassifier;
use murmur_dispatch::sink::ActionSink;
use murmur_transcribe::coordinator::{PipelineEvent, TranscriptionCoordinator};
use murmur_transcribe::service::TranscriptionService;

use crate::state::EngineStateMachine;
use crate::stats::{EngineStats, StatsSnapshot};

/// A running dictation pipeline.
///
/// Dropping all `InputSender` handles (including the one held here, via
/// `shutdown`) drains in-flight utterances and stops the tasks.
pub struct DictationPipeline {
    input: InputSender,
    stats: Arc<EngineStats>,
    segmentation: JoinHandle<Result<()>>,
    dispatch: JoinHandle<Result<()>>,
}

impl DictationPipeline {
    /// Validate the configuration and start the pipeline tasks.
    pub fn spawn<S>(
        config: MurmurConfig,
        service: Arc<S>,
        sink: Arc<dyn ActionSink>,
    ) -> Result<Self>
    where
        S: TranscriptionService + Send + Sync + 'static,
    {
        config.validate()?;
        let classifier = TextClassifier::new(&config.dictation)?;
        let stats = Arc::new(EngineStats::new());

        let (input, input_rx) = input_queue(config.audio.queue_capacity);
        let (coordinator, events) = TranscriptionCoordinator::new(&config.transcriber, service);

        info!(
            workers = config.transcriber.workers,
            model = %config.transcriber.model,
            commands = classifier.command_table().len(),
            "Starting dictation pipeline"
        );

        let segmentation = tokio::spawn(run_segmentation(
            input_rx,
            coordinator,
            UtteranceSegmenter::new(config.segmenter.clone()),
            Arc::clone(&stats),
        ));
        let dispatch = tokio::spawn(run_dispatch(
            events,
            classifier,
            sink,
            config.output.clone(),
            Arc::clone(&stats),
        ));

        Ok(Self {
            input,
            stats,
            segmentation,
            dispatch,
        })
    }

    /// A cloneable handle for producers (audio capture, hotkey listener).
    pub fn handle(&self) -> InputSender {
        self.input.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Shared counter handle; stays valid after `shutdown`.
    pub fn stats_handle(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    /// Close the input queue and wait for both tasks to drain.
    ///
    /// Any `InputSender` clones still alive keep the queue open; drop them
    /// first. Returns the first task error, if any.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.input);
        let segmentation = join(self.segmentation).await;
        let dispatch = join(self.dispatch).await;
        segmentation.and(dispatch)
    }
}

async fn join(handle: JoinHandle<Result<()>>) -> Result<()> {
    handle
        .await
        .map_err(|err| MurmurError::Dispatch(format!("pipeline task panicked: {err}")))?
}

/// Frames in, utterances out. Toggles arriving mid-utterance are held until
/// the segmenter returns to silence so a command is never cut in half.
async fn run_segmentation<S>(
    mut input: InputReceiver,
    mut coordinator: TranscriptionCoordinator<S>,
    mut segmenter: UtteranceSegmenter,
    stats: Arc<EngineStats>,
) -> Result<()>
where
    S: TranscriptionService + Send + Sync + 'static,
{
    let mut deferred_toggles: u64 = 0;

    while let Some(event) = input.recv().await {
        match event {
            PipelineInput::Frame(frame) => {
                let emitted = match segmenter.push(&frame) {
                    Ok(emitted) => emitted,
                    Err(err) => {
                        error!(error = %err, "Segmentation failed, stopping pipeline");
                        coordinator.finish().await;
                        return Err(err);
                    }
                };
                if let Some(utterance) = emitted {
                    stats.record_utterance();
                    coordinator.submit(utterance).await?;
                }
                // An utterance boundary (emission or a discarded blip)
                // releases any toggles held back during speech.
                if !segmenter.is_speaking() {
                    while deferred_toggles > 0 {
                        coordinator.submit_control(ControlEvent::Toggle).await?;
                        deferred_toggles -= 1;
                    }
                }
            }
            PipelineInput::Toggle => {
                stats.record_toggle();
                if segmenter.is_speaking() {
                    deferred_toggles += 1;
                } else {
                    coordinator.submit_control(ControlEvent::Toggle).await?;
                }
            }
            PipelineInput::DeviceFault(message) => {
                // Recoverable: capture will retry, segmentation just waits.
                warn!(message = %message, "Audio device fault");
                stats.record_device_fault();
            }
        }
    }

    // Input closed: emit any buffered speech, then drain the workers.
    if let Some(utterance) = segmenter.flush() {
        stats.record_utterance();
        coordinator.submit(utterance).await?;
    }
    while deferred_toggles > 0 {
        coordinator.submit_control(ControlEvent::Toggle).await?;
        deferred_toggles -= 1;
    }
    coordinator.finish().await;
    Ok(())
}

/// Ordered events in, sink actions out.
///
/// State actions always drive the state machine, even while idle, so voice
/// can start dictation. Output actions are suppressed until dictation is
/// active; sink failures are counted and do not stop the pipeline.
async fn run_dispatch(
    mut events: tokio::sync::mpsc::Receiver<PipelineEvent>,
    classifier: TextClassifier,
    sink: Arc<dyn ActionSink>,
    output: OutputConfig,
    stats: Arc<EngineStats>,
) -> Result<()> {
    let mut machine = EngineStateMachine::new();
    let mut transcript_log = open_transcript_log(&output);

    while let Some(event) = events.recv().await {
        let result = match event {
            PipelineEvent::Control(ControlEvent::Toggle) => {
                machine.toggle();
                continue;
            }
            PipelineEvent::Transcript(result) => result,
        };

        stats.record_transcript();
        if result.is_failure() || result.confidence < classifier.confidence_threshold() {
            stats.record_discarded();
        } else if let Some(log) = transcript_log.as_mut() {
            append_transcript(log, result.seq, &result.text);
        }

        let actions = classifier.classify(&result, machine.snapshot());
        for action in actions {
            if machine.apply(&action) {
                continue;
            }
            // Live snapshot per action: "computer start dictation hello"
            // must type "hello".
            if !machine.snapshot().dictation_active || !output.inject_keystrokes {
                stats.record_action_suppressed();
                continue;
            }
            match sink.apply(&action) {
                Ok(()) => stats.record_action_applied(),
                Err(err) => {
                    warn!(action = %action, error = %err, "Action failed");
                    stats.record_action_failed();
                }
            }
        }
    }
    Ok(())
}

fn open_transcript_log(output: &OutputConfig) -> Option<File> {
    let path = output.transcript_file.as_ref()?;
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(err) => {
            warn!(path = %path, error = %err, "Cannot open transcript log, continuing without it");
            None
        }
    }
}

fn append_transcript(log: &mut File, seq: u64, text: &str) {
    if let Err(err) = writeln!(log, "{}\t{}\t{}", Utc::now().to_rfc3339(), seq, text) {
        warn!(error = %err, "Transcript log write failed");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::types::{Action, AudioFormat, Frame, Key};
    use murmur_dispatch::sink::RecordingSink;
    use murmur_transcribe::service::{MockResponse, MockTranscriptionService};

    const FRAME_SAMPLES: usize = 1600; // 100 ms at 16 kHz

    fn speech_frame() -> Frame {
        Frame::new(vec![0.5; FRAME_SAMPLES], AudioFormat::default())
    }

    fn silence_frame() -> Frame {
        Frame::new(vec![0.001; FRAME_SAMPLES], AudioFormat::default())
    }

    fn config() -> MurmurConfig {
        MurmurConfig::default()
    }

    struct Harness {
        pipeline: DictationPipeline,
        sink: Arc<RecordingSink>,
        service: Arc<MockTranscriptionService>,
    }

    fn spawn(config: MurmurConfig) -> Harness {
        let service = Arc::new(MockTranscriptionService::new());
        let sink = Arc::new(RecordingSink::new());
        let pipeline = DictationPipeline::spawn(
            config,
            Arc::clone(&service),
            Arc::clone(&sink) as Arc<dyn ActionSink>,
        )
        .unwrap();
        Harness {
            pipeline,
            sink,
            service,
        }
    }

    /// One spoken utterance: 1.5 s speech, 1.1 s silence.
    async fn speak(input: &InputSender) {
        for _ in 0..15 {
            input.push_frame(speech_frame()).await.unwrap();
        }
        for _ in 0..11 {
            input.push_frame(silence_frame()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_end_to_end_dictation() {
        let h = spawn(config());
        h.service.script(0, MockResponse::text("hello world period"));

        let input = h.pipeline.handle();
        input.toggle().await.unwrap();
        speak(&input).await;
        drop(input);
        h.pipeline.shutdown().await.unwrap();

        assert_eq!(
            h.sink.recorded(),
            vec![
                Action::InsertText("hello world ".to_string()),
                Action::PressKeyCombo(vec![Key::Period]),
            ]
        );
    }

    #[tokio::test]
    async fn test_output_suppressed_while_idle() {
        let h = spawn(config());
        h.service.script(0, MockResponse::text("hello"));

        let input = h.pipeline.handle();
        let stats = h.pipeline.stats_handle();
        speak(&input).await;
        drop(input);
        h.pipeline.shutdown().await.unwrap();

        assert!(h.sink.recorded().is_empty());
        let snap = stats.snapshot();
        assert_eq!(snap.utterances, 1);
        assert_eq!(snap.actions_suppressed, 1);
    }

    #[tokio::test]
    async fn test_voice_start_dictation() {
        let h = spawn(config());
        h.service.script(0, MockResponse::text("computer start dictation"));
        h.service.script(1, MockResponse::text("hello"));

        let input = h.pipeline.handle();
        speak(&input).await;
        speak(&input).await;
        drop(input);
        h.pipeline.shutdown().await.unwrap();

        // The first utterance activates dictation while idle; only the
        // second produces output.
        assert_eq!(
            h.sink.recorded(),
            vec![Action::InsertText("hello ".to_string())]
        );
    }

    #[tokio::test]
    async fn test_toggle_deferred_to_utterance_boundary() {
        let h = spawn(config());
        h.service.script(0, MockResponse::text("first"));
        h.service.script(1, MockResponse::text("second"));

        let input = h.pipeline.handle();
        // Toggle lands mid-utterance: it must apply after the first
        // utterance, so "first" is still classified while idle.
        for _ in 0..8 {
            input.push_frame(speech_frame()).await.unwrap();
        }
        input.toggle().await.unwrap();
        for _ in 0..7 {
            input.push_frame(speech_frame()).await.unwrap();
        }
        for _ in 0..11 {
            input.push_frame(silence_frame()).await.unwrap();
        }
        speak(&input).await;
        drop(input);
        h.pipeline.shutdown().await.unwrap();

        assert_eq!(
            h.sink.recorded(),
            vec![Action::InsertText("second ".to_string())]
        );
    }

    #[tokio::test]
    async fn test_low_confidence_counted_as_discarded() {
        let h = spawn(config());
        h.service
            .script(0, MockResponse::text("mumble").with_confidence(0.2));

        let input = h.pipeline.handle();
        let stats = h.pipeline.stats_handle();
        input.toggle().await.unwrap();
        speak(&input).await;
        drop(input);
        h.pipeline.shutdown().await.unwrap();

        assert!(h.sink.recorded().is_empty());
        assert_eq!(stats.snapshot().discarded, 1);
    }

    #[tokio::test]
    async fn test_device_fault_is_recoverable() {
        let h = spawn(config());
        h.service.script(0, MockResponse::text("still here"));

        let input = h.pipeline.handle();
        let stats = h.pipeline.stats_handle();
        input.toggle().await.unwrap();
        input.device_fault("stream interrupted").await.unwrap();
        speak(&input).await;
        drop(input);
        h.pipeline.shutdown().await.unwrap();

        assert_eq!(stats.snapshot().device_faults, 1);
        assert_eq!(
            h.sink.recorded(),
            vec![Action::InsertText("still here ".to_string())]
        );
    }

    #[tokio::test]
    async fn test_format_change_is_fatal() {
        let h = spawn(config());
        let input = h.pipeline.handle();
        input.push_frame(speech_frame()).await.unwrap();
        input
            .push_frame(Frame::new(
                vec![0.5; FRAME_SAMPLES],
                AudioFormat {
                    sample_rate: 44100,
                    channels: 2,
                },
            ))
            .await
            .unwrap();
        drop(input);

        let err = h.pipeline.shutdown().await.unwrap_err();
        assert!(matches!(err, MurmurError::ConfigMismatch { .. }));
    }

    #[tokio::test]
    async fn test_shutdown_flushes_buffered_speech() {
        let h = spawn(config());
        h.service.script(0, MockResponse::text("trailing words"));

        let input = h.pipeline.handle();
        input.toggle().await.unwrap();
        // Speech with no closing pause: only the shutdown flush emits it.
        for _ in 0..15 {
            input.push_frame(speech_frame()).await.unwrap();
        }
        drop(input);
        h.pipeline.shutdown().await.unwrap();

        assert_eq!(
            h.sink.recorded(),
            vec![Action::InsertText("trailing words ".to_string())]
        );
    }

    #[tokio::test]
    async fn test_sink_failure_counted_not_fatal() {
        let h = spawn(config());
        h.service.script(0, MockResponse::text("one"));
        h.service.script(1, MockResponse::text("two"));
        h.sink.set_fail(true);

        let input = h.pipeline.handle();
        let stats = h.pipeline.stats_handle();
        input.toggle().await.unwrap();
        speak(&input).await;
        speak(&input).await;
        drop(input);
        // Failed injections never stop the pipeline.
        h.pipeline.shutdown().await.unwrap();

        assert!(h.sink.recorded().is_empty());
        assert_eq!(stats.snapshot().actions_failed, 2);
    }

    #[tokio::test]
    async fn test_injection_disabled_suppresses_output_actions() {
        let mut cfg = config();
        cfg.output.inject_keystrokes = false;

        let h = spawn(cfg);
        h.service.script(0, MockResponse::text("hello"));

        let input = h.pipeline.handle();
        let stats = h.pipeline.stats_handle();
        input.toggle().await.unwrap();
        speak(&input).await;
        drop(input);
        h.pipeline.shutdown().await.unwrap();

        assert!(h.sink.recorded().is_empty());
        assert_eq!(stats.snapshot().actions_suppressed, 1);
    }

    #[tokio::test]
    async fn test_capture_service_feeds_pipeline() {
        use murmur_audio::capture::{AudioCaptureService, MockCaptureService};

        let h = spawn(config());
        h.service.script(0, MockResponse::text("from capture"));

        let input = h.pipeline.handle();
        input.toggle().await.unwrap();

        let capture = MockCaptureService::new(input.clone(), AudioFormat::default(), FRAME_SAMPLES);
        capture.start().await.unwrap();
        capture.emit(&vec![0.5; FRAME_SAMPLES * 15]);
        capture.emit(&vec![0.001; FRAME_SAMPLES * 11]);
        capture.stop().await.unwrap();

        drop(capture);
        drop(input);
        h.pipeline.shutdown().await.unwrap();

        assert_eq!(
            h.sink.recorded(),
            vec![Action::InsertText("from capture ".to_string())]
        );
    }

    #[tokio::test]
    async fn test_transcript_log_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcripts.log");
        let mut cfg = config();
        cfg.output.transcript_file = Some(path.to_string_lossy().into_owned());

        let h = spawn(cfg);
        h.service.script(0, MockResponse::text("logged line"));

        let input = h.pipeline.handle();
        input.toggle().await.unwrap();
        speak(&input).await;
        drop(input);
        h.pipeline.shutdown().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("logged line"));
        assert!(contents.contains("\t0\t"));
    }
}
