//! Worker-pool coordination with ordered delivery.
//!
//! Up to `workers` transcriptions run concurrently; a collector task
//! re-establishes submission order before anything reaches the dispatcher.
//! Control events (hotkey toggles) travel through the same ordering path as
//! utterances so they land between transcripts exactly where they were
//! submitted, never in the middle of in-flight speech.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use murmur_core::config::TranscriberConfig;
use murmur_core::error::{MurmurError, Result};
use murmur_core::types::{ControlEvent, TranscriptResult, Utterance};

use crate::reorder::ReorderBuffer;
use crate::service::TranscriptionService;

/// An ordered event released by the collector.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Transcript(TranscriptResult),
    Control(ControlEvent),
}

/// Maps a reserved slot to the utterance sequence number occupying it, so
/// the collector can synthesize a failed result if the worker vanishes.
type InFlight = Arc<Mutex<HashMap<u64, u64>>>;

/// Submission side of the transcription stage.
///
/// `submit` blocks once all worker permits are taken, which backpressures
/// the segmentation loop instead of queueing unbounded audio.
pub struct TranscriptionCoordinator<S> {
    service: Arc<S>,
    permits: Arc<Semaphore>,
    worker_timeout: Duration,
    next_slot: u64,
    raw_tx: mpsc::Sender<(u64, PipelineEvent)>,
    in_flight: InFlight,
    collector: JoinHandle<()>,
}

impl<S> TranscriptionCoordinator<S>
where
    S: TranscriptionService + Send + Sync + 'static,
{
    /// Spawn the collector and return the coordinator plus the ordered
    /// event stream.
    pub fn new(
        config: &TranscriberConfig,
        service: Arc<S>,
    ) -> (Self, mpsc::Receiver<PipelineEvent>) {
        let capacity = config.pending_limit.max(1);
        let (raw_tx, raw_rx) = mpsc::channel(capacity);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));

        let collector = tokio::spawn(collect(
            raw_rx,
            out_tx,
            Duration::from_secs_f32(config.result_wait_secs),
            Arc::clone(&in_flight),
        ));

        let coordinator = Self {
            service,
            permits: Arc::new(Semaphore::new(config.workers.max(1))),
            worker_timeout: Duration::from_secs_f32(config.worker_timeout_secs),
            next_slot: 0,
            raw_tx,
            in_flight,
            collector,
        };
        (coordinator, out_rx)
    }

    /// Hand an utterance to a worker. Waits for a free worker permit; the
    /// permit is held until the result reaches the collector.
    pub async fn submit(&mut self, utterance: Utterance) -> Result<()> {
        let slot = self.next_slot;
        self.next_slot += 1;
        let seq = utterance.seq;
        self.in_flight
            .lock()
            .expect("in-flight map lock poisoned")
            .insert(slot, seq);

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| MurmurError::ShuttingDown)?;

        debug!(seq, slot, duration_secs = utterance.duration_secs, "Submitting utterance");

        let service = Arc::clone(&self.service);
        let raw_tx = self.raw_tx.clone();
        let worker_timeout = self.worker_timeout;
        tokio::spawn(async move {
            let result = match timeout(worker_timeout, service.transcribe(utterance)).await {
                Ok(Ok(out)) => TranscriptResult {
                    seq,
                    text: out.text,
                    confidence: out.confidence,
                    language: out.language,
                    model: out.model,
                },
                Ok(Err(err)) => {
                    warn!(seq, error = %err, "Transcription failed");
                    TranscriptResult::failed(seq)
                }
                Err(_) => {
                    warn!(
                        seq,
                        timeout_secs = worker_timeout.as_secs_f32(),
                        "Transcription timed out"
                    );
                    TranscriptResult::failed(seq)
                }
            };
            let _ = raw_tx.send((slot, PipelineEvent::Transcript(result))).await;
            drop(permit);
        });
        Ok(())
    }

    /// Enqueue a control event at the current position in the ordered
    /// stream. Resolves immediately; no worker is involved.
    pub async fn submit_control(&mut self, event: ControlEvent) -> Result<()> {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.raw_tx
            .send((slot, PipelineEvent::Control(event)))
            .await
            .map_err(|_| MurmurError::ShuttingDown)
    }

    /// Stop accepting submissions and wait for in-flight work to drain
    /// through the collector.
    pub async fn finish(self) {
        drop(self.raw_tx);
        // Workers hold channel clones; the collector exits once the last
        // worker reports.
        if let Err(err) = self.collector.await {
            warn!(error = %err, "Collector task failed");
        }
    }
}

/// Receives completion-ordered results and releases them in slot order.
///
/// If the slot at the release point stays unresolved for `result_wait`, its
/// worker is presumed lost and a failed result is synthesized so one bad
/// utterance cannot stall the stream.
async fn collect(
    mut raw_rx: mpsc::Receiver<(u64, PipelineEvent)>,
    out_tx: mpsc::Sender<PipelineEvent>,
    result_wait: Duration,
    in_flight: InFlight,
) {
    let mut buffer = ReorderBuffer::new();
    loop {
        let received = if buffer.has_pending() {
            match timeout(result_wait, raw_rx.recv()).await {
                Ok(msg) => msg,
                Err(_) => {
                    let blocking = buffer.next_slot();
                    let lost = in_flight
                        .lock()
                        .expect("in-flight map lock poisoned")
                        .remove(&blocking);
                    match lost {
                        Some(seq) => {
                            warn!(seq, slot = blocking, "Worker never reported, synthesizing failed result");
                            Some((blocking, PipelineEvent::Transcript(TranscriptResult::failed(seq))))
                        }
                        // The blocking slot is not a worker's; keep waiting.
                        None => continue,
                    }
                }
            }
        } else {
            raw_rx.recv().await
        };

        match received {
            Some((slot, event)) => {
                in_flight
                    .lock()
                    .expect("in-flight map lock poisoned")
                    .remove(&slot);
                for event in buffer.push(slot, event) {
                    if out_tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            None => break,
        }
    }

    // All senders gone. Workers that died without reporting are still in
    // the in-flight map; synthesize failed results for them so their
    // utterances are reported rather than vanishing.
    let mut lost: Vec<(u64, u64)> = in_flight
        .lock()
        .expect("in-flight map lock poisoned")
        .drain()
        .collect();
    lost.sort_unstable();
    for (slot, seq) in lost {
        warn!(seq, slot, "Worker never reported before shutdown, synthesizing failed result");
        for event in buffer.push(slot, PipelineEvent::Transcript(TranscriptResult::failed(seq))) {
            if out_tx.send(event).await.is_err() {
                return;
            }
        }
    }
    for event in buffer.drain() {
        if out_tx.send(event).await.is_err() {
            return;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{MockResponse, MockTranscriptionService};
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

    fn config(workers: usize) -> TranscriberConfig {
        TranscriberConfig {
            workers,
            worker_timeout_secs: 5.0,
            result_wait_secs: 5.0,
            ..TranscriberConfig::default()
        }
    }

    async fn recv_transcript(rx: &mut mpsc::Receiver<PipelineEvent>) -> TranscriptResult {
        match rx.recv().await.expect("stream ended early") {
            PipelineEvent::Transcript(result) => result,
            other => panic!("expected transcript, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delivery_order_despite_slow_first_result() {
        let service = Arc::new(MockTranscriptionService::new());
        service.script(0, MockResponse::text("first").with_delay(Duration::from_millis(100)));
        service.script(1, MockResponse::text("second"));

        let (mut coord, mut rx) = TranscriptionCoordinator::new(&config(2), service);
        coord.submit(utterance(0)).await.unwrap();
        coord.submit(utterance(1)).await.unwrap();

        // Seq 1 completes first but must not be delivered first.
        let a = recv_transcript(&mut rx).await;
        let b = recv_transcript(&mut rx).await;
        assert_eq!((a.seq, a.text.as_str()), (0, "first"));
        assert_eq!((b.seq, b.text.as_str()), (1, "second"));

        coord.finish().await;
    }

    #[tokio::test]
    async fn test_slow_middle_worker_does_not_reorder() {
        let service = Arc::new(MockTranscriptionService::new());
        service.script(2, MockResponse::text("slow").with_delay(Duration::from_millis(120)));

        let (mut coord, mut rx) = TranscriptionCoordinator::new(&config(4), service);
        for seq in 0..5 {
            coord.submit(utterance(seq)).await.unwrap();
        }

        for seq in 0..5 {
            assert_eq!(recv_transcript(&mut rx).await.seq, seq);
        }
        coord.finish().await;
    }

    #[tokio::test]
    async fn test_control_events_stay_in_submission_order() {
        let service = Arc::new(MockTranscriptionService::new());
        service.script(0, MockResponse::text("before").with_delay(Duration::from_millis(80)));

        let (mut coord, mut rx) = TranscriptionCoordinator::new(&config(2), service);
        coord.submit(utterance(0)).await.unwrap();
        coord.submit_control(ControlEvent::Toggle).await.unwrap();
        coord.submit(utterance(1)).await.unwrap();

        let a = rx.recv().await.unwrap();
        let b = rx.recv().await.unwrap();
        let c = rx.recv().await.unwrap();
        assert!(matches!(a, PipelineEvent::Transcript(ref t) if t.seq == 0));
        assert_eq!(b, PipelineEvent::Control(ControlEvent::Toggle));
        assert!(matches!(c, PipelineEvent::Transcript(ref t) if t.seq == 1));

        coord.finish().await;
    }

    #[tokio::test]
    async fn test_model_failure_yields_empty_result_in_order() {
        let service = Arc::new(MockTranscriptionService::new());
        service.script(0, MockResponse::failing());
        service.script(1, MockResponse::text("ok"));

        let (mut coord, mut rx) = TranscriptionCoordinator::new(&config(2), service);
        coord.submit(utterance(0)).await.unwrap();
        coord.submit(utterance(1)).await.unwrap();

        let a = recv_transcript(&mut rx).await;
        assert_eq!(a.seq, 0);
        assert!(a.is_failure());
        let b = recv_transcript(&mut rx).await;
        assert_eq!((b.seq, b.text.as_str()), (1, "ok"));

        coord.finish().await;
    }

    #[tokio::test]
    async fn test_worker_timeout_yields_failed_result() {
        let service = Arc::new(MockTranscriptionService::new());
        service.script(0, MockResponse::text("late").with_delay(Duration::from_millis(200)));

        let mut cfg = config(1);
        cfg.worker_timeout_secs = 0.05;
        let (mut coord, mut rx) = TranscriptionCoordinator::new(&cfg, service);
        coord.submit(utterance(0)).await.unwrap();

        let a = recv_transcript(&mut rx).await;
        assert_eq!(a.seq, 0);
        assert!(a.is_failure());

        coord.finish().await;
    }

    #[tokio::test]
    async fn test_lost_worker_is_skipped_after_result_wait() {
        let service = Arc::new(MockTranscriptionService::new());
        service.script(0, MockResponse::panicking());
        service.script(1, MockResponse::text("after"));

        let mut cfg = config(2);
        cfg.result_wait_secs = 0.05;
        let (mut coord, mut rx) = TranscriptionCoordinator::new(&cfg, service);
        coord.submit(utterance(0)).await.unwrap();
        coord.submit(utterance(1)).await.unwrap();

        let a = recv_transcript(&mut rx).await;
        assert_eq!(a.seq, 0);
        assert!(a.is_failure());
        let b = recv_transcript(&mut rx).await;
        assert_eq!((b.seq, b.text.as_str()), (1, "after"));

        coord.finish().await;
    }

    #[tokio::test]
    async fn test_lost_worker_reported_failed_at_shutdown() {
        let service = Arc::new(MockTranscriptionService::new());
        service.script(0, MockResponse::panicking());

        // No later result ever arrives, so only the shutdown drain can
        // report the loss.
        let (mut coord, mut rx) = TranscriptionCoordinator::new(&config(1), service);
        coord.submit(utterance(0)).await.unwrap();
        coord.finish().await;

        let a = recv_transcript(&mut rx).await;
        assert_eq!(a.seq, 0);
        assert!(a.is_failure());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_worker_pool_limits_concurrency() {
        let service = Arc::new(MockTranscriptionService::new());
        for seq in 0..3 {
            service.script(
                seq,
                MockResponse::text("x").with_delay(Duration::from_millis(30)),
            );
        }

        let (mut coord, mut rx) = TranscriptionCoordinator::new(&config(1), Arc::clone(&service));
        let started = std::time::Instant::now();
        for seq in 0..3 {
            coord.submit(utterance(seq)).await.unwrap();
        }
        // With a single worker the third submit waits for two completions.
        assert!(started.elapsed() >= Duration::from_millis(50));

        for seq in 0..3 {
            assert_eq!(recv_transcript(&mut rx).await.seq, seq);
        }
        coord.finish().await;
    }
}
