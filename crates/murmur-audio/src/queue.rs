//! Bounded input queue feeding the segmentation stage.
//!
//! Frames and control messages share one channel so toggles stay ordered
//! relative to the audio around them. The queue is the jitter absorber
//! between the capture callback and the pipeline: the capture side uses
//! `try_push_frame` and drops on overflow (a device callback must never
//! block), while in-process producers use the awaiting `push_frame` and
//! get backpressure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use murmur_core::error::{MurmurError, Result};
use murmur_core::types::Frame;

/// One message on the pipeline input queue.
#[derive(Debug, Clone)]
pub enum PipelineInput {
    /// A PCM frame from the capture collaborator.
    Frame(Frame),
    /// Hotkey toggle; applied at the next utterance boundary.
    Toggle,
    /// Recoverable capture fault; logged and counted, never fatal.
    DeviceFault(String),
}

/// Create a bounded input queue with the given capacity in messages.
pub fn input_queue(capacity: usize) -> (InputSender, InputReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        InputSender {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        InputReceiver { rx },
    )
}

/// Producer handle to the pipeline input queue. Cloneable; the queue closes
/// when every sender is dropped.
#[derive(Debug, Clone)]
pub struct InputSender {
    tx: mpsc::Sender<PipelineInput>,
    dropped: Arc<AtomicU64>,
}

impl InputSender {
    /// Push a frame, waiting if the queue is full (backpressure).
    pub async fn push_frame(&self, frame: Frame) -> Result<()> {
        self.tx
            .send(PipelineInput::Frame(frame))
            .await
            .map_err(|_| MurmurError::ShuttingDown)
    }

    /// Push a frame without waiting. Returns `false` and counts the frame
    /// as dropped if the queue is full or closed.
    pub fn try_push_frame(&self, frame: Frame) -> bool {
        match self.tx.try_send(PipelineInput::Frame(frame)) {
            Ok(()) => true,
            Err(_) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(dropped_total = total, "Input queue full, dropping frame");
                false
            }
        }
    }

    /// Deliver a hotkey toggle event.
    pub async fn toggle(&self) -> Result<()> {
        self.tx
            .send(PipelineInput::Toggle)
            .await
            .map_err(|_| MurmurError::ShuttingDown)
    }

    /// Report a recoverable capture fault.
    pub async fn device_fault(&self, message: impl Into<String>) -> Result<()> {
        self.tx
            .send(PipelineInput::DeviceFault(message.into()))
            .await
            .map_err(|_| MurmurError::ShuttingDown)
    }

    /// Number of frames dropped on overflow since creation.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer half of the pipeline input queue.
#[derive(Debug)]
pub struct InputReceiver {
    rx: mpsc::Receiver<PipelineInput>,
}

impl InputReceiver {
    /// Receive the next input, or `None` once all senders are dropped.
    pub async fn recv(&mut self) -> Option<PipelineInput> {
        self.rx.recv().await
    }
}

// =============================================================================
// Tests
// =============================================================================
