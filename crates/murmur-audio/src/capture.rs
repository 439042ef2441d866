//! Capture-service boundary.
//!
//! The real microphone lives outside this system. A capture collaborator
//! implements [`AudioCaptureService`] and feeds frames into the pipeline's
//! input queue from its device callback. The mock implementation here lets
//! tests drive the pipeline without audio hardware.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use murmur_core::error::{MurmurError, Result};
use murmur_core::types::{AudioFormat, Frame};

use crate::queue::InputSender;

/// Service for managing audio capture from a device.
///
/// Implementations handle device initialization, starting/stopping the
/// capture stream, and reporting capture state. Device errors surface as
/// `MurmurError::Device` and are recoverable.
pub trait AudioCaptureService: Send + Sync {
    /// Start delivering frames into the pipeline input queue.
    fn start(&self) -> impl Future<Output = Result<()>> + Send;

    /// Stop the current capture stream.
    fn stop(&self) -> impl Future<Output = Result<()>> + Send;

    /// Whether capture is currently active.
    fn is_active(&self) -> bool;
}

/// Mock capture service for testing.
///
/// Simulates a microphone without hardware: tests call [`emit`] with raw
/// samples and the service slices them into fixed-size frames, delivered
/// through the non-blocking path a real device callback would use.
///
/// [`emit`]: MockCaptureService::emit
#[derive(Debug, Clone)]
pub struct MockCaptureService {
    sender: InputSender,
    format: AudioFormat,
    frame_size: usize,
    active: Arc<AtomicBool>,
}

impl MockCaptureService {
    pub fn new(sender: InputSender, format: AudioFormat, frame_size: usize) -> Self {
        Self {
            sender,
            format,
            frame_size,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Deliver `samples` as fixed-size frames. Returns the number of frames
    /// enqueued; frames dropped on overflow are not counted.
    pub fn emit(&self, samples: &[f32]) -> usize {
        if !self.active.load(Ordering::Relaxed) {
            return 0;
        }
        let mut enqueued = 0;
        for chunk in samples.chunks(self.frame_size) {
            let frame = Frame::new(chunk.to_vec(), self.format);
            if self.sender.try_push_frame(frame) {
                enqueued += 1;
            }
        }
        enqueued
    }
}

impl AudioCaptureService for MockCaptureService {
    async fn start(&self) -> Result<()> {
        if self.active.load(Ordering::Relaxed) {
            return Err(MurmurError::Device("capture is already active".to_string()));
        }
        self.active.store(true, Ordering::Relaxed);
        tracing::info!(format = %self.format, "Mock audio capture started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.active.load(Ordering::Relaxed) {
            return Err(MurmurError::Device("capture is not active".to_string()));
        }
        self.active.store(false, Ordering::Relaxed);
        tracing::info!("Mock audio capture stopped");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================
