//! Capture worker: pulls frames from the capture device, classifies them, performs the channel
//! lock when a discovery claims it, and submits forwarded frames to the queue.
//!
//! Runs on a dedicated thread because reading the device and submitting to a full queue both
//! block.

use std::sync::Arc;

use wlbridge_core::{Classifier, Outcome};

use crate::capture::{CaptureError, FrameSource};
use crate::hopper::ChannelController;
use crate::queue::ForwardSender;

/// How the capture worker stopped.
#[derive(Debug)]
pub enum CaptureEnd {
    /// The device has no more frames.
    Exhausted,
    /// The forwarding queue closed (session ended).
    QueueClosed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    pub captured: u64,
    pub forwarded: u64,
    pub discovered: u64,
}

pub fn run_capture(
    source: &mut dyn FrameSource,
    classifier: &Classifier,
    controller: &Arc<ChannelController>,
    queue: &ForwardSender,
    stats: &mut CaptureStats,
) -> Result<CaptureEnd, CaptureError> {
    while let Some(frame) = source.next_frame()? {
        stats.captured += 1;
        let outcome = classifier.classify(&frame);
        if let Outcome::Discovered { lock, .. } = &outcome {
            stats.discovered += 1;
            if let Some(lock) = lock {
                controller.lock_blocking(*lock);
            }
        }
        if !outcome.forwards() {
            continue;
        }
        tracing::trace!(
            len = frame.data.len(),
            captured_at = ?frame.meta.timestamp,
            ?outcome,
            "forwarding frame"
        );
        if queue.submit_blocking(frame.data).is_err() {
            return Ok(CaptureEnd::QueueClosed);
        }
        stats.forwarded += 1;
    }
    Ok(CaptureEnd::Exhausted)
}
