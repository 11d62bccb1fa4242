//! Capture device: the source of raw frames and the transmit path for injected frames.

use std::thread::JoinHandle;

use tokio::sync::mpsc;
use wlbridge_core::RawFrame;

use crate::config::Settings;

/// Injected frames waiting for the transmit thread.
const INJECT_QUEUE: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[cfg(feature = "pcap")]
    #[error("pcap: {0}")]
    Pcap(#[from] pcap::Error),
    #[error("built without packet capture support (enable the `pcap` feature)")]
    Unsupported,
}

/// Lazy sequence of captured frames. `Ok(None)` means the device has no more frames.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError>;
}

/// Transmit path for frames received from the server.
pub trait Injector: Send {
    fn inject(&mut self, frame: &[u8]) -> Result<(), CaptureError>;
}

pub struct CaptureDevice {
    pub source: Box<dyn FrameSource>,
    pub injector: Box<dyn Injector>,
}

/// Open the capture device for `settings.interface`. Failure here is fatal: no data can flow.
#[cfg(feature = "pcap")]
pub fn open(settings: &Settings) -> Result<CaptureDevice, CaptureError> {
    crate::pcap_capture::open(settings)
}

#[cfg(not(feature = "pcap"))]
pub fn open(_settings: &Settings) -> Result<CaptureDevice, CaptureError> {
    Err(CaptureError::Unsupported)
}

/// Non-blocking handle to the injection thread. Frames are dropped, with a warning, when the
/// transmit path is backed up.
#[derive(Clone)]
pub struct InjectHandle {
    tx: mpsc::Sender<Vec<u8>>,
}

impl InjectHandle {
    pub fn try_inject(&self, frame: Vec<u8>) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("injection queue full, dropping frame from server");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("injection thread stopped, dropping frame from server");
            }
        }
    }
}

/// Run `injector` on its own thread. The thread exits when every handle is dropped.
pub fn spawn_injector(
    mut injector: Box<dyn Injector>,
) -> std::io::Result<(InjectHandle, JoinHandle<()>)> {
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(INJECT_QUEUE);
    let thread = std::thread::Builder::new()
        .name("inject".into())
        .spawn(move || {
            while let Some(frame) = rx.blocking_recv() {
                if let Err(e) = injector.inject(&frame) {
                    tracing::error!(error = %e, len = frame.len(), "could not inject frame");
                }
            }
        })?;
    Ok((InjectHandle { tx }, thread))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Replays a fixed list of frames, then reports the device exhausted.
    pub struct ScriptedSource(pub VecDeque<RawFrame>);

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
            Ok(self.0.pop_front())
        }
    }

    #[derive(Clone, Default)]
    pub struct RecordingInjector {
        pub frames: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl Injector for RecordingInjector {
        fn inject(&mut self, frame: &[u8]) -> Result<(), CaptureError> {
            self.frames.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }
}
