//! Forwarding queue: bounded FIFO between the capture worker and the server writer.
//!
//! Producers block when the queue is full; frames are never dropped. The queue closes when the
//! last sender is dropped, after which the receiver yields the remaining frames and then `None`.

use tokio::sync::mpsc;

/// Queue closed: the session writer is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("forwarding queue closed")]
pub struct QueueClosed;

#[derive(Clone)]
pub struct ForwardSender {
    tx: mpsc::Sender<Vec<u8>>,
}

pub struct ForwardReceiver {
    rx: mpsc::Receiver<Vec<u8>>,
}

pub fn forward_queue(capacity: usize) -> (ForwardSender, ForwardReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (ForwardSender { tx }, ForwardReceiver { rx })
}

impl ForwardSender {
    /// Submit from a blocking thread, waiting for room if the queue is full.
    pub fn submit_blocking(&self, frame: Vec<u8>) -> Result<(), QueueClosed> {
        self.tx.blocking_send(frame).map_err(|_| QueueClosed)
    }

    #[cfg(test)]
    pub async fn submit(&self, frame: Vec<u8>) -> Result<(), QueueClosed> {
        self.tx.send(frame).await.map_err(|_| QueueClosed)
    }
}

impl ForwardReceiver {
    /// Next frame in submission order; `None` once closed and drained.
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Stop accepting new frames. Already queued frames are still delivered.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
