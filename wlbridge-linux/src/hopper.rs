//! Channel controller: runs the hop worker while searching for peers and pins the channel once
//! the first peer is found.
//!
//! Locking cancels the hop worker and waits for it to acknowledge before issuing the final
//! channel command, so the worker can never move the radio after the channel is fixed.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use wlbridge_core::channel::{next_hop, HOP_CHANNELS};
use wlbridge_core::{ChannelLock, ChannelState};

use crate::radio::Radio;

/// Highest 2.4 GHz channel the lock command accepts.
const MAX_LOCK_CHANNEL: i32 = 13;

struct HopWorker {
    cancel: CancellationToken,
    stopped: oneshot::Receiver<()>,
}

pub struct ChannelController {
    state: Arc<ChannelState>,
    radio: Arc<dyn Radio>,
    worker: Mutex<Option<HopWorker>>,
}

impl ChannelController {
    pub fn new(state: Arc<ChannelState>, radio: Arc<dyn Radio>) -> Self {
        Self {
            state,
            radio,
            worker: Mutex::new(None),
        }
    }

    /// Spawn the hop worker on the current tokio runtime. No-op when hopping is disabled or the
    /// channel is already locked.
    pub fn start_hopping(&self, interval: Duration) {
        if !self.state.is_hopping() {
            tracing::info!("channel hopping disabled");
            return;
        }
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let (ack_tx, ack_rx) = oneshot::channel();
        tokio::spawn(hop_loop(
            self.state.clone(),
            self.radio.clone(),
            cancel.clone(),
            ack_tx,
            interval,
        ));
        *worker = Some(HopWorker {
            cancel,
            stopped: ack_rx,
        });
    }

    /// Pin the radio to `lock.channel`. Blocks until the hop worker has stopped; call from a
    /// blocking thread, never from inside the async runtime.
    pub fn lock_blocking(&self, lock: ChannelLock) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.cancel.cancel();
            // Err means the worker already exited, which is just as good.
            let _ = worker.stopped.blocking_recv();
        }

        let channel = match u8::try_from(lock.channel) {
            Ok(ch) if lock.channel >= 1 && lock.channel <= MAX_LOCK_CHANNEL => ch,
            _ => {
                tracing::warn!(
                    frequency = lock.frequency,
                    "frequency is outside the 2.4 GHz band, leaving channel unchanged"
                );
                return;
            }
        };
        tracing::info!(
            channel,
            previous = self.state.current_channel(),
            "locking channel"
        );
        if self.radio.set_channel(channel).is_ok() {
            self.state.set_current_channel(channel);
        }
    }
}

async fn hop_loop(
    state: Arc<ChannelState>,
    radio: Arc<dyn Radio>,
    cancel: CancellationToken,
    stopped: oneshot::Sender<()>,
    interval: Duration,
) {
    let mut channel = *HOP_CHANNELS.start();
    while !cancel.is_cancelled() {
        let r = radio.clone();
        let set = tokio::task::spawn_blocking(move || r.set_channel(channel)).await;
        if matches!(set, Ok(Ok(()))) {
            state.set_current_channel(channel);
        }
        channel = next_hop(channel);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    tracing::debug!("channel hopper stopped");
    let _ = stopped.send(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::testing::RecordingRadio;

    fn controller(state: ChannelState) -> (Arc<ChannelController>, Arc<RecordingRadio>) {
        let (ctl, _, radio) = controller_with_state(state);
        (ctl, radio)
    }

    fn controller_with_state(
        state: ChannelState,
    ) -> (Arc<ChannelController>, Arc<ChannelState>, Arc<RecordingRadio>) {
        let radio = Arc::new(RecordingRadio::default());
        let state = Arc::new(state);
        let ctl = Arc::new(ChannelController::new(state.clone(), radio.clone()));
        (ctl, state, radio)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn hops_through_channels_in_order() {
        let (ctl, radio) = controller(ChannelState::hopping());
        ctl.start_hopping(Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let history = radio.history();
        assert!(history.len() >= 12, "only hopped {history:?}");
        for pair in history.windows(2) {
            assert_eq!(pair[1], next_hop(pair[0]));
        }
        assert_eq!(history[0], 1);
        assert!(history.iter().all(|c| (1..=11).contains(c)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lock_stops_hopping_before_fixing_channel() {
        let (ctl, state, radio) = controller_with_state(ChannelState::hopping());
        ctl.start_hopping(Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(state.try_begin_lock());
        let c = ctl.clone();
        tokio::task::spawn_blocking(move || {
            c.lock_blocking(ChannelLock {
                frequency: 2422,
                channel: 3,
            })
        })
        .await
        .unwrap();

        let at_lock = radio.history();
        assert_eq!(at_lock.last(), Some(&3));
        assert_eq!(state.current_channel(), 3);

        // Nothing moves the radio after the lock.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(radio.history(), at_lock);
    }

    #[tokio::test]
    async fn disabled_hopping_never_touches_radio() {
        let (ctl, radio) = controller(ChannelState::fixed());
        ctl.start_hopping(Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(radio.history().is_empty());
    }

    #[test]
    fn lock_without_worker_sets_channel() {
        let (ctl, radio) = controller(ChannelState::hopping());
        ctl.lock_blocking(ChannelLock {
            frequency: 2462,
            channel: 11,
        });
        assert_eq!(radio.history(), vec![11]);
    }

    #[test]
    fn out_of_band_lock_is_ignored() {
        let (ctl, radio) = controller(ChannelState::hopping());
        ctl.lock_blocking(ChannelLock {
            frequency: 5180,
            channel: wlbridge_core::freq_to_channel(5180),
        });
        assert!(radio.history().is_empty());
    }
}
