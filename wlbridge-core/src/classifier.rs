//! Frame classifier: decides for each captured frame whether it belongs to a peer (forward),
//! announces a new peer (register, maybe lock the channel, forward), or is unrelated (drop).
//!
//! Classification is synchronous and never blocks; the caller performs the channel lock and
//! queue submission afterwards.

use std::sync::Arc;
use std::time::Duration;

use crate::channel::{freq_to_channel, ChannelState};
use crate::dot11::{self, Dot11, Dot11Error};
use crate::mac::HardwareAddress;
use crate::radiotap::{self, RadiotapError};
use crate::registry::PeerRegistry;

/// Vendor OUI carried in the peers' vendor-specific action frames.
pub const PEER_OUI: [u8; 3] = [0x00, 0x22, 0xaa];

/// Capture metadata attached to a frame by the capture device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameMeta {
    /// Capture time since the Unix epoch.
    pub timestamp: Duration,
    /// Captured length is shorter than the on-air length.
    pub truncated: bool,
}

/// One captured frame: RadioTap header followed by the 802.11 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub meta: FrameMeta,
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            meta: FrameMeta::default(),
            data,
        }
    }
}

/// Why a frame was forwarded without registering anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardReason {
    /// Transmitter is a registered peer.
    KnownSender,
    /// Addressed to a registered peer (reply to its broadcast, or an ACK/CTS).
    ReplyToPeer,
    /// Vendor action frame from a peer another frame registered first.
    PeerAnnouncement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    Truncated,
    NoRadiotap(RadiotapError),
    NoDot11(Dot11Error),
    Unrelated,
}

/// Channel to pin the radio to, claimed by the first peer discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLock {
    pub frequency: u16,
    pub channel: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Forward(ForwardReason),
    /// First sighting of `peer`: it is now registered as Local and the frame is forwarded.
    /// `lock` is set for the single discovery that claimed the channel lock.
    Discovered {
        peer: HardwareAddress,
        lock: Option<ChannelLock>,
    },
    Drop(DropReason),
}

impl Outcome {
    pub fn forwards(&self) -> bool {
        !matches!(self, Outcome::Drop(_))
    }
}

pub struct Classifier {
    registry: Arc<PeerRegistry>,
    channel: Arc<ChannelState>,
}

impl Classifier {
    pub fn new(registry: Arc<PeerRegistry>, channel: Arc<ChannelState>) -> Self {
        Self { registry, channel }
    }

    pub fn classify(&self, frame: &RawFrame) -> Outcome {
        if frame.meta.truncated {
            tracing::debug!("found truncated frame, discarding");
            return Outcome::Drop(DropReason::Truncated);
        }
        let rt = match radiotap::parse(&frame.data) {
            Ok(rt) => rt,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "radiotap header not found; the interface is likely not in monitor mode"
                );
                return Outcome::Drop(DropReason::NoRadiotap(e));
            }
        };
        let dot11 = match dot11::parse(&frame.data[rt.header_len..], rt.has_fcs()) {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(error = %e, "error parsing 802.11 header, discarding");
                return Outcome::Drop(DropReason::NoDot11(e));
            }
        };
        self.classify_dot11(&dot11, rt.channel_frequency)
    }

    fn classify_dot11(&self, dot11: &Dot11, frequency: Option<u16>) -> Outcome {
        if let Some(sender) = dot11.sender {
            if self.registry.is_member(&sender) {
                return Outcome::Forward(ForwardReason::KnownSender);
            }
        }

        if self.registry.is_member(&dot11.receiver) {
            // Frames without a sender (ACK, CTS) cannot be attributed; forward them blindly.
            return match dot11.sender {
                Some(sender) => self
                    .register(sender, frequency)
                    .unwrap_or(Outcome::Forward(ForwardReason::ReplyToPeer)),
                None => Outcome::Forward(ForwardReason::ReplyToPeer),
            };
        }

        if let (Some(oui), Some(sender)) = (dot11.vendor_action_oui(), dot11.sender) {
            tracing::trace!(?oui, "vendor specific action frame");
            if oui == PEER_OUI {
                return self
                    .register(sender, frequency)
                    .unwrap_or(Outcome::Forward(ForwardReason::PeerAnnouncement));
            }
        }

        Outcome::Drop(DropReason::Unrelated)
    }

    /// Register `peer` locally. `None` when it was already registered.
    fn register(&self, peer: HardwareAddress, frequency: Option<u16>) -> Option<Outcome> {
        if self.registry.register_local(peer) {
            return None;
        }
        tracing::info!(%peer, "found peer, forwarding its frames");
        let lock = match frequency {
            Some(frequency) if self.channel.try_begin_lock() => Some(ChannelLock {
                frequency,
                channel: freq_to_channel(frequency),
            }),
            Some(_) => None,
            None => {
                if self.channel.is_hopping() {
                    tracing::warn!(
                        %peer,
                        "frame carries no channel frequency, cannot lock channel"
                    );
                }
                None
            }
        };
        Some(Outcome::Discovered { peer, lock })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dot11::testing;
    use crate::registry::Origin;

    fn addr(last: u8) -> HardwareAddress {
        HardwareAddress::new([0x02, 0, 0, 0, 0, last])
    }

    fn captured(freq: u16, dot11: Vec<u8>) -> RawFrame {
        let mut data = radiotap::encode_minimal(freq, 0);
        data.extend_from_slice(&dot11);
        RawFrame::new(data)
    }

    fn setup(channel: ChannelState) -> (Classifier, Arc<PeerRegistry>, Arc<ChannelState>) {
        let registry = Arc::new(PeerRegistry::new());
        let channel = Arc::new(channel);
        let classifier = Classifier::new(registry.clone(), channel.clone());
        (classifier, registry, channel)
    }

    #[test]
    fn vendor_action_registers_locks_and_forwards() {
        let (classifier, registry, channel) = setup(ChannelState::hopping());
        let frame = captured(
            2422,
            testing::vendor_action(HardwareAddress::BROADCAST, addr(1), PEER_OUI),
        );

        let outcome = classifier.classify(&frame);
        assert_eq!(
            outcome,
            Outcome::Discovered {
                peer: addr(1),
                lock: Some(ChannelLock {
                    frequency: 2422,
                    channel: 3
                }),
            }
        );
        assert!(outcome.forwards());
        assert_eq!(registry.origin(&addr(1)), Some(Origin::Local));
        assert!(!channel.is_hopping());

        // Same announcement again: forwarded, nothing new registered or locked.
        assert_eq!(
            classifier.classify(&frame),
            Outcome::Forward(ForwardReason::KnownSender)
        );
        let data = captured(2422, testing::data(addr(7), addr(1)));
        assert_eq!(
            classifier.classify(&data),
            Outcome::Forward(ForwardReason::KnownSender)
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn other_vendor_oui_is_dropped() {
        let (classifier, registry, _) = setup(ChannelState::hopping());
        let frame = captured(
            2437,
            testing::vendor_action(HardwareAddress::BROADCAST, addr(1), [0x00, 0x17, 0xf2]),
        );
        assert_eq!(
            classifier.classify(&frame),
            Outcome::Drop(DropReason::Unrelated)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn reply_to_peer_registers_sender() {
        let (classifier, registry, channel) = setup(ChannelState::hopping());
        registry.merge_remote(&[addr(1)]);

        let reply = captured(2462, testing::data(addr(1), addr(2)));
        assert_eq!(
            classifier.classify(&reply),
            Outcome::Discovered {
                peer: addr(2),
                lock: Some(ChannelLock {
                    frequency: 2462,
                    channel: 11
                }),
            }
        );
        assert_eq!(registry.origin(&addr(2)), Some(Origin::Local));
        assert!(!channel.is_hopping());
    }

    #[test]
    fn ack_to_peer_is_forwarded_blindly() {
        let (classifier, registry, channel) = setup(ChannelState::hopping());
        registry.merge_remote(&[addr(1)]);
        let ack = captured(2412, testing::ack(addr(1)));
        assert_eq!(
            classifier.classify(&ack),
            Outcome::Forward(ForwardReason::ReplyToPeer)
        );
        assert_eq!(registry.len(), 1);
        assert!(channel.is_hopping());
    }

    #[test]
    fn lock_fires_once_across_discoveries() {
        let (classifier, _, _) = setup(ChannelState::hopping());
        let first = captured(
            2412,
            testing::vendor_action(HardwareAddress::BROADCAST, addr(1), PEER_OUI),
        );
        let second = captured(
            2437,
            testing::vendor_action(HardwareAddress::BROADCAST, addr(2), PEER_OUI),
        );
        assert!(matches!(
            classifier.classify(&first),
            Outcome::Discovered { lock: Some(_), .. }
        ));
        assert_eq!(
            classifier.classify(&second),
            Outcome::Discovered {
                peer: addr(2),
                lock: None
            }
        );
    }

    #[test]
    fn fixed_channel_never_locks() {
        let (classifier, registry, _) = setup(ChannelState::fixed());
        let frame = captured(
            2422,
            testing::vendor_action(HardwareAddress::BROADCAST, addr(1), PEER_OUI),
        );
        assert_eq!(
            classifier.classify(&frame),
            Outcome::Discovered {
                peer: addr(1),
                lock: None
            }
        );
        assert!(registry.is_member(&addr(1)));
    }

    #[test]
    fn unrelated_traffic_is_dropped() {
        let (classifier, _, _) = setup(ChannelState::hopping());
        let frame = captured(2412, testing::data(addr(5), addr(6)));
        assert_eq!(
            classifier.classify(&frame),
            Outcome::Drop(DropReason::Unrelated)
        );
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let (classifier, registry, _) = setup(ChannelState::hopping());
        registry.merge_remote(&[addr(1)]);

        let mut truncated = captured(2412, testing::data(addr(1), addr(2)));
        truncated.meta.truncated = true;
        assert_eq!(
            classifier.classify(&truncated),
            Outcome::Drop(DropReason::Truncated)
        );

        let no_radiotap = RawFrame::new(testing::data(addr(1), addr(2)));
        assert!(matches!(
            classifier.classify(&no_radiotap),
            Outcome::Drop(DropReason::NoRadiotap(_))
        ));

        let short = captured(2412, vec![0x08, 0x00, 0x00]);
        assert!(matches!(
            classifier.classify(&short),
            Outcome::Drop(DropReason::NoDot11(_))
        ));
    }

    #[test]
    fn missing_frequency_registers_without_lock() {
        let (classifier, registry, channel) = setup(ChannelState::hopping());
        let mut data = vec![0, 0, 8, 0, 0, 0, 0, 0];
        data.extend_from_slice(&testing::vendor_action(
            HardwareAddress::BROADCAST,
            addr(1),
            PEER_OUI,
        ));
        assert_eq!(
            classifier.classify(&RawFrame::new(data)),
            Outcome::Discovered {
                peer: addr(1),
                lock: None
            }
        );
        assert!(registry.is_member(&addr(1)));
        assert!(channel.is_hopping());
    }
}
