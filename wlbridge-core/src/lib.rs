//! wlbridge core: classification of captured 802.11 frames, the peer registry, channel state,
//! and the backchannel wire protocol.
//! Host-driven: no I/O; the daemon feeds captured frames and performs the resulting actions.

pub mod channel;
pub mod classifier;
pub mod dot11;
pub mod mac;
pub mod protocol;
pub mod radiotap;
pub mod registry;
pub mod wire;

pub use channel::{freq_to_channel, ChannelMode, ChannelState};
pub use classifier::{ChannelLock, Classifier, FrameMeta, Outcome, RawFrame, PEER_OUI};
pub use mac::{HardwareAddress, ParseAddressError};
pub use protocol::Message;
pub use registry::{Origin, PeerEntry, PeerRegistry};
pub use wire::{decode_frame, encode_frame, Decoded, FrameDecodeError, FrameEncodeError};
