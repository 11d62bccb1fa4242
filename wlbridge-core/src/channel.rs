//! Channel state: the hop sequence, frequency to channel conversion, and the one-way
//! hopping → locked transition.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// 2.4 GHz channels cycled while searching for a peer.
pub const HOP_CHANNELS: std::ops::RangeInclusive<u8> = 1..=11;

/// Channel number for a 2.4 GHz centre frequency in MHz, channels 1-13 only.
/// Frequencies outside that band give meaningless results.
pub fn freq_to_channel(freq_mhz: u16) -> i32 {
    (i32::from(freq_mhz) - 2407) / 5
}

/// Next channel in the hop cycle after `channel`.
pub fn next_hop(channel: u8) -> u8 {
    if channel >= *HOP_CHANNELS.end() || channel < *HOP_CHANNELS.start() {
        *HOP_CHANNELS.start()
    } else {
        channel + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Hopping,
    /// Channel pinned where the first peer was found. Terminal.
    Locked,
    /// Hopping disabled by configuration; something else owns the channel.
    Fixed,
}

/// Shared channel state. `locked` only ever goes false → true.
#[derive(Debug)]
pub struct ChannelState {
    hopping_enabled: bool,
    locked: AtomicBool,
    current: AtomicU8,
}

impl ChannelState {
    pub fn hopping() -> Self {
        Self {
            hopping_enabled: true,
            locked: AtomicBool::new(false),
            current: AtomicU8::new(0),
        }
    }

    /// Hopping disabled: behaves as a hopper that never moves and never locks.
    pub fn fixed() -> Self {
        Self {
            hopping_enabled: false,
            locked: AtomicBool::new(false),
            current: AtomicU8::new(0),
        }
    }

    pub fn mode(&self) -> ChannelMode {
        if !self.hopping_enabled {
            ChannelMode::Fixed
        } else if self.locked.load(Ordering::Acquire) {
            ChannelMode::Locked
        } else {
            ChannelMode::Hopping
        }
    }

    pub fn is_hopping(&self) -> bool {
        self.mode() == ChannelMode::Hopping
    }

    /// Claim the lock transition. Returns `true` for exactly one caller per session, and never
    /// when hopping is disabled.
    pub fn try_begin_lock(&self) -> bool {
        self.hopping_enabled
            && self
                .locked
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Last channel the radio was set to (0 if never set by us).
    pub fn current_channel(&self) -> u8 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn set_current_channel(&self, channel: u8) {
        self.current.store(channel, Ordering::Relaxed);
    }
}
