//! Backchannel message types exchanged with the remote endpoint.

use crate::mac::{HardwareAddress, ParseAddressError};

/// Message kind byte: first byte of every frame payload (see wire module).
pub const KIND_ERROR: u8 = 0;
pub const KIND_PACKET: u8 = 1;
pub const KIND_REGISTER: u8 = 2;

/// All wire message types. Exactly one variant per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Remote-reported failure. Informational only.
    Error { text: String },
    /// One raw captured frame (RadioTap + 802.11) to forward or inject.
    Packet { bytes: Vec<u8> },
    /// Sender's full canonical peer list, never a delta.
    Register { addresses: Vec<String> },
}

impl Message {
    pub fn kind(&self) -> u8 {
        match self {
            Message::Error { .. } => KIND_ERROR,
            Message::Packet { .. } => KIND_PACKET,
            Message::Register { .. } => KIND_REGISTER,
        }
    }

    /// Register message carrying `peers` in canonical string form, in order.
    pub fn register(peers: &[HardwareAddress]) -> Self {
        Message::Register {
            addresses: peers.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Parse the address strings of a Register message. Returns the parsed addresses (in order)
/// and the strings that failed to parse.
pub fn parse_addresses(addresses: &[String]) -> (Vec<HardwareAddress>, Vec<ParseAddressError>) {
    let mut ok = Vec::with_capacity(addresses.len());
    let mut bad = Vec::new();
    for s in addresses {
        match s.parse() {
            Ok(a) => ok.push(a),
            Err(e) => bad.push(e),
        }
    }
    (ok, bad)
}
