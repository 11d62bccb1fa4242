//! 802.11 MAC header: frame type, receiver/transmitter addresses, vendor action OUI.
//!
//! Parsing goes through the `ieee80211` crate. Frames it rejects fall back to reading the
//! frame control byte and the address fields at their fixed offsets.

use ieee80211::common::{FrameType as WireFrameType, ManagementFrameSubtype};
use ieee80211::match_frames;
use ieee80211::mgmt_frame::body::action::CategoryCode;
use ieee80211::mgmt_frame::RawActionFrame;
use ieee80211::GenericFrame;

use crate::mac::HardwareAddress;

/// Frame control (2) + duration (2) + address 1 (6).
const MIN_HEADER: usize = 10;
/// Up to and including address 2.
const ADDR2_END: usize = 16;
const FCS_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Management,
    Control,
    Data,
    Extension,
}

impl FrameType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => FrameType::Management,
            1 => FrameType::Control,
            2 => FrameType::Data,
            _ => FrameType::Extension,
        }
    }
}

/// Header fields of a parsed 802.11 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dot11 {
    pub frame_type: FrameType,
    /// Address 1.
    pub receiver: HardwareAddress,
    /// Address 2. Absent on ACK and CTS frames.
    pub sender: Option<HardwareAddress>,
    /// OUI of a vendor-specific action frame.
    pub vendor_oui: Option<[u8; 3]>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Dot11Error {
    #[error("802.11 header truncated ({0} bytes)")]
    Truncated(usize),
}

/// Parse the 802.11 header in `frame`. `has_fcs` strips a trailing checksum first.
pub fn parse(frame: &[u8], has_fcs: bool) -> Result<Dot11, Dot11Error> {
    let frame = if has_fcs && frame.len() >= MIN_HEADER + FCS_LEN {
        &frame[..frame.len() - FCS_LEN]
    } else {
        frame
    };
    let dot11 = match GenericFrame::new(frame, false) {
        Ok(generic) => {
            let (frame_type, is_action) = match generic.frame_control_field().frame_type() {
                WireFrameType::Management(subtype) => (
                    FrameType::Management,
                    matches!(subtype, ManagementFrameSubtype::Action),
                ),
                WireFrameType::Control(_) => (FrameType::Control, false),
                WireFrameType::Data(_) => (FrameType::Data, false),
                _ => (FrameType::Extension, false),
            };
            Dot11 {
                frame_type,
                receiver: HardwareAddress::new(generic.address_1().0),
                sender: generic.address_2().map(|a| HardwareAddress::new(a.0)),
                vendor_oui: if is_action { vendor_action_oui(frame) } else { None },
            }
        }
        Err(_) => parse_raw(frame)?,
    };
    // Only control frames may end before address 2.
    if dot11.sender.is_none() && dot11.frame_type != FrameType::Control {
        return Err(Dot11Error::Truncated(frame.len()));
    }
    Ok(dot11)
}

/// OUI carried by a vendor-specific action frame: category 127 followed by three OUI bytes.
fn vendor_action_oui(frame: &[u8]) -> Option<[u8; 3]> {
    match_frames! {
        frame,
        action = RawActionFrame<'_> => {
            match action.body.category_code {
                CategoryCode::VendorSpecific => action
                    .body
                    .payload
                    .get(..3)
                    .and_then(|oui| <[u8; 3]>::try_from(oui).ok()),
                _ => None,
            }
        }
    }
    .ok()
    .flatten()
}

fn parse_raw(frame: &[u8]) -> Result<Dot11, Dot11Error> {
    if frame.len() < MIN_HEADER {
        return Err(Dot11Error::Truncated(frame.len()));
    }
    let receiver = HardwareAddress::from_slice(&frame[4..MIN_HEADER])
        .ok_or(Dot11Error::Truncated(frame.len()))?;
    let sender = frame
        .get(MIN_HEADER..ADDR2_END)
        .and_then(HardwareAddress::from_slice);
    Ok(Dot11 {
        frame_type: FrameType::from_bits(frame[0] >> 2),
        receiver,
        sender,
        vendor_oui: None,
    })
}

impl Dot11 {
    pub fn vendor_action_oui(&self) -> Option<[u8; 3]> {
        self.vendor_oui
    }
}
