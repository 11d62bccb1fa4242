//! RadioTap header parsing. Only the fields needed to locate the channel frequency are decoded.
//!
//! Layout: version (1), pad (1), length (2 LE), one or more 32-bit LE presence words (bit 31
//! chains another word), then fields in bit order, each aligned to its natural size relative to
//! the start of the header.

const HEADER_MIN: usize = 8;
const PRESENT_EXT: u32 = 1 << 31;

const BIT_TSFT: u32 = 0;
const BIT_FLAGS: u32 = 1;
const BIT_RATE: u32 = 2;
const BIT_CHANNEL: u32 = 3;

/// Flags field bit: frame includes a trailing FCS.
pub const FLAG_FCS: u8 = 0x10;

/// Decoded RadioTap metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Radiotap {
    /// Total header length; the 802.11 frame starts here.
    pub header_len: usize,
    /// Channel frequency in MHz, if the Channel field is present.
    pub channel_frequency: Option<u16>,
    /// Flags field, if present.
    pub flags: Option<u8>,
}

impl Radiotap {
    pub fn has_fcs(&self) -> bool {
        self.flags.map(|f| f & FLAG_FCS != 0).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RadiotapError {
    #[error("radiotap header too short")]
    TooShort,
    #[error("unsupported radiotap version {0}")]
    UnsupportedVersion(u8),
    #[error("radiotap length {0} exceeds captured bytes")]
    BadLength(usize),
}

/// Parse the RadioTap header at the front of `bytes`.
pub fn parse(bytes: &[u8]) -> Result<Radiotap, RadiotapError> {
    if bytes.len() < HEADER_MIN {
        return Err(RadiotapError::TooShort);
    }
    if bytes[0] != 0 {
        return Err(RadiotapError::UnsupportedVersion(bytes[0]));
    }
    let header_len = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    if header_len < HEADER_MIN || header_len > bytes.len() {
        return Err(RadiotapError::BadLength(header_len));
    }
    let header = &bytes[..header_len];

    let present = read_u32(header, 4).ok_or(RadiotapError::TooShort)?;
    let mut offset = 8;
    let mut word = present;
    while word & PRESENT_EXT != 0 {
        word = read_u32(header, offset).ok_or(RadiotapError::BadLength(header_len))?;
        offset += 4;
    }

    let mut out = Radiotap {
        header_len,
        channel_frequency: None,
        flags: None,
    };
    if present & (1 << BIT_TSFT) != 0 {
        offset = align(offset, 8) + 8;
    }
    if present & (1 << BIT_FLAGS) != 0 {
        out.flags = header.get(offset).copied();
        offset += 1;
    }
    if present & (1 << BIT_RATE) != 0 {
        offset += 1;
    }
    if present & (1 << BIT_CHANNEL) != 0 {
        offset = align(offset, 2);
        let freq = header
            .get(offset..offset + 2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .ok_or(RadiotapError::BadLength(header_len))?;
        out.channel_frequency = Some(freq);
    }
    Ok(out)
}

fn align(offset: usize, to: usize) -> usize {
    (offset + to - 1) & !(to - 1)
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Build a minimal RadioTap header carrying Flags and Channel. Used by tests and tooling.
pub fn encode_minimal(frequency: u16, flags: u8) -> Vec<u8> {
    let present: u32 = (1 << BIT_FLAGS) | (1 << BIT_CHANNEL);
    // 8 header + 1 flags + 1 pad + 4 channel
    let len: u16 = 14;
    let mut out = Vec::with_capacity(len as usize);
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&present.to_le_bytes());
    out.push(flags);
    out.push(0);
    out.extend_from_slice(&frequency.to_le_bytes());
    out.extend_from_slice(&0x00a0u16.to_le_bytes());
    out
}
