//! VISCA-over-IP envelope header encoding/decoding

/// First two header bytes of every wrapped packet
pub const HEADER_MAGIC: [u8; 2] = [0x01, 0x00];

/// Wrapped packet header (7 bytes)
///
/// Layout: `01 00 [seq] 00 00 [len-hi] [len-lo]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpHeader {
    pub sequence: u8,
    pub payload_len: u16,
}

impl IpHeader {
    pub const SIZE: usize = 7;

    pub fn new(sequence: u8, payload_len: usize) -> Self {
        Self {
            sequence,
            payload_len: payload_len.min(u16::MAX as usize) as u16,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&HEADER_MAGIC);
        buf[2] = self.sequence;
        // buf[3..5] reserved, always zero
        buf[5..7].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        if buf[0..2] != HEADER_MAGIC || buf[3] != 0 || buf[4] != 0 {
            return None;
        }
        Some(Self {
            sequence: buf[2],
            payload_len: u16::from_be_bytes([buf[5], buf[6]]),
        })
    }
}
