//! VISCA packet encoding, decoding and reply classification

use std::sync::atomic::{AtomicU8, Ordering};

use super::header::IpHeader;
use super::{
    pan, tilt, CommandIntent, Direction, Framing, BROADCAST, TERMINATOR, TRACKING_OFF_PRESET,
    TRACKING_ON_PRESET,
};

/// Pan speed range accepted by the camera (0x01-0x18)
const PAN_SPEED: (i32, i32) = (0x01, 0x18);
/// Tilt speed range accepted by the camera (0x01-0x14)
const TILT_SPEED: (i32, i32) = (0x01, 0x14);
/// Zoom speed range (0-7)
const ZOOM_SPEED: (i32, i32) = (0, 7);
/// Speeds used by the pan/tilt stop message
const STOP_SPEED: u8 = 0x04;

const ZOOM_TELE: u8 = 0x20;
const ZOOM_WIDE: u8 = 0x30;

fn clamp_speed(value: i32, range: (i32, i32)) -> u8 {
    value.clamp(range.0, range.1) as u8
}

/// Builds camera packets for one configured camera.
///
/// Address and framing are fixed at construction. The wrapped-framing
/// sequence number is owned here and advances once per encoded packet; the
/// atomic counter makes concurrent encoding safe without a lock.
#[derive(Debug)]
pub struct ViscaEncoder {
    address: u8,
    framing: Framing,
    sequence: AtomicU8,
}

impl ViscaEncoder {
    /// Create an encoder. Addresses outside 1-7 are clamped.
    pub fn new(address: i64, framing: Framing) -> Self {
        Self {
            address: address.clamp(1, 7) as u8,
            framing,
            sequence: AtomicU8::new(0),
        }
    }

    pub fn address_byte(&self) -> u8 {
        0x80 | (self.address & 0x0F)
    }

    /// Encode an intent using the configured framing
    pub fn encode(&self, intent: &CommandIntent) -> Vec<u8> {
        let raw = self.encode_raw(intent);
        match self.framing {
            Framing::Raw => raw,
            Framing::Wrapped => self.wrap(&raw),
        }
    }

    /// Encode an intent as a bare VISCA message, ignoring framing
    pub fn encode_raw(&self, intent: &CommandIntent) -> Vec<u8> {
        let a = self.address_byte();

        let mut msg = match intent {
            CommandIntent::PresetRecall(preset) => preset_recall(a, (*preset & 0x7F) as u8),
            CommandIntent::TrackingOn => preset_recall(a, TRACKING_ON_PRESET),
            CommandIntent::TrackingOff => preset_recall(a, TRACKING_OFF_PRESET),
            CommandIntent::PanTilt {
                pan_speed,
                tilt_speed,
                direction,
            } => {
                let [pan_dir, tilt_dir] = direction
                    .map(Direction::bytes)
                    .unwrap_or([pan::STILL, tilt::STILL]);
                vec![
                    a,
                    0x01,
                    0x06,
                    0x01,
                    clamp_speed(*pan_speed, PAN_SPEED),
                    clamp_speed(*tilt_speed, TILT_SPEED),
                    pan_dir,
                    tilt_dir,
                ]
            }
            CommandIntent::PanTiltStop => vec![
                a,
                0x01,
                0x06,
                0x01,
                STOP_SPEED,
                STOP_SPEED,
                pan::STILL,
                tilt::STILL,
            ],
            CommandIntent::ZoomIn(speed) => {
                vec![a, 0x01, 0x04, 0x07, ZOOM_TELE | clamp_speed(*speed, ZOOM_SPEED)]
            }
            CommandIntent::ZoomOut(speed) => {
                vec![a, 0x01, 0x04, 0x07, ZOOM_WIDE | clamp_speed(*speed, ZOOM_SPEED)]
            }
            CommandIntent::ZoomStop => vec![a, 0x01, 0x04, 0x07, 0x00],
            CommandIntent::Home => vec![a, 0x01, 0x06, 0x04],
            CommandIntent::IfClear => vec![BROADCAST, 0x01, 0x00, 0x01],
            CommandIntent::AddressSet => vec![BROADCAST, 0x30, 0x01],
            CommandIntent::CommandCancel(socket) => {
                let socket = if *socket == 2 { 0x02 } else { 0x01 };
                vec![a, 0x20 | socket]
            }
            CommandIntent::PowerOn => vec![a, 0x01, 0x04, 0x00, 0x02],
            CommandIntent::PowerOff => vec![a, 0x01, 0x04, 0x00, 0x03],
            CommandIntent::PowerInquiry => vec![a, 0x09, 0x04, 0x00],
            CommandIntent::VersionInquiry => vec![a, 0x09, 0x00, 0x02],
        };

        msg.push(TERMINATOR);
        msg
    }

    fn wrap(&self, raw: &[u8]) -> Vec<u8> {
        // fetch_add wraps at 256
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let header = IpHeader::new(sequence, raw.len());

        let mut packet = Vec::with_capacity(IpHeader::SIZE + raw.len());
        packet.extend_from_slice(&header.to_bytes());
        packet.extend_from_slice(raw);
        packet
    }
}

fn preset_recall(address: u8, preset: u8) -> Vec<u8> {
    vec![address, 0x01, 0x04, 0x3F, 0x02, preset]
}

/// Split a wrapped packet into its header and raw payload.
///
/// Returns `None` when the header is malformed or the length field does not
/// match the payload.
pub fn split_wrapped(packet: &[u8]) -> Option<(IpHeader, &[u8])> {
    let header = IpHeader::from_bytes(packet)?;
    let payload = &packet[IpHeader::SIZE..];
    if payload.len() != header.payload_len as usize {
        return None;
    }
    Some((header, payload))
}

/// Parse a raw VISCA message back into its address byte and intent.
///
/// A pan/tilt message with the neutral direction pair decodes as
/// `PanTiltStop`, whatever speeds it carries. `PanTilt` with no direction
/// encodes to that pair, so it is the one intent that does not survive
/// encode then decode.
pub fn decode(raw: &[u8]) -> Option<(u8, CommandIntent)> {
    let (&last, body) = raw.split_last()?;
    if last != TERMINATOR {
        return None;
    }

    match body {
        [BROADCAST, 0x01, 0x00, 0x01] => Some((BROADCAST, CommandIntent::IfClear)),
        [BROADCAST, 0x30, 0x01] => Some((BROADCAST, CommandIntent::AddressSet)),
        [address, rest @ ..] if *address & 0xF0 == 0x80 => {
            let intent = match rest {
                [0x01, 0x04, 0x3F, 0x02, preset] => match *preset {
                    TRACKING_ON_PRESET => CommandIntent::TrackingOn,
                    TRACKING_OFF_PRESET => CommandIntent::TrackingOff,
                    p => CommandIntent::PresetRecall(p as u32),
                },
                [0x01, 0x06, 0x01, pan_speed, tilt_speed, pan_dir, tilt_dir] => {
                    match Direction::from_bytes(*pan_dir, *tilt_dir) {
                        Some(direction) => CommandIntent::PanTilt {
                            pan_speed: *pan_speed as i32,
                            tilt_speed: *tilt_speed as i32,
                            direction: Some(direction),
                        },
                        None if (*pan_dir, *tilt_dir) == (pan::STILL, tilt::STILL) => {
                            CommandIntent::PanTiltStop
                        }
                        None => return None,
                    }
                }
                [0x01, 0x04, 0x07, 0x00] => CommandIntent::ZoomStop,
                [0x01, 0x04, 0x07, zoom] if *zoom & 0xF0 == ZOOM_TELE => {
                    CommandIntent::ZoomIn((*zoom & 0x0F) as i32)
                }
                [0x01, 0x04, 0x07, zoom] if *zoom & 0xF0 == ZOOM_WIDE => {
                    CommandIntent::ZoomOut((*zoom & 0x0F) as i32)
                }
                [0x01, 0x06, 0x04] => CommandIntent::Home,
                [0x01, 0x04, 0x00, 0x02] => CommandIntent::PowerOn,
                [0x01, 0x04, 0x00, 0x03] => CommandIntent::PowerOff,
                [0x09, 0x04, 0x00] => CommandIntent::PowerInquiry,
                [0x09, 0x00, 0x02] => CommandIntent::VersionInquiry,
                [cancel] if *cancel & 0xF0 == 0x20 => CommandIntent::CommandCancel(*cancel & 0x0F),
                _ => return None,
            };
            Some((*address, intent))
        }
        _ => None,
    }
}

/// Log form of an outgoing packet: the decoded intent, plus the sequence
/// number when wrapped.
pub fn describe(packet: &[u8]) -> String {
    let (sequence, raw) = match split_wrapped(packet) {
        Some((header, payload)) => (Some(header.sequence), payload),
        None => (None, packet),
    };
    let intent = match decode(raw) {
        Some((_, intent)) => format!("{:?}", intent),
        None => "unrecognised".to_string(),
    };
    match sequence {
        Some(seq) => format!("{} (seq {})", intent, seq),
        None => intent,
    }
}

/// Camera reply classes, for diagnostics only
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    Ack { socket: u8 },
    Completion { socket: u8 },
    Error { socket: u8, code: u8 },
    Unknown(Vec<u8>),
}

/// Split reply bytes on terminators and classify each message
pub fn classify_reply(bytes: &[u8]) -> Vec<ReplyKind> {
    bytes
        .split_inclusive(|b| *b == TERMINATOR)
        .map(|msg| match msg {
            [sender, kind, rest @ ..] if *sender & 0xF0 == 0x90 => {
                let socket = *kind & 0x0F;
                match *kind & 0xF0 {
                    0x40 => ReplyKind::Ack { socket },
                    0x50 => ReplyKind::Completion { socket },
                    0x60 => ReplyKind::Error {
                        socket,
                        code: rest.first().copied().unwrap_or(0),
                    },
                    _ => ReplyKind::Unknown(msg.to_vec()),
                }
            }
            _ => ReplyKind::Unknown(msg.to_vec()),
        })
        .collect()
}
