//! Camera protocol module - command intents and VISCA encoding

pub mod header;
mod visca;

pub use visca::{classify_reply, describe, ViscaEncoder};

use serde::Deserialize;

/// Terminator byte closing every VISCA message
pub const TERMINATOR: u8 = 0xFF;

/// Address byte used by broadcast commands (I/F clear, address set)
pub const BROADCAST: u8 = 0x88;

/// Preset numbers the tracking camera family reserves for auto-tracking
pub const TRACKING_ON_PRESET: u8 = 0x50;
pub const TRACKING_OFF_PRESET: u8 = 0x51;

/// Speed used when a caller does not specify one
pub const DEFAULT_SPEED: i32 = 4;

/// How encoded packets are put on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Bare VISCA message: `8x 01 ... FF`
    #[default]
    Raw,
    /// VISCA-over-IP envelope: 7-byte header followed by the raw message
    Wrapped,
}

/// Pan/tilt directions, numbered the way the web UI sends them
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left = 1,
    Right = 2,
    Up = 3,
    Down = 4,
    UpLeft = 5,
    UpRight = 6,
    DownLeft = 7,
    DownRight = 8,
}

impl Direction {
    /// Map a UI direction code. Unknown codes yield `None`, which encodes as
    /// the neutral (no motion) pair.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Direction::Left),
            2 => Some(Direction::Right),
            3 => Some(Direction::Up),
            4 => Some(Direction::Down),
            5 => Some(Direction::UpLeft),
            6 => Some(Direction::UpRight),
            7 => Some(Direction::DownLeft),
            8 => Some(Direction::DownRight),
            _ => None,
        }
    }

    /// Pan and tilt direction bytes
    pub fn bytes(self) -> [u8; 2] {
        match self {
            Direction::Up => [pan::STILL, tilt::UP],
            Direction::Down => [pan::STILL, tilt::DOWN],
            Direction::Left => [pan::LEFT, tilt::STILL],
            Direction::Right => [pan::RIGHT, tilt::STILL],
            Direction::UpLeft => [pan::LEFT, tilt::UP],
            Direction::UpRight => [pan::RIGHT, tilt::UP],
            Direction::DownLeft => [pan::LEFT, tilt::DOWN],
            Direction::DownRight => [pan::RIGHT, tilt::DOWN],
        }
    }

    /// Inverse of [`Direction::bytes`]
    pub fn from_bytes(pan_dir: u8, tilt_dir: u8) -> Option<Self> {
        [
            Direction::Left,
            Direction::Right,
            Direction::Up,
            Direction::Down,
            Direction::UpLeft,
            Direction::UpRight,
            Direction::DownLeft,
            Direction::DownRight,
        ]
        .into_iter()
        .find(|d| d.bytes() == [pan_dir, tilt_dir])
    }
}

/// Pan direction bytes
pub mod pan {
    pub const LEFT: u8 = 0x01;
    pub const RIGHT: u8 = 0x02;
    pub const STILL: u8 = 0x03;
}

/// Tilt direction bytes
pub mod tilt {
    pub const UP: u8 = 0x01;
    pub const DOWN: u8 = 0x02;
    pub const STILL: u8 = 0x03;
}

/// A single camera command, before encoding.
///
/// Speeds are carried unclamped; the encoder clamps them into the ranges the
/// camera accepts, so out-of-range input degrades to the nearest valid
/// command instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandIntent {
    PresetRecall(u32),
    TrackingOn,
    TrackingOff,
    PanTilt {
        pan_speed: i32,
        tilt_speed: i32,
        direction: Option<Direction>,
    },
    PanTiltStop,
    ZoomIn(i32),
    ZoomOut(i32),
    ZoomStop,
    Home,
    IfClear,
    AddressSet,
    CommandCancel(u8),
    PowerOn,
    PowerOff,
    PowerInquiry,
    VersionInquiry,
}

impl CommandIntent {
    /// Whether this intent halts motion on an axis
    pub fn is_stop(&self) -> bool {
        matches!(self, CommandIntent::PanTiltStop | CommandIntent::ZoomStop)
    }
}
