//! HTTP request and response bodies

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use warp::http::StatusCode;

use crate::camera::Axis;
use crate::config::{AppConfig, Preset};
use crate::error::ControlError;
use crate::protocol::{CommandIntent, Direction, DEFAULT_SPEED};

/// Body of `POST /api/command`, tagged by `type`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CommandRequest {
    #[serde(rename_all = "camelCase")]
    Preset { preset_number: u32 },

    #[serde(rename_all = "camelCase")]
    PresetWithTracking {
        preset_number: u32,
        #[serde(default)]
        tracking: bool,
    },

    TrackingOn,
    TrackingOff,

    #[serde(rename_all = "camelCase")]
    PanTilt {
        #[serde(default)]
        pan_speed: Option<i32>,
        #[serde(default)]
        tilt_speed: Option<i32>,
        #[serde(default)]
        direction: Option<i64>,
    },

    PanTiltStop,

    ZoomIn {
        #[serde(default)]
        speed: Option<i32>,
    },

    ZoomOut {
        #[serde(default)]
        speed: Option<i32>,
    },

    ZoomStop,
    Home,
    IfClear,
    AddressSet,

    CommandCancel {
        #[serde(default = "default_socket")]
        socket: u8,
    },

    PowerOn,
    PowerOff,
    PowerInquiry,
    VersionInquiry,
}

/// Missing, null and zero speeds all fall back to the default
fn speed_or_default(speed: Option<i32>) -> i32 {
    match speed {
        None | Some(0) => DEFAULT_SPEED,
        Some(speed) => speed,
    }
}

fn default_socket() -> u8 {
    1
}

/// What a command request asks the controller to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(CommandIntent),
    PresetWithTracking { tracking: bool, preset: u32 },
}

impl CommandRequest {
    pub fn into_command(self) -> Command {
        let intent = match self {
            CommandRequest::PresetWithTracking {
                preset_number,
                tracking,
            } => {
                return Command::PresetWithTracking {
                    tracking,
                    preset: preset_number,
                }
            }
            CommandRequest::Preset { preset_number } => CommandIntent::PresetRecall(preset_number),
            CommandRequest::TrackingOn => CommandIntent::TrackingOn,
            CommandRequest::TrackingOff => CommandIntent::TrackingOff,
            CommandRequest::PanTilt {
                pan_speed,
                tilt_speed,
                direction,
            } => CommandIntent::PanTilt {
                pan_speed: speed_or_default(pan_speed),
                tilt_speed: speed_or_default(tilt_speed),
                direction: direction.and_then(Direction::from_code),
            },
            CommandRequest::PanTiltStop => CommandIntent::PanTiltStop,
            CommandRequest::ZoomIn { speed } => CommandIntent::ZoomIn(speed_or_default(speed)),
            CommandRequest::ZoomOut { speed } => CommandIntent::ZoomOut(speed_or_default(speed)),
            CommandRequest::ZoomStop => CommandIntent::ZoomStop,
            CommandRequest::Home => CommandIntent::Home,
            CommandRequest::IfClear => CommandIntent::IfClear,
            CommandRequest::AddressSet => CommandIntent::AddressSet,
            CommandRequest::CommandCancel { socket } => CommandIntent::CommandCancel(socket),
            CommandRequest::PowerOn => CommandIntent::PowerOn,
            CommandRequest::PowerOff => CommandIntent::PowerOff,
            CommandRequest::PowerInquiry => CommandIntent::PowerInquiry,
            CommandRequest::VersionInquiry => CommandIntent::VersionInquiry,
        };
        Command::Send(intent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContinuousAction {
    Start,
    Stop,
}

/// Body of `POST /api/continuous`: `{action, type, ...params}`
#[derive(Debug, Clone, Deserialize)]
pub struct ContinuousRequest {
    pub action: ContinuousAction,
    #[serde(flatten)]
    pub command: CommandRequest,
}

impl ContinuousRequest {
    /// Axis and motion intent; only pan/tilt and zoom moves qualify
    pub fn motion(self) -> Result<(Axis, CommandIntent), ControlError> {
        match self.command.into_command() {
            Command::Send(intent) => match Axis::of(&intent) {
                Some(axis) => Ok((axis, intent)),
                None => Err(ControlError::UnknownCommand(format!(
                    "{:?} is not a continuous command",
                    intent
                ))),
            },
            Command::PresetWithTracking { .. } => Err(ControlError::UnknownCommand(
                "presetWithTracking is not a continuous command".to_string(),
            )),
        }
    }
}

/// Body of the `obs` and `vlc` command endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    pub action: String,
}

/// Generic `{success, error?, data?}` reply
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            data: None,
        }
    }

    pub fn with_data(data: Value) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            data: None,
        }
    }
}

/// HTTP status for a failed operation
pub fn status_for(error: &ControlError) -> StatusCode {
    match error {
        ControlError::UnknownCommand(_) | ControlError::UnsupportedContinuous(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Enabled {
    pub enabled: bool,
}

/// `GET /api/config`; never includes camera address or secrets
#[derive(Debug, Clone, Serialize)]
pub struct PublicConfig {
    pub presets: BTreeMap<String, Preset>,
    pub protocol: &'static str,
    pub obs: Enabled,
    pub vlc: Enabled,
}

impl PublicConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            presets: config.presets.clone(),
            protocol: config.camera.protocol.as_str(),
            obs: Enabled {
                enabled: config.streaming.enabled,
            },
            vlc: Enabled {
                enabled: config.player.enabled,
            },
        }
    }
}
