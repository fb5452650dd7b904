//! Media player session (VLC RC text interface)
//!
//! Every command gets its own connection: optional password line, the
//! command line, then whatever the player prints during the drain window.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::PlayerConfig;
use crate::error::PlayerError;
use crate::utils;

const AUTH_SETTLE: Duration = Duration::from_millis(100);
const COMMAND_SETTLE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    Play,
    Pause,
    Stop,
    Status,
}

impl PlayerCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerCommand::Play => "play",
            PlayerCommand::Pause => "pause",
            PlayerCommand::Stop => "stop",
            PlayerCommand::Status => "status",
        }
    }
}

impl FromStr for PlayerCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "play" => Ok(PlayerCommand::Play),
            "pause" => Ok(PlayerCommand::Pause),
            "stop" => Ok(PlayerCommand::Stop),
            "status" => Ok(PlayerCommand::Status),
            other => Err(other.to_string()),
        }
    }
}

/// Last known playback state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlayerState {
    pub playing: bool,
    pub paused: bool,
}

/// State keyword found in a `status` reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reported {
    Playing,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub reported: Option<Reported>,
    pub state: PlayerState,
}

/// Status for the UI; errors are folded in rather than returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerStatus {
    pub playing: bool,
    pub paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct PlayerSession {
    config: PlayerConfig,
    state: Mutex<PlayerState>,
}

impl PlayerSession {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PlayerState::default()),
        }
    }

    pub fn state(&self) -> PlayerState {
        *self.state.lock()
    }

    /// Run one command on a fresh connection and fold the reply into the
    /// cached state.
    pub async fn execute(&self, command: PlayerCommand) -> Result<ParsedResponse, PlayerError> {
        if !self.config.enabled {
            return Err(PlayerError::Disabled);
        }

        let text = self.exchange(command).await?;
        let mut state = self.state.lock();
        let reported = parse_reply(&text, command, &mut state)?;
        Ok(ParsedResponse {
            reported,
            state: *state,
        })
    }

    async fn exchange(&self, command: PlayerCommand) -> Result<String, PlayerError> {
        let connect = TcpStream::connect((self.config.host.as_str(), self.config.port));
        let mut stream = connect_within(connect, self.config.connect_timeout()).await?;
        debug!("Connected to VLC at {}:{}", self.config.host, self.config.port);

        let settle = match self.config.password() {
            Some(password) => {
                stream.write_all(format!("{}\n", password).as_bytes()).await?;
                AUTH_SETTLE
            }
            None => COMMAND_SETTLE,
        };
        tokio::time::sleep(settle).await;
        stream
            .write_all(format!("{}\n", command.as_str()).as_bytes())
            .await?;

        let reply = utils::drain(&mut stream, self.config.drain_window()).await;
        Ok(String::from_utf8_lossy(&reply).into_owned())
    }

    /// Query the player; failures report a stopped player plus the error.
    pub async fn status(&self) -> PlayerStatus {
        match self.execute(PlayerCommand::Status).await {
            Ok(response) => {
                debug!("VLC reported {:?}", response.reported);
                PlayerStatus {
                    playing: response.state.playing,
                    paused: response.state.paused,
                    error: None,
                }
            }
            Err(e) => {
                warn!("VLC status error: {}", e);
                PlayerStatus {
                    playing: false,
                    paused: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Run a play/pause/stop command
    pub async fn command(&self, command: PlayerCommand) -> Result<PlayerState, PlayerError> {
        match self.execute(command).await {
            Ok(response) => {
                info!("VLC {} command sent", command.as_str());
                Ok(response.state)
            }
            Err(e) => {
                warn!("VLC {} error: {}", command.as_str(), e);
                Err(e)
            }
        }
    }

    /// Stop when playing, play otherwise. Read-then-act, not atomic.
    pub async fn toggle(&self) -> Result<PlayerCommand, PlayerError> {
        let next = if self.status().await.playing {
            PlayerCommand::Stop
        } else {
            PlayerCommand::Play
        };
        self.command(next).await?;
        Ok(next)
    }
}

/// Bound a connect attempt; on expiry the attempt and its socket are dropped.
async fn connect_within<T>(
    connect: impl Future<Output = std::io::Result<T>>,
    limit: Duration,
) -> Result<T, PlayerError> {
    tokio::time::timeout(limit, connect)
        .await
        .map_err(|_| PlayerError::ConnectTimeout)?
        .map_err(PlayerError::from)
}

/// Interpret the reply text for `command`, updating `state`.
///
/// `status` replies are authoritative; for the other commands the state is
/// set from the command itself. Pause leaves `playing` untouched.
pub fn parse_reply(
    text: &str,
    command: PlayerCommand,
    state: &mut PlayerState,
) -> Result<Option<Reported>, PlayerError> {
    if let Some(idx) = text.find("Error:") {
        let detail = text[idx + "Error:".len()..]
            .lines()
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown error");
        return Err(PlayerError::Reply(detail.to_string()));
    }

    match command {
        PlayerCommand::Status => {
            let reported = if text.contains("state playing") {
                Some(Reported::Playing)
            } else if text.contains("state paused") {
                Some(Reported::Paused)
            } else if text.contains("state stopped") {
                Some(Reported::Stopped)
            } else {
                None
            };

            match reported {
                Some(Reported::Playing) => *state = PlayerState { playing: true, paused: false },
                Some(Reported::Paused) => *state = PlayerState { playing: false, paused: true },
                Some(Reported::Stopped) => *state = PlayerState::default(),
                None => {}
            }
            Ok(reported)
        }
        PlayerCommand::Play => {
            *state = PlayerState { playing: true, paused: false };
            Ok(None)
        }
        PlayerCommand::Pause => {
            state.paused = true;
            Ok(None)
        }
        PlayerCommand::Stop => {
            *state = PlayerState::default();
            Ok(None)
        }
    }
}
