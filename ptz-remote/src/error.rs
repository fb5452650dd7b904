//! Error types for the device control layer

use std::time::Duration;

/// Camera transport failures. Never retried by the transport itself.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Could not resolve camera address {target}: {source}")]
    Resolve {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TCP connection timeout after {timeout:?} ({target})")]
    ConnectTimeout { target: String, timeout: Duration },

    #[error("Connection to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Send to {target} failed: {source}")]
    Send {
        target: String,
        #[source]
        source: std::io::Error,
    },
}

/// Streaming session failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamingError {
    #[error("OBS WebSocket not connected")]
    NotConnected,

    #[error("OBS request timeout")]
    Timeout,

    #[error("OBS connection lost before a response arrived")]
    ConnectionLost,

    #[error("OBS authentication required but no password configured")]
    AuthRequired,

    #[error("{comment}")]
    RequestFailed { code: u32, comment: String },

    #[error("OBS socket error: {0}")]
    Socket(String),
}

/// Player session failures
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("VLC not configured or disabled")]
    Disabled,

    #[error("VLC connection timeout")]
    ConnectTimeout,

    #[error("VLC socket error: {0}")]
    Io(#[from] std::io::Error),

    /// The player answered with an `Error:` line
    #[error("{0}")]
    Reply(String),
}

/// Errors surfaced by the control facade
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Streaming(#[from] StreamingError),

    #[error(transparent)]
    Player(#[from] PlayerError),

    #[error("Command cannot drive the {0} axis continuously")]
    UnsupportedContinuous(&'static str),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}
