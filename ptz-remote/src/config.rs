//! Deployment configuration
//!
//! Loaded once at startup from a JSON file and read-only afterwards. Field
//! names follow the deployment file layout (`camera`, `obs`, `vlc`,
//! `presets`, `server`).

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::camera::TransportProtocol;
use crate::protocol::Framing;
use crate::utils;

/// Default config location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";

/// Shortest gap the camera needs between a tracking toggle and a preset
pub const MIN_TRACKING_DELAY_MS: u64 = 50;

/// Accepted reply drain window for both socket sessions
pub const DRAIN_RANGE_MS: std::ops::RangeInclusive<u64> = 100..=500;

/// Full application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    pub camera: CameraConfig,
    #[serde(default, rename = "obs")]
    pub streaming: StreamingConfig,
    #[serde(default, rename = "vlc")]
    pub player: PlayerConfig,
    #[serde(default)]
    pub presets: BTreeMap<String, Preset>,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSection {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            bind: default_bind(),
            public_dir: default_public_dir(),
        }
    }
}

/// Camera endpoint and packet settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraConfig {
    #[serde(alias = "host")]
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: TransportProtocol,
    #[serde(default = "default_camera_address")]
    pub address: i64,
    #[serde(default)]
    pub framing: Framing,
    #[serde(default = "default_camera_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_camera_drain_ms")]
    pub drain_ms: u64,
    #[serde(default = "default_tracking_delay_ms")]
    pub tracking_delay_ms: u64,
    #[serde(default = "default_repeat_interval_ms")]
    pub repeat_interval_ms: u64,
}

impl CameraConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn drain_window(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }

    pub fn tracking_delay(&self) -> Duration {
        Duration::from_millis(self.tracking_delay_ms)
    }

    pub fn repeat_interval(&self) -> Duration {
        Duration::from_millis(self.repeat_interval_ms)
    }
}

/// Streaming application (OBS WebSocket) settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_local_host")]
    pub host: String,
    #[serde(default = "default_streaming_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_local_host(),
            port: default_streaming_port(),
            password: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl StreamingConfig {
    /// Shared secret, if one is configured (empty counts as none)
    pub fn secret(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Media player (VLC RC interface) settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_local_host")]
    pub host: String,
    #[serde(default = "default_player_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_player_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_player_drain_ms")]
    pub drain_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_local_host(),
            port: default_player_port(),
            password: None,
            connect_timeout_ms: default_player_connect_timeout_ms(),
            drain_ms: default_player_drain_ms(),
        }
    }
}

impl PlayerConfig {
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn drain_window(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }
}

/// A named camera preset shown in the UI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preset {
    pub label: String,
    pub number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking: Option<bool>,
}

fn default_http_port() -> u16 {
    3000
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_camera_address() -> i64 {
    1
}

fn default_camera_connect_timeout_ms() -> u64 {
    5000
}

fn default_camera_drain_ms() -> u64 {
    500
}

fn default_tracking_delay_ms() -> u64 {
    50
}

fn default_repeat_interval_ms() -> u64 {
    200
}

fn default_local_host() -> String {
    "127.0.0.1".to_string()
}

fn default_streaming_port() -> u16 {
    4455
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_player_port() -> u16 {
    4212
}

fn default_player_connect_timeout_ms() -> u64 {
    3000
}

fn default_player_drain_ms() -> u64 {
    500
}

impl AppConfig {
    /// Load configuration from a JSON file and apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_json(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        config.apply_overrides(
            std::env::var("VISCA_USE_IP_WRAPPER").ok().as_deref(),
            std::env::var("VISCA_CAMERA_ADDRESS").ok().as_deref(),
        );
        config
            .validate()
            .with_context(|| format!("Invalid timings in {}", path.display()))?;

        Ok(config)
    }

    /// Reject timings the control loops cannot run with.
    pub fn validate(&self) -> Result<()> {
        let camera = &self.camera;
        ensure!(
            camera.repeat_interval_ms > 0,
            "camera.repeatIntervalMs must be greater than zero"
        );
        ensure!(
            camera.tracking_delay_ms >= MIN_TRACKING_DELAY_MS,
            "camera.trackingDelayMs must be at least {}ms, got {}",
            MIN_TRACKING_DELAY_MS,
            camera.tracking_delay_ms
        );
        ensure!(
            camera.connect_timeout_ms > 0,
            "camera.connectTimeoutMs must be greater than zero"
        );
        ensure!(
            DRAIN_RANGE_MS.contains(&camera.drain_ms),
            "camera.drainMs must be within {:?}ms, got {}",
            DRAIN_RANGE_MS,
            camera.drain_ms
        );

        let streaming = &self.streaming;
        ensure!(
            streaming.reconnect_delay_ms > 0,
            "obs.reconnectDelayMs must be greater than zero"
        );
        ensure!(
            streaming.request_timeout_ms > 0,
            "obs.requestTimeoutMs must be greater than zero"
        );

        let player = &self.player;
        ensure!(
            player.connect_timeout_ms > 0,
            "vlc.connectTimeoutMs must be greater than zero"
        );
        ensure!(
            DRAIN_RANGE_MS.contains(&player.drain_ms),
            "vlc.drainMs must be within {:?}ms, got {}",
            DRAIN_RANGE_MS,
            player.drain_ms
        );

        Ok(())
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Apply `VISCA_USE_IP_WRAPPER` / `VISCA_CAMERA_ADDRESS` style overrides
    pub fn apply_overrides(&mut self, ip_wrapper: Option<&str>, camera_address: Option<&str>) {
        if let Some(flag) = ip_wrapper {
            self.camera.framing = if utils::is_truthy(flag) {
                Framing::Wrapped
            } else {
                Framing::Raw
            };
        }

        if let Some(address) = camera_address {
            match address.trim().parse::<i64>() {
                Ok(parsed) => self.camera.address = parsed.clamp(1, 7),
                Err(_) => warn!("Ignoring invalid camera address override: {:?}", address),
            }
        }
    }
}

/// Pick the config file: explicit path, then the working directory default,
/// then the per-user config directory.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }

    let local = PathBuf::from(DEFAULT_CONFIG_PATH);
    if local.exists() {
        return local;
    }

    dirs::config_dir()
        .map(|dir| dir.join("ptz-remote").join("config.json"))
        .filter(|path| path.exists())
        .unwrap_or(local)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "server": { "port": 8080 },
        "camera": { "ip": "10.0.0.2", "port": 5678, "protocol": "udp" },
        "obs": { "enabled": true, "host": "192.168.1.5", "port": 4455, "password": "s3cret" },
        "vlc": { "enabled": true, "port": 4212, "password": "" },
        "presets": {
            "pulpit": { "label": "Pulpit", "number": 1, "tracking": true },
            "wide": { "label": "Wide", "number": 2 }
        }
    }"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = AppConfig::from_json(SAMPLE).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.camera.protocol, TransportProtocol::Udp);
        assert_eq!(config.camera.address, 1);
        assert_eq!(config.camera.framing, Framing::Raw);
        assert_eq!(config.camera.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.camera.drain_window(), Duration::from_millis(500));
        assert_eq!(config.camera.tracking_delay(), Duration::from_millis(50));
        assert_eq!(config.camera.repeat_interval(), Duration::from_millis(200));

        assert_eq!(config.streaming.secret(), Some("s3cret"));
        assert_eq!(config.streaming.url(), "ws://192.168.1.5:4455");
        assert_eq!(config.streaming.reconnect_delay(), Duration::from_secs(5));

        assert_eq!(config.player.host, "127.0.0.1");
        assert_eq!(config.player.password(), None);
        assert_eq!(config.player.connect_timeout(), Duration::from_secs(3));

        assert_eq!(config.presets.len(), 2);
        assert_eq!(config.presets["pulpit"].tracking, Some(true));
        assert_eq!(config.presets["wide"].tracking, None);
    }

    #[test]
    fn test_missing_sections_default_to_disabled() {
        let config =
            AppConfig::from_json(r#"{ "camera": { "host": "cam.local", "port": 1259 } }"#).unwrap();
        assert_eq!(config.camera.ip, "cam.local");
        assert_eq!(config.camera.protocol, TransportProtocol::Tcp);
        assert!(!config.streaming.enabled);
        assert!(!config.player.enabled);
        assert!(config.presets.is_empty());
    }

    #[test]
    fn test_camera_section_required() {
        assert!(AppConfig::from_json(r#"{ "server": { "port": 1 } }"#).is_err());
    }

    fn with_camera(timings: &str) -> AppConfig {
        AppConfig::from_json(&format!(
            r#"{{ "camera": {{ "ip": "10.0.0.2", "port": 5678, {} }} }}"#,
            timings
        ))
        .unwrap()
    }

    #[test]
    fn test_defaults_and_sample_pass_validation() {
        AppConfig::from_json(SAMPLE).unwrap().validate().unwrap();
        with_camera(r#""trackingDelayMs": 50, "drainMs": 100"#)
            .validate()
            .unwrap();
    }

    #[test]
    fn test_rejects_unusable_camera_timings() {
        for (timings, field) in [
            (r#""repeatIntervalMs": 0"#, "repeatIntervalMs"),
            (r#""trackingDelayMs": 0"#, "trackingDelayMs"),
            (r#""trackingDelayMs": 49"#, "trackingDelayMs"),
            (r#""connectTimeoutMs": 0"#, "connectTimeoutMs"),
            (r#""drainMs": 0"#, "camera.drainMs"),
            (r#""drainMs": 60000"#, "camera.drainMs"),
        ] {
            let err = with_camera(timings).validate().unwrap_err();
            assert!(err.to_string().contains(field), "{}: {}", timings, err);
        }
    }

    #[test]
    fn test_rejects_unusable_session_timings() {
        let mut config = AppConfig::from_json(SAMPLE).unwrap();
        config.streaming.reconnect_delay_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::from_json(SAMPLE).unwrap();
        config.streaming.request_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::from_json(SAMPLE).unwrap();
        config.player.connect_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::from_json(SAMPLE).unwrap();
        config.player.drain_ms = 5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("vlc.drainMs"));
    }

    #[test]
    fn test_load_rejects_zero_cadence() {
        let path = std::env::temp_dir().join(format!("ptz-remote-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{ "camera": { "ip": "10.0.0.2", "port": 5678, "repeatIntervalMs": 0 } }"#,
        )
        .unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(format!("{:#}", err).contains("repeatIntervalMs"));
    }

    #[test]
    fn test_env_style_overrides() {
        let mut config = AppConfig::from_json(SAMPLE).unwrap();

        config.apply_overrides(Some("yes"), Some("12"));
        assert_eq!(config.camera.framing, Framing::Wrapped);
        assert_eq!(config.camera.address, 7);

        config.apply_overrides(Some("0"), Some("not-a-number"));
        assert_eq!(config.camera.framing, Framing::Raw);
        assert_eq!(config.camera.address, 7);
    }
}
