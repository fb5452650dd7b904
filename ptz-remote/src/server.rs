//! HTTP server: JSON API plus the static web UI

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::Filter;

use crate::api::{
    self, ActionRequest, ApiResponse, Command, CommandRequest, ContinuousAction,
    ContinuousRequest, PublicConfig,
};
use crate::camera::{CameraTransport, PacketSink};
use crate::config::AppConfig;
use crate::controller::Controller;
use crate::error::ControlError;

const MAX_BODY: u64 = 16 * 1024;

/// Shared state handed to every route
pub struct AppState<S: PacketSink = CameraTransport> {
    pub controller: Controller<S>,
    pub public_config: PublicConfig,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            controller: Controller::new(config),
            public_config: PublicConfig::from_config(config),
        }
    }
}

/// Bind, serve until Ctrl-C, then stop all camera motion.
pub async fn run(config: AppConfig) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.bind, config.server.port
            )
        })?;

    let state = Arc::new(AppState::new(&config));
    let routes = routes(state.clone(), config.server.public_dir.clone());

    let (bound, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
        })
        .with_context(|| format!("Failed to bind HTTP server on {}", addr))?;

    info!("HTTP server listening on http://{}", bound);
    server.await;

    state.controller.shutdown().await;
    info!("Server stopped");
    Ok(())
}

/// All routes: `/api/*` plus static files from `public_dir`
pub fn routes<S: PacketSink>(
    state: Arc<AppState<S>>,
    public_dir: PathBuf,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let with_state = warp::any().map(move || state.clone());
    let body = warp::body::content_length_limit(MAX_BODY).and(warp::body::bytes());

    let config = warp::path!("api" / "config")
        .and(warp::get())
        .and(with_state.clone())
        .map(|state: Arc<AppState<S>>| warp::reply::json(&state.public_config));

    let command = warp::path!("api" / "command")
        .and(warp::post())
        .and(body.clone())
        .and(with_state.clone())
        .and_then(handle_command::<S>);

    let continuous = warp::path!("api" / "continuous")
        .and(warp::post())
        .and(body.clone())
        .and(with_state.clone())
        .and_then(handle_continuous::<S>);

    let stop = warp::path!("api" / "stop")
        .and(warp::post())
        .and(with_state.clone())
        .and_then(handle_stop::<S>);

    let obs_status = warp::path!("api" / "obs" / "status")
        .and(warp::get())
        .and(with_state.clone())
        .and_then(handle_obs_status::<S>);

    let obs_command = warp::path!("api" / "obs" / "command")
        .and(warp::post())
        .and(body.clone())
        .and(with_state.clone())
        .and_then(handle_obs_command::<S>);

    let vlc_status = warp::path!("api" / "vlc" / "status")
        .and(warp::get())
        .and(with_state.clone())
        .and_then(handle_vlc_status::<S>);

    let vlc_command = warp::path!("api" / "vlc" / "command")
        .and(warp::post())
        .and(body)
        .and(with_state)
        .and_then(handle_vlc_command::<S>);

    config
        .or(command)
        .or(continuous)
        .or(stop)
        .or(obs_status)
        .or(obs_command)
        .or(vlc_status)
        .or(vlc_command)
        .or(warp::fs::dir(public_dir))
        .with(warp::trace::request())
}

type Reply = warp::reply::WithStatus<warp::reply::Json>;

fn respond(response: &ApiResponse, status: StatusCode) -> Reply {
    warp::reply::with_status(warp::reply::json(response), status)
}

fn respond_json<T: Serialize>(body: &T) -> Reply {
    warp::reply::with_status(warp::reply::json(body), StatusCode::OK)
}

fn respond_result(result: Result<ApiResponse, ControlError>) -> Reply {
    match result {
        Ok(response) => respond(&response, StatusCode::OK),
        Err(e) => {
            warn!("Request failed: {}", e);
            respond(&ApiResponse::error(e.to_string()), api::status_for(&e))
        }
    }
}

/// Parse a JSON body regardless of content type (beacons arrive as text/plain)
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, Reply> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("Rejected request body: {}", e);
        respond(
            &ApiResponse::error(format!("Unknown or malformed command: {}", e)),
            StatusCode::BAD_REQUEST,
        )
    })
}

async fn handle_command<S: PacketSink>(
    body: Bytes,
    state: Arc<AppState<S>>,
) -> Result<Reply, Infallible> {
    let request: CommandRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(reply) => return Ok(reply),
    };

    let controller = &state.controller;
    let result = match request.into_command() {
        Command::Send(intent) => controller.send_command(intent).await,
        Command::PresetWithTracking { tracking, preset } => {
            controller.send_preset_with_tracking(tracking, preset).await
        }
    };
    Ok(respond_result(result.map(|_| ApiResponse::ok())))
}

async fn handle_continuous<S: PacketSink>(
    body: Bytes,
    state: Arc<AppState<S>>,
) -> Result<Reply, Infallible> {
    let request: ContinuousRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(reply) => return Ok(reply),
    };

    let action = request.action;
    let result = match request.motion() {
        Ok((axis, intent)) => match action {
            ContinuousAction::Start => state.controller.start_continuous(axis, intent).await,
            ContinuousAction::Stop => state.controller.stop_continuous(axis).await,
        },
        Err(e) => Err(e),
    };
    Ok(respond_result(result.map(|_| ApiResponse::ok())))
}

async fn handle_stop<S: PacketSink>(state: Arc<AppState<S>>) -> Result<Reply, Infallible> {
    info!("Panic stop requested");
    let result = state.controller.stop_all().await;
    Ok(respond_result(result.map(|_| ApiResponse::ok())))
}

async fn handle_obs_status<S: PacketSink>(state: Arc<AppState<S>>) -> Result<Reply, Infallible> {
    Ok(respond_json(&state.controller.streaming_status().await))
}

async fn handle_obs_command<S: PacketSink>(
    body: Bytes,
    state: Arc<AppState<S>>,
) -> Result<Reply, Infallible> {
    let request: ActionRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(reply) => return Ok(reply),
    };

    let controller = &state.controller;
    let result = match request.action.as_str() {
        "toggleStreaming" => controller
            .streaming_toggle()
            .await
            .map(|action| ApiResponse::with_data(json!({ "action": action.as_str() }))),
        "startStreaming" => controller.start_streaming().await.map(|_| ApiResponse::ok()),
        "stopStreaming" => controller.stop_streaming().await.map(|_| ApiResponse::ok()),
        other => Err(ControlError::UnknownCommand(other.to_string())),
    };
    Ok(respond_result(result))
}

async fn handle_vlc_status<S: PacketSink>(state: Arc<AppState<S>>) -> Result<Reply, Infallible> {
    Ok(respond_json(&state.controller.player_status().await))
}

async fn handle_vlc_command<S: PacketSink>(
    body: Bytes,
    state: Arc<AppState<S>>,
) -> Result<Reply, Infallible> {
    let request: ActionRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(reply) => return Ok(reply),
    };

    let result = state
        .controller
        .player_command(&request.action)
        .await
        .map(|player| ApiResponse::with_data(json!(player)));
    Ok(respond_result(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::testing::RecordingSink;
    use serde_json::Value;

    const CONFIG: &str = r#"{
        "camera": { "ip": "127.0.0.1", "port": 5678, "protocol": "udp" },
        "obs": { "enabled": false, "password": "never-leaked" },
        "presets": { "pulpit": { "label": "Pulpit", "number": 1, "tracking": true } }
    }"#;

    fn state() -> (Arc<RecordingSink>, Arc<AppState<RecordingSink>>) {
        let config = AppConfig::from_json(CONFIG).unwrap();
        let sink = Arc::new(RecordingSink::default());
        let state = Arc::new(AppState {
            controller: Controller::with_sink(sink.clone(), &config),
            public_config: PublicConfig::from_config(&config),
        });
        (sink, state)
    }

    fn body_json(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_public_config() {
        let (_, state) = state();
        let filter = routes(state, PathBuf::from("public"));

        let res = warp::test::request()
            .method("GET")
            .path("/api/config")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        let body = body_json(res.body());
        assert_eq!(body["protocol"], "udp");
        assert_eq!(body["presets"]["pulpit"]["number"], 1);
        assert_eq!(body["obs"]["enabled"], false);
        assert!(!String::from_utf8_lossy(res.body()).contains("never-leaked"));
        assert!(!String::from_utf8_lossy(res.body()).contains("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_command_sends_packet() {
        let (sink, state) = state();
        let filter = routes(state, PathBuf::from("public"));

        let res = warp::test::request()
            .method("POST")
            .path("/api/command")
            .body(r#"{"type":"zoomIn","speed":4}"#)
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res.body()), json!({"success": true}));
        assert_eq!(sink.packets(), vec![vec![0x81, 0x01, 0x04, 0x07, 0x24, 0xFF]]);
    }

    #[tokio::test]
    async fn test_unknown_command_is_bad_request() {
        let (sink, state) = state();
        let filter = routes(state, PathBuf::from("public"));

        let res = warp::test::request()
            .method("POST")
            .path("/api/command")
            .body(r#"{"type":"reboot"}"#)
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res.body())["success"], false);
        assert!(sink.packets().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_server_error() {
        let (sink, state) = state();
        sink.set_failing(true);
        let filter = routes(state, PathBuf::from("public"));

        let res = warp::test::request()
            .method("POST")
            .path("/api/command")
            .body(r#"{"type":"home"}"#)
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(res.body());
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("mock"));
    }

    #[tokio::test]
    async fn test_panic_stop() {
        let (sink, state) = state();
        let filter = routes(state, PathBuf::from("public"));

        let res = warp::test::request()
            .method("POST")
            .path("/api/stop")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(sink.packets().len(), 2);
    }

    #[tokio::test]
    async fn test_continuous_start_then_stop() {
        let (sink, state) = state();
        let filter = routes(state, PathBuf::from("public"));

        for action in ["start", "stop"] {
            let res = warp::test::request()
                .method("POST")
                .path("/api/continuous")
                .body(format!(r#"{{"action":"{}","type":"zoomOut","speed":2}}"#, action))
                .reply(&filter)
                .await;
            assert_eq!(res.status(), StatusCode::OK);
        }

        let packets = sink.packets();
        assert_eq!(packets.first().unwrap(), &vec![0x81, 0x01, 0x04, 0x07, 0x32, 0xFF]);
        assert_eq!(packets.last().unwrap(), &vec![0x81, 0x01, 0x04, 0x07, 0x00, 0xFF]);
    }

    #[tokio::test]
    async fn test_disabled_media_endpoints() {
        let (_, state) = state();
        let filter = routes(state, PathBuf::from("public"));

        let res = warp::test::request()
            .method("GET")
            .path("/api/obs/status")
            .reply(&filter)
            .await;
        assert_eq!(body_json(res.body())["streaming"], false);

        let res = warp::test::request()
            .method("POST")
            .path("/api/obs/command")
            .body(r#"{"action":"launchRocket"}"#)
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = warp::test::request()
            .method("POST")
            .path("/api/vlc/command")
            .body(r#"{"action":"play"}"#)
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(res.body())["error"],
            "VLC not configured or disabled"
        );

        let res = warp::test::request()
            .method("GET")
            .path("/api/vlc/status")
            .reply(&filter)
            .await;
        let body = body_json(res.body());
        assert_eq!(body["playing"], false);
        assert_eq!(body["paused"], false);
    }
}
