//! Streaming application session (OBS WebSocket v5)
//!
//! One background task owns the socket: it connects, answers the greeting
//! with an identify frame, routes responses to waiting requests and logs
//! events. When the socket closes every waiting request fails with
//! `ConnectionLost` and the task reconnects after a fixed delay until
//! [`StreamingSession::shutdown`] is called.

pub mod messages;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::config::StreamingConfig;
use crate::error::StreamingError;
use messages::Incoming;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingAuth,
    Identified,
}

/// Best-effort stream status, never an error
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StreamStatus {
    pub streaming: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a toggle ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    Started,
    Stopped,
}

impl StreamAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamAction::Started => "started",
            StreamAction::Stopped => "stopped",
        }
    }
}

type Waiter = oneshot::Sender<Result<Value, StreamingError>>;

struct Inner {
    config: StreamingConfig,
    state: watch::Sender<SessionState>,
    shutdown: watch::Sender<bool>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    pending: Mutex<HashMap<String, Waiter>>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct StreamingSession {
    inner: Arc<Inner>,
}

impl StreamingSession {
    /// Create the session and, when enabled, start its connection task.
    pub fn spawn(config: StreamingConfig) -> Self {
        let enabled = config.enabled;
        let session = Self {
            inner: Arc::new(Inner {
                config,
                state: watch::Sender::new(SessionState::Disconnected),
                shutdown: watch::Sender::new(false),
                outbound: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        };

        if enabled {
            tokio::spawn(run(session.inner.clone()));
        } else {
            info!("OBS integration disabled");
        }
        session
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Stop reconnecting and close the current connection.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
    }

    /// Send a request and wait for the matching response.
    ///
    /// Fails immediately unless identified; nothing is queued.
    pub async fn request(
        &self,
        request_type: &str,
        data: Option<Value>,
    ) -> Result<Value, StreamingError> {
        if self.state() != SessionState::Identified {
            return Err(StreamingError::NotConnected);
        }
        let outbound = self
            .inner
            .outbound
            .lock()
            .clone()
            .ok_or(StreamingError::NotConnected)?;

        let id = format!("req_{}", self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id.clone(), tx);
        let _guard = PendingGuard {
            pending: &self.inner.pending,
            id: &id,
        };

        let frame = messages::request(request_type, &id, data.as_ref());
        outbound
            .send(Message::Text(frame))
            .map_err(|_| StreamingError::NotConnected)?;
        debug!("OBS request {} ({})", request_type, id);

        match tokio::time::timeout(self.inner.config.request_timeout(), rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(StreamingError::ConnectionLost),
            Err(_) => Err(StreamingError::Timeout),
        }
    }

    pub async fn get_status(&self) -> StreamStatus {
        match self.request("GetStreamStatus", None).await {
            Ok(data) => StreamStatus {
                streaming: data
                    .get("outputActive")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                error: None,
            },
            Err(e) => StreamStatus {
                streaming: false,
                error: Some(e.to_string()),
            },
        }
    }

    pub async fn start_stream(&self) -> Result<(), StreamingError> {
        self.request("StartStream", None).await.map(|_| ())
    }

    pub async fn stop_stream(&self) -> Result<(), StreamingError> {
        self.request("StopStream", None).await.map(|_| ())
    }

    /// Stop if the stream is live, start it otherwise.
    ///
    /// Not atomic: another controller can change the stream between the
    /// status read and the action.
    pub async fn toggle(&self) -> Result<StreamAction, StreamingError> {
        if self.get_status().await.streaming {
            self.stop_stream().await?;
            Ok(StreamAction::Stopped)
        } else {
            self.start_stream().await?;
            Ok(StreamAction::Started)
        }
    }
}

/// Removes a pending entry however the request ends
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<String, Waiter>>,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.id);
    }
}

impl Inner {
    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    /// Forget the socket and fail everything still waiting on it
    fn disconnected(&self) {
        *self.outbound.lock() = None;
        self.set_state(SessionState::Disconnected);

        let waiters: Vec<Waiter> = self.pending.lock().drain().map(|(_, w)| w).collect();
        if !waiters.is_empty() {
            debug!("Failing {} pending OBS requests", waiters.len());
        }
        for waiter in waiters {
            let _ = waiter.send(Err(StreamingError::ConnectionLost));
        }
    }

    fn handle_text(
        &self,
        text: &str,
        outbound: &mpsc::UnboundedSender<Message>,
    ) -> Result<(), StreamingError> {
        let incoming = match Incoming::parse(text) {
            Ok(incoming) => incoming,
            Err(e) => {
                warn!("Failed to parse OBS message: {}", e);
                return Ok(());
            }
        };

        match incoming {
            Incoming::Hello(hello) => {
                info!(
                    "OBS hello (websocket {}, rpc v{})",
                    hello.obs_web_socket_version.as_deref().unwrap_or("?"),
                    hello.rpc_version
                );
                self.set_state(SessionState::AwaitingAuth);

                let auth = match &hello.authentication {
                    Some(challenge) => match self.config.secret() {
                        Some(password) => Some(messages::compute_auth(
                            password,
                            &challenge.salt,
                            &challenge.challenge,
                        )),
                        None => {
                            error!("OBS requires authentication but no password is configured");
                            return Err(StreamingError::AuthRequired);
                        }
                    },
                    None => None,
                };

                outbound
                    .send(Message::Text(messages::identify(auth.as_deref())))
                    .map_err(|e| StreamingError::Socket(e.to_string()))?;
            }
            Incoming::Identified(identified) => {
                info!(
                    "OBS identified (rpc v{})",
                    identified.negotiated_rpc_version
                );
                self.set_state(SessionState::Identified);
            }
            Incoming::RequestResponse(response) => {
                let Some(waiter) = self.pending.lock().remove(&response.request_id) else {
                    debug!("Dropping unmatched OBS response {}", response.request_id);
                    return Ok(());
                };

                let status = response.request_status;
                let outcome = if status.result {
                    Ok(response.response_data.unwrap_or(Value::Null))
                } else {
                    Err(StreamingError::RequestFailed {
                        code: status.code,
                        comment: status.comment.unwrap_or_else(|| {
                            format!("{} failed with code {}", response.request_type, status.code)
                        }),
                    })
                };
                let _ = waiter.send(outcome);
            }
            Incoming::Event(event) => {
                if event.event_type == "StreamStateChanged" {
                    let state = event
                        .event_data
                        .as_ref()
                        .and_then(|d| d.get("outputState"))
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    info!("OBS stream state changed: {}", state);
                } else {
                    debug!("OBS event {}", event.event_type);
                }
            }
            Incoming::Other(op) => debug!("Ignoring OBS message with op {}", op),
        }

        Ok(())
    }
}

/// Reconnect loop
async fn run(inner: Arc<Inner>) {
    let mut shutdown = inner.shutdown.subscribe();

    loop {
        if *shutdown.borrow() {
            break;
        }

        inner.set_state(SessionState::Connecting);
        let result = tokio::select! {
            result = connection(&inner) => result,
            _ = shutdown.changed() => break,
        };

        match result {
            Ok(()) => info!("OBS connection closed"),
            Err(e) => warn!("OBS connection error: {}", e),
        }
        inner.disconnected();

        let delay = inner.config.reconnect_delay();
        info!("Reconnecting to OBS in {:?}", delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    inner.disconnected();
    info!("OBS session stopped");
}

/// One connection, from connect to close
async fn connection(inner: &Inner) -> Result<(), StreamingError> {
    let url = inner.config.url();
    let (ws, _) = connect_async(url.as_str())
        .await
        .map_err(|e| StreamingError::Socket(e.to_string()))?;
    info!("Connected to OBS at {}", url);

    let (mut write, mut read) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    *inner.outbound.lock() = Some(tx.clone());

    loop {
        tokio::select! {
            Some(msg) = rx.recv() => {
                write
                    .send(msg)
                    .await
                    .map_err(|e| StreamingError::Socket(e.to_string()))?;
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = inner.handle_text(&text, &tx) {
                        let _ = write.send(Message::Close(None)).await;
                        return Err(e);
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    write
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| StreamingError::Socket(e.to_string()))?;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(StreamingError::Socket(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{accept_async, WebSocketStream};

    type ServerWs = WebSocketStream<TcpStream>;

    const SALT: &str = "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=";
    const CHALLENGE: &str = "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=";

    fn config(port: u16, password: Option<&str>) -> StreamingConfig {
        StreamingConfig {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port,
            password: password.map(str::to_string),
            reconnect_delay_ms: 100,
            request_timeout_ms: 300,
        }
    }

    async fn next_json(ws: &mut ServerWs) -> Option<Value> {
        loop {
            match ws.next().await? {
                Ok(Message::Text(text)) => return serde_json::from_str(&text).ok(),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    /// Accept one client and run the greeting; returns the identify payload
    async fn accept(listener: &TcpListener, with_auth: bool) -> (ServerWs, Option<Value>) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let hello = if with_auth {
            json!({"op": 0, "d": {"obsWebSocketVersion": "5.0.1", "rpcVersion": 1,
                "authentication": {"challenge": CHALLENGE, "salt": SALT}}})
        } else {
            json!({"op": 0, "d": {"obsWebSocketVersion": "5.0.1", "rpcVersion": 1}})
        };
        ws.send(Message::Text(hello.to_string())).await.unwrap();

        let identify = next_json(&mut ws).await;
        if let Some(frame) = &identify {
            assert_eq!(frame["op"], 1);
            ws.send(Message::Text(
                json!({"op": 2, "d": {"negotiatedRpcVersion": 1}}).to_string(),
            ))
            .await
            .unwrap();
        }
        (ws, identify.map(|frame| frame["d"].clone()))
    }

    async fn respond(ws: &mut ServerWs, request: &Value, result: bool, data: Value) {
        let code = if result { 100 } else { 501 };
        let mut status = json!({"result": result, "code": code});
        if !result {
            status["comment"] = json!("Stream already active");
        }
        let frame = json!({"op": 7, "d": {
            "requestType": request["d"]["requestType"],
            "requestId": request["d"]["requestId"],
            "requestStatus": status,
            "responseData": data,
        }});
        ws.send(Message::Text(frame.to_string())).await.unwrap();
    }

    async fn wait_for(session: &StreamingSession, state: SessionState) {
        let mut rx = session.inner.state.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
            .await
            .expect("state not reached")
            .unwrap();
    }

    #[tokio::test]
    async fn test_auth_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let session = StreamingSession::spawn(config(port, Some("supersecret")));

        let (_ws, identify) = accept(&listener, true).await;
        let identify = identify.unwrap();
        assert_eq!(identify["rpcVersion"], 1);
        assert_eq!(
            identify["authentication"],
            messages::compute_auth("supersecret", SALT, CHALLENGE)
        );

        wait_for(&session, SessionState::Identified).await;
        session.shutdown();
    }

    #[tokio::test]
    async fn test_toggle_starts_inactive_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let session = StreamingSession::spawn(config(port, None));

        let server = tokio::spawn(async move {
            let (mut ws, identify) = accept(&listener, false).await;
            assert!(identify.unwrap().get("authentication").is_none());

            let status = next_json(&mut ws).await.unwrap();
            assert_eq!(status["op"], 6);
            assert_eq!(status["d"]["requestType"], "GetStreamStatus");
            respond(&mut ws, &status, true, json!({"outputActive": false})).await;

            let action = next_json(&mut ws).await.unwrap();
            respond(&mut ws, &action, true, Value::Null).await;
            action["d"]["requestType"].as_str().unwrap().to_string()
        });

        wait_for(&session, SessionState::Identified).await;
        assert_eq!(session.toggle().await.unwrap(), StreamAction::Started);
        assert_eq!(server.await.unwrap(), "StartStream");
        session.shutdown();
    }

    #[tokio::test]
    async fn test_request_ids_are_unique() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let session = StreamingSession::spawn(config(port, None));

        let server = tokio::spawn(async move {
            let (mut ws, _) = accept(&listener, false).await;
            let mut ids = Vec::new();
            for _ in 0..2 {
                let request = next_json(&mut ws).await.unwrap();
                ids.push(request["d"]["requestId"].as_str().unwrap().to_string());
                respond(&mut ws, &request, true, json!({"outputActive": true})).await;
            }
            ids
        });

        wait_for(&session, SessionState::Identified).await;
        assert!(session.get_status().await.streaming);
        assert!(session.get_status().await.streaming);

        let ids = server.await.unwrap();
        assert_eq!(ids, vec!["req_1".to_string(), "req_2".to_string()]);
        session.shutdown();
    }

    #[tokio::test]
    async fn test_failed_request_carries_comment() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let session = StreamingSession::spawn(config(port, None));

        tokio::spawn(async move {
            let (mut ws, _) = accept(&listener, false).await;
            let request = next_json(&mut ws).await.unwrap();
            respond(&mut ws, &request, false, Value::Null).await;
            let _ = next_json(&mut ws).await;
        });

        wait_for(&session, SessionState::Identified).await;
        match session.start_stream().await {
            Err(StreamingError::RequestFailed { code, comment }) => {
                assert_eq!(code, 501);
                assert_eq!(comment, "Stream already active");
            }
            other => panic!("unexpected {:?}", other),
        }
        session.shutdown();
    }

    #[tokio::test]
    async fn test_not_connected_fails_fast() {
        let mut disabled = config(1, None);
        disabled.enabled = false;
        let session = StreamingSession::spawn(disabled);

        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(
            session.request("GetStreamStatus", None).await,
            Err(StreamingError::NotConnected)
        ));

        let status = session.get_status().await;
        assert!(!status.streaming);
        assert_eq!(status.error.as_deref(), Some("OBS WebSocket not connected"));
    }

    #[tokio::test]
    async fn test_timeout_clears_pending() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let session = StreamingSession::spawn(config(port, None));

        tokio::spawn(async move {
            let (mut ws, _) = accept(&listener, false).await;
            // read and never answer
            while next_json(&mut ws).await.is_some() {}
        });

        wait_for(&session, SessionState::Identified).await;
        assert!(matches!(
            session.request("GetStreamStatus", None).await,
            Err(StreamingError::Timeout)
        ));
        assert!(session.inner.pending.lock().is_empty());
        session.shutdown();
    }

    #[tokio::test]
    async fn test_disconnect_fails_pending_and_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut cfg = config(port, None);
        cfg.request_timeout_ms = 5000;
        let session = StreamingSession::spawn(cfg);

        let server = tokio::spawn(async move {
            let (mut ws, _) = accept(&listener, false).await;
            let _ = next_json(&mut ws).await;
            drop(ws);

            // the client comes back after the reconnect delay
            let (_ws, identify) = accept(&listener, false).await;
            assert!(identify.is_some());
            tokio::time::sleep(Duration::from_millis(500)).await;
        });

        wait_for(&session, SessionState::Identified).await;
        assert!(matches!(
            session.request("GetStreamStatus", None).await,
            Err(StreamingError::ConnectionLost)
        ));
        assert!(session.inner.pending.lock().is_empty());

        wait_for(&session, SessionState::Identified).await;
        server.await.unwrap();
        session.shutdown();
    }

    #[tokio::test]
    async fn test_auth_required_without_password_closes_and_redials() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let session = StreamingSession::spawn(config(port, None));

        // client closes instead of identifying
        let (_first, identify) = accept(&listener, true).await;
        assert!(identify.is_none());
        assert_ne!(session.state(), SessionState::Identified);

        // then comes back after the reconnect delay and closes again
        let (_second, identify) =
            tokio::time::timeout(Duration::from_secs(5), accept(&listener, true))
                .await
                .expect("client did not reconnect");
        assert!(identify.is_none());
        assert_ne!(session.state(), SessionState::Identified);
        session.shutdown();
    }
}
