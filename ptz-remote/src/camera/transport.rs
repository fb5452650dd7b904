//! TCP/UDP delivery of encoded camera packets

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tracing::{debug, warn};

use super::PacketSink;
use crate::config::CameraConfig;
use crate::error::TransportError;
use crate::protocol::{classify_reply, describe};
use crate::utils::{self, hex};

/// Channel used to reach the camera, fixed at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    #[default]
    Tcp,
    Udp,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Tcp => "tcp",
            TransportProtocol::Udp => "udp",
        }
    }
}

/// Sends packets to the camera, one connection (or datagram socket) per send.
///
/// The camera does not keep control sessions reliably, so nothing is pooled.
/// Sockets are owned by the sending future and released on every exit path.
#[derive(Debug, Clone)]
pub struct CameraTransport {
    host: String,
    port: u16,
    protocol: TransportProtocol,
    connect_timeout: Duration,
    drain_window: Duration,
}

impl CameraTransport {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            host: config.ip.clone(),
            port: config.port,
            protocol: config.protocol,
            connect_timeout: config.connect_timeout(),
            drain_window: config.drain_window(),
        }
    }

    pub fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Send one packet. Success means the write completed; replies are only
    /// logged.
    pub async fn send(&self, packet: &[u8]) -> Result<(), TransportError> {
        debug!(
            ">>> Sending {} to {} via {}: {}",
            describe(packet),
            self.target(),
            self.protocol.as_str().to_uppercase(),
            hex(packet)
        );

        let result = match self.protocol {
            TransportProtocol::Udp => self.send_udp(packet).await,
            TransportProtocol::Tcp => self.send_tcp(packet).await.map(|reply| log_reply(&reply)),
        };

        match &result {
            Ok(()) => debug!(">>> Command complete"),
            Err(e) => warn!("Command send error: {}", e),
        }
        result
    }

    /// Connect, write, collect reply bytes for the drain window, close.
    async fn send_tcp(&self, packet: &[u8]) -> Result<Vec<u8>, TransportError> {
        let target = self.target();

        let connect = TcpStream::connect((self.host.as_str(), self.port));
        let mut stream = connect_within(connect, self.connect_timeout, &target).await?;
        debug!("TCP connected to {}", target);

        stream
            .write_all(packet)
            .await
            .map_err(|source| TransportError::Send {
                target: target.clone(),
                source,
            })?;

        let reply = utils::drain(&mut stream, self.drain_window).await;
        drop(stream);
        Ok(reply)
    }

    /// Fire-and-forget datagram; no reply is awaited.
    async fn send_udp(&self, packet: &[u8]) -> Result<(), TransportError> {
        let target = self.target();

        let addr = lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|source| TransportError::Resolve {
                target: target.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| TransportError::Resolve {
                target: target.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no address found"),
            })?;

        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TransportError::Send {
                target: target.clone(),
                source,
            })?;

        socket
            .send_to(packet, addr)
            .await
            .map_err(|source| TransportError::Send {
                target: target.clone(),
                source,
            })?;

        debug!("UDP packet sent to {} (no response expected)", target);
        Ok(())
    }
}

impl PacketSink for CameraTransport {
    async fn send_packet(&self, packet: &[u8]) -> Result<(), TransportError> {
        self.send(packet).await
    }
}

/// Bound a connect attempt; on expiry the pending attempt is dropped along
/// with its socket.
async fn connect_within<T, F>(
    connect: F,
    limit: Duration,
    target: &str,
) -> Result<T, TransportError>
where
    F: Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(limit, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(TransportError::Connect {
            target: target.to_string(),
            source,
        }),
        Err(_) => Err(TransportError::ConnectTimeout {
            target: target.to_string(),
            timeout: limit,
        }),
    }
}

fn log_reply(reply: &[u8]) {
    if reply.is_empty() {
        debug!("<<< No response received");
    } else {
        debug!("<<< Response: {} {:?}", hex(reply), classify_reply(reply));
    }
}
