//! Helpers shared by the device sessions

use std::fmt::Write;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tracing::debug;

/// Render bytes as space separated uppercase hex, e.g. `81 01 06 04 FF`
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", b);
    }
    out
}

/// Parse a truthy environment flag (`1`, `true`, `yes`, any case)
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Collect whatever the peer sends until `window` elapses or it closes.
///
/// Read errors end the window early; they are logged, not returned.
pub async fn drain<R: AsyncRead + Unpin>(reader: &mut R, window: Duration) -> Vec<u8> {
    let deadline = Instant::now() + window;
    let mut collected = Vec::new();
    let mut buf = [0u8; 1024];

    loop {
        match tokio::time::timeout_at(deadline, reader.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => collected.extend_from_slice(&buf[..n]),
            Ok(Err(e)) => {
                debug!("Read error during drain window: {}", e);
                break;
            }
            Err(_) => break,
        }
    }

    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_hex_format() {
        assert_eq!(hex(&[0x81, 0x01, 0x06, 0x04, 0xFF]), "81 01 06 04 FF");
        assert_eq!(hex(&[]), "");
    }

    #[test]
    fn test_truthy_flags() {
        assert!(is_truthy("1"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy(" yes "));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
    }

    #[tokio::test]
    async fn test_drain_stops_at_close() {
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(b"state playing\r\n").await.unwrap();
        drop(server);

        let collected = drain(&mut client, Duration::from_secs(5)).await;
        assert_eq!(collected, b"state playing\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_stops_at_window() {
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(b"> ").await.unwrap();

        let started = Instant::now();
        let collected = drain(&mut client, Duration::from_millis(500)).await;
        assert_eq!(collected, b"> ");
        assert!(started.elapsed() >= Duration::from_millis(500));
        drop(server);
    }
}
