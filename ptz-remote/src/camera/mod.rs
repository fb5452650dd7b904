//! Camera transport and hold-to-move repetition

mod repeater;
mod transport;

pub use repeater::{Axis, MotionRepeater};
pub use transport::{CameraTransport, TransportProtocol};

use std::future::Future;
use std::time::Duration;

use crate::error::TransportError;

/// Puts one encoded packet on the wire.
///
/// Each call is an independent, self-contained send; implementations never
/// retry.
pub trait PacketSink: Send + Sync + 'static {
    fn send_packet(&self, packet: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Send `first`, wait `gap`, then send `second`.
///
/// If the first send fails the second is not attempted and the first error
/// is returned.
pub async fn send_sequenced<S: PacketSink>(
    sink: &S,
    first: &[u8],
    gap: Duration,
    second: &[u8],
) -> Result<(), TransportError> {
    sink.send_packet(first).await?;
    tokio::time::sleep(gap).await;
    sink.send_packet(second).await
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::Instant;

    /// In-memory sink recording every packet with the (tokio) time it was sent
    #[derive(Default)]
    pub struct RecordingSink {
        sent: Mutex<Vec<(Instant, Vec<u8>)>>,
        failing: AtomicBool,
    }

    impl RecordingSink {
        pub fn packets(&self) -> Vec<Vec<u8>> {
            self.sent.lock().iter().map(|(_, p)| p.clone()).collect()
        }

        pub fn times(&self) -> Vec<Instant> {
            self.sent.lock().iter().map(|(t, _)| *t).collect()
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    impl PacketSink for RecordingSink {
        async fn send_packet(&self, packet: &[u8]) -> Result<(), TransportError> {
            self.sent.lock().push((Instant::now(), packet.to_vec()));
            if self.failing.load(Ordering::SeqCst) {
                return Err(TransportError::Send {
                    target: "mock".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
                });
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sequenced_sends_in_order_with_gap() {
        let sink = RecordingSink::default();
        send_sequenced(&sink, &[0x01], Duration::from_millis(50), &[0x02])
            .await
            .unwrap();

        assert_eq!(sink.packets(), vec![vec![0x01], vec![0x02]]);
        let times = sink.times();
        assert!(times[1] - times[0] >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequenced_stops_after_first_failure() {
        let sink = RecordingSink::default();
        sink.set_failing(true);

        let result = send_sequenced(&sink, &[0x01], Duration::from_millis(50), &[0x02]).await;
        assert!(matches!(result, Err(TransportError::Send { .. })));
        assert_eq!(sink.packets(), vec![vec![0x01]]);
    }
}
