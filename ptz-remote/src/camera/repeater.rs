//! Hold-to-move repetition, one slot per motion axis
//!
//! While a button is held the camera needs the motion command re-sent on a
//! fixed cadence. Each axis owns a single slot holding at most one repeat
//! task; starting again replaces the task, stopping cancels it and sends the
//! axis stop command.
//!
//! The slot lock is held across the cancel and the send that follows it, so
//! per axis the order on the wire matches the order of calls: a stop can
//! never overtake the start it is meant to end.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::PacketSink;
use crate::error::TransportError;
use crate::protocol::{CommandIntent, ViscaEncoder};

/// Independently repeatable degree of motion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    PanTilt,
    Zoom,
}

impl Axis {
    pub fn name(&self) -> &'static str {
        match self {
            Axis::PanTilt => "pan/tilt",
            Axis::Zoom => "zoom",
        }
    }

    pub fn stop_intent(&self) -> CommandIntent {
        match self {
            Axis::PanTilt => CommandIntent::PanTiltStop,
            Axis::Zoom => CommandIntent::ZoomStop,
        }
    }

    /// Axis an intent moves or stops, if any
    pub fn of(intent: &CommandIntent) -> Option<Axis> {
        match intent {
            CommandIntent::PanTilt { .. } | CommandIntent::PanTiltStop => Some(Axis::PanTilt),
            CommandIntent::ZoomIn(_) | CommandIntent::ZoomOut(_) | CommandIntent::ZoomStop => {
                Some(Axis::Zoom)
            }
            _ => None,
        }
    }
}

/// A running repeat task and the handle that ends it
struct Repeating {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Repeating {
    /// Signal the task and wait until it has exited, including any repeat
    /// send still in flight.
    async fn halt(self) {
        let _ = self.cancel.send(());
        if let Err(e) = self.task.await {
            warn!("Repeat task ended abnormally: {}", e);
        }
    }
}

pub struct MotionRepeater<S: PacketSink> {
    sink: Arc<S>,
    encoder: Arc<ViscaEncoder>,
    cadence: Duration,
    pan_tilt: Mutex<Option<Repeating>>,
    zoom: Mutex<Option<Repeating>>,
}

impl<S: PacketSink> MotionRepeater<S> {
    pub fn new(sink: Arc<S>, encoder: Arc<ViscaEncoder>, cadence: Duration) -> Self {
        Self {
            sink,
            encoder,
            cadence,
            pan_tilt: Mutex::new(None),
            zoom: Mutex::new(None),
        }
    }

    fn slot(&self, axis: Axis) -> &Mutex<Option<Repeating>> {
        match axis {
            Axis::PanTilt => &self.pan_tilt,
            Axis::Zoom => &self.zoom,
        }
    }

    /// Send `intent` now and keep re-sending it every cadence tick.
    ///
    /// Any repeat already running on the axis is cancelled first. The
    /// repeat is armed even if the immediate send fails; its result is
    /// returned.
    pub async fn start(&self, axis: Axis, intent: CommandIntent) -> Result<(), TransportError> {
        let mut slot = self.slot(axis).lock().await;
        if let Some(previous) = slot.take() {
            debug!("Replacing active {} repeat", axis.name());
            previous.halt().await;
        }

        let started = Instant::now();
        let packet = self.encoder.encode(&intent);
        let result = self.sink.send_packet(&packet).await;

        let (cancel, cancelled) = oneshot::channel();
        let task = tokio::spawn(repeat(
            self.sink.clone(),
            self.encoder.clone(),
            intent,
            started + self.cadence,
            self.cadence,
            cancelled,
        ));
        *slot = Some(Repeating { cancel, task });
        info!("Continuous {} started", axis.name());

        result
    }

    /// Cancel repetition on the axis and send its stop command once.
    ///
    /// The stop is sent even when nothing is repeating.
    pub async fn stop(&self, axis: Axis) -> Result<(), TransportError> {
        let mut slot = self.slot(axis).lock().await;
        if let Some(active) = slot.take() {
            active.halt().await;
            info!("Continuous {} stopped", axis.name());
        }

        let packet = self.encoder.encode(&axis.stop_intent());
        self.sink.send_packet(&packet).await
    }

    /// Force-stop both axes. Reports the first failure.
    pub async fn stop_all(&self) -> Result<(), TransportError> {
        let (pan_tilt, zoom) = tokio::join!(self.stop(Axis::PanTilt), self.stop(Axis::Zoom));
        pan_tilt.and(zoom)
    }

    #[cfg(test)]
    pub async fn is_repeating(&self, axis: Axis) -> bool {
        self.slot(axis).lock().await.is_some()
    }
}

/// Re-send on every tick until cancelled, then wait for in-flight sends.
async fn repeat<S: PacketSink>(
    sink: Arc<S>,
    encoder: Arc<ViscaEncoder>,
    intent: CommandIntent,
    first_tick: Instant,
    cadence: Duration,
    mut cancelled: oneshot::Receiver<()>,
) {
    let mut ticker = interval_at(first_tick, cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = &mut cancelled => break,
            _ = ticker.tick() => {
                let sink = sink.clone();
                let packet = encoder.encode(&intent);
                in_flight.spawn(async move {
                    if let Err(e) = sink.send_packet(&packet).await {
                        debug!("Repeat send failed: {}", e);
                    }
                });
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }

    while in_flight.join_next().await.is_some() {}
}
