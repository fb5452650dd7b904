//! Control facade used by the HTTP layer
//!
//! Built once at startup; owns the encoder, the camera sink, the motion
//! repeater and both media sessions.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::camera::{self, Axis, CameraTransport, MotionRepeater, PacketSink};
use crate::config::AppConfig;
use crate::error::ControlError;
use crate::player::{PlayerCommand, PlayerSession, PlayerState, PlayerStatus};
use crate::protocol::{CommandIntent, ViscaEncoder};
use crate::streaming::{StreamAction, StreamStatus, StreamingSession};

pub struct Controller<S: PacketSink = CameraTransport> {
    encoder: Arc<ViscaEncoder>,
    camera: Arc<S>,
    repeater: MotionRepeater<S>,
    streaming: StreamingSession,
    player: PlayerSession,
    tracking_delay: Duration,
}

impl Controller<CameraTransport> {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_sink(Arc::new(CameraTransport::new(&config.camera)), config)
    }
}

impl<S: PacketSink> Controller<S> {
    pub fn with_sink(camera: Arc<S>, config: &AppConfig) -> Self {
        let encoder = Arc::new(ViscaEncoder::new(
            config.camera.address,
            config.camera.framing,
        ));
        let repeater = MotionRepeater::new(
            camera.clone(),
            encoder.clone(),
            config.camera.repeat_interval(),
        );

        Self {
            encoder,
            camera,
            repeater,
            streaming: StreamingSession::spawn(config.streaming.clone()),
            player: PlayerSession::new(config.player.clone()),
            tracking_delay: config.camera.tracking_delay(),
        }
    }

    /// One-shot command. Stops go through the repeater so they also end any
    /// repetition on their axis.
    pub async fn send_command(&self, intent: CommandIntent) -> Result<(), ControlError> {
        if intent.is_stop() {
            if let Some(axis) = Axis::of(&intent) {
                self.repeater.stop(axis).await?;
                return Ok(());
            }
        }

        let packet = self.encoder.encode(&intent);
        self.camera.send_packet(&packet).await?;
        Ok(())
    }

    /// Switch tracking, wait for the camera to settle, then recall `preset`.
    pub async fn send_preset_with_tracking(
        &self,
        tracking: bool,
        preset: u32,
    ) -> Result<(), ControlError> {
        let toggle = if tracking {
            CommandIntent::TrackingOn
        } else {
            CommandIntent::TrackingOff
        };
        let first = self.encoder.encode(&toggle);
        let second = self.encoder.encode(&CommandIntent::PresetRecall(preset));

        camera::send_sequenced(self.camera.as_ref(), &first, self.tracking_delay, &second).await?;
        Ok(())
    }

    pub async fn start_continuous(
        &self,
        axis: Axis,
        intent: CommandIntent,
    ) -> Result<(), ControlError> {
        if intent.is_stop() || Axis::of(&intent) != Some(axis) {
            return Err(ControlError::UnsupportedContinuous(axis.name()));
        }
        self.repeater.start(axis, intent).await?;
        Ok(())
    }

    pub async fn stop_continuous(&self, axis: Axis) -> Result<(), ControlError> {
        self.repeater.stop(axis).await?;
        Ok(())
    }

    /// Panic stop: both axes, whatever their state
    pub async fn stop_all(&self) -> Result<(), ControlError> {
        self.repeater.stop_all().await?;
        Ok(())
    }

    pub async fn streaming_status(&self) -> StreamStatus {
        self.streaming.get_status().await
    }

    pub async fn streaming_toggle(&self) -> Result<StreamAction, ControlError> {
        Ok(self.streaming.toggle().await?)
    }

    pub async fn start_streaming(&self) -> Result<(), ControlError> {
        Ok(self.streaming.start_stream().await?)
    }

    pub async fn stop_streaming(&self) -> Result<(), ControlError> {
        Ok(self.streaming.stop_stream().await?)
    }

    pub async fn player_status(&self) -> PlayerStatus {
        self.player.status().await
    }

    /// `play`, `pause`, `stop`, `status` or `toggle`; returns the state after
    pub async fn player_command(&self, action: &str) -> Result<PlayerState, ControlError> {
        if action == "toggle" {
            self.player.toggle().await?;
            return Ok(self.player.state());
        }

        let command: PlayerCommand = action
            .parse()
            .map_err(ControlError::UnknownCommand)?;
        match command {
            PlayerCommand::Status => Ok(self.player.execute(command).await?.state),
            _ => Ok(self.player.command(command).await?),
        }
    }

    pub async fn shutdown(&self) {
        info!("Stopping camera motion");
        if let Err(e) = self.stop_all().await {
            warn!("Panic stop on shutdown failed: {}", e);
        }
        self.streaming.shutdown();
    }
}
