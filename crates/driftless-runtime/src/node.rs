//! Localization node wiring.
//!
//! [`LocalizationNode::start`] performs the one-time setup the pose
//! corrector needs: it creates the event bus, binds the corrector's sinks to
//! it, and spawns the background consumers (TF listener, optional odometry
//! recorder).  The caller then drives [`PoseCorrector::correct`] and
//! [`PoseCorrector::publish`] once per odometry tick.

use driftless_localization::PoseCorrector;
use driftless_middleware::{EventBus, OdometryRecorder, Topic};
use driftless_perception::{TfBuffer, TfListener};
use driftless_types::LocalizationError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;

/// Counters reported by [`LocalizationNode::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeStats {
    /// Transforms applied to the TF buffer.
    pub transforms_applied: u64,
    /// Rows written by the odometry recorder (0 when recording is off).
    pub odometry_rows: u64,
}

/// A running pose corrector with its bus and background consumers.
pub struct LocalizationNode {
    corrector: PoseCorrector,
    bus: EventBus,
    tf: TfBuffer,
    stop: watch::Sender<bool>,
    listener: JoinHandle<u64>,
    recorder: Option<JoinHandle<Result<u64, LocalizationError>>>,
}

impl LocalizationNode {
    /// Validate `config`, advertise the corrector on a fresh bus and spawn
    /// the consumers.  Must be called inside a Tokio runtime.
    pub async fn start(config: &Config) -> Result<Self, LocalizationError> {
        config.validate()?;
        let bus = EventBus::new(config.bus_capacity);

        let mut corrector = PoseCorrector::new(config.pose.clone())?;
        corrector.advertise_on_bus(&bus)?;

        let (stop, stop_rx) = watch::channel(false);

        let tf = TfBuffer::new();
        let tf_listener = TfListener::new(bus.subscribe_to(Topic::Transforms), tf.clone());
        let listener = tokio::spawn(tf_listener.run_until(stopped(stop_rx.clone())));

        let recorder = match &config.odometry_log {
            Some(path) => {
                let rx = bus.subscribe_to(Topic::Odometry);
                let recorder = OdometryRecorder::create(path, rx).await?;
                info!(path = %path.display(), "recording corrected odometry");
                Some(tokio::spawn(recorder.run_until(stopped(stop_rx))))
            }
            None => None,
        };

        info!(
            frame_id = %config.pose.pose_frame_id,
            child_frame_id = %config.pose.pose_child_frame_id,
            "localization node started"
        );
        Ok(Self {
            corrector,
            bus,
            tf,
            stop,
            listener,
            recorder,
        })
    }

    pub fn corrector(&self) -> &PoseCorrector {
        &self.corrector
    }

    /// The bus the corrector publishes on; subscribe here for live output.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Frame graph fed by the corrector's announcements.
    pub fn tf(&self) -> &TfBuffer {
        &self.tf
    }

    /// Signal the consumers to stop and wait for them to drain.
    ///
    /// Bus clones held elsewhere do not keep the consumers alive; events
    /// already queued for them are still processed.
    pub async fn shutdown(self) -> Result<NodeStats, LocalizationError> {
        let Self {
            corrector,
            bus,
            stop,
            listener,
            recorder,
            ..
        } = self;
        drop(corrector);
        drop(bus);
        stop.send_replace(true);

        let transforms_applied = listener.await.map_err(|e| task_failed("TF listener", e))?;
        let odometry_rows = match recorder {
            Some(handle) => handle.await.map_err(|e| task_failed("odometry recorder", e))??,
            None => 0,
        };
        info!(transforms_applied, odometry_rows, "localization node stopped");
        Ok(NodeStats {
            transforms_applied,
            odometry_rows,
        })
    }
}

/// Resolves once `rx` observes a change or its sender is dropped.
async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.changed().await;
}

fn task_failed(task: &str, err: tokio::task::JoinError) -> LocalizationError {
    LocalizationError::Channel(format!("{task} task failed: {err}"))
}
