//! Graph-anchored pose correction.
//!
//! Raw odometry is accurate over short horizons but drifts without bound.
//! A pose-graph optimizer periodically confirms a drift-free pose.  The
//! corrector re-applies the motion odometry has measured since that
//! confirmation on top of the confirmed pose:
//!
//! ```text
//! corrected = last_graph_pose ∘ inverse(last_graph_raw_pose) ∘ current_raw_pose
//! ```
//!
//! The caller owns the `(last_graph_pose, last_graph_raw_pose)` pair and
//! passes it on every call; [`PoseCorrector`] only holds its frame ids and
//! the two output sinks.
//!
//! # Example
//!
//! ```rust
//! use driftless_localization::pose::correct_pose;
//! use nalgebra::Isometry3;
//!
//! let graph = Isometry3::translation(5.0, 0.0, 0.0);
//! let graph_raw = Isometry3::translation(4.0, 0.0, 0.0);
//! let raw = Isometry3::translation(4.5, 0.0, 0.0);
//!
//! let corrected = correct_pose(&raw, &graph, &graph_raw);
//! assert!((corrected.translation.x - 5.5).abs() < 1e-12);
//! ```

use std::fmt;

use driftless_middleware::{
    EventBus, FrameBroadcaster, OdometryPublisher, PosePublisher, TransformBroadcaster,
};
use driftless_types::{LocalizationError, OdometryRecord, TransformStamped};
use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rigid;

/// Event source tag used by the bus-backed sinks.
pub const EVENT_SOURCE: &str = "driftless-localization::pose";

// ────────────────────────────────────────────────────────────────────────────
// Parameters
// ────────────────────────────────────────────────────────────────────────────

/// Frame ids used when emitting the corrected pose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoseParams {
    /// Parent frame of the published pose and of the announced transform.
    #[serde(default = "default_pose_frame_id")]
    pub pose_frame_id: String,

    /// Child (robot body) frame of the announced transform.
    #[serde(default = "default_pose_child_frame_id")]
    pub pose_child_frame_id: String,
}

fn default_pose_frame_id() -> String {
    "/map".to_string()
}
fn default_pose_child_frame_id() -> String {
    "/robot".to_string()
}

impl Default for PoseParams {
    fn default() -> Self {
        Self {
            pose_frame_id: default_pose_frame_id(),
            pose_child_frame_id: default_pose_child_frame_id(),
        }
    }
}

impl PoseParams {
    /// Reject empty or whitespace-only frame ids.
    pub fn validate(&self) -> Result<(), LocalizationError> {
        if self.pose_frame_id.trim().is_empty() {
            return Err(LocalizationError::InvalidConfig("pose_frame_id is empty".to_string()));
        }
        if self.pose_child_frame_id.trim().is_empty() {
            return Err(LocalizationError::InvalidConfig(
                "pose_child_frame_id is empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Correction arithmetic
// ────────────────────────────────────────────────────────────────────────────

/// Compose the odometry motion measured since the last graph confirmation
/// onto the confirmed graph pose.
///
/// * `current_raw_pose` – latest raw odometry pose.
/// * `last_graph_pose` – most recent pose confirmed by the graph optimizer.
/// * `last_graph_raw_pose` – raw odometry pose current when
///   `last_graph_pose` was confirmed.
///
/// When `current_raw_pose == last_graph_raw_pose` the result equals
/// `last_graph_pose` up to composition round-off.  The rotation of the
/// result is renormalized so repeated corrections cannot accumulate
/// non-unit quaternions.
pub fn correct_pose(
    current_raw_pose: &Isometry3<f64>,
    last_graph_pose: &Isometry3<f64>,
    last_graph_raw_pose: &Isometry3<f64>,
) -> Isometry3<f64> {
    let motion = last_graph_raw_pose.inv_mul(current_raw_pose);
    let mut corrected = last_graph_pose * motion;
    corrected.rotation.renormalize();
    corrected
}

// ────────────────────────────────────────────────────────────────────────────
// PoseCorrector
// ────────────────────────────────────────────────────────────────────────────

/// Produces and emits the corrected robot pose.
///
/// Construct with [`PoseCorrector::new`], bind the output sinks once with
/// [`PoseCorrector::advertise`] (or [`PoseCorrector::advertise_on_bus`]),
/// then call [`PoseCorrector::correct`] and [`PoseCorrector::publish`] once
/// per odometry tick.
pub struct PoseCorrector {
    params: PoseParams,
    publisher: Option<Box<dyn PosePublisher>>,
    broadcaster: Option<Box<dyn FrameBroadcaster>>,
}

impl fmt::Debug for PoseCorrector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoseCorrector")
            .field("params", &self.params)
            .field("advertised", &self.is_advertised())
            .finish()
    }
}

impl PoseCorrector {
    /// Create a corrector with validated `params` and no sinks bound.
    ///
    /// # Errors
    ///
    /// [`LocalizationError::InvalidConfig`] if either frame id is empty.
    pub fn new(params: PoseParams) -> Result<Self, LocalizationError> {
        params.validate()?;
        Ok(Self {
            params,
            publisher: None,
            broadcaster: None,
        })
    }

    /// Current parameters.
    pub fn params(&self) -> &PoseParams {
        &self.params
    }

    /// Whether both output sinks have been bound.
    pub fn is_advertised(&self) -> bool {
        self.publisher.is_some() && self.broadcaster.is_some()
    }

    /// Bind the pose publisher and the frame broadcaster.
    ///
    /// # Errors
    ///
    /// [`LocalizationError::AlreadyAdvertised`] on a second call; the sinks
    /// bound first stay in place.
    pub fn advertise(
        &mut self,
        publisher: Box<dyn PosePublisher>,
        broadcaster: Box<dyn FrameBroadcaster>,
    ) -> Result<(), LocalizationError> {
        if self.publisher.is_some() || self.broadcaster.is_some() {
            return Err(LocalizationError::AlreadyAdvertised);
        }
        self.publisher = Some(publisher);
        self.broadcaster = Some(broadcaster);
        debug!(
            frame_id = %self.params.pose_frame_id,
            child_frame_id = %self.params.pose_child_frame_id,
            "pose sinks advertised"
        );
        Ok(())
    }

    /// Bind both sinks to `bus`: records go to the odometry topic,
    /// announcements to the transform topic.
    pub fn advertise_on_bus(&mut self, bus: &EventBus) -> Result<(), LocalizationError> {
        self.advertise(
            Box::new(OdometryPublisher::new(bus, EVENT_SOURCE)),
            Box::new(TransformBroadcaster::new(bus, EVENT_SOURCE)),
        )
    }

    /// See [`correct_pose`].  Configuration does not affect the result.
    pub fn correct(
        &self,
        current_raw_pose: &Isometry3<f64>,
        last_graph_pose: &Isometry3<f64>,
        last_graph_raw_pose: &Isometry3<f64>,
    ) -> Isometry3<f64> {
        correct_pose(current_raw_pose, last_graph_pose, last_graph_raw_pose)
    }

    /// Emit `corrected_pose`.
    ///
    /// A copy of `odom_msg` with its pose replaced by `corrected_pose` and
    /// its header frame id set to the configured parent frame goes to the
    /// pose publisher.  The transform parent → child, stamped with the
    /// record's stamp, goes to the frame broadcaster.  Every other field of
    /// the record passes through untouched.
    ///
    /// # Errors
    ///
    /// * [`LocalizationError::NotAdvertised`] before [`PoseCorrector::advertise`].
    /// * [`LocalizationError::DegenerateTransform`] for a non-finite or
    ///   non-unit `corrected_pose`; nothing is emitted.
    /// * Any error returned by a sink, unchanged.
    pub fn publish(
        &self,
        odom_msg: &OdometryRecord,
        corrected_pose: &Isometry3<f64>,
    ) -> Result<(), LocalizationError> {
        let (Some(publisher), Some(broadcaster)) = (&self.publisher, &self.broadcaster) else {
            return Err(LocalizationError::NotAdvertised);
        };
        rigid::validate(corrected_pose)?;

        let mut record = odom_msg.clone();
        record.header.frame_id = self.params.pose_frame_id.clone();
        record.pose.pose = *corrected_pose;
        let stamp = record.header.stamp;
        let seq = record.header.seq;
        publisher.publish_odometry(record)?;

        broadcaster.send_transform(TransformStamped::new(
            stamp,
            self.params.pose_frame_id.clone(),
            self.params.pose_child_frame_id.clone(),
            *corrected_pose,
        ))?;

        debug!(
            seq,
            x = corrected_pose.translation.x,
            y = corrected_pose.translation.y,
            z = corrected_pose.translation.z,
            "corrected pose published"
        );
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rigid::planar_pose;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use driftless_middleware::Topic;
    use driftless_perception::TfBuffer;
    use driftless_types::EventPayload;
    use nalgebra::{Matrix6, Translation3, UnitQuaternion, Vector3};
    use std::f64::consts::FRAC_PI_2;
    use std::sync::{Arc, Mutex};

    fn pose(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::new(x, y, z),
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        )
    }

    fn assert_pose_eq(actual: &Isometry3<f64>, expected: &Isometry3<f64>) {
        assert_relative_eq!(actual.translation.vector, expected.translation.vector, epsilon = 1e-9);
        // q and -q encode the same rotation.
        let a = actual.rotation.quaternion().coords;
        let b = expected.rotation.quaternion().coords;
        let b = if a.dot(&b) < 0.0 { -b } else { b };
        assert_relative_eq!(a, b, epsilon = 1e-9);
    }

    fn sample_poses() -> Vec<Isometry3<f64>> {
        vec![
            Isometry3::identity(),
            pose(1.0, 0.0, 0.0, 0.0, 0.0, 0.0),
            pose(-3.2, 4.1, 0.7, 0.1, -0.2, 2.5),
            pose(100.0, -250.0, 3.0, 0.0, 0.0, -3.1),
            pose(0.0, 0.0, 0.0, 1.2, 0.4, -0.9),
        ]
    }

    // ── Correction arithmetic ───────────────────────────────────────────────

    #[test]
    fn no_motion_returns_graph_pose() {
        for raw in sample_poses() {
            for graph in sample_poses() {
                let corrected = correct_pose(&raw, &graph, &raw);
                assert_pose_eq(&corrected, &graph);
            }
        }
    }

    #[test]
    fn relative_motion_is_applied_on_graph_pose() {
        let delta = pose(0.4, -0.1, 0.0, 0.0, 0.0, 0.3);
        for graph_raw in sample_poses() {
            for graph in sample_poses() {
                let raw = graph_raw * delta;
                let corrected = correct_pose(&raw, &graph, &graph_raw);
                assert_pose_eq(&corrected, &(graph * delta));
            }
        }
    }

    #[test]
    fn forward_motion_from_identity() {
        let corrected = correct_pose(
            &Isometry3::translation(1.0, 0.0, 0.0),
            &Isometry3::identity(),
            &Isometry3::identity(),
        );
        assert_pose_eq(&corrected, &Isometry3::translation(1.0, 0.0, 0.0));
    }

    #[test]
    fn forward_motion_is_rotated_into_graph_heading() {
        let graph = planar_pose(5.0, 0.0, FRAC_PI_2);
        let raw = Isometry3::translation(1.0, 0.0, 0.0);
        let corrected = correct_pose(&raw, &graph, &Isometry3::identity());

        let t = corrected.translation.vector;
        assert_relative_eq!(t, Vector3::new(5.0, 1.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(corrected.rotation.angle(), FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(
            corrected.rotation.axis().expect("non-zero rotation").into_inner(),
            Vector3::z(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn drifted_odometry_is_reanchored() {
        // Odometry believes the robot is at (10, 0) heading +X; the graph
        // said it was actually at (9, 1) heading +Y at that moment.
        let graph_raw = planar_pose(10.0, 0.0, 0.0);
        let graph = planar_pose(9.0, 1.0, FRAC_PI_2);
        // Since then odometry measured 2 m straight ahead.
        let raw = planar_pose(12.0, 0.0, 0.0);

        let corrected = correct_pose(&raw, &graph, &graph_raw);
        assert_pose_eq(&corrected, &planar_pose(9.0, 3.0, FRAC_PI_2));
    }

    #[test]
    fn correction_is_deterministic() {
        let raw = pose(1.3, -0.2, 0.1, 0.05, 0.02, 0.7);
        let graph = pose(7.0, 3.0, 0.0, 0.0, 0.0, -1.1);
        let graph_raw = pose(0.9, 0.1, 0.0, 0.0, 0.01, 0.4);

        let corrector = PoseCorrector::new(PoseParams::default()).unwrap();
        let first = corrector.correct(&raw, &graph, &graph_raw);
        let second = corrector.correct(&raw, &graph, &graph_raw);
        assert_eq!(first, second);
        assert_eq!(first, correct_pose(&raw, &graph, &graph_raw));
    }

    #[test]
    fn all_identity_yields_identity() {
        let id = Isometry3::identity();
        assert_eq!(correct_pose(&id, &id, &id), id);
    }

    #[test]
    fn correct_is_usable_across_threads() {
        let corrector = Arc::new(PoseCorrector::new(PoseParams::default()).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let corrector = Arc::clone(&corrector);
                std::thread::spawn(move || {
                    let raw = Isometry3::translation(i as f64, 0.0, 0.0);
                    let graph = Isometry3::translation(0.0, 1.0, 0.0);
                    corrector.correct(&raw, &graph, &Isometry3::identity())
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let corrected = handle.join().unwrap();
            assert_relative_eq!(corrected.translation.vector, Vector3::new(i as f64, 1.0, 0.0));
        }
    }

    // ── Parameters ──────────────────────────────────────────────────────────

    #[test]
    fn default_params_use_map_and_robot() {
        let params = PoseParams::default();
        assert_eq!(params.pose_frame_id, "/map");
        assert_eq!(params.pose_child_frame_id, "/robot");
        assert!(params.validate().is_ok());
    }

    #[test]
    fn empty_frame_ids_are_rejected() {
        let params = PoseParams {
            pose_frame_id: String::new(),
            ..Default::default()
        };
        assert!(matches!(PoseCorrector::new(params), Err(LocalizationError::InvalidConfig(_))));

        let params = PoseParams {
            pose_child_frame_id: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(PoseCorrector::new(params), Err(LocalizationError::InvalidConfig(_))));
    }

    // ── Publishing ──────────────────────────────────────────────────────────

    #[derive(Clone, Default)]
    struct CapturingPublisher(Arc<Mutex<Vec<OdometryRecord>>>);

    impl PosePublisher for CapturingPublisher {
        fn publish_odometry(&self, record: OdometryRecord) -> Result<(), LocalizationError> {
            self.0.lock().unwrap().push(record);
            Ok(())
        }
    }

    struct FailingBroadcaster;

    impl FrameBroadcaster for FailingBroadcaster {
        fn send_transform(&self, _: TransformStamped) -> Result<(), LocalizationError> {
            Err(LocalizationError::Channel("broadcaster offline".to_string()))
        }
    }

    struct FailingPublisher;

    impl PosePublisher for FailingPublisher {
        fn publish_odometry(&self, _: OdometryRecord) -> Result<(), LocalizationError> {
            Err(LocalizationError::Channel("publisher offline".to_string()))
        }
    }

    fn raw_record() -> OdometryRecord {
        let stamp = Utc.timestamp_opt(1_700_000_000, 250_000_000).single().unwrap();
        let raw = Isometry3::translation(3.0, 0.0, 0.0);
        let mut record = OdometryRecord::new(42, stamp, "/odom", "/base_link", raw);
        record.pose.covariance = Matrix6::identity() * 0.05;
        record.twist.linear = Vector3::new(0.3, 0.0, 0.0);
        record.twist.angular = Vector3::new(0.0, 0.0, 0.1);
        record.twist.covariance = Matrix6::identity() * 0.2;
        record
    }

    #[test]
    fn publish_before_advertise_fails() {
        let corrector = PoseCorrector::new(PoseParams::default()).unwrap();
        let result = corrector.publish(&raw_record(), &Isometry3::identity());
        assert_eq!(result, Err(LocalizationError::NotAdvertised));
    }

    #[test]
    fn advertise_twice_fails() {
        let bus = EventBus::default();
        let mut corrector = PoseCorrector::new(PoseParams::default()).unwrap();
        corrector.advertise_on_bus(&bus).unwrap();
        assert!(corrector.is_advertised());
        assert_eq!(corrector.advertise_on_bus(&bus), Err(LocalizationError::AlreadyAdvertised));
    }

    #[test]
    fn publish_replaces_only_pose_and_frame_id() {
        let captured = CapturingPublisher::default();
        let tf = TfBuffer::new();
        let mut corrector = PoseCorrector::new(PoseParams::default()).unwrap();
        corrector
            .advertise(Box::new(captured.clone()), Box::new(tf.clone()))
            .unwrap();

        let original = raw_record();
        let corrected = planar_pose(5.0, 1.0, FRAC_PI_2);
        corrector.publish(&original, &corrected).unwrap();

        let records = captured.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        let sent = &records[0];
        assert_eq!(sent.pose.pose, corrected);
        assert_eq!(sent.header.frame_id, "/map");

        let mut expected = original.clone();
        expected.pose.pose = corrected;
        expected.header.frame_id = "/map".to_string();
        assert_eq!(*sent, expected);

        // The caller's record is untouched.
        assert_eq!(original, raw_record());
    }

    #[test]
    fn publish_announces_parent_to_child_transform() {
        let tf = TfBuffer::new();
        let params = PoseParams {
            pose_frame_id: "world".to_string(),
            pose_child_frame_id: "base".to_string(),
        };
        let mut corrector = PoseCorrector::new(params).unwrap();
        corrector
            .advertise(Box::new(CapturingPublisher::default()), Box::new(tf.clone()))
            .unwrap();

        let corrected = planar_pose(2.0, -1.0, 0.25);
        let record = raw_record();
        corrector.publish(&record, &corrected).unwrap();

        let t = tf.lookup("world", "base").expect("transform announced");
        assert_pose_eq(&t, &corrected);
        assert_eq!(tf.stamp("world", "base"), Some(record.header.stamp));
    }

    #[test]
    fn publish_rejects_degenerate_pose() {
        let captured = CapturingPublisher::default();
        let mut corrector = PoseCorrector::new(PoseParams::default()).unwrap();
        corrector
            .advertise(Box::new(captured.clone()), Box::new(TfBuffer::new()))
            .unwrap();

        let bad = Isometry3::translation(f64::NAN, 0.0, 0.0);
        let result = corrector.publish(&raw_record(), &bad);
        assert!(matches!(result, Err(LocalizationError::DegenerateTransform(_))));
        assert!(captured.0.lock().unwrap().is_empty(), "nothing may be emitted");
    }

    #[test]
    fn publish_surfaces_sink_errors() {
        let mut corrector = PoseCorrector::new(PoseParams::default()).unwrap();
        corrector
            .advertise(Box::new(CapturingPublisher::default()), Box::new(FailingBroadcaster))
            .unwrap();
        let result = corrector.publish(&raw_record(), &Isometry3::identity());
        assert_eq!(result, Err(LocalizationError::Channel("broadcaster offline".to_string())));
    }

    #[test]
    fn publisher_failure_suppresses_transform() {
        let tf = TfBuffer::new();
        let mut corrector = PoseCorrector::new(PoseParams::default()).unwrap();
        corrector
            .advertise(Box::new(FailingPublisher), Box::new(tf.clone()))
            .unwrap();

        let result = corrector.publish(&raw_record(), &Isometry3::identity());
        assert_eq!(result, Err(LocalizationError::Channel("publisher offline".to_string())));
        assert!(tf.lookup("/map", "/robot").is_none(), "no transform after a failed publish");
    }

    #[test]
    fn publish_on_bus_emits_both_topics() {
        let bus = EventBus::default();
        let mut odom_rx = bus.subscribe_to(Topic::Odometry);
        let mut tf_rx = bus.subscribe_to(Topic::Transforms);
        let mut corrector = PoseCorrector::new(PoseParams::default()).unwrap();
        corrector.advertise_on_bus(&bus).unwrap();

        let corrected = planar_pose(1.0, 2.0, 0.0);
        corrector.publish(&raw_record(), &corrected).unwrap();

        let odom = odom_rx.try_recv().expect("odometry event");
        assert_eq!(odom.source, EVENT_SOURCE);
        match odom.payload {
            EventPayload::Odometry(r) => assert_eq!(r.pose.pose, corrected),
            other => panic!("unexpected payload: {other:?}"),
        }
        match tf_rx.try_recv().expect("transform event").payload {
            EventPayload::Transform(t) => {
                assert_eq!(t.parent_frame_id, "/map");
                assert_eq!(t.child_frame_id, "/robot");
                assert_eq!(t.transform, corrected);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
