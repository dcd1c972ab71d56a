use chrono::{DateTime, Utc};
use nalgebra::{Isometry3, Matrix6, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Stamp and reference frame shared by every localization message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Monotonic sequence number assigned by the producer.
    pub seq: u32,
    /// Acquisition time of the data the message carries.
    pub stamp: DateTime<Utc>,
    /// Frame the pose is expressed in (e.g. "/map", "/odom").
    pub frame_id: String,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            seq: 0,
            stamp: DateTime::<Utc>::UNIX_EPOCH,
            frame_id: String::new(),
        }
    }
}

/// A rigid-body pose with its 6×6 uncertainty (x, y, z, roll, pitch, yaw).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseWithCovariance {
    pub pose: Isometry3<f64>,
    pub covariance: Matrix6<f64>,
}

impl Default for PoseWithCovariance {
    fn default() -> Self {
        Self {
            pose: Isometry3::identity(),
            covariance: Matrix6::zeros(),
        }
    }
}

/// Body-frame velocity with its 6×6 uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwistWithCovariance {
    /// Linear velocity (m/s).
    pub linear: Vector3<f64>,
    /// Angular velocity (rad/s).
    pub angular: Vector3<f64>,
    pub covariance: Matrix6<f64>,
}

impl Default for TwistWithCovariance {
    fn default() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
            covariance: Matrix6::zeros(),
        }
    }
}

/// A timestamped pose estimate plus velocity, as produced by an odometry
/// source or by the pose corrector.
///
/// `header.frame_id` names the frame `pose` is expressed in;
/// `child_frame_id` names the frame `twist` is expressed in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OdometryRecord {
    pub header: Header,
    pub child_frame_id: String,
    pub pose: PoseWithCovariance,
    pub twist: TwistWithCovariance,
}

impl OdometryRecord {
    /// Build a record with zero covariance and zero velocity.
    pub fn new(
        seq: u32,
        stamp: DateTime<Utc>,
        frame_id: impl Into<String>,
        child_frame_id: impl Into<String>,
        pose: Isometry3<f64>,
    ) -> Self {
        Self {
            header: Header {
                seq,
                stamp,
                frame_id: frame_id.into(),
            },
            child_frame_id: child_frame_id.into(),
            pose: PoseWithCovariance {
                pose,
                ..Default::default()
            },
            twist: TwistWithCovariance::default(),
        }
    }
}

/// Announcement of the spatial relationship between two named frames.
///
/// `transform` maps points expressed in `child_frame_id` into
/// `parent_frame_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStamped {
    pub stamp: DateTime<Utc>,
    pub parent_frame_id: String,
    pub child_frame_id: String,
    pub transform: Isometry3<f64>,
}

impl TransformStamped {
    pub fn new(
        stamp: DateTime<Utc>,
        parent_frame_id: impl Into<String>,
        child_frame_id: impl Into<String>,
        transform: Isometry3<f64>,
    ) -> Self {
        Self {
            stamp,
            parent_frame_id: parent_frame_id.into(),
            child_frame_id: child_frame_id.into(),
            transform,
        }
    }
}

/// Unified event wrapper for the in-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "driftless-localization::pose"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` with a fresh id and the current wall-clock time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Odometry(OdometryRecord),
    Transform(TransformStamped),
}

/// Error type shared by every localization crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocalizationError {
    #[error("Pose sinks not advertised: call advertise() before publish()")]
    NotAdvertised,

    #[error("Pose sinks already advertised")]
    AlreadyAdvertised,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Degenerate rigid transform: {0}")]
    DegenerateTransform(String),

    /// A sink refused delivery or a consumer task died.  The bus-backed
    /// sinks never return it: a topic with no subscribers still accepts.
    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("I/O Error: {0}")]
    Io(String),
}
