//! `driftless-middleware` – pose transport plumbing.
//!
//! Routes corrected poses and frame announcements between the pose corrector
//! and its consumers without caring about the data's meaning.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.
//! - [`sink`] – [`PosePublisher`] and [`FrameBroadcaster`] capabilities plus
//!   their bus-backed implementations.
//! - [`recorder`] – [`OdometryRecorder`]: appends odometry traffic to a CSV
//!   trajectory file.

pub mod bus;
pub mod recorder;
pub mod sink;

pub use bus::{EventBus, Topic, TopicPublisher, TopicReceiver};
pub use recorder::OdometryRecorder;
pub use sink::{FrameBroadcaster, OdometryPublisher, PosePublisher, TransformBroadcaster};
