//! Output sinks for corrected poses.
//!
//! The pose corrector never speaks directly to a transport.  It hands data
//! to two narrow capabilities, and the implementations here translate that
//! data onto the internal [`EventBus`][crate::bus::EventBus].
//!
//! # Overview
//!
//! - [`PosePublisher`] – accepts a structured [`OdometryRecord`].
//! - [`FrameBroadcaster`] – accepts a parent → child [`TransformStamped`].
//! - [`OdometryPublisher`] / [`TransformBroadcaster`] – bus-backed
//!   implementations publishing on [`Topic::Odometry`] and
//!   [`Topic::Transforms`].

use driftless_types::{Event, EventPayload, LocalizationError, OdometryRecord, TransformStamped};
use tracing::trace;

use crate::bus::{EventBus, Topic, TopicPublisher};

/// Capability to emit a structured odometry record on a well-known channel.
///
/// # Contract
///
/// Delivery and ordering are the implementation's responsibility.  An error
/// is returned only when the sink itself is unusable; callers do not retry.
pub trait PosePublisher: Send + Sync {
    fn publish_odometry(&self, record: OdometryRecord) -> Result<(), LocalizationError>;
}

/// Capability to announce the transform between two named frames so that
/// downstream consumers can resolve it.
pub trait FrameBroadcaster: Send + Sync {
    fn send_transform(&self, transform: TransformStamped) -> Result<(), LocalizationError>;
}

/// [`PosePublisher`] that publishes [`EventPayload::Odometry`] events on
/// [`Topic::Odometry`].
#[derive(Clone, Debug)]
pub struct OdometryPublisher {
    source: String,
    publisher: TopicPublisher,
}

impl OdometryPublisher {
    /// Advertise the odometry topic on `bus`.
    pub fn new(bus: &EventBus, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            publisher: bus.advertise(Topic::Odometry),
        }
    }
}

impl PosePublisher for OdometryPublisher {
    fn publish_odometry(&self, record: OdometryRecord) -> Result<(), LocalizationError> {
        let seq = record.header.seq;
        let delivered = self
            .publisher
            .publish(Event::new(self.source.clone(), EventPayload::Odometry(record)))?;
        trace!(topic = Topic::Odometry.name(), seq, delivered, "odometry published");
        Ok(())
    }
}

/// [`FrameBroadcaster`] that publishes [`EventPayload::Transform`] events on
/// [`Topic::Transforms`].
#[derive(Clone, Debug)]
pub struct TransformBroadcaster {
    source: String,
    publisher: TopicPublisher,
}

impl TransformBroadcaster {
    /// Advertise the transform topic on `bus`.
    pub fn new(bus: &EventBus, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            publisher: bus.advertise(Topic::Transforms),
        }
    }
}

impl FrameBroadcaster for TransformBroadcaster {
    fn send_transform(&self, transform: TransformStamped) -> Result<(), LocalizationError> {
        let delivered = self
            .publisher
            .publish(Event::new(self.source.clone(), EventPayload::Transform(transform)))?;
        trace!(topic = Topic::Transforms.name(), delivered, "transform broadcast");
        Ok(())
    }
}
