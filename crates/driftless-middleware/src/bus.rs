//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Odometry`] | Corrected odometry records, one per odometry tick |
//! | [`Topic::Transforms`] | Frame announcements consumed by the TF buffer |

use driftless_types::{Event, LocalizationError};
use tokio::sync::broadcast;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
pub const DEFAULT_CAPACITY: usize = 256;

/// Enumeration of all routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Pose/velocity records.
    Odometry,
    /// Parent → child frame transforms.
    Transforms,
}

impl Topic {
    /// Well-known channel name, used in event `source` fields and logs.
    pub fn name(self) -> &'static str {
        match self {
            Topic::Odometry => "pose",
            Topic::Transforms => "tf",
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    odometry: broadcast::Sender<Event>,
    transforms: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (a [`broadcast`] restriction).
    pub fn new(capacity: usize) -> Self {
        let (odometry, _) = broadcast::channel(capacity);
        let (transforms, _) = broadcast::channel(capacity);
        Self {
            odometry,
            transforms,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// Returns `Ok(0)` when no subscribers are currently listening on the
    /// topic (this is a normal condition, not an error).
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, LocalizationError> {
        send(self.topic_sender(topic), event)
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Obtain a publish handle bound to `topic`.
    ///
    /// The handle keeps the channel open even if the bus itself is dropped.
    pub fn advertise(&self, topic: Topic) -> TopicPublisher {
        TopicPublisher {
            topic,
            sender: self.topic_sender(topic).clone(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Odometry => &self.odometry,
            Topic::Transforms => &self.transforms,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn send(sender: &broadcast::Sender<Event>, event: Event) -> Result<usize, LocalizationError> {
    if sender.receiver_count() == 0 {
        return Ok(0);
    }
    // A receiver may drop between the count and the send; treat that the
    // same as having no subscribers.
    Ok(sender.send(event).unwrap_or(0))
}

// ---------------------------------------------------------------------------
// Topic-bound publisher
// ---------------------------------------------------------------------------

/// A publish handle bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::advertise`].
#[derive(Clone, Debug)]
pub struct TopicPublisher {
    topic: Topic,
    sender: broadcast::Sender<Event>,
}

impl TopicPublisher {
    /// Publish `event` on this handle's topic.  See [`EventBus::publish_to`].
    pub fn publish(&self, event: Event) -> Result<usize, LocalizationError> {
        send(&self.sender, event)
    }

    /// The [`Topic`] this publisher is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Number of receivers currently subscribed to the topic.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – every publisher and the
    ///   bus have been dropped.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`TopicReceiver::recv`].
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftless_types::{EventPayload, OdometryRecord};

    fn make_event(source: &str) -> Event {
        Event::new(source, EventPayload::Odometry(OdometryRecord::default()))
    }

    #[tokio::test]
    async fn publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Odometry);

        let event = make_event("driftless-middleware::test");
        let delivered = bus.publish_to(Topic::Odometry, event.clone())?;
        assert_eq!(delivered, 1);

        let received = rx.recv().await?;
        assert_eq!(received.id, event.id);
        assert_eq!(received.source, event.source);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(Topic::Odometry, make_event("test"));
        assert_eq!(result, Ok(0));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe_to(Topic::Transforms);
        let mut rx2 = bus.subscribe_to(Topic::Transforms);

        let event = make_event("driftless-localization::tf");
        assert_eq!(bus.publish_to(Topic::Transforms, event.clone())?, 2);

        assert_eq!(rx1.recv().await?.id, event.id);
        assert_eq!(rx2.recv().await?.id, event.id);
        Ok(())
    }

    /// A subscriber on `Transforms` must not receive events published to
    /// `Odometry` because they are routed through separate channels.
    #[tokio::test]
    async fn topic_subscriber_ignores_other_topics() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut tf_sub = bus.subscribe_to(Topic::Transforms);
        let _odom_sub = bus.subscribe_to(Topic::Odometry);

        bus.publish_to(Topic::Odometry, make_event("odom"))?;

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            tf_sub.recv(),
        )
        .await;
        assert!(result.is_err(), "Transforms subscriber must not receive an Odometry event");
        Ok(())
    }

    #[test]
    fn advertised_publisher_shares_the_bus_channel() {
        let bus = EventBus::default();
        let publisher = bus.advertise(Topic::Odometry);
        assert_eq!(publisher.topic(), Topic::Odometry);
        assert_eq!(publisher.subscriber_count(), 0);

        let mut rx = bus.subscribe_to(Topic::Odometry);
        assert_eq!(publisher.subscriber_count(), 1);

        let event = make_event("advertised");
        assert_eq!(publisher.publish(event.clone()), Ok(1));
        assert_eq!(rx.try_recv().expect("event must be queued").id, event.id);
    }

    #[tokio::test]
    async fn receiver_reports_closed_when_all_publishers_dropped() {
        let bus = EventBus::default();
        let publisher = bus.advertise(Topic::Odometry);
        let mut rx = bus.subscribe_to(Topic::Odometry);
        drop(bus);
        drop(publisher);

        let result = rx.recv().await;
        assert!(matches!(result, Err(broadcast::error::RecvError::Closed)));
    }

    /// Flooding a low-capacity channel while a subscriber sleeps must produce
    /// a `Lagged` error rather than panicking or blocking.
    #[tokio::test]
    async fn topic_channel_lag_on_slow_subscriber() {
        const CAPACITY: usize = 16;
        let bus = EventBus::new(CAPACITY);
        let mut slow_sub = bus.subscribe_to(Topic::Odometry);

        for _ in 0..1_000 {
            let _ = bus.publish_to(Topic::Odometry, make_event("flood::odom"));
        }

        let result = slow_sub.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }
}
