//! Shared TF buffer and the bus listener that keeps it current.
//!
//! [`TfBuffer`] is a cloneable handle to a [`TfEngine`] guarded by a
//! read/write lock.  It can be fed two ways:
//!
//! * directly, as an in-process [`FrameBroadcaster`] handed to the pose
//!   corrector;
//! * from [`Topic::Transforms`] traffic, by running a [`TfListener`].

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use driftless_middleware::{FrameBroadcaster, TopicReceiver};
use driftless_types::{EventPayload, LocalizationError, TransformStamped};
use nalgebra::Isometry3;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::transform::TfEngine;

/// Cloneable, thread-safe handle to a [`TfEngine`].
#[derive(Clone, Debug, Default)]
pub struct TfBuffer {
    inner: Arc<RwLock<TfEngine>>,
}

impl TfBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `announcement` in the frame graph.
    pub fn apply(&self, announcement: &TransformStamped) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(announcement);
    }

    /// See [`TfEngine::lookup`].
    pub fn lookup(&self, source_frame: &str, target_frame: &str) -> Option<Isometry3<f64>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(source_frame, target_frame)
    }

    /// See [`TfEngine::stamp`].
    pub fn stamp(&self, parent_frame: &str, child_frame: &str) -> Option<DateTime<Utc>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .stamp(parent_frame, child_frame)
    }
}

impl FrameBroadcaster for TfBuffer {
    fn send_transform(&self, transform: TransformStamped) -> Result<(), LocalizationError> {
        self.apply(&transform);
        Ok(())
    }
}

/// Drains [`Topic::Transforms`][driftless_middleware::Topic::Transforms]
/// into a [`TfBuffer`].
pub struct TfListener {
    receiver: TopicReceiver,
    buffer: TfBuffer,
}

impl TfListener {
    pub fn new(receiver: TopicReceiver, buffer: TfBuffer) -> Self {
        Self { receiver, buffer }
    }

    /// Handle to the buffer this listener writes into.
    pub fn buffer(&self) -> TfBuffer {
        self.buffer.clone()
    }

    /// Apply announcements until every publisher on the topic is gone.
    ///
    /// Returns the number of transforms applied.
    pub async fn run(self) -> u64 {
        self.run_until(std::future::pending()).await
    }

    /// Like [`TfListener::run`], but also returns once `stop` resolves.
    ///
    /// Announcements already queued when `stop` fires are applied first.
    pub async fn run_until(mut self, stop: impl Future<Output = ()>) -> u64 {
        tokio::pin!(stop);
        let mut applied = 0u64;
        loop {
            tokio::select! {
                biased;
                result = self.receiver.recv() => match result {
                    Ok(event) => {
                        if let EventPayload::Transform(tf) = &event.payload {
                            self.buffer.apply(tf);
                            applied += 1;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(lagged_by = n, "TF listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                () = &mut stop => break,
            }
        }
        debug!(applied, "TF listener stopped");
        applied
    }
}
