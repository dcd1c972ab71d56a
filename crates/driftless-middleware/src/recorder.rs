//! Odometry trajectory recorder.
//!
//! [`OdometryRecorder`] drains [`Topic::Odometry`][crate::bus::Topic::Odometry]
//! and appends one CSV row per record to a file, so raw and corrected
//! trajectories can be compared offline.  Row layout:
//!
//! ```text
//! stamp_ns,seq,stamp_ns,child_frame_id,frame_id,x,y,z
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};

use driftless_types::{EventPayload, LocalizationError, OdometryRecord};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::bus::TopicReceiver;

/// Format `record` as a single CSV row (with trailing newline).
pub fn csv_row(record: &OdometryRecord) -> String {
    let stamp = &record.header.stamp;
    // i128 keeps stamps past 2262 exact; i64 nanoseconds would overflow.
    let stamp_ns = i128::from(stamp.timestamp()) * 1_000_000_000
        + i128::from(stamp.timestamp_subsec_nanos());
    let t = &record.pose.pose.translation;
    format!(
        "{stamp_ns},{},{stamp_ns},{},{},{},{},{}\n",
        record.header.seq, record.child_frame_id, record.header.frame_id, t.x, t.y, t.z,
    )
}

/// Writes every odometry record received on a topic to a CSV file.
pub struct OdometryRecorder {
    path: PathBuf,
    file: File,
    receiver: TopicReceiver,
}

impl OdometryRecorder {
    /// Create (or truncate) `path` and bind the recorder to `receiver`.
    pub async fn create(
        path: impl AsRef<Path>,
        receiver: TopicReceiver,
    ) -> Result<Self, LocalizationError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|e| LocalizationError::Io(format!("failed to open {}: {e}", path.display())))?;
        Ok(Self { path, file, receiver })
    }

    /// Path the recorder writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record until every publisher on the topic is gone.
    ///
    /// Returns the number of rows written.  Lagged receives are logged and
    /// skipped; non-odometry payloads are ignored.
    pub async fn run(self) -> Result<u64, LocalizationError> {
        self.run_until(std::future::pending()).await
    }

    /// Like [`OdometryRecorder::run`], but also stops once `stop` resolves.
    ///
    /// Records already queued when `stop` fires are written before the file
    /// is flushed.
    pub async fn run_until(
        mut self,
        stop: impl Future<Output = ()>,
    ) -> Result<u64, LocalizationError> {
        tokio::pin!(stop);
        let mut rows = 0u64;
        loop {
            tokio::select! {
                biased;
                result = self.receiver.recv() => match result {
                    Ok(event) => {
                        if let EventPayload::Odometry(record) = event.payload {
                            self.write_row(&record).await?;
                            rows += 1;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(
                            path = %self.path.display(),
                            lagged_by = n,
                            "odometry recorder lagged"
                        );
                    }
                    Err(RecvError::Closed) => break,
                },
                () = &mut stop => break,
            }
        }
        self.file.flush().await.map_err(|e| {
            LocalizationError::Io(format!("failed to flush {}: {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), rows, "odometry recorder finished");
        Ok(rows)
    }

    async fn write_row(&mut self, record: &OdometryRecord) -> Result<(), LocalizationError> {
        self.file.write_all(csv_row(record).as_bytes()).await.map_err(|e| {
            LocalizationError::Io(format!("failed to write {}: {e}", self.path.display()))
        })
    }
}
