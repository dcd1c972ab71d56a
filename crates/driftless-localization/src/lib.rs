//! `driftless-localization` – drift-free pose output.
//!
//! Combines continuously-updating raw odometry with the sparse, drift-free
//! poses confirmed by a pose-graph optimizer, and emits the result as an
//! odometry record plus a frame announcement.
//!
//! # Modules
//!
//! - [`pose`] – [`PoseCorrector`][pose::PoseCorrector] and the pure
//!   [`correct_pose`][pose::correct_pose] arithmetic.
//! - [`rigid`] – building rigid transforms from raw components, rejecting
//!   degenerate rotations.

pub mod pose;
pub mod rigid;

pub use pose::{EVENT_SOURCE, PoseCorrector, PoseParams, correct_pose};
pub use rigid::{planar_pose, rigid_transform};
