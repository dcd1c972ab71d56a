//! `driftless-perception` – frame bookkeeping.
//!
//! Keeps the spatial relationships between named coordinate frames so that
//! downstream consumers can resolve the robot pose in the map frame.
//!
//! # Modules
//!
//! - [`transform`] – [`TfEngine`][transform::TfEngine]: graph of named frames
//!   that composes rigid transforms between any two of them.
//! - [`listener`] – [`TfBuffer`][listener::TfBuffer], a shared, lockable
//!   engine usable as a frame broadcaster, and
//!   [`TfListener`][listener::TfListener], which feeds it from the bus.

pub mod listener;
pub mod transform;

pub use listener::{TfBuffer, TfListener};
pub use transform::TfEngine;
