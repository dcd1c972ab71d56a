//! `driftless-runtime` – process-level glue.
//!
//! # Modules
//!
//! - [`config`] – [`Config`][config::Config]: TOML configuration vault at
//!   `~/.driftless/config.toml` with `DRIFTLESS_*` environment overrides.
//! - [`node`] – [`LocalizationNode`][node::LocalizationNode]: one-time setup
//!   of the pose corrector, its event bus and the background consumers.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber from the `[log]` config table, with an
//!   optional OTLP span exporter when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

pub mod config;
pub mod node;
pub mod telemetry;

pub use config::Config;
pub use node::{LocalizationNode, NodeStats};
pub use telemetry::{LogConfig, LogFormat, TracerProviderGuard, init_tracing};
