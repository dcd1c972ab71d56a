//! Configuration vault – reads/writes `~/.driftless/config.toml`.
//!
//! ```toml
//! bus_capacity = 256
//! odometry_log = "/tmp/pose.txt"
//!
//! [pose]
//! pose_frame_id = "/map"
//! pose_child_frame_id = "/robot"
//!
//! [log]
//! filter = "info"
//! format = "compact"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use driftless_localization::PoseParams;
use driftless_middleware::bus::DEFAULT_CAPACITY;
use driftless_types::LocalizationError;
use serde::{Deserialize, Serialize};

use crate::telemetry::LogConfig;

/// Startup configuration of the localization node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Per-topic event bus capacity.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    /// When set, corrected odometry is recorded to this CSV file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odometry_log: Option<PathBuf>,

    /// Frame ids used for the corrected pose.
    #[serde(default)]
    pub pose: PoseParams,

    /// Log filter and output format.
    #[serde(default)]
    pub log: LogConfig,
}

fn default_bus_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pose: PoseParams::default(),
            bus_capacity: default_bus_capacity(),
            odometry_log: None,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Check every field that would otherwise fail later at startup.
    pub fn validate(&self) -> Result<(), LocalizationError> {
        self.pose.validate()?;
        self.log.validate()?;
        if self.bus_capacity == 0 {
            return Err(LocalizationError::InvalidConfig(
                "bus_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Return the path to `~/.driftless/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".driftless").join("config.toml")
}

/// Load the config from disk and apply `DRIFTLESS_*` overrides.
///
/// Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, LocalizationError> {
    let Some(mut cfg) = load_from(&config_path())? else {
        return Ok(None);
    };
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(Some(cfg))
}

/// Load and validate the config at `path`, without environment overrides.
pub fn load_from(path: &Path) -> Result<Option<Config>, LocalizationError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        LocalizationError::InvalidConfig(format!(
            "failed to read config at {}: {e}",
            path.display()
        ))
    })?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| LocalizationError::InvalidConfig(format!("failed to parse config: {e}")))?;
    cfg.validate()?;
    Ok(Some(cfg))
}

/// Apply `DRIFTLESS_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `DRIFTLESS_POSE_FRAME_ID` | `pose.pose_frame_id` |
/// | `DRIFTLESS_POSE_CHILD_FRAME_ID` | `pose.pose_child_frame_id` |
/// | `DRIFTLESS_BUS_CAPACITY` | `bus_capacity` |
/// | `DRIFTLESS_LOG_FORMAT` | `log.format` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("DRIFTLESS_POSE_FRAME_ID") {
        cfg.pose.pose_frame_id = v;
    }
    if let Ok(v) = std::env::var("DRIFTLESS_POSE_CHILD_FRAME_ID") {
        cfg.pose.pose_child_frame_id = v;
    }
    if let Ok(v) = std::env::var("DRIFTLESS_BUS_CAPACITY")
        && let Ok(capacity) = v.parse::<usize>()
    {
        cfg.bus_capacity = capacity;
    }
    if let Ok(v) = std::env::var("DRIFTLESS_LOG_FORMAT")
        && let Ok(format) = v.parse()
    {
        cfg.log.format = format;
    }
}

/// Save the config to disk, creating `~/.driftless/` if necessary.
pub fn save(cfg: &Config) -> Result<(), LocalizationError> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path with owner-only permissions on Unix.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), LocalizationError> {
    let io_err = |what: &str, e: std::io::Error| {
        LocalizationError::Io(format!("{what} {}: {e}", path.display()))
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err("failed to create directory for", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| io_err("failed to restrict directory of", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| LocalizationError::InvalidConfig(format!("failed to serialize config: {e}")))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| io_err("failed to write config at", e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| io_err("failed to write config at", e))?;
    Ok(())
}
