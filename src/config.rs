//! Client configuration using Figment.
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. A TOML file (`daq-cli.toml` in the working directory, or `--config <path>`)
//! 3. Environment variables prefixed with `DAQ_CLI_`, nested with `__`
//!
//! # Environment Variable Overrides
//!
//! ```text
//! DAQ_CLI_BACKEND__SIMULATED=true
//! DAQ_CLI_BACKEND__MARKER_PATH=/tmp/backend.ipc
//! DAQ_CLI_MOTION__MOVE_TIMEOUT_MS=30000
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default settings file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "daq-cli.toml";
/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "DAQ_CLI_";
/// Hard ceiling on a single relative move, in meters.
pub const MAX_DISTANCE_M: f64 = 0.1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    Load(#[from] figment::Error),
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendSettings,
    pub acquisition: AcquisitionSettings,
    pub motion: MotionSettings,
    pub display: DisplaySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Address of the backend endpoint.
    pub address: String,
    /// File left behind by a backend process, whether or not it answers.
    pub marker_path: PathBuf,
    /// Talk to the in-process simulated microscope instead of a backend.
    pub simulated: bool,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            address: "ipc:///var/run/odemisd/backend.ipc".to_string(),
            marker_path: PathBuf::from("/var/run/odemisd/backend.ipc"),
            simulated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Data-flow used when a command names none.
    pub default_dataflow: String,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            default_dataflow: "data".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    /// Largest accepted displacement per request, in meters.
    pub max_distance_m: f64,
    /// Client-side limit on waiting for a move. `None` leaves it to the backend.
    pub move_timeout_ms: Option<u64>,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            max_distance_m: MAX_DISTANCE_M,
            move_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Window size used until the first frame arrives, when the detector does
    /// not report a resolution.
    pub initial_size: (u32, u32),
    /// Print a coarse text preview of each frame.
    pub preview: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            initial_size: (640, 480),
            preview: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive used when neither `--log-level` nor `RUST_LOG` is given.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the default file (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Load settings from `path` (if present) and the environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let max = self.motion.max_distance_m;
        if !(max > 0.0 && max <= MAX_DISTANCE_M) {
            return Err(ConfigError::Validation(format!(
                "motion.max_distance_m must be in (0, {}], got {}",
                MAX_DISTANCE_M, max
            )));
        }
        if self.acquisition.default_dataflow.is_empty() {
            return Err(ConfigError::Validation(
                "acquisition.default_dataflow must not be empty".to_string(),
            ));
        }
        let (w, h) = self.display.initial_size;
        if w == 0 || h == 0 {
            return Err(ConfigError::Validation(format!(
                "display.initial_size must be non-zero, got {}x{}",
                w, h
            )));
        }
        Ok(())
    }
}
