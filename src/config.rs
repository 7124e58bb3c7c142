//! Environment-driven configuration.
//!
//! | Variable | Default | Used for |
//! |---|---|---|
//! | `MODEL_DIR` | `pretrained_models/CosyVoice2-0.5B` | key loaded when a caller passes none |
//! | `GPU_IDLE_TIMEOUT` | `600` (seconds) | reported in status, never enforced |
//! | `INPUT_DIR` | `/data/input` | base for relative prompt audio paths |
//! | `OUTPUT_DIR` | `/data/output` | where synthesized WAV files are written |

use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;

pub const DEFAULT_MODEL_DIR: &str = "pretrained_models/CosyVoice2-0.5B";
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_INPUT_DIR: &str = "/data/input";
pub const DEFAULT_OUTPUT_DIR: &str = "/data/output";

/// Parameters for the resource manager.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct ManagerConfig {
    /// Key substituted when `acquire` is called without one.
    #[builder(setter(into))]
    pub default_key: String,
    /// Informational only; surfaced in the status report.
    pub idle_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_key: DEFAULT_MODEL_DIR.to_string(),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

impl ManagerConfig {
    /// Read `MODEL_DIR` and `GPU_IDLE_TIMEOUT` from the process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Same as [`ManagerConfig::from_env`] with a custom variable lookup.
    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(dir) = lookup("MODEL_DIR").filter(|d| !d.is_empty()) {
            config.default_key = dir;
        }
        if let Some(raw) = lookup("GPU_IDLE_TIMEOUT") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => config.idle_timeout = Duration::from_secs(secs),
                Err(_) => log::warn!(
                    "Ignoring GPU_IDLE_TIMEOUT={raw:?}, using {DEFAULT_IDLE_TIMEOUT_SECS}s"
                ),
            }
        }
        config
    }
}

/// Directories used by the tool layer.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct ServiceConfig {
    #[builder(setter(into))]
    pub input_dir: PathBuf,
    #[builder(setter(into))]
    pub output_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(dir) = lookup("INPUT_DIR").filter(|d| !d.is_empty()) {
            config.input_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("OUTPUT_DIR").filter(|d| !d.is_empty()) {
            config.output_dir = PathBuf::from(dir);
        }
        config
    }

    /// Create the input and output directories if missing.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.input_dir)?;
        std::fs::create_dir_all(&self.output_dir)
    }
}
