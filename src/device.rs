//! Execution-environment introspection for status reports.

use std::process::{Command, Stdio};

use serde::Serialize;

/// Snapshot of the accelerator the model runs on.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_used_gb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_total_gb: Option<f64>,
}

impl DeviceInfo {
    pub fn unavailable() -> Self {
        Self::default()
    }
}

/// Source of [`DeviceInfo`]. Queried outside the manager lock.
pub trait DeviceProbe: Send + Sync {
    fn probe(&self) -> DeviceInfo;
}

/// Reports no accelerator. Useful for CPU-only deployments and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDevice;

impl DeviceProbe for NoDevice {
    fn probe(&self) -> DeviceInfo {
        DeviceInfo::unavailable()
    }
}

/// Queries the first NVIDIA GPU through `nvidia-smi`.
#[derive(Debug, Clone)]
pub struct NvidiaSmiProbe {
    bin_path: String,
}

impl Default for NvidiaSmiProbe {
    fn default() -> Self {
        Self {
            bin_path: "nvidia-smi".to_string(),
        }
    }
}

impl NvidiaSmiProbe {
    /// Use a specific `nvidia-smi` binary instead of the one on PATH.
    pub fn with_bin_path(bin_path: impl Into<String>) -> Self {
        Self {
            bin_path: bin_path.into(),
        }
    }
}

impl DeviceProbe for NvidiaSmiProbe {
    fn probe(&self) -> DeviceInfo {
        let output = Command::new(&self.bin_path)
            .args([
                "--query-gpu=name,memory.used,memory.total",
                "--format=csv,noheader,nounits",
            ])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();

        match output {
            Ok(out) if out.status.success() => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                parse_smi_line(&stdout).unwrap_or_else(|| {
                    log::debug!("Unrecognized nvidia-smi output: {stdout:?}");
                    DeviceInfo::unavailable()
                })
            }
            Ok(out) => {
                log::debug!("nvidia-smi exited with {}", out.status);
                DeviceInfo::unavailable()
            }
            Err(e) => {
                log::debug!("nvidia-smi not usable: {e}");
                DeviceInfo::unavailable()
            }
        }
    }
}

/// Parse `name, used_mib, total_mib` from the first line of `nvidia-smi` CSV output.
fn parse_smi_line(output: &str) -> Option<DeviceInfo> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;
    let mut fields = line.split(',').map(str::trim);
    let name = fields.next().filter(|n| !n.is_empty())?;
    let used_mib: f64 = fields.next()?.parse().ok()?;
    let total_mib: f64 = fields.next()?.parse().ok()?;

    Some(DeviceInfo {
        available: true,
        device: Some(name.to_string()),
        memory_used_gb: Some(mib_to_gb(used_mib)),
        memory_total_gb: Some(mib_to_gb(total_mib)),
    })
}

fn mib_to_gb(mib: f64) -> f64 {
    (mib / 1024.0 * 100.0).round() / 100.0
}
