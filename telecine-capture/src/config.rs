//! Capture client configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use telecine_core::{ProcessingOptions, SaveOptions, ScannerAddress};

/// Top-level configuration for the capture client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Scanner connection.
    pub network: NetworkConfig,
    /// Fusion, calibration and post-processing switches.
    pub processing: ProcessingOptions,
    /// Save-to-file.
    pub output: SaveOptions,
    /// Calibration table storage.
    pub calibration: CalibrationConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Scanner host name or IP.
    pub host: String,
    /// Port of the frame stream.
    pub port: u16,
    /// Connection timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Calibration table storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// File the table is loaded from at start and written to after a run.
    pub path: PathBuf,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level, used when `RUST_LOG` is unset.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            timeout_ms: 5000,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("calibrate.bin"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl NetworkConfig {
    pub fn address(&self) -> ScannerAddress {
        ScannerAddress::new(self.host.clone(), self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Apply a `host` or `host:port` override.
    pub fn set_address(&mut self, addr: &str) {
        match addr.rsplit_once(':').map(|(h, p)| (h, p.parse::<u16>())) {
            Some((host, Ok(port))) => {
                self.host = host.to_string();
                self.port = port;
            }
            _ => self.host = addr.to_string(),
        }
    }
}

impl CaptureConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
