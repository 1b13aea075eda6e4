//! Probe configuration parsing and validation.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_startup_timeout_seconds() -> u64 {
    10
}

fn default_readiness_timeout_seconds() -> u64 {
    30
}

/// Configuration for `stagehand-probe`, parsed from a TOML file.
///
/// ```toml
/// command = "stagehand-demo"
/// args = ["--log-format", "text"]
/// startup_timeout_seconds = 10
/// readiness_timeout_seconds = 30
///
/// [options]
/// app_root = "/srv/app"
/// generation_dir = "/var/run/supervisor/gen-1"
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProbeConfig {
    /// Worker binary or interpreter to execute.
    pub command: String,
    /// Arguments passed to the worker command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the worker; inherited when absent.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    /// Startup options sent after the header ack, in key order.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Seconds to wait for the worker's greeting.
    #[serde(default = "default_startup_timeout_seconds")]
    pub startup_timeout_seconds: u64,
    /// Seconds to wait for the readiness report.
    #[serde(default = "default_readiness_timeout_seconds")]
    pub readiness_timeout_seconds: u64,
}

impl ProbeConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] on a TOML parse failure or when
    /// validation rejects the parsed values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Startup timeout as a [`Duration`].
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_seconds)
    }

    /// Readiness timeout as a [`Duration`].
    #[must_use]
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_seconds)
    }

    // ── Private helpers ──────────────────────────────────────────────────────

    fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(AppError::Config("command must not be empty".into()));
        }
        if self.startup_timeout_seconds == 0 {
            return Err(AppError::Config(
                "startup_timeout_seconds must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
