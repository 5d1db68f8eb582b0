//! Engine settings.
//!
//! Settings can be loaded from a YAML or JSON file and adjusted through the
//! environment. They configure the engine itself; the per-run workflow
//! configuration is an opaque value supplied by the caller.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Environment variable overriding [`EngineConfig::rollback_on_failure`].
pub const ROLLBACK_ENV: &str = "RELAY_ROLLBACK";

/// Engine-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run compensations of completed tasks when a task fails.
    pub rollback_on_failure: bool,
    /// Refuse to run task graphs that produce validation warnings.
    pub treat_warnings_as_errors: bool,
    /// Log graph statistics before each run.
    pub emit_statistics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rollback_on_failure: true,
            treat_warnings_as_errors: false,
            emit_statistics: true,
        }
    }
}

impl EngineConfig {
    /// Parses settings from YAML (JSON documents are accepted as well).
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("invalid engine configuration")
    }

    /// Loads settings from a file. `.json` files are parsed as JSON; anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read engine configuration: {}", path.display()))?;
        let is_json = path.extension().and_then(|extension| extension.to_str()) == Some("json");
        if is_json {
            serde_json::from_str(&content).with_context(|| format!("invalid engine configuration in {}", path.display()))
        } else {
            Self::from_yaml_str(&content).with_context(|| format!("invalid engine configuration in {}", path.display()))
        }
    }

    /// Applies overrides from the environment (`RELAY_ROLLBACK`).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(ROLLBACK_ENV) {
            match parse_flag(&raw) {
                Some(enabled) => self.rollback_on_failure = enabled,
                None => warn!(variable = ROLLBACK_ENV, value = %raw, "ignoring unrecognized boolean override"),
            }
        }
        self
    }

    /// Executor options derived from these settings.
    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            rollback_enabled: self.rollback_on_failure,
        }
    }
}

/// Options for a single executor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    pub rollback_enabled: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        EngineConfig::default().executor_options()
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
