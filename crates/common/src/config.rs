//! Harness configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// Harness configuration, loaded from TOML with `CSSBUILD_*` overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Project directory containing the bundler setup
    pub project_root: PathBuf,

    /// Source root, relative to the project root
    pub input_dir: PathBuf,

    /// Build output root, relative to the project root
    pub output_dir: PathBuf,

    /// Prepended to every command line (e.g. `npx`)
    pub command_prefix: Option<String>,

    /// Where scenarios run
    pub sandbox: SandboxMode,

    /// Wait and timeout knobs
    pub timeouts: TimeoutConfig,

    /// Extra environment passed to every build process
    pub env: BTreeMap<String, String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("integrations/webpack-5"),
            input_dir: PathBuf::from("src"),
            output_dir: PathBuf::from("dist"),
            command_prefix: Some("npx".to_string()),
            sandbox: SandboxMode::Copy,
            timeouts: TimeoutConfig::default(),
            env: BTreeMap::new(),
        }
    }
}

/// How a scenario gets its project directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    /// Copy the project into a temporary directory per scenario
    #[default]
    Copy,
    /// Mutate the project directly and restore touched files afterwards
    InPlace,
}

impl std::str::FromStr for SandboxMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "copy" => Ok(SandboxMode::Copy),
            "in-place" | "in_place" => Ok(SandboxMode::InPlace),
            other => Err(Error::InvalidConfig(format!("unknown sandbox mode: {}", other))),
        }
    }
}

/// Timeouts in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Waiting for an output file to appear
    pub creation_ms: u64,

    /// Waiting for an output file to change after a trigger
    pub change_ms: u64,

    /// Grace period between SIGTERM and SIGKILL
    pub stop_ms: u64,

    /// Upper bound for a whole scenario
    pub scenario_ms: u64,

    /// Output polling interval
    pub poll_interval_ms: u64,

    /// How long an output file must stay unchanged to count as settled
    pub settle_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            creation_ms: 30_000,
            change_ms: 30_000,
            stop_ms: 5_000,
            scenario_ms: 120_000,
            poll_interval_ms: 50,
            settle_ms: 100,
        }
    }
}

impl TimeoutConfig {
    pub fn creation(&self) -> Duration {
        Duration::from_millis(self.creation_ms)
    }

    pub fn change(&self) -> Duration {
        Duration::from_millis(self.change_ms)
    }

    pub fn stop(&self) -> Duration {
        Duration::from_millis(self.stop_ms)
    }

    pub fn scenario(&self) -> Duration {
        Duration::from_millis(self.scenario_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            debug!("Loaded harness config from {}", path.display());
            Ok(config)
        } else {
            debug!("No harness config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `CSSBUILD_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(root) = lookup("CSSBUILD_PROJECT") {
            self.project_root = PathBuf::from(root);
        }
        if let Some(mode) = lookup("CSSBUILD_SANDBOX") {
            self.sandbox = mode.parse()?;
        }
        if let Some(prefix) = lookup("CSSBUILD_COMMAND_PREFIX") {
            let prefix = prefix.trim();
            self.command_prefix = if prefix.is_empty() {
                None
            } else {
                Some(prefix.to_string())
            };
        }
        if let Some(ms) = lookup("CSSBUILD_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| Error::InvalidConfig(format!("CSSBUILD_TIMEOUT_MS: not a number: {}", ms)))?;
            self.timeouts.creation_ms = ms;
            self.timeouts.change_ms = ms;
        }
        self.validate()
    }

    /// Reject settings the harness cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.input_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("input_dir must not be empty".into()));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("output_dir must not be empty".into()));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("poll_interval_ms must be positive".into()));
        }
        if self.timeouts.settle_ms >= self.timeouts.change_ms {
            return Err(Error::InvalidConfig(format!(
                "settle_ms ({}) must be below change_ms ({})",
                self.timeouts.settle_ms, self.timeouts.change_ms
            )));
        }
        Ok(())
    }
}
