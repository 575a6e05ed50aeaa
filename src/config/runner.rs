//! Runner configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Prefix for environment overrides, e.g. `JOB_RUNNER_WORKERS`.
pub const ENV_PREFIX: &str = "JOB_RUNNER_";

const fn default_poll_interval_ms() -> u64 {
    100
}

const fn default_idle_backoff_ms() -> u64 {
    5_000
}

const fn default_idle_pass_threshold() -> u32 {
    10
}

const fn default_grace_timeout_ms() -> u64 {
    1_000
}

const fn default_store_timeout_ms() -> u64 {
    30_000
}

fn default_connection_file() -> PathBuf {
    PathBuf::from("connection_string.txt")
}

/// Scheduler and process pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Slot count; `None` uses the detected CPU core count.
    #[serde(default)]
    pub worker_count: Option<usize>,
    /// Pause between full passes over the pool.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Extra pause after a fully idle pass.
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,
    /// Consecutive fully idle passes before the runner shuts itself down.
    #[serde(default = "default_idle_pass_threshold")]
    pub idle_pass_threshold: u32,
    /// Time a terminated process gets before it is killed.
    #[serde(default = "default_grace_timeout_ms")]
    pub grace_timeout_ms: u64,
    /// Upper bound on any single queue store round trip.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// File holding the store connection string.
    #[serde(default = "default_connection_file")]
    pub connection_file: PathBuf,
    /// Reset claimed jobs to pending before the first pass.
    #[serde(default)]
    pub recover_stale_claims: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            poll_interval_ms: default_poll_interval_ms(),
            idle_backoff_ms: default_idle_backoff_ms(),
            idle_pass_threshold: default_idle_pass_threshold(),
            grace_timeout_ms: default_grace_timeout_ms(),
            store_timeout_ms: default_store_timeout_ms(),
            connection_file: default_connection_file(),
            recover_stale_claims: false,
        }
    }
}

impl RunnerConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == Some(0) {
            return Err("worker_count must be greater than 0".into());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.idle_pass_threshold == 0 {
            return Err("idle_pass_threshold must be greater than 0".into());
        }
        if self.store_timeout_ms == 0 {
            return Err("store_timeout_ms must be greater than 0".into());
        }
        if self.connection_file.as_os_str().is_empty() {
            return Err("connection_file must not be empty".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns a read, parse or validation message.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        Self::from_json_str(&raw)
    }

    /// Apply `JOB_RUNNER_*` environment overrides, then validate.
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse.
    pub fn apply_env(self) -> Result<Self, String> {
        self.apply_vars(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, String> {
            raw.trim()
                .parse()
                .map_err(|_| format!("{ENV_PREFIX}{key}: invalid value `{raw}`"))
        }

        if let Some(v) = lookup("WORKERS") {
            self.worker_count = Some(parse("WORKERS", &v)?);
        }
        if let Some(v) = lookup("POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse("POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("IDLE_BACKOFF_MS") {
            self.idle_backoff_ms = parse("IDLE_BACKOFF_MS", &v)?;
        }
        if let Some(v) = lookup("IDLE_PASS_THRESHOLD") {
            self.idle_pass_threshold = parse("IDLE_PASS_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("GRACE_TIMEOUT_MS") {
            self.grace_timeout_ms = parse("GRACE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("STORE_TIMEOUT_MS") {
            self.store_timeout_ms = parse("STORE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("CONNECTION_FILE") {
            self.connection_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("RECOVER_STALE_CLAIMS") {
            self.recover_stale_claims = parse("RECOVER_STALE_CLAIMS", &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Resolved slot count.
    #[must_use]
    pub fn resolved_worker_count(&self) -> usize {
        self.worker_count.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Pause between passes.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Extra pause after an idle pass.
    #[must_use]
    pub const fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    /// Grace period before a forced kill.
    #[must_use]
    pub const fn grace_timeout(&self) -> Duration {
        Duration::from_millis(self.grace_timeout_ms)
    }

    /// Bound on a single store call.
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}
