use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{OrchestratorError, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/aggregator";

/// Timing and decoding knobs for monitoring fetch jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Aggregator blueprint root of the AIPscan instance
    pub base_url: String,
    /// Pause between two status requests of the same phase
    pub poll_interval_ms: u64,
    /// Pause after the METS phase before index refresh starts
    pub settle_delay_ms: u64,
    /// Delay a display should wait before reloading after completion
    pub refresh_delay_ms: u64,
    /// Maximum duration of a single phase; `None` polls forever
    pub phase_timeout_secs: Option<u64>,
    /// Timeout of a single HTTP request
    pub request_timeout_secs: u64,
    /// Reject state literals outside the known set
    pub strict_states: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_ms: 1000,
            settle_delay_ms: 3000,
            refresh_delay_ms: 3000,
            phase_timeout_secs: Some(3600),
            request_timeout_secs: 30,
            strict_states: false,
        }
    }
}

impl MonitorConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Sub-second remainders round up to the next whole second.
    pub fn with_phase_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.phase_timeout_secs = timeout.map(|t| t.as_secs() + u64::from(t.subsec_nanos() > 0));
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self
    }

    pub fn with_strict_states(mut self, strict: bool) -> Self {
        self.strict_states = strict;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    pub fn phase_timeout(&self) -> Option<Duration> {
        self.phase_timeout_secs.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "base_url must not be empty".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.phase_timeout_secs == Some(0) {
            return Err(OrchestratorError::InvalidConfig(
                "phase_timeout_secs must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Read a TOML config file, falling back to defaults when it is missing
    /// or unreadable.
    pub async fn read(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "Config file does not exist, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path).await {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    debug!(path = %path.display(), "Config loaded successfully");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                Self::default()
            }
        }
    }

    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).await?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| OrchestratorError::InvalidConfig(e.to_string()))?;
        fs::write(path, content).await?;
        debug!(path = %path.display(), "Config saved successfully");

        Ok(())
    }
}
