//! Session configuration with documented timings
//!
//! Every delay the lifecycle manager waits on is collected here. The
//! defaults match the deployment the client was first written against;
//! none of them is derived from a documented server contract, so all of
//! them can be overridden from TOML.

use crate::core::error::{Result, SeaWatchError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the remote API base URL
pub const API_URL_ENV: &str = "SEAWATCH_API_URL";

/// Environment variable enabling developer testing mode
pub const DEVELOPER_TEST_ENV: &str = "SEAWATCH_DEVELOPER_TEST";

/// Base URL used when neither TOML nor the environment supplies one
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Remote endpoint settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the remote service; may or may not already end in `/api/v1`
    pub base_url: String,

    /// Budget for a single HTTP call before it is treated as a timeout
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Apply the `SEAWATCH_API_URL` override, if present and non-empty
    pub fn with_env_override(mut self) -> Self {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
        self
    }
}

/// Configuration for the session lifecycle manager
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    // === MODE ===
    /// Developer testing mode
    ///
    /// Extends the inactivity threshold from minutes to hours and is sent
    /// to the server with every create and reset.
    pub developer_test: bool,

    /// Where the last client identifier is written, if anywhere
    ///
    /// A convenience only; the identifier is regenerated on every create.
    pub client_id_path: Option<PathBuf>,

    // === RETRIES ===
    /// Retries after the first attempt for create, start, stop, step and speed
    pub max_retries: u32,

    /// Base unit for retry backoff
    ///
    /// Create waits 1x, 2x, 3x this value; start waits 1x, 2x, 4x.
    pub retry_base_ms: u64,

    /// Fixed wait before retrying a timed-out stop or step
    pub timeout_retry_ms: u64,

    // === POLLING ===
    /// Poll interval while the simulation is running
    pub running_poll_interval_ms: u64,

    /// Poll interval while the simulation is loading
    pub loading_poll_interval_ms: u64,

    /// Loading-phase polls allowed before one recovery reset is attempted
    pub max_loading_polls: u32,

    /// Wait between observing stage Complete and auto-starting
    pub autostart_delay_ms: u64,

    // === CREATION ===
    /// Wait after deleting a previous session so the deletion propagates
    pub delete_settle_ms: u64,

    /// Wait before every create request to stay clear of the rate limiter
    pub pre_create_delay_ms: u64,

    /// Wait after stopping a session before deleting it during cleanup
    pub stop_settle_ms: u64,

    /// Force-release of creation flags if a create never finishes
    pub creation_safety_timeout_ms: u64,

    /// Creation protection hold once the session reports stage Complete,
    /// whether from a poll or straight from the create reply
    pub complete_release_ms: u64,

    // === GUARD COOLDOWNS ===
    /// Protection hold after a start call
    pub start_release_ms: u64,

    /// Start in-flight flag hold after a start call
    pub start_inflight_release_ms: u64,

    /// Protection hold after a stop call
    pub stop_release_ms: u64,

    /// Active-operation hold after a step call, absorbing trailing polls
    pub step_release_ms: u64,

    /// Window after a stop during which cleanup refuses to delete
    pub recently_stopped_ms: u64,

    /// How long a cleaned-up id stays in the cleanup set
    pub cleanup_tracking_ms: u64,

    /// How long the unmounting flag stays set after `unmount`
    pub unmount_reset_ms: u64,

    // === INACTIVITY SWEEP ===
    /// Interval between inactivity sweeps
    pub sweep_interval_ms: u64,

    /// Inactivity threshold in normal use
    pub inactivity_timeout_ms: u64,

    /// Inactivity threshold in developer testing mode
    pub developer_inactivity_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            developer_test: false,
            client_id_path: None,

            max_retries: 3,
            retry_base_ms: 1_000,
            timeout_retry_ms: 2_000,

            running_poll_interval_ms: 1_000,
            loading_poll_interval_ms: 2_000,
            max_loading_polls: 120,
            autostart_delay_ms: 1_000,

            delete_settle_ms: 2_500,
            pre_create_delay_ms: 2_000,
            stop_settle_ms: 300,
            creation_safety_timeout_ms: 30_000,
            complete_release_ms: 2_000,

            start_release_ms: 2_000,
            start_inflight_release_ms: 1_000,
            stop_release_ms: 5_000,
            step_release_ms: 5_000,
            recently_stopped_ms: 10_000,
            cleanup_tracking_ms: 1_000,
            unmount_reset_ms: 5_000,

            // Five minutes normally, five hours for developer testing
            sweep_interval_ms: 60_000,
            inactivity_timeout_ms: 300_000,
            developer_inactivity_timeout_ms: 18_000_000,
        }
    }
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same defaults with developer testing mode enabled
    pub fn developer() -> Self {
        Self {
            developer_test: true,
            ..Self::default()
        }
    }

    /// Effective inactivity threshold for the current mode
    pub fn inactivity_timeout(&self) -> Duration {
        if self.developer_test {
            ms(self.developer_inactivity_timeout_ms)
        } else {
            ms(self.inactivity_timeout_ms)
        }
    }

    /// Inactivity threshold in whole minutes, for user-facing messages
    pub fn inactivity_minutes(&self) -> u64 {
        self.inactivity_timeout().as_secs() / 60
    }

    pub fn running_poll_interval(&self) -> Duration {
        ms(self.running_poll_interval_ms)
    }

    pub fn loading_poll_interval(&self) -> Duration {
        ms(self.loading_poll_interval_ms)
    }

    pub fn autostart_delay(&self) -> Duration {
        ms(self.autostart_delay_ms)
    }

    pub fn delete_settle(&self) -> Duration {
        ms(self.delete_settle_ms)
    }

    pub fn pre_create_delay(&self) -> Duration {
        ms(self.pre_create_delay_ms)
    }

    pub fn stop_settle(&self) -> Duration {
        ms(self.stop_settle_ms)
    }

    pub fn creation_safety_timeout(&self) -> Duration {
        ms(self.creation_safety_timeout_ms)
    }

    pub fn complete_release(&self) -> Duration {
        ms(self.complete_release_ms)
    }

    pub fn start_release(&self) -> Duration {
        ms(self.start_release_ms)
    }

    pub fn start_inflight_release(&self) -> Duration {
        ms(self.start_inflight_release_ms)
    }

    pub fn stop_release(&self) -> Duration {
        ms(self.stop_release_ms)
    }

    pub fn step_release(&self) -> Duration {
        ms(self.step_release_ms)
    }

    pub fn recently_stopped_window(&self) -> Duration {
        ms(self.recently_stopped_ms)
    }

    pub fn cleanup_tracking(&self) -> Duration {
        ms(self.cleanup_tracking_ms)
    }

    pub fn unmount_reset(&self) -> Duration {
        ms(self.unmount_reset_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        ms(self.sweep_interval_ms)
    }

    pub fn retry_base(&self) -> Duration {
        ms(self.retry_base_ms)
    }

    pub fn timeout_retry(&self) -> Duration {
        ms(self.timeout_retry_ms)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.running_poll_interval_ms == 0 || self.loading_poll_interval_ms == 0 {
            return Err("Poll intervals must be positive".into());
        }

        if self.running_poll_interval_ms > self.loading_poll_interval_ms {
            return Err(format!(
                "running_poll_interval_ms ({}) should be <= loading_poll_interval_ms ({})",
                self.running_poll_interval_ms, self.loading_poll_interval_ms
            ));
        }

        if self.max_loading_polls == 0 {
            return Err("max_loading_polls must be at least 1".into());
        }

        if self.sweep_interval_ms == 0 {
            return Err("sweep_interval_ms must be positive".into());
        }

        // A sweep threshold shorter than the poll interval would delete live sessions
        if self.inactivity_timeout() <= self.loading_poll_interval() {
            return Err(format!(
                "inactivity timeout ({:?}) must exceed the loading poll interval ({:?})",
                self.inactivity_timeout(),
                self.loading_poll_interval()
            ));
        }

        Ok(())
    }
}

/// Full configuration file layout
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeaWatchConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
}

impl SeaWatchConfig {
    /// Load configuration from a TOML file
    pub fn load_from_toml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string and validate it
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: SeaWatchConfig =
            toml::from_str(content).map_err(|e| SeaWatchError::Config(e.to_string()))?;
        config.session.validate().map_err(SeaWatchError::Config)?;
        Ok(config)
    }

    /// Apply environment overrides on top of whatever was loaded
    pub fn with_env_overrides(mut self) -> Self {
        self.api = self.api.with_env_override();
        if let Ok(flag) = std::env::var(DEVELOPER_TEST_ENV) {
            if matches!(flag.trim(), "1" | "true" | "yes") {
                self.session.developer_test = true;
            }
        }
        self
    }
}
