//! Client configuration
//!
//! Loads `config.toml` (default `~/.config/verisoul/config.toml`), fills
//! missing sections with defaults and applies `VERISOUL_*` environment
//! overrides on top.
//!
//! ```toml
//! environment = "prod"
//! project_id = "00000000-0000-0000-0000-000000000001"
//!
//! [timing]
//! session_timeout_secs = 20
//! ```

use crate::environment::Environment;
use crate::error::{Result, VerisoulError};
use crate::evidence::SdkType;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;


/// Top-level client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Environment name (`dev`, `staging`, `sandbox`, `prod`)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Project identifier issued by the dashboard
    #[serde(default)]
    pub project_id: String,

    /// Which SDK flavour reports itself in `sdk_info`
    #[serde(default)]
    pub sdk_type: SdkType,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub handshake: HandshakeConfig,

    #[serde(default)]
    pub behavior: BehaviorConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            project_id: String::new(),
            sdk_type: SdkType::default(),
            timing: TimingConfig::default(),
            network: NetworkConfig::default(),
            handshake: HandshakeConfig::default(),
            behavior: BehaviorConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

fn default_environment() -> String {
    Environment::Prod.as_str().to_string()
}

/// Session wait, debounce and polling settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    /// Budget for one `session()` call
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    /// Minimum spacing between effective reinitializations
    #[serde(default = "default_debounce_ms")]
    pub reinitialize_debounce_ms: u64,

    /// Registry polling interval once no collection task is attached
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: default_session_timeout_secs(),
            reinitialize_debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl TimingConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn reinitialize_debounce(&self) -> Duration {
        Duration::from_millis(self.reinitialize_debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_session_timeout_secs() -> u64 {
    20
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    200
}

/// Gateway retry and transport settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Total attempts per request, first try included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Overrides `https://ingest.<env>.verisoul.ai`
    #[serde(default)]
    pub ingest_base_url: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            ingest_base_url: None,
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Session-creation handshake settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandshakeConfig {
    #[serde(default = "default_handshake_retries")]
    pub max_retries: u32,

    /// Watchdog per page load
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Overrides `https://js.<env>.verisoul.ai`
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            max_retries: default_handshake_retries(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            base_url: None,
        }
    }
}

impl HandshakeConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

fn default_handshake_retries() -> u32 {
    3
}

fn default_attempt_timeout_ms() -> u64 {
    3000
}

/// Behavioral (motion + touch) capture settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorConfig {
    /// Uploads per session before capture stops
    #[serde(default = "default_max_sends")]
    pub max_sends: u32,

    /// Capture stops on its own after this long
    #[serde(default = "default_capture_window_secs")]
    pub capture_window_secs: u64,

    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Accelerometer sampling interval
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            max_sends: default_max_sends(),
            capture_window_secs: default_capture_window_secs(),
            buffer_capacity: default_buffer_capacity(),
            sample_interval_ms: default_sample_interval_ms(),
        }
    }
}

fn default_max_sends() -> u32 {
    10
}

fn default_capture_window_secs() -> u64 {
    300
}

fn default_buffer_capacity() -> usize {
    200
}

fn default_sample_interval_ms() -> u64 {
    20
}

/// Where the session record lives
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Defaults to `<data dir>/verisoul/state.json`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("verisoul").join("state.json")))
    }
}

impl ClientConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| VerisoulError::ConfigLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| VerisoulError::ConfigLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| VerisoulError::InvalidConfig {
            message: e.to_string(),
        })?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("verisoul").join("config.toml"))
    }

    /// Load from default location or fall back to defaults, then apply env overrides
    pub fn load_or_default() -> Self {
        let mut config = Self::default_path()
            .filter(|p| p.exists())
            .and_then(|p| match Self::load(&p) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Ignoring unreadable config: {}", e);
                    None
                }
            })
            .unwrap_or_default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// - `VERISOUL_ENV` → `environment`
    /// - `VERISOUL_PROJECT_ID` → `project_id`
    /// - `VERISOUL_INGEST_URL` → `network.ingest_base_url`
    /// - `VERISOUL_SESSION_TIMEOUT_SECS` → `timing.session_timeout_secs`
    ///
    /// Invalid values are logged as warnings but don't cause errors.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with an explicit lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("VERISOUL_ENV").filter(|v| !v.is_empty()) {
            self.environment = value;
        }

        if let Some(value) = lookup("VERISOUL_PROJECT_ID").filter(|v| !v.is_empty()) {
            self.project_id = value;
        }

        if let Some(value) = lookup("VERISOUL_INGEST_URL").filter(|v| !v.is_empty()) {
            self.network.ingest_base_url = Some(value);
        }

        if let Some(value) = lookup("VERISOUL_SESSION_TIMEOUT_SECS") {
            match value.parse::<u64>() {
                Ok(secs) if secs > 0 => self.timing.session_timeout_secs = secs,
                _ => warn!("Invalid VERISOUL_SESSION_TIMEOUT_SECS value: {}", value),
            }
        }
    }

    /// Parsed environment
    pub fn environment(&self) -> Result<Environment> {
        self.environment.parse()
    }

    /// Reject values the client cannot run with
    pub fn validate(&self) -> Result<()> {
        self.environment()?;

        let zero_fields = [
            ("timing.session_timeout_secs", self.timing.session_timeout_secs == 0),
            ("timing.poll_interval_ms", self.timing.poll_interval_ms == 0),
            ("network.max_attempts", self.network.max_attempts == 0),
            ("handshake.attempt_timeout_ms", self.handshake.attempt_timeout_ms == 0),
            ("behavior.buffer_capacity", self.behavior.buffer_capacity == 0),
        ];
        if let Some((name, _)) = zero_fields.iter().find(|(_, is_zero)| *is_zero) {
            return Err(VerisoulError::InvalidConfig {
                message: format!("{} must be greater than zero", name),
            });
        }
        Ok(())
    }
}
