//! Configuration module for probescope
//!
//! This module handles the console configuration:
//! - Remote probe service location, REST paths and operation timeouts
//! - Telemetry socket location and watch defaults
//! - Waveform viewport defaults
//! - Build and flash defaults
//!
//! # App Data Location
//!
//! The default configuration file and log files live in the
//! platform-appropriate data directory under `dev.hxyulin.probescope`:
//!
//! - **Linux**: `~/.local/share/dev.hxyulin.probescope/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.probescope/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.probescope\`
//!
//! # Example
//!
//! ```ignore
//! use probescope::config::ConsoleConfig;
//!
//! let mut config = ConsoleConfig::load_or_default(ConsoleConfig::default_path());
//! config.telemetry.buffer_size = 5_000;
//! config.validate()?;
//! config.save("probescope.toml")?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{ConsoleError, OperationKind, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.hxyulin.probescope";

/// Default configuration filename
pub const CONFIG_FILE: &str = "probescope.toml";

/// Default flash base address (internal flash of most Cortex-M parts)
pub const DEFAULT_FLASH_BASE: u64 = 0x0800_0000;

/// Default telemetry sample interval in milliseconds
pub const DEFAULT_SAMPLE_RATE_MS: u64 = 10;

/// Default number of samples retained per watched variable
pub const DEFAULT_BUFFER_SIZE: usize = 10_000;

/// Upper bound on `buffer_size` to keep memory per variable sane
pub const MAX_BUFFER_SIZE: usize = 1_000_000;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        ConsoleError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            ConsoleError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

// ==================== Console Config ====================

/// Complete console configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConsoleConfig {
    /// Remote probe service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Telemetry stream configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Waveform viewport defaults
    #[serde(default)]
    pub viewport: ViewportConfig,

    /// Build defaults
    #[serde(default)]
    pub build: BuildConfig,

    /// Flash defaults
    #[serde(default)]
    pub flash: FlashConfig,
}

impl ConsoleConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the configuration file in the app data directory
    pub fn default_path() -> Option<PathBuf> {
        app_data_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConsoleError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content).with_context(|| format!("Failed to load config file {:?}", path))
    }

    /// Load a configuration file, returning defaults if it is missing or invalid
    pub fn load_or_default(path: Option<impl AsRef<Path>>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ConsoleError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Serialize the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConsoleError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Save the configuration to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConsoleError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| {
            ConsoleError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.service.base_url).map_err(|e| {
            ConsoleError::Config(format!("Invalid service base_url '{}': {}", self.service.base_url, e))
        })?;

        if !self.telemetry.socket_url.contains(SESSION_PLACEHOLDER) {
            return Err(ConsoleError::Config(format!(
                "telemetry.socket_url must contain the {} placeholder",
                SESSION_PLACEHOLDER
            )));
        }
        url::Url::parse(&self.telemetry.socket_url.replace(SESSION_PLACEHOLDER, "session"))
            .map_err(|e| ConsoleError::Config(format!("Invalid telemetry socket_url: {}", e)))?;

        if self.telemetry.buffer_size == 0 || self.telemetry.buffer_size > MAX_BUFFER_SIZE {
            return Err(ConsoleError::Config(format!(
                "telemetry.buffer_size must be between 1 and {}",
                MAX_BUFFER_SIZE
            )));
        }
        if self.telemetry.sample_rate_ms == 0 {
            return Err(ConsoleError::Config(
                "telemetry.sample_rate_ms must be greater than zero".to_string(),
            ));
        }
        if !(self.viewport.time_range_ms > 0.0) {
            return Err(ConsoleError::Config(
                "viewport.time_range_ms must be positive".to_string(),
            ));
        }
        if !(self.viewport.vertical_range > 0.0) {
            return Err(ConsoleError::Config(
                "viewport.vertical_range must be positive".to_string(),
            ));
        }
        if self.build.optimization_level.is_empty() {
            return Err(ConsoleError::Config(
                "build.optimization_level must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ==================== Service Config ====================

/// Remote probe service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the probe/build service
    pub base_url: String,

    /// REST paths, relative to `base_url`
    pub paths: ServicePaths,

    /// Per-operation timeouts
    pub timeouts: TimeoutConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            paths: ServicePaths::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// REST endpoint paths of the probe service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServicePaths {
    pub connect: String,
    pub disconnect: String,
    pub compile: String,
    pub flash: String,
    pub erase: String,
}

impl Default for ServicePaths {
    fn default() -> Self {
        Self {
            connect: "/api/debug/connect".to_string(),
            disconnect: "/api/debug/disconnect".to_string(),
            compile: "/api/build/compile".to_string(),
            flash: "/api/flash/program".to_string(),
            erase: "/api/flash/erase".to_string(),
        }
    }
}

/// Bounded timeouts for remote operations, in seconds
///
/// A timed-out operation is reported and never retried automatically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_secs: u64,
    pub disconnect_secs: u64,
    pub build_secs: u64,
    pub flash_secs: u64,
    pub erase_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 15,
            disconnect_secs: 5,
            build_secs: 300,
            flash_secs: 120,
            erase_secs: 60,
        }
    }
}

impl TimeoutConfig {
    /// Timeout for an operation class
    pub fn for_operation(&self, operation: OperationKind) -> Duration {
        let secs = match operation {
            OperationKind::Connect => self.connect_secs,
            OperationKind::Disconnect => self.disconnect_secs,
            OperationKind::Build => self.build_secs,
            OperationKind::Flash => self.flash_secs,
            OperationKind::Erase => self.erase_secs,
        };
        Duration::from_secs(secs.max(1))
    }
}

// ==================== Telemetry Config ====================

/// Placeholder replaced by the session id in `TelemetryConfig::socket_url`
pub const SESSION_PLACEHOLDER: &str = "{session_id}";

/// Telemetry stream configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Socket URL template; `{session_id}` is replaced on open
    pub socket_url: String,

    /// Requested sample interval in milliseconds
    pub sample_rate_ms: u64,

    /// Samples retained per watched variable
    pub buffer_size: usize,

    /// Whether the viewport follows the newest sample
    pub auto_scroll: bool,

    /// Queue depth for each UI event subscriber
    pub subscriber_queue: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            socket_url: "ws://127.0.0.1:8000/ws/debug/{session_id}".to_string(),
            sample_rate_ms: DEFAULT_SAMPLE_RATE_MS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            auto_scroll: true,
            subscriber_queue: 1024,
        }
    }
}

impl TelemetryConfig {
    /// Socket URL for a session
    pub fn socket_url_for(&self, session_id: &str) -> String {
        self.socket_url.replace(SESSION_PLACEHOLDER, session_id)
    }
}

// ==================== Viewport Config ====================

/// Waveform viewport defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewportConfig {
    /// Visible time span in milliseconds
    pub time_range_ms: f64,

    /// Visible value span
    pub vertical_range: f64,

    /// Value at the vertical center of the view
    pub vertical_offset: f64,

    /// Fit the vertical range to visible data after each ingestion
    pub auto_scale: bool,

    /// Maximum points handed to a renderer per variable
    pub max_render_points: usize,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            time_range_ms: 5_000.0,
            vertical_range: 10.0,
            vertical_offset: 0.0,
            auto_scale: false,
            max_render_points: 2_000,
        }
    }
}

// ==================== Build Config ====================

/// Build defaults sent with every compile request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    /// Build with debug information
    pub debug: bool,

    /// Optimization level passed to the compiler (e.g. "O0", "Os")
    pub optimization_level: String,

    /// Preprocessor defines
    pub defines: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            debug: true,
            optimization_level: "O0".to_string(),
            defines: Vec::new(),
        }
    }
}

// ==================== Flash Config ====================

/// Flash defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlashConfig {
    /// Fixed base address every image is written at
    pub base_address: u64,

    /// Read back and verify after writing
    pub verify: bool,

    /// Erase the whole chip before writing
    pub erase_all: bool,

    /// How the probe resets the target after every successful write
    pub reset_mode: ResetMode,

    /// Optional probe-service target configuration name
    pub target_config: Option<String>,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            base_address: DEFAULT_FLASH_BASE,
            verify: true,
            erase_all: false,
            reset_mode: ResetMode::default(),
            target_config: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ConsoleConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.flash.base_address, 0x0800_0000);
        assert!(config.flash.verify);
        assert!(config.telemetry.auto_scroll);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = ConsoleConfig::default();
        config.telemetry.buffer_size = 3;
        config.build.defines = vec!["DEBUG=1".to_string()];
        config.flash.target_config = Some("stm32f1x.cfg".to_string());

        let text = config.to_toml().unwrap();
        let parsed = ConsoleConfig::from_toml(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed = ConsoleConfig::from_toml(
            r#"
            [telemetry]
            buffer_size = 500

            [service.timeouts]
            build_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(parsed.telemetry.buffer_size, 500);
        assert_eq!(parsed.telemetry.sample_rate_ms, DEFAULT_SAMPLE_RATE_MS);
        assert_eq!(
            parsed.service.timeouts.for_operation(OperationKind::Build),
            Duration::from_secs(30)
        );
        assert_eq!(parsed.service.timeouts.connect_secs, 15);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ConsoleConfig::default();
        config.telemetry.buffer_size = 0;
        assert!(config.validate().is_err());

        let mut config = ConsoleConfig::default();
        config.telemetry.socket_url = "ws://host/ws".to_string();
        assert!(config.validate().is_err());

        let mut config = ConsoleConfig::default();
        config.service.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = ConsoleConfig::default();
        config.viewport.time_range_ms = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_socket_url_for_session() {
        let config = TelemetryConfig::default();
        assert_eq!(
            config.socket_url_for("sess-1"),
            "ws://127.0.0.1:8000/ws/debug/sess-1"
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = ConsoleConfig::default();
        config.viewport.time_range_ms = 2_500.0;
        config.save(&path).unwrap();

        let loaded = ConsoleConfig::load(&path).unwrap();
        assert_eq!(loaded.viewport.time_range_ms, 2_500.0);

        let missing = ConsoleConfig::load_or_default(Some(dir.path().join("missing.toml")));
        assert_eq!(missing, ConsoleConfig::default());
    }
}
