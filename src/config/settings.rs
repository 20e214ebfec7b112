//! Per-call options for remote operations
//!
//! These are derived from the persistent [`ConsoleConfig`](super::ConsoleConfig)
//! and may be adjusted per call by UI collaborators (e.g. a release build
//! from the toolbar) without touching the saved configuration.

use super::{BuildConfig, FlashConfig};
use crate::types::Transport;
use serde::{Deserialize, Serialize};

/// How the probe resets the target after flashing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResetMode {
    /// Software reset using SYSRESETREQ
    #[default]
    Software,
    /// Hardware reset using the NRST pin
    Hardware,
    /// Core reset only
    Core,
}

impl std::fmt::Display for ResetMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResetMode::Software => write!(f, "Software (SYSRESETREQ)"),
            ResetMode::Hardware => write!(f, "Hardware (NRST pin)"),
            ResetMode::Core => write!(f, "Core Reset"),
        }
    }
}

/// Options for a single build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub debug: bool,
    pub optimization_level: String,
    pub defines: Vec<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from(&BuildConfig::default())
    }
}

impl From<&BuildConfig> for BuildOptions {
    fn from(config: &BuildConfig) -> Self {
        Self {
            debug: config.debug,
            optimization_level: config.optimization_level.clone(),
            defines: config.defines.clone(),
        }
    }
}

impl BuildOptions {
    /// Optimized build without debug information
    pub fn release() -> Self {
        Self {
            debug: false,
            optimization_level: "O2".to_string(),
            defines: vec!["NDEBUG".to_string()],
        }
    }

    /// Add a preprocessor define
    pub fn with_define(mut self, define: impl Into<String>) -> Self {
        self.defines.push(define.into());
        self
    }
}

/// Options for a single flash
///
/// The base address is not an option: images are always written at the
/// configured fixed base. Neither is the reset: a successful write always
/// resets the target so it runs the new image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashOptions {
    pub verify: bool,
    pub erase_all: bool,
    pub reset_mode: ResetMode,
    pub target_config: Option<String>,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self::from(&FlashConfig::default())
    }
}

impl From<&FlashConfig> for FlashOptions {
    fn from(config: &FlashConfig) -> Self {
        Self {
            verify: config.verify,
            erase_all: config.erase_all,
            reset_mode: config.reset_mode,
            target_config: config.target_config.clone(),
        }
    }
}

/// What to connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub chip_family: String,
    pub transport: Transport,
}

impl ConnectOptions {
    pub fn new(chip_family: impl Into<String>, transport: Transport) -> Self {
        Self {
            chip_family: chip_family.into(),
            transport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_options_default_verifies() {
        let options = FlashOptions::default();
        assert!(options.verify);
        assert!(!options.erase_all);
        assert_eq!(options.reset_mode, ResetMode::Software);
    }

    #[test]
    fn test_build_options_from_config() {
        let config = BuildConfig {
            debug: false,
            optimization_level: "Os".to_string(),
            defines: vec!["BOARD=2".to_string()],
        };
        let options = BuildOptions::from(&config).with_define("TRACE");
        assert!(!options.debug);
        assert_eq!(options.optimization_level, "Os");
        assert_eq!(options.defines, vec!["BOARD=2", "TRACE"]);
    }

    #[test]
    fn test_release_options() {
        let options = BuildOptions::release();
        assert!(!options.debug);
        assert!(options.defines.contains(&"NDEBUG".to_string()));
    }
}
