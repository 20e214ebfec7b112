//! Core data types for probescope
//!
//! This module contains the data model shared by the session state machine,
//! the telemetry channel and the waveform engine.
//!
//! # Main Types
//!
//! - [`Transport`] - Hardware debug transport (SWD or JTAG)
//! - [`DeviceSession`] - An established connection to a debug probe
//! - [`ConnectionState`] - Flattened view of the session state machine
//! - [`BuildArtifact`] - Result of a remote compilation, consumed by flash
//! - [`FlashResult`] / [`EraseResult`] - Results of destructive operations
//! - [`WatchedVariable`] - A named target variable and its sample buffer
//!
//! # Memory Management
//!
//! Every watched variable owns a [`SampleRingBuffer`] whose capacity is the
//! configured `buffer_size`. When the buffer is full, old samples are evicted
//! automatically, so memory stays bounded regardless of stream duration.

use crate::telemetry::ring_buffer::{Sample, SampleRingBuffer};
use serde::{Deserialize, Serialize};

/// Hardware debug transport used between probe and target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Serial Wire Debug
    #[default]
    Swd,
    /// JTAG
    Jtag,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Swd => write!(f, "SWD"),
            Transport::Jtag => write!(f, "JTAG"),
        }
    }
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "swd" => Ok(Transport::Swd),
            "jtag" => Ok(Transport::Jtag),
            other => Err(format!("unknown transport '{}' (expected swd or jtag)", other)),
        }
    }
}

/// Details the probe service reports about the attached probe and target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeDetails {
    /// Target chip description (e.g. "STM32F103C8")
    pub chip_info: Option<String>,
    /// Interface speed as reported by the service (e.g. "4000 kHz")
    pub speed: Option<String>,
    /// Probe serial number
    pub serial_number: Option<String>,
    /// Probe firmware version
    pub firmware: Option<String>,
    /// Measured target voltage in volts
    pub target_voltage: Option<f64>,
}

/// An established connection to a debug probe
///
/// Created on a successful connect and destroyed on disconnect or when the
/// connection fails. The `session_id` is opaque and assigned by the remote
/// probe service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSession {
    pub session_id: String,
    pub chip_family: String,
    pub transport: Transport,
    #[serde(default)]
    pub probe: ProbeDetails,
}

/// Operation currently occupying a connected session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activity {
    /// Connected and ready
    #[default]
    Idle,
    Building,
    Flashing,
    Erasing,
}

impl Activity {
    /// Lower-case label used in conflict messages and logs
    pub fn label(&self) -> &'static str {
        match self {
            Activity::Idle => "idle",
            Activity::Building => "building",
            Activity::Flashing => "flashing",
            Activity::Erasing => "erasing",
        }
    }
}

/// Flattened view of the device session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected to any probe
    #[default]
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected and ready
    Connected,
    /// Connected, compiling a project
    Building,
    /// Connected, writing firmware
    Flashing,
    /// Connected, erasing the chip
    Erasing,
    /// The last connect attempt failed
    Error,
}

impl ConnectionState {
    /// Whether a device session exists (ready or busy)
    pub fn has_session(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected
                | ConnectionState::Building
                | ConnectionState::Flashing
                | ConnectionState::Erasing
        )
    }

    /// Whether a build, flash or erase is in progress
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            ConnectionState::Building | ConnectionState::Flashing | ConnectionState::Erasing
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting..."),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Building => write!(f, "Building..."),
            ConnectionState::Flashing => write!(f, "Flashing..."),
            ConnectionState::Erasing => write!(f, "Erasing..."),
            ConnectionState::Error => write!(f, "Error"),
        }
    }
}

/// Flash and RAM usage reported by the compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub flash_used: u64,
    pub flash_total: u64,
    pub ram_used: u64,
    pub ram_total: u64,
}

impl MemoryUsage {
    /// Flash usage as a percentage (0 when the total is unknown)
    pub fn flash_percent(&self) -> f64 {
        percent(self.flash_used, self.flash_total)
    }

    /// RAM usage as a percentage (0 when the total is unknown)
    pub fn ram_percent(&self) -> f64 {
        percent(self.ram_used, self.ram_total)
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

/// Severity of a compiler diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A compiler diagnostic in `file:line:col: severity: message` form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileDiagnostic {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
    pub message: String,
}

impl std::fmt::Display for CompileDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file, self.line, self.column, severity, self.message
        )
    }
}

/// Result of a successful remote build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildArtifact {
    pub project_id: String,
    /// Paths of produced firmware images on the build host
    pub output_files: Vec<String>,
    pub memory_usage: Option<MemoryUsage>,
    /// Full compiler output, including lines that are not diagnostics
    pub compile_log: String,
    pub errors: Vec<CompileDiagnostic>,
    #[serde(default)]
    pub warnings: Vec<CompileDiagnostic>,
}

impl BuildArtifact {
    /// Whether this artifact can be flashed
    pub fn is_flashable(&self) -> bool {
        !self.output_files.is_empty()
    }

    /// Pick the image to flash, preferring Intel HEX, then raw binary, then ELF
    pub fn flash_image(&self) -> Option<&str> {
        const PREFERENCE: [&str; 3] = [".hex", ".bin", ".elf"];
        PREFERENCE
            .iter()
            .find_map(|ext| {
                self.output_files
                    .iter()
                    .find(|f| f.to_ascii_lowercase().ends_with(ext))
            })
            .or_else(|| self.output_files.first())
            .map(String::as_str)
    }
}

/// Result of writing firmware to the target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashResult {
    /// File that was written
    pub file: String,
    /// Base address the image was written at
    pub address: u64,
    /// Number of bytes written
    pub size: u64,
    /// Whether the written image was read back and verified
    pub verified: bool,
    /// Wall time reported by the service in milliseconds
    pub time_ms: u64,
    /// Raw output of the flashing tool
    #[serde(default)]
    pub output: String,
}

/// Result of a full chip erase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraseResult {
    pub time_ms: u64,
}

/// A named target variable streamed from the running firmware
///
/// The variable exclusively owns its sample buffer; the buffer is dropped
/// when the variable is removed or the session ends.
#[derive(Debug, Clone)]
pub struct WatchedVariable {
    /// Unique key within a session
    pub name: String,
    /// Display color as `#rrggbb`
    pub color: String,
    /// Most recent value received from the target
    pub current_value: Option<f64>,
    buffer: SampleRingBuffer,
}

impl WatchedVariable {
    /// Create a variable with an empty buffer of the given capacity
    pub fn new(name: impl Into<String>, color: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            current_value: None,
            buffer: SampleRingBuffer::new(capacity),
        }
    }

    /// Sample buffer of this variable
    pub fn buffer(&self) -> &SampleRingBuffer {
        &self.buffer
    }

    /// Append a batch of samples in arrival order
    ///
    /// Returns the number of samples stored. `current_value` follows the
    /// last sample the buffer accepted; rejected samples leave it alone.
    pub fn ingest(&mut self, samples: &[Sample]) -> usize {
        let mut stored = 0;
        for sample in samples {
            if self.buffer.push(*sample) {
                self.current_value = Some(sample.value);
                stored += 1;
            }
        }
        stored
    }

    /// Drop all samples and the current value
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.current_value = None;
    }

    /// Change the buffer capacity, keeping the newest samples that fit
    pub fn resize(&mut self, capacity: usize) {
        self.buffer.resize(capacity);
    }
}

/// Generate a distinct `#rrggbb` color for the n-th variable
///
/// Uses the golden ratio to spread hues evenly across the color wheel, with
/// medium saturation and brightness so colors read on light and dark themes.
pub fn generate_color(index: u32) -> String {
    const GOLDEN_RATIO: f32 = 0.618_034;

    let hue = ((index as f32 * GOLDEN_RATIO) % 1.0) * 360.0;
    let (r, g, b) = hsv_to_rgb(hue, 0.7, 0.85);
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// Convert HSV (hue 0-360, saturation 0-1, value 0-1) to RGB (u8, u8, u8)
fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> (u8, u8, u8) {
    let c = value * saturation;
    let x = c * (1.0 - ((hue / 60.0) % 2.0 - 1.0).abs());
    let m = value - c;

    let (r, g, b) = match (hue / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}
