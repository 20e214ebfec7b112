//! Wire types of the remote probe service REST interface
//!
//! Field names follow the service's camelCase JSON. Responses are lenient:
//! optional fields default when absent so older services keep working.

use crate::config::ResetMode;
use crate::types::{MemoryUsage, ProbeDetails, Transport};
use serde::{Deserialize, Deserializer, Serialize};

/// Connect probe request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub chip_family: String,
    pub transport: Transport,
}

/// Connect probe response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub session_id: String,
    #[serde(default)]
    pub chip_info: Option<String>,
    #[serde(default)]
    pub transport: Option<Transport>,
    /// Interface speed; some services report a number (kHz), others a label
    #[serde(default)]
    pub speed: Option<serde_json::Value>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub firmware: Option<String>,
    #[serde(default)]
    pub target_voltage: Option<f64>,
}

impl ConnectResponse {
    /// Probe details for the device session
    pub fn probe_details(&self) -> ProbeDetails {
        let speed = self.speed.as_ref().map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => format!("{} kHz", n),
            other => other.to_string(),
        });
        ProbeDetails {
            chip_info: self.chip_info.clone(),
            speed,
            serial_number: self.serial_number.clone(),
            firmware: self.firmware.clone(),
            target_voltage: self.target_voltage,
        }
    }
}

/// Compile project request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub project_id: String,
    pub debug: bool,
    pub optimization_level: String,
    pub defines: Vec<String>,
}

/// Compile project response
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResponse {
    #[serde(default)]
    pub compile_output: String,
    #[serde(default)]
    pub output_files: Vec<String>,
    #[serde(default)]
    pub memory_usage: Option<MemoryUsage>,
}

/// Probe-side settings of a flash request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashTargetSettings {
    pub transport: Transport,
    pub target_config: Option<String>,
    pub reset_mode: ResetMode,
}

/// Flash firmware request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashRequest {
    pub file_path: String,
    pub address: u64,
    pub verify: bool,
    pub reset: bool,
    pub chip_family: String,
    pub erase_all: bool,
    pub config: FlashTargetSettings,
}

/// Flash firmware response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashResponse {
    pub file: String,
    #[serde(deserialize_with = "deserialize_address")]
    pub address: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub flash_output: String,
    #[serde(default)]
    pub time_ms: u64,
}

/// Erase chip request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EraseRequest {
    pub chip_family: String,
    pub transport: Transport,
}

/// Erase chip response
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EraseResponse {
    #[serde(default)]
    pub time_ms: u64,
}

/// Error body returned with a non-success status
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    /// Partial compiler output of a failed build
    #[serde(default)]
    pub compile_output: Option<String>,
}

impl ErrorBody {
    /// Most specific human-readable message in the body
    pub fn text(&self) -> Option<&str> {
        self.detail
            .as_deref()
            .or(self.message.as_deref())
            .or(self.error.as_deref())
    }
}

/// Accept an address as a JSON number or a `0x`-prefixed hex string
fn deserialize_address<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Address {
        Number(u64),
        Text(String),
    }

    match Address::deserialize(deserializer)? {
        Address::Number(n) => Ok(n),
        Address::Text(s) => {
            let s = s.trim();
            let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse(),
            };
            parsed.map_err(|e| serde::de::Error::custom(format!("invalid address '{}': {}", s, e)))
        }
    }
}
