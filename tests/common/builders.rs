//! Test data builders for probe service responses

use probescope::backend::api::{CompileResponse, ConnectResponse, FlashResponse};
use probescope::types::MemoryUsage;
use serde_json::{json, Value};

/// Builder for connect responses
pub struct ConnectResponseBuilder {
    response: ConnectResponse,
}

impl ConnectResponseBuilder {
    pub fn new(session_id: &str) -> Self {
        Self {
            response: ConnectResponse {
                session_id: session_id.to_string(),
                chip_info: None,
                transport: None,
                speed: None,
                serial_number: None,
                firmware: None,
                target_voltage: None,
            },
        }
    }

    pub fn chip_info(mut self, chip_info: &str) -> Self {
        self.response.chip_info = Some(chip_info.to_string());
        self
    }

    pub fn speed_khz(mut self, khz: u32) -> Self {
        self.response.speed = Some(json!(khz));
        self
    }

    pub fn build(self) -> ConnectResponse {
        self.response
    }
}

/// Builder for compile responses
pub struct CompileResponseBuilder {
    response: CompileResponse,
}

impl CompileResponseBuilder {
    pub fn new() -> Self {
        Self {
            response: CompileResponse::default(),
        }
    }

    pub fn output_file(mut self, file: &str) -> Self {
        self.response.output_files.push(file.to_string());
        self
    }

    pub fn log_line(mut self, line: &str) -> Self {
        self.response.compile_output.push_str(line);
        self.response.compile_output.push('\n');
        self
    }

    pub fn memory(mut self, flash_used: u64, flash_total: u64, ram_used: u64, ram_total: u64) -> Self {
        self.response.memory_usage = Some(MemoryUsage {
            flash_used,
            flash_total,
            ram_used,
            ram_total,
        });
        self
    }

    pub fn build(self) -> CompileResponse {
        self.response
    }
}

impl Default for CompileResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A flash response echoing the written file
pub fn flash_response(file: &str, address: u64, verified: bool) -> FlashResponse {
    FlashResponse {
        file: file.to_string(),
        address,
        size: 4096,
        verified,
        flash_output: String::new(),
        time_ms: 850,
    }
}

/// Payload of a `variable.sample` frame for one variable
pub fn sample_payload(variable: &str, points: &[(f64, f64)]) -> Value {
    let samples: Vec<Value> = points
        .iter()
        .map(|(t, v)| json!({ "timestamp": t, "value": v }))
        .collect();
    json!({ "samples": [{ "variable": variable, "samples": samples }] })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_builder() {
        let response = CompileResponseBuilder::new()
            .output_file("P.hex")
            .log_line("main.c:1:1: warning: unused")
            .build();
        assert_eq!(response.output_files, vec!["P.hex"]);
        assert!(response.compile_output.ends_with('\n'));
    }
}
