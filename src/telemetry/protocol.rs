//! Telemetry wire protocol
//!
//! Every frame is a JSON envelope `{"type": ..., "payload": {...}}`.
//! Outbound messages are built from typed payloads; inbound frames are
//! routed purely by `type` through [`InboundKind`]. Unknown types are not
//! an error, they are ignored by the caller.

use super::ring_buffer::Sample;
use crate::error::{ConsoleError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const VARIABLE_WATCH: &str = "variable.watch";
pub const VARIABLE_STOP_WATCH: &str = "variable.stop_watch";
pub const VARIABLE_SET: &str = "variable.set";
pub const VARIABLE_INFO: &str = "variable.info";
pub const VARIABLE_SAMPLE: &str = "variable.sample";
pub const WAVEFORM_CONFIG: &str = "waveform.config";
pub const ERROR: &str = "error";

/// Tagged JSON frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

// ==================== Outbound ====================

/// Stream settings sent with a watch request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    pub variables: Vec<String>,
    /// Sample interval in milliseconds
    pub sample_rate: u64,
    pub buffer_size: usize,
    pub auto_scroll: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchPayload {
    pub session_id: String,
    pub config: WatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPayload {
    pub session_id: String,
    pub variable: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoRequestPayload {
    pub session_id: String,
    pub variable: String,
}

/// Viewport settings mirrored to the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformConfigPayload {
    pub session_id: String,
    pub variables: Vec<String>,
    /// Visible time span in milliseconds
    pub time_range: f64,
    pub vertical_range: f64,
    pub vertical_offset: f64,
    pub auto_scale: bool,
    /// `#rrggbb`, one per variable
    pub colors: Vec<String>,
}

/// A message the console sends over the telemetry socket
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Watch(WatchPayload),
    StopWatch(SessionPayload),
    Set(SetPayload),
    Info(InfoRequestPayload),
    WaveformConfig(WaveformConfigPayload),
}

impl Outbound {
    pub fn message_type(&self) -> &'static str {
        match self {
            Outbound::Watch(_) => VARIABLE_WATCH,
            Outbound::StopWatch(_) => VARIABLE_STOP_WATCH,
            Outbound::Set(_) => VARIABLE_SET,
            Outbound::Info(_) => VARIABLE_INFO,
            Outbound::WaveformConfig(_) => WAVEFORM_CONFIG,
        }
    }

    /// Wrap in an envelope and serialize
    pub fn encode(&self) -> Result<String> {
        let payload = match self {
            Outbound::Watch(p) => serde_json::to_value(p)?,
            Outbound::StopWatch(p) => serde_json::to_value(p)?,
            Outbound::Set(p) => serde_json::to_value(p)?,
            Outbound::Info(p) => serde_json::to_value(p)?,
            Outbound::WaveformConfig(p) => serde_json::to_value(p)?,
        };
        let envelope = Envelope {
            kind: self.message_type().to_string(),
            payload,
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

// ==================== Inbound ====================

/// Samples for one variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSamples {
    pub variable: String,
    #[serde(default)]
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePayload {
    #[serde(default)]
    pub samples: Vec<VariableSamples>,
}

/// Watch settings echoed in an acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EchoedConfig {
    #[serde(default)]
    pub variables: Vec<String>,
}

/// Acknowledgement of a watch or stop-watch request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AckPayload {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub config: Option<EchoedConfig>,
    /// Absent means success
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AckPayload {
    pub fn is_success(&self) -> bool {
        self.success.unwrap_or(true)
    }

    /// Echoed variable names, from either the top level or the echoed config
    pub fn echoed_variables(&self) -> &[String] {
        match &self.config {
            Some(config) if self.variables.is_empty() => &config.variables,
            _ => &self.variables,
        }
    }
}

/// Answer to a variable info request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoPayload {
    pub variable: String,
    /// Everything else the service reports (type, address, size, ...)
    #[serde(flatten)]
    pub details: serde_json::Map<String, Value>,
}

/// Acknowledgement of a variable write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetAckPayload {
    pub variable: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: String,
}

/// Every inbound message type the console understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    Sample,
    WatchAck,
    StopWatchAck,
    Info,
    SetAck,
    Error,
}

impl InboundKind {
    pub const ALL: [InboundKind; 6] = [
        InboundKind::Sample,
        InboundKind::WatchAck,
        InboundKind::StopWatchAck,
        InboundKind::Info,
        InboundKind::SetAck,
        InboundKind::Error,
    ];

    /// Look up a wire type; `None` for types the console does not handle
    pub fn from_type(kind: &str) -> Option<Self> {
        match kind {
            VARIABLE_SAMPLE => Some(InboundKind::Sample),
            VARIABLE_WATCH => Some(InboundKind::WatchAck),
            VARIABLE_STOP_WATCH => Some(InboundKind::StopWatchAck),
            VARIABLE_INFO => Some(InboundKind::Info),
            VARIABLE_SET => Some(InboundKind::SetAck),
            ERROR => Some(InboundKind::Error),
            _ => None,
        }
    }

    pub fn as_type(&self) -> &'static str {
        match self {
            InboundKind::Sample => VARIABLE_SAMPLE,
            InboundKind::WatchAck => VARIABLE_WATCH,
            InboundKind::StopWatchAck => VARIABLE_STOP_WATCH,
            InboundKind::Info => VARIABLE_INFO,
            InboundKind::SetAck => VARIABLE_SET,
            InboundKind::Error => ERROR,
        }
    }
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Samples(SamplePayload),
    WatchAck(AckPayload),
    StopWatchAck(AckPayload),
    Info(InfoPayload),
    SetAck(SetAckPayload),
    Error(ErrorPayload),
}

impl Inbound {
    pub fn kind(&self) -> InboundKind {
        match self {
            Inbound::Samples(_) => InboundKind::Sample,
            Inbound::WatchAck(_) => InboundKind::WatchAck,
            Inbound::StopWatchAck(_) => InboundKind::StopWatchAck,
            Inbound::Info(_) => InboundKind::Info,
            Inbound::SetAck(_) => InboundKind::SetAck,
            Inbound::Error(_) => InboundKind::Error,
        }
    }
}

/// Result of decoding one frame
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Message(Inbound),
    /// Well-formed envelope with a type the console does not handle
    Unknown(String),
}

/// Decode one text frame
///
/// Malformed JSON, a missing `type`, or a payload that does not match its
/// type is a [`ConsoleError::Protocol`].
pub fn decode(text: &str) -> Result<Decoded> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| ConsoleError::Protocol(format!("invalid envelope: {}", e)))?;

    let Some(kind) = InboundKind::from_type(&envelope.kind) else {
        return Ok(Decoded::Unknown(envelope.kind));
    };

    let payload = envelope.payload;
    let message = match kind {
        InboundKind::Sample => Inbound::Samples(payload_as(kind, payload)?),
        InboundKind::WatchAck => Inbound::WatchAck(payload_as(kind, payload)?),
        InboundKind::StopWatchAck => Inbound::StopWatchAck(payload_as(kind, payload)?),
        InboundKind::Info => Inbound::Info(payload_as(kind, payload)?),
        InboundKind::SetAck => Inbound::SetAck(payload_as(kind, payload)?),
        InboundKind::Error => Inbound::Error(payload_as(kind, payload)?),
    };
    Ok(Decoded::Message(message))
}

fn payload_as<T: serde::de::DeserializeOwned>(kind: InboundKind, payload: Value) -> Result<T> {
    // Acks may arrive without a payload at all
    let payload = if payload.is_null() {
        Value::Object(Default::default())
    } else {
        payload
    };
    serde_json::from_value(payload)
        .map_err(|e| ConsoleError::Protocol(format!("invalid {} payload: {}", kind.as_type(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_watch() {
        let message = Outbound::Watch(WatchPayload {
            session_id: "sess-1".to_string(),
            config: WatchConfig {
                variables: vec!["V1".to_string()],
                sample_rate: 10,
                buffer_size: 3,
                auto_scroll: true,
            },
        });
        let value: Value = serde_json::from_str(&message.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "variable.watch",
                "payload": {
                    "session_id": "sess-1",
                    "config": {
                        "variables": ["V1"],
                        "sample_rate": 10,
                        "buffer_size": 3,
                        "auto_scroll": true
                    }
                }
            })
        );
    }

    #[test]
    fn test_encode_waveform_config() {
        let message = Outbound::WaveformConfig(WaveformConfigPayload {
            session_id: "sess-1".to_string(),
            variables: vec!["V1".to_string()],
            time_range: 5000.0,
            vertical_range: 10.0,
            vertical_offset: 0.0,
            auto_scale: false,
            colors: vec!["#d94040".to_string()],
        });
        let value: Value = serde_json::from_str(&message.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "waveform.config");
        assert_eq!(value["payload"]["time_range"], 5000.0);
        assert_eq!(value["payload"]["colors"][0], "#d94040");
    }

    #[test]
    fn test_decode_samples() {
        let text = r#"{"type":"variable.sample","payload":{"samples":[
            {"variable":"V1","samples":[{"timestamp":0,"value":1.5},{"timestamp":10,"value":2}]}
        ]}}"#;
        match decode(text).unwrap() {
            Decoded::Message(Inbound::Samples(payload)) => {
                assert_eq!(payload.samples.len(), 1);
                assert_eq!(payload.samples[0].variable, "V1");
                assert_eq!(
                    payload.samples[0].samples,
                    vec![Sample::new(0.0, 1.5), Sample::new(10.0, 2.0)]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_ack_shapes() {
        let echoed = r#"{"type":"variable.watch","payload":{"session_id":"s","config":{"variables":["A","B"]}}}"#;
        let Decoded::Message(Inbound::WatchAck(ack)) = decode(echoed).unwrap() else {
            panic!("expected watch ack");
        };
        assert!(ack.is_success());
        assert_eq!(ack.echoed_variables(), ["A".to_string(), "B".to_string()]);

        let bare = r#"{"type":"variable.stop_watch"}"#;
        assert!(matches!(
            decode(bare).unwrap(),
            Decoded::Message(Inbound::StopWatchAck(_))
        ));
    }

    #[test]
    fn test_decode_info_keeps_details() {
        let text = r#"{"type":"variable.info","payload":{"variable":"V1","type":"float","address":536870912}}"#;
        let Decoded::Message(Inbound::Info(info)) = decode(text).unwrap() else {
            panic!("expected info");
        };
        assert_eq!(info.variable, "V1");
        assert_eq!(info.details["type"], "float");
    }

    #[test]
    fn test_decode_unknown_type() {
        assert_eq!(
            decode(r#"{"type":"debug.breakpoint","payload":{}}"#).unwrap(),
            Decoded::Unknown("debug.breakpoint".to_string())
        );
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode("not json"), Err(ConsoleError::Protocol(_))));
        assert!(matches!(
            decode(r#"{"payload":{}}"#),
            Err(ConsoleError::Protocol(_))
        ));
        assert!(matches!(
            decode(r#"{"type":"variable.sample","payload":{"samples":"nope"}}"#),
            Err(ConsoleError::Protocol(_))
        ));
    }

    #[test]
    fn test_kind_table_is_consistent() {
        for kind in InboundKind::ALL {
            assert_eq!(InboundKind::from_type(kind.as_type()), Some(kind));
        }
    }
}
