//! Telemetry channel for one device session
//!
//! Wraps a transport with the watch session state:
//!
//! ```text
//! Inactive ──watch──▶ Requested ──ack──▶ Active
//!     ▲                   │                 │
//!     └──── stop_watch ───┴─────────────────┘
//! ```
//!
//! A watch may only be requested while inactive; stopping is allowed from
//! `Requested` or `Active` and takes effect locally at once. Inbound frames
//! are decoded and dispatched to exactly one handler per [`InboundKind`].
//!
//! [`InboundKind`]: super::protocol::InboundKind

use super::protocol::{
    decode, Decoded, InfoRequestPayload, Inbound, Outbound, SessionPayload, SetPayload,
    VariableSamples, WatchConfig, WatchPayload, WaveformConfigPayload,
};
use super::transport::{TelemetryTransport, TransportEvent};
use crate::error::{ConsoleError, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Progress of the watch request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchPhase {
    #[default]
    Inactive,
    /// Request sent, acknowledgement pending
    Requested,
    Active,
}

/// One processed inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    /// Samples for variables currently streaming; others are already removed
    Samples(Vec<VariableSamples>),
    /// The service acknowledged the watch request
    WatchStarted(Vec<String>),
    /// The service refused the watch request
    WatchRejected(String),
    /// The service acknowledged a stop request
    WatchStopped,
    VariableInfo {
        variable: String,
        info: serde_json::Value,
    },
    VariableSet {
        variable: String,
        value: Option<f64>,
    },
    /// The service reported an error
    ServiceError(String),
    /// A frame that needs no action (unknown type, stale acknowledgement)
    Ignored(String),
    /// A frame that could not be decoded; already logged
    Malformed(String),
    /// The socket is gone
    Closed(Option<String>),
}

#[derive(Debug, Default)]
struct WatchState {
    phase: WatchPhase,
    streaming: Vec<String>,
    closed: bool,
}

/// Telemetry socket bound to one session
pub struct TelemetryChannel {
    session_id: String,
    transport: Arc<dyn TelemetryTransport>,
    state: Mutex<WatchState>,
}

impl TelemetryChannel {
    pub fn new(session_id: impl Into<String>, transport: Arc<dyn TelemetryTransport>) -> Self {
        Self {
            session_id: session_id.into(),
            transport,
            state: Mutex::new(WatchState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WatchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> WatchPhase {
        self.lock().phase
    }

    /// Variables requested in the current watch
    pub fn streaming(&self) -> Vec<String> {
        self.lock().streaming.clone()
    }

    pub fn is_streaming(&self, name: &str) -> bool {
        let state = self.lock();
        state.phase != WatchPhase::Inactive && state.streaming.iter().any(|v| v == name)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    async fn send(&self, message: Outbound) -> Result<()> {
        if self.is_closed() {
            return Err(ConsoleError::Channel("telemetry socket is closed".to_string()));
        }
        let text = message.encode()?;
        debug!("-> {}", message.message_type());
        self.transport.send(text).await
    }

    // ==================== Outbound ====================

    /// Ask the service to start streaming
    pub async fn watch(&self, config: WatchConfig) -> Result<()> {
        if config.variables.is_empty() {
            return Err(ConsoleError::Precondition(
                "no variables to watch".to_string(),
            ));
        }
        {
            let mut state = self.lock();
            if state.closed {
                return Err(ConsoleError::Channel("telemetry socket is closed".to_string()));
            }
            if state.phase != WatchPhase::Inactive {
                return Err(ConsoleError::Precondition(
                    "a watch is already requested or active".to_string(),
                ));
            }
            state.phase = WatchPhase::Requested;
            state.streaming = config.variables.clone();
        }

        let result = self
            .send(Outbound::Watch(WatchPayload {
                session_id: self.session_id.clone(),
                config,
            }))
            .await;
        if result.is_err() {
            let mut state = self.lock();
            state.phase = WatchPhase::Inactive;
            state.streaming.clear();
        }
        result
    }

    /// Stop streaming; local state is inactive even if the send fails
    pub async fn stop_watch(&self) -> Result<()> {
        {
            let mut state = self.lock();
            if state.phase == WatchPhase::Inactive {
                return Err(ConsoleError::Precondition("no active watch".to_string()));
            }
            state.phase = WatchPhase::Inactive;
            state.streaming.clear();
        }
        self.send(Outbound::StopWatch(SessionPayload {
            session_id: self.session_id.clone(),
        }))
        .await
    }

    /// Write a value to a target variable
    pub async fn set_variable(&self, variable: &str, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(ConsoleError::Precondition(format!(
                "cannot write non-finite value {} to '{}'",
                value, variable
            )));
        }
        self.send(Outbound::Set(SetPayload {
            session_id: self.session_id.clone(),
            variable: variable.to_string(),
            value,
        }))
        .await
    }

    /// Ask for type/address information about a variable
    pub async fn request_info(&self, variable: &str) -> Result<()> {
        self.send(Outbound::Info(InfoRequestPayload {
            session_id: self.session_id.clone(),
            variable: variable.to_string(),
        }))
        .await
    }

    /// Mirror the viewport settings to the service
    pub async fn send_waveform_config(&self, payload: WaveformConfigPayload) -> Result<()> {
        self.send(Outbound::WaveformConfig(payload)).await
    }

    /// Close the socket and forget the watch
    pub async fn close(&self) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.phase = WatchPhase::Inactive;
            state.streaming.clear();
        }
        self.transport.close().await;
    }

    // ==================== Inbound ====================

    /// Wait for the next frame and dispatch it
    pub async fn recv(&self) -> Received {
        if self.is_closed() {
            return Received::Closed(None);
        }
        match self.transport.recv().await {
            Ok(TransportEvent::Text(text)) => self.handle_text(&text),
            Ok(TransportEvent::Closed(reason)) => self.mark_closed(reason),
            Err(e) => self.mark_closed(Some(e.to_string())),
        }
    }

    fn mark_closed(&self, reason: Option<String>) -> Received {
        let mut state = self.lock();
        state.closed = true;
        state.phase = WatchPhase::Inactive;
        state.streaming.clear();
        Received::Closed(reason)
    }

    /// Decode and dispatch one text frame
    pub fn handle_text(&self, text: &str) -> Received {
        match decode(text) {
            Ok(Decoded::Message(message)) => self.dispatch(message),
            Ok(Decoded::Unknown(kind)) => {
                debug!("Ignoring message of unknown type '{}'", kind);
                Received::Ignored(kind)
            }
            Err(e) => {
                warn!("Dropping telemetry frame: {}", e);
                Received::Malformed(e.to_string())
            }
        }
    }

    fn dispatch(&self, message: Inbound) -> Received {
        match message {
            Inbound::Samples(payload) => self.on_samples(payload.samples),
            Inbound::WatchAck(ack) => {
                let mut state = self.lock();
                if state.phase != WatchPhase::Requested {
                    return Received::Ignored("stale variable.watch acknowledgement".to_string());
                }
                if ack.is_success() {
                    state.phase = WatchPhase::Active;
                    Received::WatchStarted(state.streaming.clone())
                } else {
                    state.phase = WatchPhase::Inactive;
                    state.streaming.clear();
                    Received::WatchRejected(
                        ack.message
                            .unwrap_or_else(|| "watch request rejected".to_string()),
                    )
                }
            }
            Inbound::StopWatchAck(_) => Received::WatchStopped,
            Inbound::Info(info) => {
                let variable = info.variable;
                Received::VariableInfo {
                    variable,
                    info: serde_json::Value::Object(info.details),
                }
            }
            Inbound::SetAck(ack) => {
                if ack.success == Some(false) {
                    Received::ServiceError(ack.message.unwrap_or_else(|| {
                        format!("write to '{}' was rejected", ack.variable)
                    }))
                } else {
                    Received::VariableSet {
                        variable: ack.variable,
                        value: ack.value,
                    }
                }
            }
            Inbound::Error(error) => {
                warn!("Telemetry service error: {}", error.message);
                Received::ServiceError(error.message)
            }
        }
    }

    fn on_samples(&self, batches: Vec<VariableSamples>) -> Received {
        let state = self.lock();
        if state.phase == WatchPhase::Inactive {
            return Received::Ignored("samples without an active watch".to_string());
        }
        let streaming: Vec<VariableSamples> = batches
            .into_iter()
            .filter(|b| state.streaming.iter().any(|v| *v == b.variable))
            .collect();
        Received::Samples(streaming)
    }
}
