//! Orchestrator facade
//!
//! [`Orchestrator`] is the single entry point for UI collaborators. It
//! composes the session controller, the lazily opened telemetry channel,
//! the waveform engine and the event bus:
//!
//! ```text
//! connect/build/flash/erase ──▶ SessionController ──▶ ProbeService (REST)
//!                                      │ session_id
//!                                      ▼
//! start_watch/set/info ──────▶ TelemetryChannel ◀──▶ socket
//!                                      │ samples
//!                                      ▼
//!                               WaveformEngine ──▶ EventBus ──▶ renderers
//! ```
//!
//! Telemetry sends are refused with [`ConsoleError::NoSession`] before the
//! socket is touched unless a device session is connected. Inbound frames
//! are handled one at a time by [`Orchestrator::process_next_message`].

use crate::backend::{HttpProbeService, ProbeService};
use crate::config::{BuildOptions, ConnectOptions, ConsoleConfig, FlashOptions};
use crate::error::{ConsoleError, Result};
use crate::events::{ConsoleEvent, EventBus, EventReceiver};
use crate::session::{SessionController, SessionSnapshot};
use crate::telemetry::channel::{Received, TelemetryChannel, WatchPhase};
use crate::telemetry::protocol::{WatchConfig, WaveformConfigPayload};
use crate::telemetry::ring_buffer::Sample;
use crate::telemetry::transport::{TelemetryConnector, WebSocketConnector};
use crate::types::{
    BuildArtifact, ConnectionState, DeviceSession, EraseResult, FlashResult, Transport,
    WatchedVariable,
};
use crate::waveform::{export, TimeWindow, WaveformEngine};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Facade over the device session, telemetry channel and waveform engine
pub struct Orchestrator {
    config: ConsoleConfig,
    session: SessionController,
    connector: Arc<dyn TelemetryConnector>,
    channel: Mutex<Option<Arc<TelemetryChannel>>>,
    /// Serializes lazy socket opening
    opening: tokio::sync::Mutex<()>,
    engine: Mutex<WaveformEngine>,
    events: EventBus,
}

impl Orchestrator {
    pub fn new(
        config: ConsoleConfig,
        service: Arc<dyn ProbeService>,
        connector: Arc<dyn TelemetryConnector>,
    ) -> Self {
        let events = EventBus::new(config.telemetry.subscriber_queue);
        Self {
            session: SessionController::new(service, &config, events.clone()),
            engine: Mutex::new(WaveformEngine::from_config(&config)),
            connector,
            channel: Mutex::new(None),
            opening: tokio::sync::Mutex::new(()),
            events,
            config,
        }
    }

    /// Build an orchestrator talking to the configured HTTP service and WebSocket
    pub fn from_config(config: ConsoleConfig) -> Result<Self> {
        config.validate()?;
        let service = HttpProbeService::new(&config.service)?;
        let connector = WebSocketConnector::new(&config.telemetry);
        Ok(Self::new(config, Arc::new(service), Arc::new(connector)))
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    /// Register a UI subscriber
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn engine(&self) -> MutexGuard<'_, WaveformEngine> {
        self.engine.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn channel_slot(&self) -> MutexGuard<'_, Option<Arc<TelemetryChannel>>> {
        self.channel.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_channel(&self) -> Option<Arc<TelemetryChannel>> {
        self.channel_slot().clone()
    }

    fn require_session(&self) -> Result<String> {
        self.session.session_id().ok_or(ConsoleError::NoSession)
    }

    /// The open channel for the connected session
    fn require_channel(&self) -> Result<Arc<TelemetryChannel>> {
        let session_id = self.require_session()?;
        match self.current_channel() {
            Some(channel) if channel.session_id() == session_id && !channel.is_closed() => {
                Ok(channel)
            }
            _ => Err(ConsoleError::Precondition(
                "telemetry channel is not open; start watching first".to_string(),
            )),
        }
    }

    /// Open the socket for `session_id` unless it is already open
    async fn ensure_channel(&self, session_id: &str) -> Result<Arc<TelemetryChannel>> {
        let _opening = self.opening.lock().await;
        if let Some(channel) = self.current_channel() {
            if channel.session_id() == session_id && !channel.is_closed() {
                return Ok(channel);
            }
        }

        debug!("Opening telemetry socket for session {}", session_id);
        let transport = self.connector.open(session_id).await?;
        // The session may have ended while the socket was opening
        if self.session.session_id().as_deref() != Some(session_id) {
            transport.close().await;
            return Err(ConsoleError::NoSession);
        }

        let channel = Arc::new(TelemetryChannel::new(session_id, transport));
        *self.channel_slot() = Some(channel.clone());
        Ok(channel)
    }

    // ==================== Session ====================

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn session(&self) -> Option<DeviceSession> {
        self.session.session()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Connect to the probe; returns the current session if already connected
    pub async fn connect(&self, chip_family: &str, transport: Transport) -> Result<DeviceSession> {
        self.session
            .connect(&ConnectOptions::new(chip_family, transport))
            .await
    }

    /// End the session, close the telemetry socket and drop all variables
    ///
    /// Idempotent and infallible: local state is reset even if the remote
    /// teardown fails.
    pub async fn disconnect(&self) {
        let channel = self.channel_slot().take();
        self.session.disconnect().await;

        if let Some(channel) = channel {
            let was_watching = channel.phase() != WatchPhase::Inactive;
            channel.close().await;
            if was_watching {
                self.events.publish(ConsoleEvent::WatchStopped);
            }
            self.events
                .publish(ConsoleEvent::TelemetryClosed { reason: None });
        }
        self.engine().clear();
    }

    /// Build with the configured defaults
    pub async fn build(&self, project_id: &str) -> Result<BuildArtifact> {
        let options = BuildOptions::from(&self.config.build);
        self.session.build(project_id, &options).await
    }

    pub async fn build_with(&self, project_id: &str, options: &BuildOptions) -> Result<BuildArtifact> {
        self.session.build(project_id, options).await
    }

    /// Flash the latest build with the configured defaults
    pub async fn flash(&self) -> Result<FlashResult> {
        let options = FlashOptions::from(&self.config.flash);
        self.session.flash_latest(&options).await
    }

    /// Flash a specific artifact with the configured defaults
    pub async fn flash_artifact(&self, artifact: &BuildArtifact) -> Result<FlashResult> {
        let options = FlashOptions::from(&self.config.flash);
        self.session.flash(artifact, &options).await
    }

    pub async fn flash_with(&self, options: &FlashOptions) -> Result<FlashResult> {
        self.session.flash_latest(options).await
    }

    /// Erase the whole chip; confirmation is the caller's job
    pub async fn erase(&self) -> Result<EraseResult> {
        self.session.erase().await
    }

    // ==================== Variables ====================

    /// Add a variable to watch; returns its display color
    pub fn add_variable(&self, name: &str) -> Result<String> {
        let color = self.engine().add_variable(name)?.color.clone();
        debug!("Added variable {} ({})", name, color);
        Ok(color)
    }

    /// Remove a variable and its samples; it must not be streaming
    pub fn remove_variable(&self, name: &str) -> Result<()> {
        if self
            .current_channel()
            .is_some_and(|channel| channel.is_streaming(name))
        {
            return Err(ConsoleError::Precondition(format!(
                "stop watching before removing '{}'",
                name
            )));
        }
        self.engine()
            .remove_variable(name)
            .map(|_| ())
            .ok_or_else(|| ConsoleError::Precondition(format!("unknown variable '{}'", name)))
    }

    /// Snapshot of a variable, samples included
    pub fn variable(&self, name: &str) -> Option<WatchedVariable> {
        self.engine().variable(name).cloned()
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.engine().variable_names()
    }

    /// Run `f` with read access to the engine (for renderers)
    pub fn with_engine<R>(&self, f: impl FnOnce(&WaveformEngine) -> R) -> R {
        let engine = self.engine();
        f(&engine)
    }

    /// Visible, decimated samples of a variable
    pub fn visible_points(&self, name: &str) -> Option<Vec<Sample>> {
        self.engine().visible_points(name)
    }

    // ==================== Telemetry ====================

    pub fn watch_phase(&self) -> WatchPhase {
        self.current_channel()
            .map(|channel| channel.phase())
            .unwrap_or_default()
    }

    /// Ask the service to stream every added variable
    ///
    /// Opens the telemetry socket on first use.
    pub async fn start_watch(&self) -> Result<()> {
        let session_id = self.require_session()?;
        let config = {
            let engine = self.engine();
            if engine.is_empty() {
                return Err(ConsoleError::Precondition(
                    "add at least one variable before watching".to_string(),
                ));
            }
            WatchConfig {
                variables: engine.variable_names(),
                sample_rate: self.config.telemetry.sample_rate_ms,
                buffer_size: engine.buffer_size(),
                auto_scroll: engine.viewport().auto_scroll,
            }
        };

        let channel = self.ensure_channel(&session_id).await?;
        let variables = config.variables.clone();
        channel.watch(config).await?;
        info!("Watch requested for {}", variables.join(", "));
        self.events
            .publish(ConsoleEvent::WatchRequested { variables });
        Ok(())
    }

    /// Stop streaming; local state is inactive even if the send fails
    pub async fn stop_watch(&self) -> Result<()> {
        self.require_session()?;
        let channel = self
            .current_channel()
            .ok_or_else(|| ConsoleError::Precondition("no active watch".to_string()))?;
        let was_watching = channel.phase() != WatchPhase::Inactive;
        let result = channel.stop_watch().await;
        if was_watching {
            info!("Watch stopped");
            self.events.publish(ConsoleEvent::WatchStopped);
        }
        result
    }

    /// Write a value to a target variable
    pub async fn set_variable(&self, name: &str, value: f64) -> Result<()> {
        self.require_channel()?.set_variable(name, value).await
    }

    /// Ask the service for information about a variable
    pub async fn request_variable_info(&self, name: &str) -> Result<()> {
        self.require_channel()?.request_info(name).await
    }

    /// The `waveform.config` payload for the current viewport and variables
    pub fn waveform_config(&self) -> Result<WaveformConfigPayload> {
        let session_id = self.require_session()?;
        let engine = self.engine();
        let viewport = engine.viewport();
        Ok(WaveformConfigPayload {
            session_id,
            variables: engine.variable_names(),
            time_range: viewport.time_range_ms,
            vertical_range: viewport.vertical_range,
            vertical_offset: viewport.vertical_offset,
            auto_scale: viewport.auto_scale,
            colors: engine.colors(),
        })
    }

    /// Mirror the viewport settings to the service
    pub async fn configure_waveform(&self) -> Result<()> {
        let channel = self.require_channel()?;
        let payload = self.waveform_config()?;
        channel.send_waveform_config(payload).await
    }

    /// Wait for and handle the next telemetry frame
    ///
    /// Returns `None` when no socket is open. The frame is fully applied
    /// (buffers updated, window recomputed, events published) before this
    /// returns.
    pub async fn process_next_message(&self) -> Option<Received> {
        let channel = self.current_channel()?;
        let received = channel.recv().await;
        self.apply(&channel, &received);
        Some(received)
    }

    /// Handle frames until the socket closes or is closed by disconnect
    pub async fn run_telemetry(&self) {
        while let Some(received) = self.process_next_message().await {
            if matches!(received, Received::Closed(_)) {
                break;
            }
        }
    }

    fn apply(&self, channel: &Arc<TelemetryChannel>, received: &Received) {
        match received {
            Received::Samples(batches) => {
                let outcome = self.engine().ingest(
                    batches
                        .iter()
                        .map(|b| (b.variable.as_str(), b.samples.as_slice())),
                );
                if !outcome.variables.is_empty() {
                    self.events.publish(ConsoleEvent::SamplesIngested {
                        variables: outcome.variables,
                        window: outcome.window,
                    });
                }
            }
            Received::WatchStarted(variables) => {
                info!("Watch active for {}", variables.join(", "));
                self.events.publish(ConsoleEvent::WatchStarted {
                    variables: variables.clone(),
                });
            }
            Received::WatchRejected(message) => {
                warn!("Watch rejected: {}", message);
                self.events
                    .publish(ConsoleEvent::TelemetryError(message.clone()));
                self.events.publish(ConsoleEvent::WatchStopped);
            }
            Received::WatchStopped => debug!("Stop watch acknowledged"),
            Received::VariableInfo { variable, info } => {
                self.events.publish(ConsoleEvent::VariableInfo {
                    variable: variable.clone(),
                    info: info.clone(),
                });
            }
            Received::VariableSet { variable, value } => {
                self.events.publish(ConsoleEvent::VariableSet {
                    variable: variable.clone(),
                    value: *value,
                });
            }
            Received::ServiceError(message) => {
                self.events
                    .publish(ConsoleEvent::TelemetryError(message.clone()));
            }
            Received::Ignored(_) | Received::Malformed(_) => {}
            Received::Closed(reason) => {
                let mut slot = self.channel_slot();
                // Only report the close of the channel that is still current
                if slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, channel)) {
                    slot.take();
                    drop(slot);
                    info!(
                        "Telemetry socket closed{}",
                        reason
                            .as_deref()
                            .map(|r| format!(": {}", r))
                            .unwrap_or_default()
                    );
                    self.events.publish(ConsoleEvent::TelemetryClosed {
                        reason: reason.clone(),
                    });
                }
            }
        }
    }

    // ==================== Viewport ====================

    fn publish_window(&self, window: TimeWindow) -> TimeWindow {
        self.events.publish(ConsoleEvent::ViewportChanged(window));
        window
    }

    /// Change the visible time span
    pub fn set_time_range(&self, range_ms: f64) -> Result<TimeWindow> {
        let window = self.engine().viewport_mut().set_time_range(range_ms)?;
        Ok(self.publish_window(window))
    }

    /// Show a fixed window; turns auto-scroll off
    pub fn set_window(&self, start_ms: f64, end_ms: f64) -> Result<TimeWindow> {
        let window = self.engine().viewport_mut().set_window(start_ms, end_ms)?;
        Ok(self.publish_window(window))
    }

    /// Turn auto-scroll on or off; turning it on jumps to the newest sample
    pub fn set_auto_scroll(&self, enabled: bool) -> TimeWindow {
        let window = {
            let mut engine = self.engine();
            engine.viewport_mut().auto_scroll = enabled;
            engine.refresh_view()
        };
        self.publish_window(window)
    }

    /// Set the vertical mapping explicitly; turns auto-scale off
    pub fn set_vertical(&self, range: f64, offset: f64) -> Result<()> {
        let window = {
            let mut engine = self.engine();
            engine.viewport_mut().set_vertical(range, offset)?;
            engine.viewport().window()
        };
        self.publish_window(window);
        Ok(())
    }

    pub fn set_auto_scale(&self, enabled: bool) {
        let window = {
            let mut engine = self.engine();
            engine.viewport_mut().auto_scale = enabled;
            engine.refresh_view()
        };
        self.publish_window(window);
    }

    pub fn window(&self) -> TimeWindow {
        self.engine().viewport().window()
    }

    // ==================== Export ====================

    /// CSV of every sample currently in memory
    pub fn export_csv(&self) -> String {
        export::export_csv(self.engine().variables())
    }

    /// Write the CSV export into `dir`; returns the file path
    pub fn write_csv(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let variables = self.engine().variables().to_vec();
        export::write_csv(&variables, dir, chrono::Utc::now())
    }

    // ==================== Teardown ====================

    /// Stop watching (best effort) and disconnect
    pub async fn shutdown(&self) {
        if self.watch_phase() != WatchPhase::Inactive {
            if let Err(e) = self.stop_watch().await {
                debug!("Stop watch during shutdown failed: {}", e);
            }
        }
        self.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::api::ConnectResponse;
    use crate::backend::MockProbeService;
    use crate::telemetry::transport::LoopbackConnector;
    use serde_json::json;

    fn orchestrator(mock: MockProbeService) -> (Orchestrator, LoopbackConnector) {
        let connector = LoopbackConnector::new();
        let orchestrator = Orchestrator::new(
            ConsoleConfig::default(),
            Arc::new(mock),
            Arc::new(connector.clone()),
        );
        (orchestrator, connector)
    }

    fn connected_mock() -> MockProbeService {
        let mut mock = MockProbeService::new();
        mock.expect_connect().returning(|_| {
            Ok(ConnectResponse {
                session_id: "sess-1".to_string(),
                chip_info: None,
                transport: None,
                speed: None,
                serial_number: None,
                firmware: None,
                target_voltage: None,
            })
        });
        mock.expect_disconnect().returning(|| Ok(()));
        mock
    }

    #[tokio::test]
    async fn test_telemetry_requires_session() {
        let (orchestrator, connector) = orchestrator(MockProbeService::new());
        orchestrator.add_variable("V1").unwrap();

        assert!(matches!(
            orchestrator.start_watch().await,
            Err(ConsoleError::NoSession)
        ));
        assert!(matches!(
            orchestrator.set_variable("V1", 1.0).await,
            Err(ConsoleError::NoSession)
        ));
        assert!(matches!(
            orchestrator.stop_watch().await,
            Err(ConsoleError::NoSession)
        ));
        assert!(connector.opened_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_socket_opens_lazily_once() {
        let (orchestrator, connector) = orchestrator(connected_mock());
        orchestrator.connect("stm32f1", Transport::Swd).await.unwrap();
        assert!(connector.opened_sessions().is_empty());

        orchestrator.add_variable("V1").unwrap();
        orchestrator.start_watch().await.unwrap();
        orchestrator.stop_watch().await.unwrap();
        orchestrator.start_watch().await.unwrap();
        assert_eq!(connector.opened_sessions(), vec!["sess-1".to_string()]);
    }

    #[tokio::test]
    async fn test_set_before_watch_is_precondition() {
        let (orchestrator, _connector) = orchestrator(connected_mock());
        orchestrator.connect("stm32f1", Transport::Swd).await.unwrap();
        assert!(matches!(
            orchestrator.set_variable("gain", 1.0).await,
            Err(ConsoleError::Precondition(_))
        ));
        assert!(matches!(
            orchestrator.start_watch().await,
            Err(ConsoleError::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_streaming_variable_is_refused() {
        let (orchestrator, _connector) = orchestrator(connected_mock());
        orchestrator.connect("stm32f1", Transport::Swd).await.unwrap();
        orchestrator.add_variable("V1").unwrap();
        orchestrator.add_variable("V2").unwrap();
        orchestrator.start_watch().await.unwrap();

        assert!(orchestrator.remove_variable("V1").is_err());
        orchestrator.stop_watch().await.unwrap();
        orchestrator.remove_variable("V1").unwrap();
        assert_eq!(orchestrator.variable_names(), vec!["V2"]);
    }

    #[tokio::test]
    async fn test_waveform_config_payload() {
        let (orchestrator, connector) = orchestrator(connected_mock());
        orchestrator.connect("stm32f1", Transport::Swd).await.unwrap();
        let color = orchestrator.add_variable("V1").unwrap();
        orchestrator.start_watch().await.unwrap();
        orchestrator.set_time_range(2000.0).unwrap();
        orchestrator.configure_waveform().await.unwrap();

        let peer = connector.last_peer().unwrap();
        let sent = peer.take_sent();
        let frame: serde_json::Value = serde_json::from_str(sent.last().unwrap()).unwrap();
        assert_eq!(frame["type"], "waveform.config");
        assert_eq!(frame["payload"]["session_id"], "sess-1");
        assert_eq!(frame["payload"]["time_range"], 2000.0);
        assert_eq!(frame["payload"]["colors"], json!([color]));
    }

    #[tokio::test]
    async fn test_disconnect_closes_socket_and_clears_variables() {
        let (orchestrator, connector) = orchestrator(connected_mock());
        let events = orchestrator.subscribe();
        orchestrator.connect("stm32f1", Transport::Swd).await.unwrap();
        orchestrator.add_variable("V1").unwrap();
        orchestrator.start_watch().await.unwrap();

        orchestrator.disconnect().await;
        let peer = connector.last_peer().unwrap();
        assert!(peer.is_closed_by_console());
        assert!(orchestrator.variable_names().is_empty());
        assert_eq!(orchestrator.watch_phase(), WatchPhase::Inactive);
        assert!(orchestrator.process_next_message().await.is_none());

        let events = events.drain();
        assert!(events.contains(&ConsoleEvent::WatchStopped));
        assert!(events.contains(&ConsoleEvent::TelemetryClosed { reason: None }));
    }
}
