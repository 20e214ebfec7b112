//! Async driver of the device session state machine
//!
//! [`SessionController`] pairs the pure [`SessionMachine`] with a
//! [`ProbeService`]. Each operation asks the machine for permission, runs
//! the remote call under a bounded timeout and reports the outcome back.
//! The machine lock is a plain `std::sync::Mutex` that is only held for
//! the transition itself, never across an `.await`, so a second operation
//! issued while the first is awaiting the service sees the busy state and
//! fails with a conflict.

use super::state::{ConnectStart, SessionMachine, SessionPhase, SessionSnapshot, Ticket};
use crate::backend::api::{CompileRequest, ConnectRequest, EraseRequest, FlashRequest, FlashTargetSettings};
use crate::backend::{parse_compile_output, ProbeService};
use crate::config::{BuildOptions, ConnectOptions, ConsoleConfig, FlashOptions, TimeoutConfig};
use crate::error::{ConsoleError, OperationKind, Result};
use crate::events::{ConsoleEvent, EventBus};
use crate::types::{BuildArtifact, ConnectionState, DeviceSession, EraseResult, FlashResult};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Drives connect, disconnect, build, flash and erase against the probe service
pub struct SessionController {
    service: Arc<dyn ProbeService>,
    machine: Mutex<SessionMachine>,
    timeouts: TimeoutConfig,
    flash_base: u64,
    events: EventBus,
}

impl SessionController {
    pub fn new(service: Arc<dyn ProbeService>, config: &ConsoleConfig, events: EventBus) -> Self {
        Self {
            service,
            machine: Mutex::new(SessionMachine::new()),
            timeouts: config.service.timeouts.clone(),
            flash_base: config.flash.base_address,
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionMachine> {
        self.machine.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run a transition and publish the new state if it changed
    fn transition<R>(&self, f: impl FnOnce(&mut SessionMachine) -> R) -> R {
        let (result, before, after) = {
            let mut machine = self.lock();
            let before = machine.state();
            let result = f(&mut machine);
            (result, before, machine.state())
        };
        if before != after {
            debug!("Session state {} -> {}", before, after);
            self.events.publish(ConsoleEvent::StateChanged(after));
        }
        result
    }

    /// Run a remote call under the operation's timeout
    async fn call<T>(
        &self,
        operation: OperationKind,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let after = self.timeouts.for_operation(operation);
        match tokio::time::timeout(after, fut).await {
            Ok(result) => result,
            Err(_) => Err(ConsoleError::Timeout { operation, after }),
        }
    }

    fn report_failure(&self, operation: OperationKind, err: &ConsoleError) {
        warn!("{}", err);
        self.lock().record_error(err.to_string());
        self.events.publish(ConsoleEvent::OperationFailed {
            operation,
            message: err.to_string(),
        });
    }

    // ==================== Queries ====================

    pub fn state(&self) -> ConnectionState {
        self.lock().state()
    }

    /// The connected session, if any
    pub fn session(&self) -> Option<DeviceSession> {
        self.lock().session().cloned()
    }

    /// Session id of the connected session, if any
    pub fn session_id(&self) -> Option<String> {
        self.lock().session().map(|s| s.session_id.clone())
    }

    pub fn latest_artifact(&self) -> Option<BuildArtifact> {
        self.lock().latest_artifact().cloned()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    /// Generation of the current session; changes on every connect attempt and disconnect
    pub fn generation(&self) -> u64 {
        self.lock().generation()
    }

    // ==================== Connect / Disconnect ====================

    /// Connect to the probe
    ///
    /// Connecting while already connected returns the current session
    /// without contacting the service.
    pub async fn connect(&self, options: &ConnectOptions) -> Result<DeviceSession> {
        let generation = match self.transition(|m| m.begin_connect())? {
            ConnectStart::AlreadyConnected(session) => {
                debug!("Already connected as {}", session.session_id);
                return Ok(session);
            }
            ConnectStart::Started(generation) => generation,
        };

        info!(
            "Connecting to {} over {}",
            options.chip_family, options.transport
        );
        let request = ConnectRequest {
            chip_family: options.chip_family.clone(),
            transport: options.transport,
        };
        let result = self
            .call(OperationKind::Connect, self.service.connect(&request))
            .await
            .and_then(|response| {
                if response.session_id.trim().is_empty() {
                    return Err(ConsoleError::remote(
                        OperationKind::Connect,
                        crate::error::RemoteFailure::Rejected,
                        "probe service returned an empty session id",
                    ));
                }
                Ok(DeviceSession {
                    session_id: response.session_id.clone(),
                    chip_family: options.chip_family.clone(),
                    transport: response.transport.unwrap_or(options.transport),
                    probe: response.probe_details(),
                })
            });

        match result {
            Ok(session) => {
                if self.transition(|m| m.complete_connect(generation, session.clone())) {
                    info!("Connected, session {}", session.session_id);
                    self.events.publish(ConsoleEvent::Connected(session.clone()));
                    Ok(session)
                } else {
                    // Disconnected while in flight; disconnect() already tore
                    // down the remote side
                    warn!(
                        "Discarding late connect result for session {}",
                        session.session_id
                    );
                    Err(ConsoleError::NoSession.with_context("connect was cancelled by disconnect"))
                }
            }
            Err(err) => {
                if self.transition(|m| m.fail_connect(generation, err.to_string())) {
                    warn!("Connect failed: {}", err);
                    self.events.publish(ConsoleEvent::OperationFailed {
                        operation: OperationKind::Connect,
                        message: err.to_string(),
                    });
                }
                Err(err)
            }
        }
    }

    /// Disconnect from the probe
    ///
    /// Local state is forced to `Disconnected` first, so in-flight
    /// operations are discarded even if the remote teardown never returns.
    /// The remote call is best effort and only made if a session existed or
    /// was being established. Idempotent.
    pub async fn disconnect(&self) {
        let previous = self.transition(|m| m.disconnect());
        let remote = match previous {
            SessionPhase::Disconnected => return,
            SessionPhase::Error { .. } => false,
            SessionPhase::Connecting => true,
            SessionPhase::Connected { ref session, activity } => {
                info!(
                    "Disconnecting session {} ({})",
                    session.session_id,
                    activity.label()
                );
                true
            }
        };
        self.events.publish(ConsoleEvent::Disconnected);

        if remote {
            if let Err(err) = self
                .call(OperationKind::Disconnect, self.service.disconnect())
                .await
            {
                warn!("Remote disconnect failed: {}", err);
                self.events.publish(ConsoleEvent::OperationFailed {
                    operation: OperationKind::Disconnect,
                    message: err.to_string(),
                });
            }
        }
    }

    // ==================== Build ====================

    /// Compile a project on the build host
    ///
    /// Compiler output is parsed into diagnostics; the artifact is kept as
    /// the latest build for [`flash_latest`](Self::flash_latest).
    pub async fn build(&self, project_id: &str, options: &BuildOptions) -> Result<BuildArtifact> {
        let ticket = self.transition(|m| m.begin_activity(OperationKind::Build))?;
        info!("Building project {}", project_id);

        let request = CompileRequest {
            project_id: project_id.to_string(),
            debug: options.debug,
            optimization_level: options.optimization_level.clone(),
            defines: options.defines.clone(),
        };
        let result = self
            .call(OperationKind::Build, self.service.compile(&request))
            .await;
        let current = self.transition(|m| m.finish_activity(&ticket));

        match result {
            Ok(response) => {
                let parsed = parse_compile_output(&response.compile_output);
                let artifact = BuildArtifact {
                    project_id: project_id.to_string(),
                    output_files: response.output_files,
                    memory_usage: response.memory_usage,
                    compile_log: response.compile_output,
                    errors: parsed.errors,
                    warnings: parsed.warnings,
                };
                info!(
                    "Build of {} finished: {} file(s), {} error(s), {} warning(s)",
                    project_id,
                    artifact.output_files.len(),
                    artifact.errors.len(),
                    artifact.warnings.len()
                );
                if current {
                    self.lock().store_artifact(artifact.clone());
                    self.events
                        .publish(ConsoleEvent::BuildFinished(artifact.clone()));
                } else {
                    debug!("Build finished after its session ended");
                }
                Ok(artifact)
            }
            Err(err) => {
                if current {
                    self.report_failure(OperationKind::Build, &err);
                    if let Some(output) = err.diagnostics() {
                        let parsed = parse_compile_output(output);
                        info!(
                            "Build of {} failed with {} error(s)",
                            project_id,
                            parsed.errors.len()
                        );
                        self.events.publish(ConsoleEvent::BuildFailed {
                            project_id: project_id.to_string(),
                            errors: parsed.errors,
                            warnings: parsed.warnings,
                            compile_log: output.to_string(),
                        });
                    }
                }
                Err(err)
            }
        }
    }

    // ==================== Flash / Erase ====================

    /// Flash the most recent successful build
    pub async fn flash_latest(&self, options: &FlashOptions) -> Result<FlashResult> {
        self.flash_inner(None, options).await
    }

    /// Flash a specific build artifact
    pub async fn flash(&self, artifact: &BuildArtifact, options: &FlashOptions) -> Result<FlashResult> {
        self.flash_inner(Some(artifact), options).await
    }

    async fn flash_inner(
        &self,
        artifact: Option<&BuildArtifact>,
        options: &FlashOptions,
    ) -> Result<FlashResult> {
        let (ticket, file) = self.transition(|m| -> Result<(Ticket, String)> {
            m.ensure_ready(OperationKind::Flash)?;
            let artifact = match artifact {
                Some(a) => a.clone(),
                None => m.latest_artifact().cloned().ok_or_else(|| {
                    ConsoleError::Precondition("no build artifact to flash".to_string())
                })?,
            };
            let file = artifact.flash_image().map(str::to_string).ok_or_else(|| {
                ConsoleError::Precondition(format!(
                    "build of {} produced no output files",
                    artifact.project_id
                ))
            })?;
            Ok((m.begin_activity(OperationKind::Flash)?, file))
        })?;

        info!("Flashing {} at {:#010x}", file, self.flash_base);
        let request = FlashRequest {
            file_path: file,
            address: self.flash_base,
            verify: options.verify,
            reset: true,
            chip_family: ticket.session.chip_family.clone(),
            erase_all: options.erase_all,
            config: FlashTargetSettings {
                transport: ticket.session.transport,
                target_config: options.target_config.clone(),
                reset_mode: options.reset_mode,
            },
        };
        let result = self
            .call(OperationKind::Flash, self.service.flash(&request))
            .await;
        let current = self.transition(|m| m.finish_activity(&ticket));

        match result {
            Ok(response) => {
                let flashed = FlashResult {
                    file: response.file,
                    address: response.address,
                    size: response.size,
                    verified: response.verified,
                    time_ms: response.time_ms,
                    output: response.flash_output,
                };
                info!(
                    "Flashed {} bytes in {} ms (verified: {})",
                    flashed.size, flashed.time_ms, flashed.verified
                );
                if current {
                    self.events
                        .publish(ConsoleEvent::FlashFinished(flashed.clone()));
                }
                Ok(flashed)
            }
            Err(err) => {
                if current {
                    self.report_failure(OperationKind::Flash, &err);
                }
                Err(err)
            }
        }
    }

    /// Erase the whole target flash
    ///
    /// Destructive; callers confirm with the user before calling.
    pub async fn erase(&self) -> Result<EraseResult> {
        let ticket = self.transition(|m| m.begin_activity(OperationKind::Erase))?;
        info!("Erasing {}", ticket.session.chip_family);

        let request = EraseRequest {
            chip_family: ticket.session.chip_family.clone(),
            transport: ticket.session.transport,
        };
        let result = self
            .call(OperationKind::Erase, self.service.erase(&request))
            .await;
        let current = self.transition(|m| m.finish_activity(&ticket));

        match result {
            Ok(response) => {
                let erased = EraseResult {
                    time_ms: response.time_ms,
                };
                if current {
                    self.events.publish(ConsoleEvent::EraseFinished(erased));
                }
                Ok(erased)
            }
            Err(err) => {
                if current {
                    self.report_failure(OperationKind::Erase, &err);
                }
                Err(err)
            }
        }
    }
}
