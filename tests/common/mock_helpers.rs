//! Scripted probe service for integration tests
//!
//! Responses are fixed up front. Any operation can be held at a [`Gate`]
//! so a test can observe the console while the remote call is in flight.

use super::builders::{flash_response, CompileResponseBuilder, ConnectResponseBuilder};
use async_trait::async_trait;
use probescope::backend::api::{
    CompileRequest, CompileResponse, ConnectRequest, ConnectResponse, EraseRequest, EraseResponse,
    FlashRequest, FlashResponse,
};
use probescope::error::{ConsoleError, OperationKind, RemoteFailure, Result};
use probescope::ProbeService;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Pauses a remote call until the test releases it
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Wait until the service is parked at this gate
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the parked call finish
    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

/// Probe service with canned responses and call recording
pub struct ScriptedService {
    connect: Mutex<Result<ConnectResponse>>,
    compile: Mutex<CompileResponse>,
    compile_failure: Option<String>,
    flash_ok: bool,
    gates: Mutex<HashMap<OperationKind, Arc<Gate>>>,
    calls: Mutex<Vec<OperationKind>>,
    flash_requests: Mutex<Vec<FlashRequest>>,
}

impl ScriptedService {
    /// Connects as `session_id`; builds produce `firmware.hex`
    pub fn new(session_id: &str) -> Self {
        Self {
            connect: Mutex::new(Ok(ConnectResponseBuilder::new(session_id)
                .chip_info("STM32F103C8")
                .build())),
            compile: Mutex::new(
                CompileResponseBuilder::new()
                    .output_file("firmware.hex")
                    .build(),
            ),
            compile_failure: None,
            flash_ok: true,
            gates: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            flash_requests: Mutex::new(Vec::new()),
        }
    }

    /// Connect fails with "probe not found"
    pub fn without_probe() -> Self {
        let service = Self::new("unused");
        *service.connect.lock().unwrap() = Err(ConsoleError::remote(
            OperationKind::Connect,
            RemoteFailure::ProbeNotFound,
            "no debug probe attached",
        ));
        service
    }

    pub fn with_compile(self, response: CompileResponse) -> Self {
        *self.compile.lock().unwrap() = response;
        self
    }

    /// Compile fails with `output` as the partial compiler output
    pub fn with_compile_failure(mut self, output: &str) -> Self {
        self.compile_failure = Some(output.to_string());
        self
    }

    pub fn with_flash_failure(mut self) -> Self {
        self.flash_ok = false;
        self
    }

    /// Hold every call of `operation` until the returned gate is released
    pub fn hold(&self, operation: OperationKind) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates.lock().unwrap().insert(operation, gate.clone());
        gate
    }

    /// Stop holding `operation`
    pub fn unhold(&self, operation: OperationKind) {
        self.gates.lock().unwrap().remove(&operation);
    }

    /// Remote calls made so far, in order
    pub fn calls(&self) -> Vec<OperationKind> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, operation: OperationKind) -> usize {
        self.calls().iter().filter(|c| **c == operation).count()
    }

    pub fn flash_requests(&self) -> Vec<FlashRequest> {
        self.flash_requests.lock().unwrap().clone()
    }

    async fn enter(&self, operation: OperationKind) {
        self.calls.lock().unwrap().push(operation);
        let gate = self.gates.lock().unwrap().get(&operation).cloned();
        if let Some(gate) = gate {
            gate.pass().await;
        }
    }
}

fn clone_result(result: &Result<ConnectResponse>) -> Result<ConnectResponse> {
    match result {
        Ok(response) => Ok(response.clone()),
        Err(e) => Err(ConsoleError::remote(
            OperationKind::Connect,
            RemoteFailure::ProbeNotFound,
            e.to_string(),
        )),
    }
}

#[async_trait]
impl ProbeService for ScriptedService {
    async fn connect(&self, _request: &ConnectRequest) -> Result<ConnectResponse> {
        self.enter(OperationKind::Connect).await;
        clone_result(&self.connect.lock().unwrap())
    }

    async fn disconnect(&self) -> Result<()> {
        self.enter(OperationKind::Disconnect).await;
        Ok(())
    }

    async fn compile(&self, _request: &CompileRequest) -> Result<CompileResponse> {
        self.enter(OperationKind::Build).await;
        if let Some(output) = &self.compile_failure {
            return Err(ConsoleError::Remote {
                operation: OperationKind::Build,
                kind: RemoteFailure::Rejected,
                message: "compilation failed".to_string(),
                diagnostics: Some(output.clone()),
            });
        }
        Ok(self.compile.lock().unwrap().clone())
    }

    async fn flash(&self, request: &FlashRequest) -> Result<FlashResponse> {
        self.flash_requests.lock().unwrap().push(request.clone());
        self.enter(OperationKind::Flash).await;
        if self.flash_ok {
            Ok(flash_response(&request.file_path, request.address, request.verify))
        } else {
            Err(ConsoleError::remote(
                OperationKind::Flash,
                RemoteFailure::Rejected,
                "target did not respond",
            ))
        }
    }

    async fn erase(&self, _request: &EraseRequest) -> Result<EraseResponse> {
        self.enter(OperationKind::Erase).await;
        Ok(EraseResponse { time_ms: 1200 })
    }
}
