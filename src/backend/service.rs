//! ProbeService trait for the remote probe/build service
//!
//! The session state machine talks to the outside world only through this
//! trait, so the same state machine drives the HTTP service in production
//! and scripted fakes in tests.

use super::api::{
    CompileRequest, CompileResponse, ConnectRequest, ConnectResponse, EraseRequest, EraseResponse,
    FlashRequest, FlashResponse,
};
use crate::error::Result;
use async_trait::async_trait;

/// Remote operations against the debug probe and build host
///
/// Implementations surface failures as
/// [`ConsoleError::Remote`](crate::error::ConsoleError::Remote) with the
/// failure kind classified; they never retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProbeService: Send + Sync {
    /// Attach to the probe and open a debug session
    async fn connect(&self, request: &ConnectRequest) -> Result<ConnectResponse>;

    /// Tear down the current debug session
    async fn disconnect(&self) -> Result<()>;

    /// Compile a project on the build host
    async fn compile(&self, request: &CompileRequest) -> Result<CompileResponse>;

    /// Write a firmware image to the target
    async fn flash(&self, request: &FlashRequest) -> Result<FlashResponse>;

    /// Erase the whole target flash
    async fn erase(&self, request: &EraseRequest) -> Result<EraseResponse>;
}
