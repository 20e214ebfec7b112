//! Backend module for the remote probe service
//!
//! The debug probe and the build host live behind a remote service. This
//! module holds everything needed to talk to it:
//!
//! - [`ProbeService`] - Trait the session state machine drives
//! - [`HttpProbeService`] - reqwest-based implementation for the REST interface
//! - [`api`] - Request/response wire types
//! - [`diagnostics`] - Parsing of compiler output into structured diagnostics
//!
//! # Example
//!
//! ```ignore
//! use probescope::backend::{HttpProbeService, ProbeService};
//! use probescope::backend::api::ConnectRequest;
//! use probescope::config::ServiceConfig;
//! use probescope::types::Transport;
//!
//! let service = HttpProbeService::new(&ServiceConfig::default())?;
//! let response = service
//!     .connect(&ConnectRequest {
//!         chip_family: "stm32f1".to_string(),
//!         transport: Transport::Swd,
//!     })
//!     .await?;
//! println!("session {}", response.session_id);
//! ```

pub mod api;
pub mod diagnostics;
pub mod http;
pub mod service;

pub use diagnostics::{parse_compile_output, parse_diagnostic_line, ParsedOutput};
pub use http::HttpProbeService;
pub use service::ProbeService;

#[cfg(test)]
pub use service::MockProbeService;
