//! Error handling for probescope
//!
//! This module defines the error taxonomy shared by the session state
//! machine, the telemetry channel and the waveform engine, plus a Result
//! alias for use throughout the crate.
//!
//! Local precondition violations ([`ConsoleError::NoSession`],
//! [`ConsoleError::Conflict`], [`ConsoleError::Precondition`]) are raised at
//! the operation boundary and never reach the network layer.

use std::time::Duration;
use thiserror::Error;

/// Operation classes that run against the remote probe service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Connect,
    Disconnect,
    Build,
    Flash,
    Erase,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Connect => write!(f, "connect"),
            OperationKind::Disconnect => write!(f, "disconnect"),
            OperationKind::Build => write!(f, "build"),
            OperationKind::Flash => write!(f, "flash"),
            OperationKind::Erase => write!(f, "erase"),
        }
    }
}

/// Why a remote call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFailure {
    /// The service could not be reached (DNS, refused, reset, TLS)
    Network,
    /// The service answered but no debug probe is attached
    ProbeNotFound,
    /// The service or the probe refused the request
    Rejected,
}

impl std::fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteFailure::Network => write!(f, "network error"),
            RemoteFailure::ProbeNotFound => write!(f, "probe not found"),
            RemoteFailure::Rejected => write!(f, "rejected by remote"),
        }
    }
}

/// Main error type for probescope operations
#[derive(Error, Debug)]
pub enum ConsoleError {
    /// An operation needs a connected device session and there is none
    #[error("No connected device session")]
    NoSession,

    /// A mutually-exclusive operation is already in progress
    #[error("Cannot {requested} while {active} is in progress")]
    Conflict {
        active: &'static str,
        requested: OperationKind,
    },

    /// A local precondition for the operation does not hold
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The remote probe service reported a failure
    #[error("{operation} failed ({kind}): {message}")]
    Remote {
        operation: OperationKind,
        kind: RemoteFailure,
        message: String,
        /// Extra diagnostic output, e.g. partial compiler output
        diagnostics: Option<String>,
    },

    /// A malformed or unexpected telemetry message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A remote operation did not finish in time
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: OperationKind,
        after: Duration,
    },

    /// The telemetry socket is closed or could not be opened
    #[error("Channel error: {0}")]
    Channel(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ConsoleError>,
    },
}

impl ConsoleError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ConsoleError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for a remote failure without diagnostics
    pub fn remote(operation: OperationKind, kind: RemoteFailure, message: impl Into<String>) -> Self {
        ConsoleError::Remote {
            operation,
            kind,
            message: message.into(),
            diagnostics: None,
        }
    }

    /// The innermost error, skipping any context wrappers
    pub fn root(&self) -> &ConsoleError {
        match self {
            ConsoleError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error is a local precondition violation that never
    /// touched the network
    pub fn is_local(&self) -> bool {
        matches!(
            self.root(),
            ConsoleError::NoSession | ConsoleError::Conflict { .. } | ConsoleError::Precondition(_)
        )
    }

    /// Diagnostic payload carried by a remote failure, if any
    pub fn diagnostics(&self) -> Option<&str> {
        match self.root() {
            ConsoleError::Remote { diagnostics, .. } => diagnostics.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConsoleError {
    fn from(err: serde_json::Error) -> Self {
        ConsoleError::Serialization(err.to_string())
    }
}

/// Result type alias for probescope operations
pub type Result<T> = std::result::Result<T, ConsoleError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
