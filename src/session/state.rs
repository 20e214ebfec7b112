//! Pure device session state machine
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected(Idle)
//!       ▲                       │                 │   ▲
//!       │                     fail                ▼   │
//!   disconnect                  ▼          Building / Flashing / Erasing
//!       └──────────────────── Error
//! ```
//!
//! [`SessionMachine`] performs no I/O. The controller asks it for
//! permission before a remote call and reports the outcome afterwards.
//! A session only exists inside [`SessionPhase::Connected`], and the busy
//! substate is a single [`Activity`] tag, so "flashing while disconnected"
//! or "building and erasing" cannot be represented.
//!
//! Every connect attempt and every disconnect bumps a generation counter.
//! Outcomes are reported with the [`Ticket`] obtained at the start of the
//! operation; an outcome whose generation is stale (the user disconnected
//! meanwhile) is discarded and cannot resurrect an old session.

use crate::error::{ConsoleError, OperationKind, Result};
use crate::types::{Activity, BuildArtifact, ConnectionState, DeviceSession};

/// Where the session lifecycle currently is
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    Connected {
        session: DeviceSession,
        activity: Activity,
    },
    Error {
        message: String,
    },
}

/// Outcome of asking to connect
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectStart {
    /// Already connected; connecting again is a no-op
    AlreadyConnected(DeviceSession),
    /// A new attempt started with this generation
    Started(u64),
}

/// Permission to run an exclusive operation on a connected session
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub generation: u64,
    pub activity: Activity,
    pub session: DeviceSession,
}

/// Point-in-time view of the session for UI collaborators
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub session: Option<DeviceSession>,
    pub last_error: Option<String>,
    pub latest_artifact: Option<BuildArtifact>,
}

/// The device session state machine
#[derive(Debug, Clone)]
pub struct SessionMachine {
    phase: SessionPhase,
    generation: u64,
    last_error: Option<String>,
    latest_artifact: Option<BuildArtifact>,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Disconnected,
            generation: 0,
            last_error: None,
            latest_artifact: None,
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Flattened state
    pub fn state(&self) -> ConnectionState {
        match &self.phase {
            SessionPhase::Disconnected => ConnectionState::Disconnected,
            SessionPhase::Connecting => ConnectionState::Connecting,
            SessionPhase::Connected { activity, .. } => match activity {
                Activity::Idle => ConnectionState::Connected,
                Activity::Building => ConnectionState::Building,
                Activity::Flashing => ConnectionState::Flashing,
                Activity::Erasing => ConnectionState::Erasing,
            },
            SessionPhase::Error { .. } => ConnectionState::Error,
        }
    }

    /// The current session, if connected (idle or busy)
    pub fn session(&self) -> Option<&DeviceSession> {
        match &self.phase {
            SessionPhase::Connected { session, .. } => Some(session),
            _ => None,
        }
    }

    /// Message of the most recent failure, cleared by a successful connect
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Most recent successful build
    pub fn latest_artifact(&self) -> Option<&BuildArtifact> {
        self.latest_artifact.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            session: self.session().cloned(),
            last_error: self.last_error.clone(),
            latest_artifact: self.latest_artifact.clone(),
        }
    }

    // ==================== Connect / Disconnect ====================

    /// Ask to connect
    pub fn begin_connect(&mut self) -> Result<ConnectStart> {
        match &self.phase {
            SessionPhase::Connected { session, .. } => {
                Ok(ConnectStart::AlreadyConnected(session.clone()))
            }
            SessionPhase::Connecting => Err(ConsoleError::Conflict {
                active: "connecting",
                requested: OperationKind::Connect,
            }),
            SessionPhase::Disconnected | SessionPhase::Error { .. } => {
                self.generation += 1;
                self.phase = SessionPhase::Connecting;
                Ok(ConnectStart::Started(self.generation))
            }
        }
    }

    /// Report a successful connect; returns `false` if the attempt is stale
    pub fn complete_connect(&mut self, generation: u64, session: DeviceSession) -> bool {
        if generation != self.generation || self.phase != SessionPhase::Connecting {
            return false;
        }
        self.phase = SessionPhase::Connected {
            session,
            activity: Activity::Idle,
        };
        self.last_error = None;
        true
    }

    /// Report a failed connect; returns `false` if the attempt is stale
    pub fn fail_connect(&mut self, generation: u64, message: impl Into<String>) -> bool {
        if generation != self.generation || self.phase != SessionPhase::Connecting {
            return false;
        }
        let message = message.into();
        self.last_error = Some(message.clone());
        self.phase = SessionPhase::Error { message };
        true
    }

    /// Force the machine to `Disconnected`
    ///
    /// Returns the previous phase. Idempotent: disconnecting twice leaves
    /// the machine `Disconnected` and bumps nothing the second time.
    pub fn disconnect(&mut self) -> SessionPhase {
        if self.phase == SessionPhase::Disconnected {
            return SessionPhase::Disconnected;
        }
        self.generation += 1;
        std::mem::replace(&mut self.phase, SessionPhase::Disconnected)
    }

    // ==================== Exclusive operations ====================

    /// Check that an exclusive operation could start now
    pub fn ensure_ready(&self, requested: OperationKind) -> Result<&DeviceSession> {
        match &self.phase {
            SessionPhase::Connected {
                session,
                activity: Activity::Idle,
            } => Ok(session),
            SessionPhase::Connected { activity, .. } => Err(ConsoleError::Conflict {
                active: activity.label(),
                requested,
            }),
            _ => Err(ConsoleError::NoSession),
        }
    }

    /// Enter the busy substate for an operation
    pub fn begin_activity(&mut self, requested: OperationKind) -> Result<Ticket> {
        let activity = match requested {
            OperationKind::Build => Activity::Building,
            OperationKind::Flash => Activity::Flashing,
            OperationKind::Erase => Activity::Erasing,
            OperationKind::Connect | OperationKind::Disconnect => {
                return Err(ConsoleError::Precondition(format!(
                    "{} is not an exclusive session operation",
                    requested
                )))
            }
        };
        let session = self.ensure_ready(requested)?.clone();
        if let SessionPhase::Connected { activity: slot, .. } = &mut self.phase {
            *slot = activity;
        }
        Ok(Ticket {
            generation: self.generation,
            activity,
            session,
        })
    }

    /// Leave the busy substate; returns `false` if the ticket is stale
    ///
    /// Called for success and failure alike: build, flash and erase
    /// failures never affect connectivity.
    pub fn finish_activity(&mut self, ticket: &Ticket) -> bool {
        if ticket.generation != self.generation {
            return false;
        }
        match &mut self.phase {
            SessionPhase::Connected { activity, .. } if *activity == ticket.activity => {
                *activity = Activity::Idle;
                true
            }
            _ => false,
        }
    }

    /// Remember a successful build for later flashing
    pub fn store_artifact(&mut self, artifact: BuildArtifact) {
        self.latest_artifact = Some(artifact);
    }

    /// Record a failure message without changing state
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }
}
