//! Device session lifecycle
//!
//! - [`state`] - Pure state machine (`Disconnected`, `Connecting`,
//!   `Connected` with an activity tag, `Error`) and its generation counter
//! - [`controller`] - Async driver that runs remote calls with timeouts and
//!   publishes state changes on the event bus

pub mod controller;
pub mod state;

pub use controller::SessionController;
pub use state::{ConnectStart, SessionMachine, SessionPhase, SessionSnapshot, Ticket};
