//! Live variable telemetry
//!
//! - [`ring_buffer`] - Bounded per-variable sample storage with statistics
//! - [`protocol`] - JSON envelope codec and the typed inbound dispatch table
//! - [`transport`] - WebSocket and in-process loopback sockets
//! - [`channel`] - Watch session state on top of a transport
//!
//! # Example
//!
//! ```ignore
//! use probescope::telemetry::{TelemetryChannel, WebSocketTransport, WatchConfig, Received};
//! use std::sync::Arc;
//!
//! let transport = WebSocketTransport::connect("ws://127.0.0.1:8000/ws/debug/sess-1").await?;
//! let channel = TelemetryChannel::new("sess-1", Arc::new(transport));
//! channel
//!     .watch(WatchConfig {
//!         variables: vec!["motor.speed".into()],
//!         sample_rate: 10,
//!         buffer_size: 10_000,
//!         auto_scroll: true,
//!     })
//!     .await?;
//! loop {
//!     match channel.recv().await {
//!         Received::Samples(batches) => println!("{} batch(es)", batches.len()),
//!         Received::Closed(_) => break,
//!         _ => {}
//!     }
//! }
//! ```

pub mod channel;
pub mod protocol;
pub mod ring_buffer;
pub mod transport;

pub use channel::{Received, TelemetryChannel, WatchPhase};
pub use protocol::{Inbound, InboundKind, VariableSamples, WatchConfig, WaveformConfigPayload};
pub use ring_buffer::{IncrementalStats, Sample, SampleRingBuffer};
pub use transport::{
    LoopbackConnector, LoopbackPeer, LoopbackTransport, TelemetryConnector, TelemetryTransport,
    TransportEvent, WebSocketConnector, WebSocketTransport,
};
