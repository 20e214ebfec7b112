//! # probescope: Device Session & Telemetry Orchestrator
//!
//! The core of a browser-based firmware console. It tracks the lifecycle of
//! a hardware debug-probe connection with its mutually-exclusive
//! build/flash/erase operations, and manages a live socket stream of watched
//! target variables that are buffered and windowed for waveform rendering
//! and CSV export.
//!
//! ## Architecture
//!
//! - **Session**: State machine over a remote probe service (REST via reqwest)
//! - **Telemetry**: Typed JSON envelopes over a WebSocket (tokio-tungstenite)
//! - **Waveform**: Ring-buffered samples per variable plus a shared viewport
//! - **Events**: Crossbeam channels fan state changes out to any number of UIs
//!
//! ## Configuration
//!
//! The default configuration file and logs live in the platform-appropriate
//! data directory under `dev.hxyulin.probescope`:
//!
//! - **Linux**: `~/.local/share/dev.hxyulin.probescope/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.probescope/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.probescope\`
//!
//! ## Example
//!
//! ```ignore
//! use probescope::{ConsoleConfig, Orchestrator, Transport};
//!
//! #[tokio::main]
//! async fn main() -> probescope::Result<()> {
//!     let config = ConsoleConfig::load_or_default(ConsoleConfig::default_path());
//!     let console = Orchestrator::from_config(config)?;
//!     let ui = console.subscribe();
//!
//!     console.connect("stm32f1", Transport::Swd).await?;
//!     console.build("blinky").await?;
//!     console.flash().await?;
//!
//!     console.add_variable("motor.speed")?;
//!     console.start_watch().await?;
//!     for _ in 0..100 {
//!         console.process_next_message().await;
//!     }
//!     for event in ui.drain() {
//!         println!("{:?}", event);
//!     }
//!
//!     console.write_csv(".")?;
//!     console.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod session;
pub mod telemetry;
pub mod types;
pub mod waveform;

// Re-export commonly used types
pub use backend::{HttpProbeService, ProbeService};
pub use config::{BuildOptions, ConsoleConfig, FlashOptions};
pub use error::{ConsoleError, OperationKind, RemoteFailure, Result};
pub use events::{ConsoleEvent, EventBus, EventReceiver};
pub use orchestrator::Orchestrator;
pub use session::{SessionController, SessionSnapshot};
pub use telemetry::{Received, Sample, SampleRingBuffer, WatchPhase};
pub use types::{
    BuildArtifact, ConnectionState, DeviceSession, EraseResult, FlashResult, Transport,
    WatchedVariable,
};
pub use waveform::{TimeWindow, WaveformEngine, WaveformViewport};
