//! Waveform viewport engine
//!
//! Turns streamed samples into something a renderer can draw:
//!
//! - [`WaveformEngine`] - Watched variables, ingestion, auto-scroll and
//!   per-variable visible points
//! - [`WaveformViewport`] - Time window and vertical mapping shared by all
//!   displayed variables
//! - [`export`] - CSV export of everything currently buffered
//!
//! Any chart mechanism works as long as it draws the points returned by
//! [`WaveformEngine::visible_points`] inside
//! [`WaveformViewport::window`] and [`WaveformViewport::vertical_bounds`].

pub mod engine;
pub mod export;
pub mod viewport;

pub use engine::{IngestOutcome, WaveformEngine};
pub use export::{csv_file_name, export_csv, write_csv};
pub use viewport::{decimate, TimeWindow, WaveformViewport};
