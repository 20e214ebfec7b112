//! Waveform viewport engine
//!
//! Owns the watched variables (and through them their sample buffers) and
//! the shared viewport. Ingestion appends each batch in arrival order,
//! lets the ring buffers evict, then recomputes the visible window.

use super::viewport::{decimate, TimeWindow, WaveformViewport};
use crate::config::{ConsoleConfig, ViewportConfig};
use crate::error::{ConsoleError, Result};
use crate::telemetry::ring_buffer::Sample;
use crate::types::{generate_color, WatchedVariable};

/// What a call to [`WaveformEngine::ingest`] changed
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// Variables that received samples, in batch order
    pub variables: Vec<String>,
    /// Samples stored across all variables
    pub stored: usize,
    /// Batches naming a variable that is not watched
    pub dropped_batches: usize,
    /// Visible window after ingestion
    pub window: TimeWindow,
}

/// Watched variables plus the viewport they are displayed through
#[derive(Debug, Clone)]
pub struct WaveformEngine {
    variables: Vec<WatchedVariable>,
    viewport: WaveformViewport,
    buffer_size: usize,
    max_render_points: usize,
    next_color: u32,
}

impl Default for WaveformEngine {
    fn default() -> Self {
        Self::from_config(&ConsoleConfig::default())
    }
}

impl WaveformEngine {
    pub fn new(viewport: &ViewportConfig, buffer_size: usize, auto_scroll: bool) -> Self {
        Self {
            variables: Vec::new(),
            viewport: WaveformViewport::new(viewport, auto_scroll),
            buffer_size: buffer_size.max(1),
            max_render_points: viewport.max_render_points,
            next_color: 0,
        }
    }

    pub fn from_config(config: &ConsoleConfig) -> Self {
        Self::new(
            &config.viewport,
            config.telemetry.buffer_size,
            config.telemetry.auto_scroll,
        )
    }

    // ==================== Variables ====================

    /// Add a variable with the next palette color
    pub fn add_variable(&mut self, name: &str) -> Result<&WatchedVariable> {
        let color = generate_color(self.next_color);
        self.add_variable_with_color(name, &color)
    }

    /// Add a variable with an explicit `#rrggbb` color
    pub fn add_variable_with_color(&mut self, name: &str, color: &str) -> Result<&WatchedVariable> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConsoleError::Precondition(
                "variable name must not be empty".to_string(),
            ));
        }
        if self.contains(name) {
            return Err(ConsoleError::Precondition(format!(
                "variable '{}' is already watched",
                name
            )));
        }
        self.next_color += 1;
        self.variables
            .push(WatchedVariable::new(name, color, self.buffer_size));
        Ok(&self.variables[self.variables.len() - 1])
    }

    /// Remove a variable and drop its buffer
    pub fn remove_variable(&mut self, name: &str) -> Option<WatchedVariable> {
        let index = self.variables.iter().position(|v| v.name == name)?;
        Some(self.variables.remove(index))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&WatchedVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Variables in the order they were added
    pub fn variables(&self) -> &[WatchedVariable] {
        &self.variables
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }

    pub fn colors(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.color.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Remove every variable
    pub fn clear(&mut self) {
        self.variables.clear();
        self.next_color = 0;
    }

    /// Drop all samples but keep the variables
    pub fn clear_samples(&mut self) {
        for var in &mut self.variables {
            var.clear();
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Change the per-variable capacity, keeping the newest samples
    pub fn set_buffer_size(&mut self, buffer_size: usize) {
        self.buffer_size = buffer_size.max(1);
        for var in &mut self.variables {
            var.resize(self.buffer_size);
        }
    }

    // ==================== Ingestion ====================

    /// Store sample batches, then recompute the visible window
    ///
    /// Batches for variables that are not present are dropped.
    pub fn ingest<'a, I>(&mut self, batches: I) -> IngestOutcome
    where
        I: IntoIterator<Item = (&'a str, &'a [Sample])>,
    {
        let mut variables = Vec::new();
        let mut stored = 0;
        let mut dropped_batches = 0;

        for (name, samples) in batches {
            match self.variables.iter_mut().find(|v| v.name == name) {
                Some(var) => {
                    stored += var.ingest(samples);
                    if !variables.iter().any(|n| n == name) {
                        variables.push(name.to_string());
                    }
                }
                None => {
                    tracing::trace!("Dropping {} samples for unwatched '{}'", samples.len(), name);
                    dropped_batches += 1;
                }
            }
        }

        let window = self.refresh_view();
        IngestOutcome {
            variables,
            stored,
            dropped_batches,
            window,
        }
    }

    /// Newest timestamp across all buffers
    pub fn latest_timestamp(&self) -> Option<f64> {
        self.variables
            .iter()
            .filter_map(|v| v.buffer().last().map(|s| s.timestamp_ms))
            .max_by(f64::total_cmp)
    }

    /// Re-apply auto-scroll and auto-scale to the current data
    pub fn refresh_view(&mut self) -> TimeWindow {
        if let Some(last) = self.latest_timestamp() {
            self.viewport.follow(last);
        }
        if self.viewport.auto_scale {
            let window = self.viewport.window();
            let (min, max) = self
                .variables
                .iter()
                .flat_map(|v| v.buffer().range(window.start_ms, window.end_ms))
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), s| {
                    (min.min(s.value), max.max(s.value))
                });
            self.viewport.fit_vertical(min, max);
        }
        self.viewport.window()
    }

    // ==================== View ====================

    pub fn viewport(&self) -> &WaveformViewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut WaveformViewport {
        &mut self.viewport
    }

    pub fn max_render_points(&self) -> usize {
        self.max_render_points
    }

    /// Samples of a variable inside the visible window, decimated for rendering
    pub fn visible_points(&self, name: &str) -> Option<Vec<Sample>> {
        let var = self.variable(name)?;
        let window = self.viewport.window();
        let visible: Vec<Sample> = var
            .buffer()
            .range(window.start_ms, window.end_ms)
            .copied()
            .collect();
        Some(decimate(&visible, self.max_render_points))
    }
}
