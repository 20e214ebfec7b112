//! Visible time/value window shared by all displayed variables

use crate::config::ViewportConfig;
use crate::error::{ConsoleError, Result};
use crate::telemetry::ring_buffer::Sample;

/// Headroom added around the data when auto-scaling the vertical range
const AUTO_SCALE_MARGIN: f64 = 0.1;

/// A closed time interval `[start_ms, end_ms]` on the telemetry clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start_ms: f64,
    pub end_ms: f64,
}

impl TimeWindow {
    pub fn new(start_ms: f64, end_ms: f64) -> Self {
        Self { start_ms, end_ms }
    }

    /// The window ending at `end_ms`, `range_ms` wide, never starting before zero
    pub fn trailing(end_ms: f64, range_ms: f64) -> Self {
        Self {
            start_ms: (end_ms - range_ms).max(0.0),
            end_ms,
        }
    }

    pub fn duration_ms(&self) -> f64 {
        self.end_ms - self.start_ms
    }

    pub fn contains(&self, timestamp_ms: f64) -> bool {
        timestamp_ms >= self.start_ms && timestamp_ms <= self.end_ms
    }
}

/// Time and value window of the waveform view
///
/// The same viewport applies to every variable shown together. With
/// `auto_scroll` on, the window follows the newest sample; with it off the
/// window only moves when the user moves it. Values outside the vertical
/// bounds stay in the buffers; only the view clips them.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformViewport {
    /// Visible time span in milliseconds
    pub time_range_ms: f64,
    /// Visible value span
    pub vertical_range: f64,
    /// Value at the vertical center
    pub vertical_offset: f64,
    /// Follow the newest sample
    pub auto_scroll: bool,
    /// Fit the vertical range to the visible samples
    pub auto_scale: bool,
    window: TimeWindow,
}

impl Default for WaveformViewport {
    fn default() -> Self {
        Self::new(&ViewportConfig::default(), true)
    }
}

impl WaveformViewport {
    pub fn new(config: &ViewportConfig, auto_scroll: bool) -> Self {
        Self {
            time_range_ms: config.time_range_ms,
            vertical_range: config.vertical_range,
            vertical_offset: config.vertical_offset,
            auto_scroll,
            auto_scale: config.auto_scale,
            window: TimeWindow::new(0.0, config.time_range_ms),
        }
    }

    /// Currently visible time window
    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// Displayed value range `(low, high)`
    pub fn vertical_bounds(&self) -> (f64, f64) {
        let half = self.vertical_range / 2.0;
        (self.vertical_offset - half, self.vertical_offset + half)
    }

    /// Whether a value falls inside the displayed value range
    pub fn is_value_visible(&self, value: f64) -> bool {
        let (low, high) = self.vertical_bounds();
        value >= low && value <= high
    }

    /// Move the window to end at the newest timestamp, if auto-scrolling
    pub fn follow(&mut self, last_timestamp_ms: f64) -> TimeWindow {
        if self.auto_scroll {
            self.window = TimeWindow::trailing(last_timestamp_ms, self.time_range_ms);
        }
        self.window
    }

    /// Set an explicit window; turns auto-scroll off
    pub fn set_window(&mut self, start_ms: f64, end_ms: f64) -> Result<TimeWindow> {
        if !start_ms.is_finite() || !end_ms.is_finite() || start_ms >= end_ms {
            return Err(ConsoleError::Precondition(format!(
                "invalid time window [{}, {}]",
                start_ms, end_ms
            )));
        }
        self.auto_scroll = false;
        self.time_range_ms = end_ms - start_ms;
        self.window = TimeWindow::new(start_ms, end_ms);
        Ok(self.window)
    }

    /// Change the visible time span, keeping the window's right edge
    pub fn set_time_range(&mut self, range_ms: f64) -> Result<TimeWindow> {
        if !(range_ms.is_finite() && range_ms > 0.0) {
            return Err(ConsoleError::Precondition(format!(
                "time range must be positive, got {}",
                range_ms
            )));
        }
        self.time_range_ms = range_ms;
        self.window = TimeWindow::trailing(self.window.end_ms, range_ms);
        Ok(self.window)
    }

    /// Shift the window by `delta_ms`; turns auto-scroll off
    pub fn pan(&mut self, delta_ms: f64) -> TimeWindow {
        self.auto_scroll = false;
        let duration = self.window.duration_ms();
        let start = (self.window.start_ms + delta_ms).max(0.0);
        self.window = TimeWindow::new(start, start + duration);
        self.window
    }

    /// Set the vertical mapping explicitly; turns auto-scale off
    pub fn set_vertical(&mut self, range: f64, offset: f64) -> Result<()> {
        if !(range.is_finite() && range > 0.0) || !offset.is_finite() {
            return Err(ConsoleError::Precondition(format!(
                "invalid vertical range {} at offset {}",
                range, offset
            )));
        }
        self.auto_scale = false;
        self.vertical_range = range;
        self.vertical_offset = offset;
        Ok(())
    }

    /// Fit the vertical range to `[min, max]` plus a margin, if auto-scaling
    pub fn fit_vertical(&mut self, min: f64, max: f64) {
        if !self.auto_scale || !min.is_finite() || !max.is_finite() || min > max {
            return;
        }
        let span = max - min;
        self.vertical_offset = (min + max) / 2.0;
        self.vertical_range = if span > 0.0 {
            span * (1.0 + AUTO_SCALE_MARGIN)
        } else {
            // Flat signal: keep a unit-wide band around it
            1.0_f64.max(min.abs() * AUTO_SCALE_MARGIN)
        };
    }
}

/// Reduce samples to at most `max_points` while keeping peaks
///
/// Keeps the first and last sample and, per bucket, the minimum and the
/// maximum in time order, so spikes survive decimation.
pub fn decimate(samples: &[Sample], max_points: usize) -> Vec<Sample> {
    if samples.len() <= max_points || samples.len() < 3 || max_points < 4 {
        return samples.to_vec();
    }

    let inner = &samples[1..samples.len() - 1];
    let buckets = ((max_points - 2) / 2).max(1);
    let bucket_size = inner.len().div_ceil(buckets);
    let mut result = Vec::with_capacity(max_points);

    result.push(samples[0]);
    for bucket in inner.chunks(bucket_size) {
        let (min, max) = bucket.iter().fold((bucket[0], bucket[0]), |(min, max), s| {
            (
                if s.value < min.value { *s } else { min },
                if s.value > max.value { *s } else { max },
            )
        });
        if min == max {
            result.push(min);
        } else if min.timestamp_ms <= max.timestamp_ms {
            result.push(min);
            result.push(max);
        } else {
            result.push(max);
            result.push(min);
        }
    }
    result.push(samples[samples.len() - 1]);

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> WaveformViewport {
        WaveformViewport::new(&ViewportConfig::default(), true)
    }

    #[test]
    fn test_follow_clamps_at_zero() {
        let mut vp = viewport();
        assert_eq!(vp.follow(1200.0), TimeWindow::new(0.0, 1200.0));
        assert_eq!(vp.follow(7500.0), TimeWindow::new(2500.0, 7500.0));
    }

    #[test]
    fn test_follow_is_noop_without_auto_scroll() {
        let mut vp = viewport();
        vp.set_window(100.0, 600.0).unwrap();
        assert!(!vp.auto_scroll);
        assert_eq!(vp.follow(10_000.0), TimeWindow::new(100.0, 600.0));
    }

    #[test]
    fn test_vertical_bounds() {
        let mut vp = viewport();
        vp.set_vertical(4.0, 1.0).unwrap();
        assert_eq!(vp.vertical_bounds(), (-1.0, 3.0));
        assert!(vp.is_value_visible(3.0));
        assert!(!vp.is_value_visible(3.5));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut vp = viewport();
        assert!(vp.set_window(10.0, 10.0).is_err());
        assert!(vp.set_time_range(0.0).is_err());
        assert!(vp.set_vertical(-1.0, 0.0).is_err());
        assert!(vp.set_vertical(1.0, f64::NAN).is_err());
    }

    #[test]
    fn test_set_time_range_keeps_right_edge() {
        let mut vp = viewport();
        vp.follow(8000.0);
        assert_eq!(vp.set_time_range(1000.0).unwrap(), TimeWindow::new(7000.0, 8000.0));
    }

    #[test]
    fn test_pan_never_goes_negative() {
        let mut vp = viewport();
        vp.follow(6000.0);
        let window = vp.pan(-3000.0);
        assert_eq!(window, TimeWindow::new(0.0, 5000.0));
        assert!(!vp.auto_scroll);
    }

    #[test]
    fn test_fit_vertical() {
        let mut vp = viewport();
        vp.fit_vertical(-1.0, 1.0);
        // auto_scale is off by default
        assert_eq!(vp.vertical_range, 10.0);

        vp.auto_scale = true;
        vp.fit_vertical(0.0, 10.0);
        assert!((vp.vertical_offset - 5.0).abs() < 1e-9);
        assert!((vp.vertical_range - 11.0).abs() < 1e-9);

        vp.fit_vertical(3.0, 3.0);
        assert_eq!(vp.vertical_offset, 3.0);
        assert_eq!(vp.vertical_range, 1.0);
    }

    #[test]
    fn test_decimate_keeps_peaks() {
        let mut samples: Vec<Sample> = (0..1000).map(|i| Sample::new(i as f64, 0.0)).collect();
        samples[500].value = 99.0;
        samples[700].value = -42.0;

        let reduced = decimate(&samples, 100);
        assert!(reduced.len() <= 100);
        assert_eq!(reduced.first(), samples.first());
        assert_eq!(reduced.last(), samples.last());
        assert!(reduced.iter().any(|s| s.value == 99.0));
        assert!(reduced.iter().any(|s| s.value == -42.0));
        assert!(reduced
            .windows(2)
            .all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
    }

    #[test]
    fn test_decimate_small_input_untouched() {
        let samples = vec![Sample::new(0.0, 1.0), Sample::new(1.0, 2.0)];
        assert_eq!(decimate(&samples, 100), samples);
    }
}
