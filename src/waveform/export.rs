//! CSV export of the samples currently in memory
//!
//! Wide layout: one column per variable, one row per distinct timestamp
//! across all buffers. A variable without a sample at a row's timestamp
//! gets an empty cell.
//!
//! ```text
//! timestamp,V1,V2
//! 0,1,
//! 10,2,5.5
//! 20,3,
//! ```

use crate::error::{ConsoleError, Result, ResultExt};
use crate::types::WatchedVariable;
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Render the buffers of `variables` as CSV text
pub fn export_csv(variables: &[WatchedVariable]) -> String {
    let mut timestamps: Vec<f64> = variables
        .iter()
        .flat_map(|v| v.buffer().iter().map(|s| s.timestamp_ms))
        .collect();
    timestamps.sort_by(f64::total_cmp);
    timestamps.dedup();

    let mut out = String::from("timestamp");
    for var in variables {
        out.push(',');
        out.push_str(&quote_field(&var.name));
    }
    out.push('\n');

    // Buffers are time-ordered, so one cursor per variable walks them in step
    let columns: Vec<Vec<_>> = variables.iter().map(|v| v.buffer().to_vec()).collect();
    let mut cursors = vec![0usize; columns.len()];

    for t in timestamps {
        let _ = write!(out, "{}", t);
        for (samples, cursor) in columns.iter().zip(cursors.iter_mut()) {
            out.push(',');
            let mut value = None;
            // Several samples may share a timestamp; the last one wins
            while *cursor < samples.len() && samples[*cursor].timestamp_ms <= t {
                if samples[*cursor].timestamp_ms == t {
                    value = Some(samples[*cursor].value);
                }
                *cursor += 1;
            }
            if let Some(value) = value {
                let _ = write!(out, "{}", value);
            }
        }
        out.push('\n');
    }

    out
}

/// File name for an export taken at `at`, e.g. `waveform_2026-10-18T09-30-00Z.csv`
pub fn csv_file_name(at: DateTime<Utc>) -> String {
    format!("waveform_{}.csv", at.format("%Y-%m-%dT%H-%M-%SZ"))
}

/// Write the export into `dir`, returning the path of the new file
pub fn write_csv(variables: &[WatchedVariable], dir: impl AsRef<Path>, at: DateTime<Utc>) -> Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .map_err(ConsoleError::Io)
        .with_context(|| format!("Failed to create export directory {:?}", dir))?;

    let path = dir.join(csv_file_name(at));
    std::fs::write(&path, export_csv(variables))
        .map_err(ConsoleError::Io)
        .context(format!("Failed to write {:?}", path))?;

    tracing::info!("Exported {} variable(s) to {:?}", variables.len(), path);
    Ok(path)
}

/// Quote a header field per RFC 4180 when it contains a delimiter, quote or newline
fn quote_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
