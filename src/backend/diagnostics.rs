//! Compiler output parsing
//!
//! Remote builds return the raw compiler output. Lines of the form
//! `file:line:col: error: message` become structured diagnostics; every
//! other line stays in the verbatim compile log only.

use crate::types::{CompileDiagnostic, Severity};
use regex::Regex;
use std::sync::OnceLock;

fn diagnostic_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Optional drive letter so Windows paths like C:\src\main.c parse
        Regex::new(
            r"^(?P<file>(?:[A-Za-z]:)?[^:\r\n]+):(?P<line>\d+):(?P<col>\d+):\s*(?P<sev>fatal error|error|warning):\s*(?P<msg>.*?)\s*$",
        )
        .expect("diagnostic pattern is valid")
    })
}

/// Parse a single line into a diagnostic, if it has the expected shape
pub fn parse_diagnostic_line(line: &str) -> Option<CompileDiagnostic> {
    let caps = diagnostic_pattern().captures(line)?;
    let severity = match &caps["sev"] {
        "warning" => Severity::Warning,
        _ => Severity::Error,
    };
    Some(CompileDiagnostic {
        file: caps["file"].trim().to_string(),
        line: caps["line"].parse().ok()?,
        column: caps["col"].parse().ok()?,
        severity,
        message: caps["msg"].to_string(),
    })
}

/// Errors and warnings found in compiler output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutput {
    pub errors: Vec<CompileDiagnostic>,
    pub warnings: Vec<CompileDiagnostic>,
}

/// Split compiler output into structured errors and warnings
pub fn parse_compile_output(output: &str) -> ParsedOutput {
    let mut parsed = ParsedOutput::default();
    for diagnostic in output.lines().filter_map(parse_diagnostic_line) {
        match diagnostic.severity {
            Severity::Error => parsed.errors.push(diagnostic),
            Severity::Warning => parsed.warnings.push(diagnostic),
        }
    }
    parsed
}
