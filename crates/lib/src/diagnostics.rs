//! Compiler diagnostics in PSL output
//!
//! The compiler reports each problem on two lines:
//!
//! ```text
//! %PSL-E-UNDEF, undefined variable
//! At source code line: 42 in subroutine FOO
//! ```

use std::fmt;

use tracing::warn;

const WARNING_PREFIX: &str = "%PSL-W";
const ERROR_PREFIX: &str = "%PSL-E";
const LOCATION_PREFIX: &str = "At source code line: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// One compiler message tied to a source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// 1-based line in the compiled source
    pub line: usize,
    /// The full `%PSL-...` line
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiagnosticError {
    #[error("diagnostic on output line {line} has no location line")]
    MissingLocation { line: usize },
    #[error("location after output line {line} has no line number")]
    BadLineNumber { line: usize },
}

/// Iterate over the diagnostics in `output`, in the order they appear.
///
/// A record whose location line is missing or unreadable yields an error
/// for that record only.
pub fn diagnostics(output: &str) -> Diagnostics {
    let lines = output
        .lines()
        .map(|l| l.trim_end_matches('\r').to_string())
        .collect();
    Diagnostics { lines, pos: 0 }
}

/// Diagnostics that parsed, skipping and logging the rest
pub fn parse_lenient(output: &str) -> Vec<Diagnostic> {
    diagnostics(output)
        .filter_map(|d| match d {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable diagnostic");
                None
            }
        })
        .collect()
}

/// Iterator returned by [`diagnostics`]
pub struct Diagnostics {
    lines: Vec<String>,
    pos: usize,
}

impl Iterator for Diagnostics {
    type Item = Result<Diagnostic, DiagnosticError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.lines.len() {
            let idx = self.pos;
            self.pos += 1;

            let line = &self.lines[idx];
            let severity = match line.get(..WARNING_PREFIX.len()) {
                Some(WARNING_PREFIX) => Severity::Warning,
                Some(ERROR_PREFIX) => Severity::Error,
                _ => continue,
            };

            let Some(location) = self.lines.get(idx + 1) else {
                return Some(Err(DiagnosticError::MissingLocation { line: idx + 1 }));
            };
            return Some(
                line_number(location)
                    .map(|n| Diagnostic {
                        severity,
                        line: n,
                        message: line.clone(),
                    })
                    .ok_or(DiagnosticError::BadLineNumber { line: idx + 1 }),
            );
        }
        None
    }
}

/// Leading integer after the fixed location prefix
fn line_number(location: &str) -> Option<usize> {
    let rest = location.get(LOCATION_PREFIX.len()..)?;
    rest.split(' ').next()?.parse().ok()
}
