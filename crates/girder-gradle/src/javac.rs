//! Incremental parser for javac-style compiler output.
//!
//! Gradle forwards javac diagnostics to its own stderr in the classic
//! three-line shape:
//!
//! ```text
//! /w/app/src/main/java/App.java:12: error: cannot find symbol
//!         frob();
//!         ^
//! ```
//!
//! The parser is fed one line at a time while the process runs and emits a
//! diagnostic as soon as it is complete, so callers see diagnostics in real
//! time. The caret line refines the column of the pending diagnostic; a
//! diagnostic followed by unrelated output is emitted with column zero.

use girder_core::{Diagnostic, Position, Range, Severity};
use std::path::PathBuf;

const SOURCE: &str = "javac";

#[derive(Debug, Default)]
pub struct JavacOutputParser {
    pending: Option<PendingDiagnostic>,
}

#[derive(Debug)]
struct PendingDiagnostic {
    file: PathBuf,
    line: u32,
    severity: Severity,
    message: String,
    saw_snippet: bool,
}

impl JavacOutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one output line. Returns a finished diagnostic when the line
    /// completes one (or proves the pending one will get no caret).
    pub fn push_line(&mut self, line: &str) -> Option<Diagnostic> {
        if let Some(parsed) = parse_header(line) {
            let finished = self.take_pending();
            self.pending = Some(parsed);
            return finished;
        }

        if self.pending.is_none() {
            return None;
        }

        let trimmed = line.trim_end();
        if trimmed.trim_start() == "^" {
            let column = trimmed.find('^').unwrap_or(0) as u32;
            let pending = self.pending.take().expect("pending checked above");
            return Some(finish(pending, column));
        }

        // First non-header line after the header is the source snippet;
        // anything after that means no caret is coming.
        let pending = self.pending.as_mut().expect("pending checked above");
        if !pending.saw_snippet {
            pending.saw_snippet = true;
            return None;
        }
        self.take_pending()
    }

    /// Flush the pending diagnostic at end of stream.
    pub fn finish(&mut self) -> Option<Diagnostic> {
        self.take_pending()
    }

    fn take_pending(&mut self) -> Option<Diagnostic> {
        self.pending.take().map(|pending| finish(pending, 0))
    }
}

fn finish(pending: PendingDiagnostic, column: u32) -> Diagnostic {
    // javac reports 1-based lines; BSP ranges are 0-based.
    let line = pending.line.saturating_sub(1);
    let position = Position::new(line, column);
    Diagnostic::new(
        pending.file,
        Range::new(position, Position::new(line, column + 1)),
        pending.severity,
        pending.message,
        Some(SOURCE.to_string()),
    )
}

fn parse_header(line: &str) -> Option<PendingDiagnostic> {
    // `<path>:<line>: <severity>: <message>` — severity is `error`,
    // `warning`, or `Note`. Windows drive letters contain a colon, so split
    // from the right of the line-number segment.
    let (rest, message) = split_once_any(line, &[": error: ", ": warning: ", ": Note: "])?;
    let severity = if line[rest.len()..].starts_with(": error") {
        Severity::Error
    } else if line[rest.len()..].starts_with(": warning") {
        Severity::Warning
    } else {
        Severity::Information
    };

    let (path, line_number) = rest.rsplit_once(':')?;
    let line_number: u32 = line_number.trim().parse().ok()?;
    if path.is_empty() {
        return None;
    }

    Some(PendingDiagnostic {
        file: PathBuf::from(path),
        line: line_number,
        severity,
        message: message.trim().to_string(),
        saw_snippet: false,
    })
}

fn split_once_any<'a>(line: &'a str, separators: &[&str]) -> Option<(&'a str, &'a str)> {
    for sep in separators {
        if let Some(idx) = line.find(sep) {
            return Some((&line[..idx], &line[idx + sep.len()..]));
        }
    }
    None
}
