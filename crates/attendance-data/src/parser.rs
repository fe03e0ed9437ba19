//! Auth log line parser.
//!
//! Recognises `lightdm`-style PAM session lines, e.g.
//!
//! ```text
//! 2024-01-08 09:05:00 192.168.18.101 lightdm: pam_unix(lightdm:session): session opened for user alice by (uid=0)
//! ```
//!
//! and turns each into a [`Record`] of raw text fields, then runs the
//! records through the parser's [`Pipeline`].

use attendance_core::error::{AttendanceError, Result};
use regex::Regex;
use tracing::warn;

use crate::pipeline::{fields, FieldValue, Pipeline, Record, RecordStream};

/// Grammar of an auth log session line.  Anchored to the whole line.
pub const DEFAULT_LOG_PATTERN: &str = concat!(
    r"^(?P<datetime>.+?) (?:\d{1,3}\.){3}(?P<computer_id>\d{1,3}) ",
    r"(?P<service>.+?): session (?P<session_action>[a-z]+) ",
    r"for user\s+(?P<student_id>\S+)\s*(?:by \(uid=\d+\))?$",
);

/// Named groups every log pattern must define.
const CAPTURED_FIELDS: [&str; 4] = [
    fields::DATETIME,
    fields::COMPUTER_ID,
    fields::SESSION_ACTION,
    fields::STUDENT_ID,
];

/// Strip a trailing `\n` or `\r\n`.
fn strip_line_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

// ── LogParser ─────────────────────────────────────────────────────────────────

/// Matches raw log lines against a fixed grammar and transforms the result.
pub struct LogParser {
    pattern: Regex,
    pipeline: Pipeline,
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser {
    /// Parser for the default grammar with the [`Pipeline::base`] steps.
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_LOG_PATTERN).expect("regex is valid"),
            pipeline: Pipeline::base(),
        }
    }

    /// Parser for an alternate log format.
    ///
    /// `pattern` must define the `datetime`, `computer_id`, `session_action`
    /// and `student_id` named groups.
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| AttendanceError::LogPattern(e.to_string()))?;
        let names: Vec<&str> = regex.capture_names().flatten().collect();
        if let Some(missing) = CAPTURED_FIELDS.iter().find(|f| !names.contains(*f)) {
            return Err(AttendanceError::LogPattern(format!(
                "missing named group {}",
                missing
            )));
        }
        Ok(Self {
            pattern: regex,
            pipeline: Pipeline::base(),
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// Replace the whole transformation pipeline.
    pub fn set_pipeline(&mut self, pipeline: Pipeline) {
        self.pipeline = pipeline;
    }

    /// Match one line.  Returns `None` when it does not fit the grammar.
    ///
    /// Captured values are kept verbatim.
    pub fn parse_line(&self, line: &str) -> Option<Record> {
        let caps = self.pattern.captures(strip_line_terminator(line))?;
        let record = CAPTURED_FIELDS
            .iter()
            .filter_map(|field| {
                caps.name(field)
                    .map(|m| (field.to_string(), FieldValue::from(m.as_str())))
            })
            .collect();
        Some(record)
    }

    /// Lazily match `lines`, skipping and reporting the ones that don't fit.
    ///
    /// Every unrecognised line is logged and handed to `on_unknown` without its
    /// line terminator.
    pub fn parse_lines<'a, I, S, F>(
        &'a self,
        lines: I,
        mut on_unknown: F,
    ) -> impl Iterator<Item = Record> + 'a
    where
        I: IntoIterator<Item = S>,
        I::IntoIter: 'a,
        S: AsRef<str>,
        F: FnMut(&str) + 'a,
    {
        lines.into_iter().filter_map(move |line| {
            let line = line.as_ref();
            let record = self.parse_line(line);
            if record.is_none() {
                let trimmed = strip_line_terminator(line);
                warn!("Unknown line found while parsing: {}", trimmed);
                on_unknown(trimmed);
            }
            record
        })
    }

    /// Match `lines` and run the matches through the pipeline.
    pub fn parse<'a, I, S, F>(&'a self, lines: I, on_unknown: F) -> RecordStream<'a>
    where
        I: IntoIterator<Item = S>,
        I::IntoIter: 'a,
        S: AsRef<str>,
        F: FnMut(&str) + 'a,
    {
        let records = self
            .parse_lines(lines, on_unknown)
            .map(Ok::<Record, AttendanceError>);
        self.pipeline.apply(Box::new(records))
    }
}

impl std::fmt::Debug for LogParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogParser")
            .field("pattern", &self.pattern.as_str())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
