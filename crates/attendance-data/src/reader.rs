//! Auth log file loading.
//!
//! Streams the lines of a log file one at a time so the whole file never has
//! to sit in memory.  Bytes that are not valid UTF-8 are replaced rather than
//! rejected; a failed read is yielded as [`AttendanceError::Io`] and ends the
//! stream.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use attendance_core::error::{AttendanceError, Result};
use tracing::debug;

// ── Public API ────────────────────────────────────────────────────────────────

/// Open `path` and return a lazy iterator over its lines.
pub fn read_log_lines(path: &Path) -> Result<LogLines<BufReader<File>>> {
    let file = File::open(path).map_err(|source| AttendanceError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Reading auth log {}", path.display());
    Ok(LogLines::new(
        BufReader::new(file),
        path.display().to_string(),
    ))
}

// ── LogLines ──────────────────────────────────────────────────────────────────

/// Lines of a buffered reader, terminators stripped.
///
/// A read error is yielded once, after which the stream is exhausted.
#[derive(Debug)]
pub struct LogLines<R> {
    reader: R,
    source: String,
    buf: Vec<u8>,
    lines_read: usize,
    done: bool,
}

impl<R: BufRead> LogLines<R> {
    pub fn new(reader: R, source: impl Into<String>) -> Self {
        Self {
            reader,
            source: source.into(),
            buf: Vec::new(),
            lines_read: 0,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for LogLines<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Result<String>> {
        if self.done {
            return None;
        }

        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
                self.lines_read += 1;
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => {
                debug!(
                    "Failed to read {} after {} lines: {}",
                    self.source, self.lines_read, e
                );
                self.done = true;
                Some(Err(AttendanceError::Io(e)))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_log_lines_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "first line").unwrap();
        writeln!(file, "second line").unwrap();

        let lines: Vec<String> = read_log_lines(file.path())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(lines, vec!["first line", "second line"]);
    }

    #[test]
    fn test_read_log_lines_missing_file() {
        let err = read_log_lines(Path::new("/tmp/no-such-auth-log-xyz.log")).unwrap_err();
        assert!(matches!(err, AttendanceError::FileRead { .. }));
    }

    #[test]
    fn test_crlf_and_missing_final_newline() {
        let lines: Vec<String> = LogLines::new(Cursor::new("a\r\nb\nc"), "mem")
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let lines: Vec<String> = LogLines::new(Cursor::new(b"ok\n\xffbad\n".to_vec()), "mem")
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("bad"));
    }

    /// Serves `data`, then fails every read.
    struct FailingReader {
        data: Cursor<Vec<u8>>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(std::io::Error::other("disk gone")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn test_read_error_is_yielded_then_stream_ends() {
        let reader = FailingReader {
            data: Cursor::new(b"first\n".to_vec()),
        };
        let mut lines = LogLines::new(BufReader::new(reader), "broken");

        assert_eq!(lines.next().unwrap().unwrap(), "first");
        assert!(matches!(lines.next(), Some(Err(AttendanceError::Io(_)))));
        assert!(lines.next().is_none());
    }
}
