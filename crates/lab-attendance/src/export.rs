//! Report export.
//!
//! Writes every course table to `<output_dir>/<teacher>/<course>.<format>`
//! in each requested format.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use attendance_data::analysis::{AttendanceReport, CourseReport};
use tracing::{error, info, warn};

/// Render `course` in `format` (`csv`, `tsv`, `json`, `yaml` or `html`).
pub fn render(course: &CourseReport, format: &str) -> anyhow::Result<String> {
    match format {
        "csv" => render_delimited(course, b','),
        "tsv" => render_delimited(course, b'\t'),
        "json" => Ok(serde_json::to_string_pretty(course)?),
        "yaml" => Ok(serde_yaml::to_string(course)?),
        "html" => Ok(render_html(course)),
        other => bail!("unsupported report format \"{}\"", other),
    }
}

fn render_delimited(course: &CourseReport, delimiter: u8) -> anyhow::Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer.write_record(&course.headers)?;
    for row in &course.rows {
        writer.write_record(row.cells())?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_html(course: &CourseReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<table>");
    let _ = writeln!(out, "<caption>{}</caption>", escape_html(&course.title));
    let _ = write!(out, "<thead>\n<tr>");
    for header in &course.headers {
        let _ = write!(out, "<th>{}</th>", escape_html(header));
    }
    let _ = writeln!(out, "</tr>\n</thead>");
    for row in &course.rows {
        let _ = write!(out, "<tr>");
        for cell in row.cells() {
            let _ = write!(out, "<td>{}</td>", escape_html(&cell));
        }
        let _ = writeln!(out, "</tr>");
    }
    let _ = writeln!(out, "</table>");
    out
}

/// Replace path separators so a name is safe as a single path component.
fn path_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "_".to_string(),
        other => other.to_string(),
    }
}

/// Write every course of `report` to `output_dir`.
///
/// An existing `output_dir` is removed first.  A format that fails to render
/// or write is logged and skipped.  Returns the paths written.
pub fn save_reports(
    report: &AttendanceReport,
    output_dir: &Path,
    formats: &[String],
) -> anyhow::Result<Vec<PathBuf>> {
    if output_dir.exists() {
        warn!(
            "Directory {} already exists and will be deleted before continuing",
            output_dir.display()
        );
        std::fs::remove_dir_all(output_dir)
            .with_context(|| format!("failed to remove {}", output_dir.display()))?;
    }

    let mut written = Vec::new();
    for course in &report.courses {
        info!("Saving analysis results for {}", course.title);

        let dir = output_dir.join(path_component(&course.teacher));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        for format in formats {
            let path = dir.join(format!("{}.{}", path_component(&course.title), format));
            let result = render(course, format).and_then(|content| {
                std::fs::write(&path, content)
                    .with_context(|| format!("failed to write {}", path.display()))
            });
            match result {
                Ok(()) => written.push(path),
                Err(e) => error!("Failed to export {}: {:#}", path.display(), e),
            }
        }
    }

    Ok(written)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
