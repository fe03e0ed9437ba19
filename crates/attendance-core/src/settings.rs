use clap::Parser;
use std::path::PathBuf;

/// Default output directory for the exported reports.
pub const DEFAULT_OUTPUT_DIR: &str = "attendance_reports";

/// Report formats the exporter knows how to write.
pub const REPORT_FORMATS: [&str; 5] = ["csv", "tsv", "json", "yaml", "html"];

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Analyzes and reports the lab attendance of students
#[derive(Parser, Debug, Clone)]
#[command(
    name = "lab-attendance",
    about = "Analyzes and reports the lab attendance of students",
    version
)]
pub struct Settings {
    /// Student auth log file, as provided by the lab administrators
    #[arg(value_name = "AUTH_LOG")]
    pub auth_log: PathBuf,

    /// YAML file describing the semester to analyze
    #[arg(value_name = "SEMESTER_CONFIG")]
    pub semester_config: PathBuf,

    /// Output the attendance reports to this directory
    #[arg(short = 'o', long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_to: PathBuf,

    /// Report file format (repeatable)
    #[arg(long = "format", value_parser = REPORT_FORMATS, default_values_t = REPORT_FORMATS.map(String::from))]
    pub formats: Vec<String>,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_paths_and_defaults() {
        let s = Settings::try_parse_from(["lab-attendance", "auth.log", "semester.yml"]).unwrap();
        assert_eq!(s.auth_log, PathBuf::from("auth.log"));
        assert_eq!(s.semester_config, PathBuf::from("semester.yml"));
        assert_eq!(s.output_to, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert_eq!(s.formats, REPORT_FORMATS.to_vec());
        assert_eq!(s.log_level, "INFO");
    }

    #[test]
    fn test_output_dir_and_formats() {
        let s = Settings::try_parse_from([
            "lab-attendance",
            "auth.log",
            "semester.yml",
            "-o",
            "/tmp/out",
            "--format",
            "csv",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(s.output_to, PathBuf::from("/tmp/out"));
        assert_eq!(s.formats, vec!["csv", "json"]);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let res = Settings::try_parse_from([
            "lab-attendance",
            "auth.log",
            "semester.yml",
            "--format",
            "xlsx",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn test_missing_config_path_rejected() {
        assert!(Settings::try_parse_from(["lab-attendance", "auth.log"]).is_err());
    }
}
