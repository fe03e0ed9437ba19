mod bootstrap;
mod export;

use anyhow::{Context, Result};
use attendance_core::config::SemesterConfig;
use attendance_core::settings::Settings;
use attendance_data::analysis::AttendanceAnalysis;
use attendance_data::reader::read_log_lines;
use clap::Parser;

fn main() -> Result<()> {
    let settings = Settings::parse();

    bootstrap::setup_logging(&settings.log_level)?;

    tracing::info!("Lab attendance v{} starting", env!("CARGO_PKG_VERSION"));

    let config = SemesterConfig::load(&settings.semester_config).with_context(|| {
        format!(
            "failed to load semester config {}",
            settings.semester_config.display()
        )
    })?;
    let analysis = AttendanceAnalysis::new(config)?;

    let lines = read_log_lines(&settings.auth_log)?;

    tracing::info!("Analyzing the student auth logs, this might take a while...");
    let report = analysis.analyze_log(lines)?;

    let written = export::save_reports(&report, &settings.output_to, &settings.formats)?;

    println!(
        "Analyzed {} log lines ({} unrecognized); wrote {} report files to {}.",
        report.metadata.lines_read,
        report.metadata.unrecognized_lines,
        written.len(),
        settings.output_to.display()
    );
    if report.metadata.logins_unbucketed > 0 {
        println!(
            "{} lab logins fell after the last semester week and were not counted.",
            report.metadata.logins_unbucketed
        );
    }

    Ok(())
}
