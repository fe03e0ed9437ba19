//! Main analysis pipeline.
//!
//! Wires the log parser, the attendance-specific pipeline steps and the
//! aggregator together, returning an [`AttendanceReport`] ready for export.

use attendance_core::config::SemesterConfig;
use attendance_core::error::Result;
use attendance_core::schedule::{Schedule, ScheduleOverrides};
use attendance_core::weeks::{WeekIndex, WeekKey};
use chrono::{Datelike, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregator::{AttendanceAggregator, AttendanceVector, LoginEvent};
use crate::parser::LogParser;
use crate::pipeline::{
    expect_datetime, fields, FieldValue, FilterRecords, Pipeline, Record, RemoveFields,
    ReplaceField, TransformField,
};

/// Session action that counts as a login.
pub const LOGIN_ACTION: &str = "opened";

// ── Attendance steps ──────────────────────────────────────────────────────────

/// Keep only session-open events.
pub fn filter_logins() -> FilterRecords {
    FilterRecords::new("filter_logins", |record| {
        record
            .get(fields::SESSION_ACTION)
            .and_then(FieldValue::as_text)
            == Some(LOGIN_ACTION)
    })
}

/// Move logins made on a make-up day onto the holiday they replace.
pub fn apply_schedule_overrides(overrides: ScheduleOverrides) -> TransformField {
    TransformField::new("apply_schedule_overrides", fields::DATETIME, move |value| {
        let dt = expect_datetime(fields::DATETIME, &value)?;
        Ok(FieldValue::DateTime(overrides.apply(dt)))
    })
}

/// Drop the fields attendance matching never reads.
pub fn remove_unneeded_fields() -> RemoveFields {
    RemoveFields::new(
        "remove_unneeded_fields",
        [fields::COMPUTER_ID, fields::SESSION_ACTION],
    )
}

/// Split `datetime` into ISO year, week number, weekday, date and time.
pub fn explode_datetime() -> ReplaceField {
    ReplaceField::new("explode_datetime", fields::DATETIME, |value| {
        let dt = expect_datetime(fields::DATETIME, &value)?;
        Ok(datetime_parts(dt))
    })
}

fn datetime_parts(dt: NaiveDateTime) -> Record {
    let week = WeekKey::of(dt.date());
    Record::from([
        (fields::YEAR.to_string(), FieldValue::Int(i64::from(week.year))),
        (fields::WEEKNUMBER.to_string(), FieldValue::Int(i64::from(week.week))),
        (
            fields::WEEKDAY.to_string(),
            FieldValue::Int(i64::from(dt.weekday().number_from_monday())),
        ),
        (fields::DATE.to_string(), FieldValue::Date(dt.date())),
        (fields::TIME.to_string(), FieldValue::Time(dt.time())),
    ])
}

/// Steps appended after [`Pipeline::base`] for attendance analysis.
pub fn attendance_steps(overrides: ScheduleOverrides) -> Pipeline {
    Pipeline::new()
        .with_step(filter_logins())
        .with_step(apply_schedule_overrides(overrides))
        .with_step(remove_unneeded_fields())
        .with_step(explode_datetime())
}

// ── Report types ──────────────────────────────────────────────────────────────

/// One student's row in a course report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRow {
    pub student_id: String,
    /// 0/1 per semester week.
    pub weeks: Vec<u8>,
    pub total: u32,
}

impl AttendanceRow {
    fn new(student_id: String, vector: &AttendanceVector) -> Self {
        Self {
            student_id,
            weeks: vector.weeks().to_vec(),
            total: vector.total(),
        }
    }

    /// Row cells in header order: id, one per week, total.
    pub fn cells(&self) -> Vec<String> {
        std::iter::once(self.student_id.clone())
            .chain(self.weeks.iter().map(u8::to_string))
            .chain(std::iter::once(self.total.to_string()))
            .collect()
    }
}

/// Attendance table of one course.
#[derive(Debug, Clone, Serialize)]
pub struct CourseReport {
    /// Course name.
    pub title: String,
    pub teacher: String,
    /// `student id`, `week 01`.., `total`.
    pub headers: Vec<String>,
    /// Sorted by student id.
    pub rows: Vec<AttendanceRow>,
}

impl CourseReport {
    pub fn row(&self, student_id: &str) -> Option<&AttendanceRow> {
        self.rows.iter().find(|r| r.student_id == student_id)
    }
}

/// Counters describing one analysis run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisMetadata {
    pub lines_read: usize,
    pub unrecognized_lines: usize,
    /// Login events that reached the aggregator.
    pub logins: usize,
    /// Logins that matched at least one lab term.
    pub logins_matched: usize,
    /// Matched logins in days past the last semester week column.
    pub logins_unbucketed: usize,
}

/// The complete output of [`AttendanceAnalysis::analyze`].
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceReport {
    /// One report per configured course, ordered by course name.
    pub courses: Vec<CourseReport>,
    /// Lines that did not match the log grammar, terminators stripped.
    pub unrecognized_lines: Vec<String>,
    pub metadata: AnalysisMetadata,
}

impl AttendanceReport {
    pub fn course(&self, title: &str) -> Option<&CourseReport> {
        self.courses.iter().find(|c| c.title == title)
    }
}

// ── AttendanceAnalysis ────────────────────────────────────────────────────────

/// Semester-bound attendance analysis.
///
/// Everything derived from the configuration (schedule, week index, report
/// header) is computed once on construction; a malformed schedule fails here,
/// before any log line is read.
#[derive(Debug)]
pub struct AttendanceAnalysis {
    config: SemesterConfig,
    schedule: Schedule,
    weeks: WeekIndex,
    report_fields: Vec<String>,
    parser: LogParser,
}

impl AttendanceAnalysis {
    /// Default log grammar, base steps followed by [`attendance_steps`].
    pub fn new(config: SemesterConfig) -> Result<Self> {
        Self::with_parser(config, LogParser::new())
    }

    /// Custom parser; [`attendance_steps`] are appended to its pipeline.
    pub fn with_parser(config: SemesterConfig, parser: LogParser) -> Result<Self> {
        Self::build(config, parser, true)
    }

    /// Default log grammar with `pipeline` replacing every built-in step.
    ///
    /// The records `pipeline` produces must carry the fields read by
    /// [`LoginEvent::from_record`].
    pub fn with_pipeline(config: SemesterConfig, pipeline: Pipeline) -> Result<Self> {
        let mut parser = LogParser::new();
        parser.set_pipeline(pipeline);
        Self::build(config, parser, false)
    }

    fn build(
        config: SemesterConfig,
        mut parser: LogParser,
        with_attendance_steps: bool,
    ) -> Result<Self> {
        config.validate()?;
        let schedule = Schedule::from_config(&config)?;
        if with_attendance_steps {
            parser
                .pipeline_mut()
                .extend(attendance_steps(schedule.overrides().clone()));
        }
        let weeks = WeekIndex::from_config(&config);
        let report_fields = weeks.report_fields();

        debug!(
            "Semester {}..{} spans {} weeks; pipeline: {:?}",
            config.semester.start_date,
            config.semester.end_date,
            weeks.len(),
            parser.pipeline().step_names()
        );

        Ok(Self {
            config,
            schedule,
            weeks,
            report_fields,
            parser,
        })
    }

    pub fn config(&self) -> &SemesterConfig {
        &self.config
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn weeks(&self) -> &WeekIndex {
        &self.weeks
    }

    pub fn report_fields(&self) -> &[String] {
        &self.report_fields
    }

    pub fn pipeline(&self) -> &Pipeline {
        self.parser.pipeline()
    }

    /// Run the whole analysis over `lines`.
    ///
    /// Lines are pulled one at a time through parser, pipeline and
    /// aggregator.  The first pipeline error aborts the run.
    pub fn analyze<I, S>(&self, lines: I) -> Result<AttendanceReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.analyze_log(lines.into_iter().map(Ok))
    }

    /// Like [`analyze`](Self::analyze), over fallible lines such as
    /// [`LogLines`](crate::reader::LogLines).  A read error fails the run.
    pub fn analyze_log<I, S>(&self, lines: I) -> Result<AttendanceReport>
    where
        I: IntoIterator<Item = Result<S>>,
        S: AsRef<str>,
    {
        let semester = &self.config.semester;
        let mut aggregator = AttendanceAggregator::new(
            &self.schedule,
            &self.weeks,
            semester.start_date,
            semester.end_date,
            self.config.courses.keys().cloned(),
        );

        let mut unrecognized_lines: Vec<String> = Vec::new();
        let mut lines_read = 0usize;
        let mut read_error = None;
        {
            let lines = lines
                .into_iter()
                .map_while(|line| match line {
                    Ok(line) => Some(line),
                    Err(e) => {
                        read_error = Some(e);
                        None
                    }
                })
                .inspect(|_| lines_read += 1);
            let records = self
                .parser
                .parse(lines, |line| unrecognized_lines.push(line.to_string()));
            for record in records {
                let login = LoginEvent::from_record(&record?)?;
                aggregator.add_login(&login);
            }
        }
        if let Some(e) = read_error {
            return Err(e);
        }

        let (attendance, stats) = aggregator.finish();

        let courses: Vec<CourseReport> = attendance
            .into_iter()
            .map(|(title, students)| CourseReport {
                teacher: self
                    .config
                    .courses
                    .get(&title)
                    .map(|c| c.teacher.clone())
                    .unwrap_or_default(),
                title,
                headers: self.report_fields.clone(),
                rows: students
                    .into_iter()
                    .map(|(student_id, vector)| AttendanceRow::new(student_id, &vector))
                    .collect(),
            })
            .collect();

        let metadata = AnalysisMetadata {
            lines_read,
            unrecognized_lines: unrecognized_lines.len(),
            logins: stats.logins,
            logins_matched: stats.matched,
            logins_unbucketed: stats.unbucketed,
        };

        info!(
            "Analyzed {} lines: {} logins, {} matched a lab, {} unrecognized",
            metadata.lines_read,
            metadata.logins,
            metadata.logins_matched,
            metadata.unrecognized_lines
        );
        if metadata.logins_unbucketed > 0 {
            warn!(
                "{} matched logins fall after the last semester week and are missing from the reports",
                metadata.logins_unbucketed
            );
        }

        Ok(AttendanceReport {
            courses,
            unrecognized_lines,
            metadata,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
