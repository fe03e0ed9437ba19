//! Attendance aggregation over semester weeks.
//!
//! Matches each [`LoginEvent`] against the weekly lab [`Schedule`] and marks
//! the student present for that week in every course whose lab term contains
//! the login time.

use std::collections::BTreeMap;

use attendance_core::error::{AttendanceError, Result};
use attendance_core::schedule::Schedule;
use attendance_core::weeks::{WeekIndex, WeekKey};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::{debug, warn};

use crate::pipeline::{fields, FieldValue, Record};

// ── LoginEvent ────────────────────────────────────────────────────────────────

/// A fully transformed login record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginEvent {
    pub student_id: String,
    /// ISO week-based year.
    pub year: i32,
    /// ISO week number, 1–53.
    pub weeknumber: u32,
    /// ISO weekday, 1 = Monday .. 7 = Sunday.
    pub weekday: u32,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl LoginEvent {
    pub fn week(&self) -> WeekKey {
        WeekKey::new(self.year, self.weeknumber)
    }

    /// Read the event out of a record that went through the attendance steps.
    pub fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            student_id: field(record, fields::STUDENT_ID, "text", |v| {
                v.as_text().map(str::to_string)
            })?,
            year: field(record, fields::YEAR, "integer", |v| {
                v.as_int().and_then(|n| i32::try_from(n).ok())
            })?,
            weeknumber: field(record, fields::WEEKNUMBER, "integer", |v| {
                v.as_int().and_then(|n| u32::try_from(n).ok())
            })?,
            weekday: field(record, fields::WEEKDAY, "integer", |v| {
                v.as_int().and_then(|n| u32::try_from(n).ok())
            })?,
            date: field(record, fields::DATE, "date", FieldValue::as_date)?,
            time: field(record, fields::TIME, "time", FieldValue::as_time)?,
        })
    }
}

fn field<T>(
    record: &Record,
    key: &str,
    expected: &'static str,
    extract: impl Fn(&FieldValue) -> Option<T>,
) -> Result<T> {
    let value = record
        .get(key)
        .ok_or_else(|| AttendanceError::MissingField(key.to_string()))?;
    extract(value).ok_or_else(|| AttendanceError::FieldType {
        field: key.to_string(),
        expected,
    })
}

// ── AttendanceVector ──────────────────────────────────────────────────────────

/// Per-week presence (0/1) of one student in one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceVector {
    weeks: Vec<u8>,
}

impl AttendanceVector {
    /// All-absent vector for a semester of `len` weeks.
    pub fn new(len: usize) -> Self {
        Self {
            weeks: vec![0; len],
        }
    }

    /// Mark week `idx` as attended.  Marking twice is a no-op.
    pub fn mark(&mut self, idx: usize) {
        if let Some(slot) = self.weeks.get_mut(idx) {
            *slot = 1;
        }
    }

    pub fn weeks(&self) -> &[u8] {
        &self.weeks
    }

    /// Number of attended weeks.
    pub fn total(&self) -> u32 {
        self.weeks.iter().map(|&w| u32::from(w)).sum()
    }
}

// ── AggregationStats ──────────────────────────────────────────────────────────

/// Counters collected while aggregating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregationStats {
    /// Login events fed to the aggregator.
    pub logins: usize,
    /// Logins that matched at least one lab term.
    pub matched: usize,
    /// Logins that matched a term but fell outside every report week.
    pub unbucketed: usize,
}

// ── AttendanceAggregator ──────────────────────────────────────────────────────

/// Course → student → attendance vector, built one login at a time.
pub struct AttendanceAggregator<'s> {
    schedule: &'s Schedule,
    weeks: &'s WeekIndex,
    start: NaiveDate,
    end: NaiveDate,
    courses: BTreeMap<String, BTreeMap<String, AttendanceVector>>,
    stats: AggregationStats,
}

impl<'s> AttendanceAggregator<'s> {
    /// Create an aggregator for the semester `[start, end]`.
    ///
    /// Every name in `courses` gets a (possibly empty) entry in the result.
    pub fn new(
        schedule: &'s Schedule,
        weeks: &'s WeekIndex,
        start: NaiveDate,
        end: NaiveDate,
        courses: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            schedule,
            weeks,
            start,
            end,
            courses: courses
                .into_iter()
                .map(|name| (name, BTreeMap::new()))
                .collect(),
            stats: AggregationStats::default(),
        }
    }

    /// Record one login, marking every course whose term contains it.
    ///
    /// Returns the number of courses marked.
    pub fn add_login(&mut self, login: &LoginEvent) -> usize {
        self.stats.logins += 1;

        if login.date < self.start || login.date > self.end {
            return 0;
        }

        let mut marked = 0;
        let mut matched = false;
        for term in self.schedule.terms_for(login.weekday) {
            if !term.contains(login.time) {
                continue;
            }
            matched = true;

            let Some(idx) = self.weeks.bucket(login.week()) else {
                warn!(
                    "Login of {} on {} has no semester week column; not counted",
                    login.student_id, login.date
                );
                continue;
            };

            let len = self.weeks.len();
            self.courses
                .entry(term.course.clone())
                .or_default()
                .entry(login.student_id.clone())
                .or_insert_with(|| AttendanceVector::new(len))
                .mark(idx);
            marked += 1;
        }

        if matched {
            self.stats.matched += 1;
            if marked == 0 {
                self.stats.unbucketed += 1;
            }
        }
        marked
    }

    /// Finish aggregation.  Students are ordered by id within each course.
    pub fn finish(self) -> (BTreeMap<String, BTreeMap<String, AttendanceVector>>, AggregationStats) {
        debug!(
            "Aggregated {} logins, {} matched a lab term",
            self.stats.logins, self.stats.matched
        );
        (self.courses, self.stats)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use attendance_core::config::SemesterConfig;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn login(student: &str, d: NaiveDate, t: NaiveTime) -> LoginEvent {
        let key = WeekKey::of(d);
        LoginEvent {
            student_id: student.to_string(),
            year: key.year,
            weeknumber: key.week,
            weekday: chrono::Datelike::weekday(&d).number_from_monday(),
            date: d,
            time: t,
        }
    }

    /// Two-week semester from Monday 2024-01-08 with overlapping Monday labs.
    fn fixture() -> (SemesterConfig, Schedule, WeekIndex) {
        let config = SemesterConfig::from_yaml_str(
            r#"
semester:
  start_date: 2024-01-08
  end_date: 2024-01-21
courses:
  CS101:
    teacher: Jane Doe
    weekly_lab_schedule:
      monday: ["09:00-10:00"]
  CS102:
    teacher: John Roe
    weekly_lab_schedule:
      monday: ["09:30-11:00"]
      wednesday: ["14:00-15:00"]
  CS103:
    teacher: Ann Poe
    weekly_lab_schedule:
      friday: ["08:00-09:00"]
"#,
        )
        .unwrap();
        let schedule = Schedule::from_config(&config).unwrap();
        let weeks = WeekIndex::from_config(&config);
        (config, schedule, weeks)
    }

    fn aggregator<'s>(
        config: &SemesterConfig,
        schedule: &'s Schedule,
        weeks: &'s WeekIndex,
    ) -> AttendanceAggregator<'s> {
        AttendanceAggregator::new(
            schedule,
            weeks,
            config.semester.start_date,
            config.semester.end_date,
            config.courses.keys().cloned(),
        )
    }

    // ── add_login ─────────────────────────────────────────────────────────────

    #[test]
    fn test_single_login_marks_week() {
        let (config, schedule, weeks) = fixture();
        let mut agg = aggregator(&config, &schedule, &weeks);

        assert_eq!(agg.add_login(&login("alice", date(2024, 1, 8), time(9, 5))), 1);

        let (courses, _) = agg.finish();
        assert_eq!(courses["CS101"]["alice"].weeks(), &[1, 0]);
        assert_eq!(courses["CS101"]["alice"].total(), 1);
        assert!(courses["CS102"].is_empty());
        assert!(courses["CS103"].is_empty());
    }

    #[test]
    fn test_overlapping_terms_mark_all_courses() {
        let (config, schedule, weeks) = fixture();
        let mut agg = aggregator(&config, &schedule, &weeks);

        assert_eq!(agg.add_login(&login("bob", date(2024, 1, 15), time(9, 45))), 2);

        let (courses, _) = agg.finish();
        assert_eq!(courses["CS101"]["bob"].weeks(), &[0, 1]);
        assert_eq!(courses["CS102"]["bob"].weeks(), &[0, 1]);
    }

    #[test]
    fn test_repeated_login_is_idempotent() {
        let (config, schedule, weeks) = fixture();

        let mut once = aggregator(&config, &schedule, &weeks);
        once.add_login(&login("alice", date(2024, 1, 8), time(9, 5)));

        let mut twice = aggregator(&config, &schedule, &weeks);
        twice.add_login(&login("alice", date(2024, 1, 8), time(9, 5)));
        twice.add_login(&login("alice", date(2024, 1, 8), time(9, 10)));

        assert_eq!(once.finish().0, twice.finish().0);
    }

    #[test]
    fn test_term_bounds_inclusive() {
        let (config, schedule, weeks) = fixture();
        let mut agg = aggregator(&config, &schedule, &weeks);

        assert_eq!(agg.add_login(&login("a", date(2024, 1, 8), time(9, 0))), 1);
        assert_eq!(agg.add_login(&login("b", date(2024, 1, 8), time(11, 0))), 1);
        assert_eq!(agg.add_login(&login("c", date(2024, 1, 8), time(8, 59))), 0);
        assert_eq!(
            agg.add_login(&login(
                "d",
                date(2024, 1, 8),
                NaiveTime::from_hms_opt(11, 0, 1).unwrap()
            )),
            0
        );
    }

    #[test]
    fn test_login_outside_semester_ignored() {
        let (config, schedule, weeks) = fixture();
        let mut agg = aggregator(&config, &schedule, &weeks);

        assert_eq!(agg.add_login(&login("alice", date(2024, 1, 1), time(9, 5))), 0);
        assert_eq!(agg.add_login(&login("alice", date(2024, 1, 22), time(9, 5))), 0);

        let (courses, stats) = agg.finish();
        assert!(courses["CS101"].is_empty());
        assert_eq!(stats.logins, 2);
        assert_eq!(stats.matched, 0);
    }

    #[test]
    fn test_login_on_unscheduled_day_ignored() {
        let (config, schedule, weeks) = fixture();
        let mut agg = aggregator(&config, &schedule, &weeks);
        assert_eq!(agg.add_login(&login("alice", date(2024, 1, 9), time(9, 5))), 0);
    }

    #[test]
    fn test_unbucketed_login_counted() {
        // Semester Friday 2024-01-12 .. Monday 2024-01-22: weeks (2024, 2) and
        // (2024, 3) only, so Monday the 22nd (week 4) has no column.
        let config = SemesterConfig::from_yaml_str(
            r#"
semester:
  start_date: 2024-01-12
  end_date: 2024-01-22
courses:
  CS101:
    teacher: Jane Doe
    weekly_lab_schedule:
      monday: ["09:00-10:00"]
"#,
        )
        .unwrap();
        let schedule = Schedule::from_config(&config).unwrap();
        let weeks = WeekIndex::from_config(&config);
        let mut agg = aggregator(&config, &schedule, &weeks);

        assert_eq!(agg.add_login(&login("alice", date(2024, 1, 22), time(9, 5))), 0);
        let (courses, stats) = agg.finish();
        assert_eq!(stats.matched, 1);
        assert_eq!(stats.unbucketed, 1);
        assert!(courses["CS101"].is_empty());
    }

    // ── LoginEvent::from_record ───────────────────────────────────────────────

    #[test]
    fn test_from_record() {
        let record = Record::from([
            (fields::STUDENT_ID.to_string(), FieldValue::from("alice")),
            (fields::YEAR.to_string(), FieldValue::Int(2024)),
            (fields::WEEKNUMBER.to_string(), FieldValue::Int(2)),
            (fields::WEEKDAY.to_string(), FieldValue::Int(1)),
            (fields::DATE.to_string(), FieldValue::Date(date(2024, 1, 8))),
            (fields::TIME.to_string(), FieldValue::Time(time(9, 5))),
        ]);
        let event = LoginEvent::from_record(&record).unwrap();
        assert_eq!(event, login("alice", date(2024, 1, 8), time(9, 5)));
        assert_eq!(event.week(), WeekKey::new(2024, 2));
    }

    #[test]
    fn test_from_record_missing_field() {
        let record = Record::from([(fields::STUDENT_ID.to_string(), FieldValue::from("alice"))]);
        assert!(matches!(
            LoginEvent::from_record(&record),
            Err(AttendanceError::MissingField(f)) if f == fields::YEAR
        ));
    }

    #[test]
    fn test_from_record_wrong_type() {
        let record = Record::from([
            (fields::STUDENT_ID.to_string(), FieldValue::Int(7)),
        ]);
        assert!(matches!(
            LoginEvent::from_record(&record),
            Err(AttendanceError::FieldType { .. })
        ));
    }

    // ── AttendanceVector ──────────────────────────────────────────────────────

    #[test]
    fn test_vector_mark_out_of_range_is_ignored() {
        let mut v = AttendanceVector::new(2);
        v.mark(5);
        v.mark(1);
        v.mark(1);
        assert_eq!(v.weeks(), &[0, 1]);
        assert_eq!(v.total(), 1);
    }
}
