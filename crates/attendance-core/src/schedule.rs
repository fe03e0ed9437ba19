//! Weekly lab schedule derived from the semester configuration.
//!
//! [`Schedule::from_config`] builds, once per configuration, the
//! weekday → lab terms table used to match logins, with every term already
//! widened by the configured login time spread.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

use crate::config::{ScheduleOverride, SemesterConfig};
use crate::error::{AttendanceError, Result};

/// English weekday names in ISO order (index 0 is ISO weekday 1).
pub const WEEKDAY_NAMES: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// ISO weekday number (1 = Monday .. 7 = Sunday) for a case-insensitive name.
pub fn weekday_from_name(name: &str) -> Option<u32> {
    let lower = name.trim().to_lowercase();
    WEEKDAY_NAMES
        .iter()
        .position(|day| *day == lower)
        .map(|idx| idx as u32 + 1)
}

/// Parse a `"HH:MM-HH:MM"` term into its start and end time.
///
/// Whitespace around either part is ignored.  Returns `None` unless there are
/// exactly two valid time tokens.
pub fn parse_term(raw: &str) -> Option<(NaiveTime, NaiveTime)> {
    let parts: Vec<&str> = raw.split('-').collect();
    let [start, end] = parts.as_slice() else {
        return None;
    };
    let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?;
    Some((start, end))
}

// ── LabTerm ───────────────────────────────────────────────────────────────────

/// One scheduled lab session of a course on some weekday.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabTerm {
    pub course: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl LabTerm {
    /// Whether `time` falls inside `[start, end]`.
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }

    /// Move the start earlier and the end later by `spread`.
    ///
    /// Clamps at the day boundaries rather than wrapping past midnight.
    fn widened(self, spread: TimeDelta) -> Self {
        let (start, start_overflow) = self.start.overflowing_sub_signed(spread);
        let (end, end_overflow) = self.end.overflowing_add_signed(spread);
        Self {
            course: self.course,
            start: if start_overflow != 0 { NaiveTime::MIN } else { start },
            end: if end_overflow != 0 { last_instant_of_day() } else { end },
        }
    }
}

fn last_instant_of_day() -> NaiveTime {
    NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN)
}

// ── ScheduleOverrides ─────────────────────────────────────────────────────────

/// Date remapping rules for holidays whose labs were made up on another day.
#[derive(Debug, Clone, Default)]
pub struct ScheduleOverrides {
    overrides: Vec<ScheduleOverride>,
}

impl ScheduleOverrides {
    pub fn new(overrides: Vec<ScheduleOverride>) -> Self {
        Self { overrides }
    }

    /// First override whose `completed_on` is `date`.
    pub fn find(&self, date: NaiveDate) -> Option<&ScheduleOverride> {
        self.overrides.iter().find(|o| o.completed_on == date)
    }

    /// Swap the date of `dt` for the matching holiday date, keeping the time.
    ///
    /// Timestamps with no matching override pass through unchanged.
    pub fn apply(&self, dt: NaiveDateTime) -> NaiveDateTime {
        match self.find(dt.date()) {
            Some(o) => o.holiday_date.and_time(dt.time()),
            None => dt,
        }
    }
}

// ── Schedule ──────────────────────────────────────────────────────────────────

/// Lab terms of every course, grouped by ISO weekday.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    weekday_terms: BTreeMap<u32, Vec<LabTerm>>,
    overrides: ScheduleOverrides,
}

impl Schedule {
    /// Build the schedule, failing on unknown weekday names or malformed terms.
    pub fn from_config(config: &SemesterConfig) -> Result<Self> {
        let spread = config.extra_settings.login_time_spread();
        let mut weekday_terms: BTreeMap<u32, Vec<LabTerm>> = BTreeMap::new();

        for (course_name, course) in &config.courses {
            for (weekday_name, terms) in &course.weekly_lab_schedule {
                let weekday = weekday_from_name(weekday_name).ok_or_else(|| {
                    AttendanceError::Config(format!(
                        "unknown weekday \"{}\" in course {}",
                        weekday_name, course_name
                    ))
                })?;

                for raw in terms {
                    let (start, end) =
                        parse_term(raw).ok_or_else(|| AttendanceError::InvalidLabTerm {
                            course: course_name.clone(),
                            weekday: weekday_name.clone(),
                            term: raw.clone(),
                        })?;
                    let term = LabTerm {
                        course: course_name.clone(),
                        start,
                        end,
                    };
                    // Zero spread keeps the parsed term as-is.
                    let term = if spread.is_zero() {
                        term
                    } else {
                        term.widened(spread)
                    };
                    weekday_terms.entry(weekday).or_default().push(term);
                }
            }
        }

        Ok(Self {
            weekday_terms,
            overrides: ScheduleOverrides::new(config.semester.schedule_overrides.clone()),
        })
    }

    /// Lab terms held on ISO `weekday`; empty when there are none.
    pub fn terms_for(&self, weekday: u32) -> &[LabTerm] {
        self.weekday_terms
            .get(&weekday)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn overrides(&self) -> &ScheduleOverrides {
        &self.overrides
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
