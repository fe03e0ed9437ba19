//! Semester configuration model.
//!
//! [`SemesterConfig::load`] reads the YAML document that describes one
//! semester: its bounds, holiday overrides, the courses with their weekly lab
//! schedule, and a few extra tuning knobs.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AttendanceError, Result};

/// Largest accepted login time spread, in seconds.
const MAX_LOGIN_TIME_SPREAD_SECS: u64 = 24 * 60 * 60;

// ── Config types ──────────────────────────────────────────────────────────────

/// Top-level semester configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemesterConfig {
    pub semester: Semester,
    /// Courses keyed by course name.
    #[serde(default)]
    pub courses: BTreeMap<String, Course>,
    #[serde(default)]
    pub extra_settings: ExtraSettings,
}

/// `semester:` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Semester {
    /// First day of the semester (inclusive).
    pub start_date: NaiveDate,
    /// Last day of the semester (inclusive).
    pub end_date: NaiveDate,
    #[serde(default)]
    pub schedule_overrides: Vec<ScheduleOverride>,
}

/// Labs held on `completed_on` follow the schedule of `holiday_date`.
///
/// Used when a holiday cancels a lab day and the lab is made up later, e.g.
/// a Monday holiday whose labs are completed on the following Tuesday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleOverride {
    pub completed_on: NaiveDate,
    pub holiday_date: NaiveDate,
}

/// One course entry under `courses:`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub teacher: String,
    /// Weekday name (`monday`..`sunday`) → list of `"HH:MM-HH:MM"` terms.
    #[serde(default)]
    pub weekly_lab_schedule: BTreeMap<String, Vec<String>>,
}

/// `extra_settings:` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtraSettings {
    /// Seconds by which every lab term is widened on both ends.
    #[serde(default)]
    pub student_login_time_spread: u64,
}

impl ExtraSettings {
    pub fn login_time_spread(&self) -> TimeDelta {
        TimeDelta::seconds(self.student_login_time_spread.min(MAX_LOGIN_TIME_SPREAD_SECS) as i64)
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl SemesterConfig {
    /// Load and validate the configuration stored at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|source| AttendanceError::FileRead {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate a configuration held in memory.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: SemesterConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the constraints serde cannot express.
    ///
    /// Lab terms and weekday names are checked when the schedule is built.
    pub fn validate(&self) -> Result<()> {
        if self.semester.start_date > self.semester.end_date {
            return Err(AttendanceError::Config(format!(
                "semester start date {} is after its end date {}",
                self.semester.start_date, self.semester.end_date
            )));
        }

        if self.extra_settings.student_login_time_spread > MAX_LOGIN_TIME_SPREAD_SECS {
            return Err(AttendanceError::Config(format!(
                "student_login_time_spread of {}s exceeds one day",
                self.extra_settings.student_login_time_spread
            )));
        }

        let mut seen: HashSet<NaiveDate> = HashSet::new();
        for o in &self.semester.schedule_overrides {
            if !seen.insert(o.completed_on) {
                warn!(
                    "Multiple schedule overrides for {}; only the first one is used",
                    o.completed_on
                );
            }
        }

        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
