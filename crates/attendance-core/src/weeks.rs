use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::config::SemesterConfig;

// ── WeekKey ───────────────────────────────────────────────────────────────────

/// An ISO week: ISO week-based year plus week number (1–53).
///
/// Orders chronologically, year first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WeekKey {
    pub year: i32,
    pub week: u32,
}

impl WeekKey {
    pub fn new(year: i32, week: u32) -> Self {
        Self { year, week }
    }

    /// The ISO week containing `date`.
    ///
    /// 2024-12-30 is a Monday of ISO week 1 of 2025, so it maps to `(2025, 1)`.
    pub fn of(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }
}

// ── WeekIndex ─────────────────────────────────────────────────────────────────

/// Ordered ISO weeks of a semester, one report column each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeekIndex {
    weeks: Vec<WeekKey>,
}

impl WeekIndex {
    /// Step from `start` in 7-day increments, recording each visited week,
    /// until the stepped date passes `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        let mut weeks = Vec::new();
        let mut current = Some(start);
        while let Some(date) = current.filter(|d| *d <= end) {
            weeks.push(WeekKey::of(date));
            current = date.checked_add_days(Days::new(7));
        }
        Self { weeks }
    }

    pub fn from_config(config: &SemesterConfig) -> Self {
        Self::new(config.semester.start_date, config.semester.end_date)
    }

    pub fn len(&self) -> usize {
        self.weeks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weeks.is_empty()
    }

    pub fn weeks(&self) -> &[WeekKey] {
        &self.weeks
    }

    /// Index of the first week `>= key`; equals `len()` when every week is
    /// earlier than `key`.
    pub fn lower_bound(&self, key: WeekKey) -> usize {
        self.weeks.partition_point(|w| *w < key)
    }

    /// Report column for `key`.
    ///
    /// Weeks between two indexed weeks go to the later one.  Keys before the
    /// first week or after the last one have no column.
    pub fn bucket(&self, key: WeekKey) -> Option<usize> {
        let first = self.weeks.first()?;
        if key < *first {
            return None;
        }
        let idx = self.lower_bound(key);
        (idx < self.weeks.len()).then_some(idx)
    }

    /// Report header: `student id`, `week 01`.., `total`.
    pub fn report_fields(&self) -> Vec<String> {
        std::iter::once("student id".to_string())
            .chain((1..=self.weeks.len()).map(|n| format!("week {:02}", n)))
            .chain(std::iter::once("total".to_string()))
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_week_key_of_year_boundary() {
        // Monday 2024-12-30 opens ISO week 1 of 2025.
        assert_eq!(WeekKey::of(date(2024, 12, 30)), WeekKey::new(2025, 1));
        // Friday 2021-01-01 is still in ISO week 53 of 2020.
        assert_eq!(WeekKey::of(date(2021, 1, 1)), WeekKey::new(2020, 53));
    }

    #[test]
    fn test_two_week_semester() {
        let index = WeekIndex::new(date(2024, 1, 8), date(2024, 1, 21));
        assert_eq!(
            index.weeks(),
            &[WeekKey::new(2024, 2), WeekKey::new(2024, 3)]
        );
    }

    #[test]
    fn test_single_day_semester() {
        let index = WeekIndex::new(date(2024, 1, 10), date(2024, 1, 10));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_spans_year_boundary() {
        let index = WeekIndex::new(date(2020, 12, 14), date(2021, 1, 17));
        assert_eq!(
            index.weeks(),
            &[
                WeekKey::new(2020, 51),
                WeekKey::new(2020, 52),
                WeekKey::new(2020, 53),
                WeekKey::new(2021, 1),
                WeekKey::new(2021, 2),
            ]
        );
    }

    #[test]
    fn test_length_matches_distinct_weeks_touched() {
        let start = date(2023, 9, 27);
        let end = date(2024, 2, 2);
        let index = WeekIndex::new(start, end);

        let mut touched = HashSet::new();
        let mut d = start;
        while d <= end {
            touched.insert(WeekKey::of(d));
            d = d + Days::new(7);
        }

        assert_eq!(index.len(), touched.len());
        assert!(index.weeks().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_bucket_exact_and_lower_bound() {
        let index = WeekIndex::new(date(2024, 1, 8), date(2024, 2, 4));
        assert_eq!(index.bucket(WeekKey::new(2024, 2)), Some(0));
        assert_eq!(index.bucket(WeekKey::new(2024, 5)), Some(3));

        // A gap in the index attributes to the next indexed week.
        let sparse = WeekIndex {
            weeks: vec![WeekKey::new(2024, 2), WeekKey::new(2024, 4)],
        };
        assert_eq!(sparse.bucket(WeekKey::new(2024, 3)), Some(1));
    }

    #[test]
    fn test_bucket_outside_semester() {
        let index = WeekIndex::new(date(2024, 1, 8), date(2024, 1, 21));
        assert_eq!(index.bucket(WeekKey::new(2024, 1)), None);
        assert_eq!(index.bucket(WeekKey::new(2023, 52)), None);
        assert_eq!(index.bucket(WeekKey::new(2024, 4)), None);
        assert_eq!(index.lower_bound(WeekKey::new(2024, 4)), 2);
    }

    #[test]
    fn test_bucket_empty_index() {
        assert_eq!(WeekIndex::default().bucket(WeekKey::new(2024, 2)), None);
    }

    #[test]
    fn test_report_fields() {
        let index = WeekIndex::new(date(2024, 1, 8), date(2024, 1, 21));
        assert_eq!(
            index.report_fields(),
            vec!["student id", "week 01", "week 02", "total"]
        );
    }
}
