//! Field transformation pipeline applied to parsed log records.
//!
//! A [`Pipeline`] is an ordered list of [`Transformation`] steps.  Each step
//! wraps the incoming lazy record stream in a new one, so every record flows
//! through all steps before the next log line is read.  Steps are built from
//! four primitives: [`TransformField`], [`ReplaceField`], [`RemoveFields`]
//! and [`FilterRecords`].

use std::collections::BTreeMap;
use std::rc::Rc;

use attendance_core::error::{AttendanceError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Timestamp layout used by the auth log.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Record field names shared by the parser, the pipeline and the aggregator.
pub mod fields {
    pub const DATETIME: &str = "datetime";
    pub const COMPUTER_ID: &str = "computer_id";
    pub const SESSION_ACTION: &str = "session_action";
    pub const STUDENT_ID: &str = "student_id";
    pub const YEAR: &str = "year";
    pub const WEEKNUMBER: &str = "weeknumber";
    pub const WEEKDAY: &str = "weekday";
    pub const DATE: &str = "date";
    pub const TIME: &str = "time";
}

// ── FieldValue / Record ───────────────────────────────────────────────────────

/// Value of a single record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            FieldValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            FieldValue::Time(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

/// A parsed log line: field name → value.
pub type Record = BTreeMap<String, FieldValue>;

/// Lazy, single-pass stream of records.  An `Err` item is fatal for the run.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<Record>> + 'a>;

// ── Transformation ────────────────────────────────────────────────────────────

/// One step of a [`Pipeline`].
pub trait Transformation {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Wrap `records` in the stream this step produces.
    fn apply<'a>(&self, records: RecordStream<'a>) -> RecordStream<'a>;
}

type FieldFn = Rc<dyn Fn(FieldValue) -> Result<FieldValue>>;
type ExpandFn = Rc<dyn Fn(FieldValue) -> Result<Record>>;
type PredicateFn = Rc<dyn Fn(&Record) -> bool>;

fn take_field(record: &mut Record, key: &str) -> Result<FieldValue> {
    record
        .remove(key)
        .ok_or_else(|| AttendanceError::MissingField(key.to_string()))
}

/// Replace one field's value with `f(old_value)`.
pub struct TransformField {
    name: String,
    key: String,
    f: FieldFn,
}

impl TransformField {
    pub fn new(
        name: impl Into<String>,
        key: impl Into<String>,
        f: impl Fn(FieldValue) -> Result<FieldValue> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            f: Rc::new(f),
        }
    }
}

impl Transformation for TransformField {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply<'a>(&self, records: RecordStream<'a>) -> RecordStream<'a> {
        let key = self.key.clone();
        let f = Rc::clone(&self.f);
        Box::new(records.map(move |record| {
            let mut record = record?;
            let value = take_field(&mut record, &key)?;
            record.insert(key.clone(), f(value)?);
            Ok(record)
        }))
    }
}

/// Remove one field and merge in the fields `f` derives from its value.
pub struct ReplaceField {
    name: String,
    key: String,
    f: ExpandFn,
}

impl ReplaceField {
    pub fn new(
        name: impl Into<String>,
        key: impl Into<String>,
        f: impl Fn(FieldValue) -> Result<Record> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            f: Rc::new(f),
        }
    }
}

impl Transformation for ReplaceField {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply<'a>(&self, records: RecordStream<'a>) -> RecordStream<'a> {
        let key = self.key.clone();
        let f = Rc::clone(&self.f);
        Box::new(records.map(move |record| {
            let mut record = record?;
            let value = take_field(&mut record, &key)?;
            record.extend(f(value)?);
            Ok(record)
        }))
    }
}

/// Drop the named fields.  Absent fields are ignored.
pub struct RemoveFields {
    name: String,
    keys: Rc<[String]>,
}

impl RemoveFields {
    pub fn new<K: Into<String>>(name: impl Into<String>, keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            name: name.into(),
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl Transformation for RemoveFields {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply<'a>(&self, records: RecordStream<'a>) -> RecordStream<'a> {
        let keys = Rc::clone(&self.keys);
        Box::new(records.map(move |record| {
            let mut record = record?;
            for key in keys.iter() {
                record.remove(key);
            }
            Ok(record)
        }))
    }
}

/// Keep only records for which `predicate` holds.  Errors pass through.
pub struct FilterRecords {
    name: String,
    predicate: PredicateFn,
}

impl FilterRecords {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&Record) -> bool + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Rc::new(predicate),
        }
    }
}

impl Transformation for FilterRecords {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply<'a>(&self, records: RecordStream<'a>) -> RecordStream<'a> {
        let predicate = Rc::clone(&self.predicate);
        Box::new(records.filter(move |record| match record {
            Ok(r) => predicate(r),
            Err(_) => true,
        }))
    }
}

// ── Built-in steps ────────────────────────────────────────────────────────────

/// Parse the raw `datetime` text with [`DATETIME_FORMAT`].
pub fn parse_datetime() -> TransformField {
    TransformField::new("parse_datetime", fields::DATETIME, |value| {
        let raw = expect_text(fields::DATETIME, &value)?;
        NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
            .map(FieldValue::DateTime)
            .map_err(|_| AttendanceError::TimestampParse {
                value: raw.to_string(),
                format: DATETIME_FORMAT.to_string(),
            })
    })
}

/// Turn the raw computer number into the `sNNN` display form.
pub fn format_computer_id() -> TransformField {
    TransformField::new("format_computer_id", fields::COMPUTER_ID, |value| {
        let raw = expect_text(fields::COMPUTER_ID, &value)?;
        Ok(FieldValue::Text(format!("s{}", raw)))
    })
}

/// Lowercase the student id so ids differing only in case coincide.
pub fn lowercase_student_id() -> TransformField {
    TransformField::new("lowercase_student_id", fields::STUDENT_ID, |value| {
        let raw = expect_text(fields::STUDENT_ID, &value)?;
        Ok(FieldValue::Text(raw.to_lowercase()))
    })
}

pub(crate) fn expect_text<'v>(field: &str, value: &'v FieldValue) -> Result<&'v str> {
    value.as_text().ok_or_else(|| AttendanceError::FieldType {
        field: field.to_string(),
        expected: "text",
    })
}

pub(crate) fn expect_datetime(field: &str, value: &FieldValue) -> Result<NaiveDateTime> {
    value.as_datetime().ok_or_else(|| AttendanceError::FieldType {
        field: field.to_string(),
        expected: "datetime",
    })
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Ordered list of transformation steps.
#[derive(Default)]
pub struct Pipeline {
    steps: Vec<Box<dyn Transformation>>,
}

impl Pipeline {
    /// An empty pipeline; records pass through untouched.
    pub fn new() -> Self {
        Self::default()
    }

    /// The steps every auth log goes through: timestamp parsing, computer id
    /// formatting and student id normalisation.
    pub fn base() -> Self {
        Self::new()
            .with_step(parse_datetime())
            .with_step(format_computer_id())
            .with_step(lowercase_student_id())
    }

    /// Append `step`, builder style.
    pub fn with_step(mut self, step: impl Transformation + 'static) -> Self {
        self.push(step);
        self
    }

    pub fn push(&mut self, step: impl Transformation + 'static) {
        self.steps.push(Box::new(step));
    }

    /// Append all steps of `other` after the current ones.
    pub fn extend(&mut self, other: Pipeline) {
        self.steps.extend(other.steps);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Chain every step over `records`, first step innermost.
    pub fn apply<'a>(&self, records: RecordStream<'a>) -> RecordStream<'a> {
        self.steps
            .iter()
            .fold(records, |stream, step| step.apply(stream))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.step_names())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
