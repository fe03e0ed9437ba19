//! Core types for lab attendance analysis.
//!
//! Holds the semester configuration model, the weekly lab schedule, the
//! semester week index and the shared error type.

pub mod config;
pub mod error;
pub mod schedule;
pub mod settings;
pub mod weeks;

pub use error::{AttendanceError, Result};
