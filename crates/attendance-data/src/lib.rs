//! Data layer for lab attendance analysis.
//!
//! Responsible for reading auth logs, parsing session lines, running the
//! field transformation pipeline, aggregating logins into weekly attendance
//! and assembling per-course reports.

pub mod aggregator;
pub mod analysis;
pub mod parser;
pub mod pipeline;
pub mod reader;

pub use attendance_core as core;
