//! Domain models for the campus ETL pipeline.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`RecordType`] - Which table a run ingests (students, courses, enrollments)
//! - [`CleanStudent`], [`CleanCourse`], [`CleanEnrollment`] - Normalized rows
//! - [`CleanRecord`] / [`CleanTable`] - Transformer output, Loader input
//! - [`LoadOutcome`] - Per-record result of an upsert
//! - [`UpsertPolicy`] - How an existing row is updated

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RecordError;

/// Status assigned to every newly inserted student.
pub const DEFAULT_STUDENT_STATUS: &str = "Active";

/// Status assigned to every newly inserted enrollment.
pub const DEFAULT_ENROLLMENT_STATUS: &str = "Enrolled";

/// Capacity used when a course row carries no `max_enrollment`.
pub const DEFAULT_MAX_ENROLLMENT: i64 = 30;

// =============================================================================
// Record Type
// =============================================================================

/// Kind of table being ingested. Each has its own rule set and idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Students,
    Courses,
    Enrollments,
}

impl RecordType {
    /// How an existing row of this type is updated on a key match.
    pub fn upsert_policy(&self) -> UpsertPolicy {
        match self {
            Self::Students => UpsertPolicy::Coalesce,
            Self::Courses | Self::Enrollments => UpsertPolicy::Overwrite,
        }
    }

    /// Columns that must be present in the raw table.
    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Students => &["email"],
            Self::Courses => &["course_code", "course_name", "department_code"],
            Self::Enrollments => &["student_code", "course_code"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Students => "students",
            Self::Courses => "courses",
            Self::Enrollments => "enrollments",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "students" | "student" => Ok(Self::Students),
            "courses" | "course" => Ok(Self::Courses),
            "enrollments" | "enrollment" => Ok(Self::Enrollments),
            other => Err(format!("unknown record type: {}", other)),
        }
    }
}

// =============================================================================
// Upsert Policy
// =============================================================================

/// Update semantics applied when a record matches an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertPolicy {
    /// Only non-absent input fields overwrite stored values.
    Coalesce,
    /// Every mutable field is overwritten, absent or not.
    Overwrite,
}

// =============================================================================
// Clean Records
// =============================================================================

/// A normalized student row.
///
/// `row` is the index of the row in the raw input table and survives
/// deduplication and filtering unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CleanStudent {
    pub row: usize,
    pub student_code: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub department_code: Option<String>,
    pub graduation_year: Option<i64>,
    pub gpa: Option<f64>,
    pub status: Option<String>,
}

/// A normalized course row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanCourse {
    pub row: usize,
    pub course_code: Option<String>,
    pub course_name: Option<String>,
    pub credits: i64,
    pub department_code: Option<String>,
    pub max_enrollment: Option<i64>,
}

/// A normalized enrollment row, keyed by business codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanEnrollment {
    pub row: usize,
    pub student_code: Option<String>,
    pub course_code: Option<String>,
    pub grade: Option<String>,
}

/// One row of a [`CleanTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CleanRecord {
    Student(CleanStudent),
    Course(CleanCourse),
    Enrollment(CleanEnrollment),
}

impl CleanRecord {
    /// Index of the source row this record came from.
    pub fn row(&self) -> usize {
        match self {
            Self::Student(s) => s.row,
            Self::Course(c) => c.row,
            Self::Enrollment(e) => e.row,
        }
    }

    /// Human-readable business key, used in failure reports.
    pub fn business_key(&self) -> String {
        fn or_dash(v: &Option<String>) -> &str {
            v.as_deref().unwrap_or("-")
        }
        match self {
            Self::Student(s) => s
                .email
                .clone()
                .or_else(|| s.student_code.clone())
                .unwrap_or_else(|| "-".to_string()),
            Self::Course(c) => or_dash(&c.course_code).to_string(),
            Self::Enrollment(e) => {
                format!("{}/{}", or_dash(&e.student_code), or_dash(&e.course_code))
            }
        }
    }
}

/// Transformer output: homogeneous records of one [`RecordType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanTable {
    pub record_type: RecordType,
    pub records: Vec<CleanRecord>,
}

impl CleanTable {
    pub fn new(record_type: RecordType) -> Self {
        Self {
            record_type,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// =============================================================================
// Load Outcome
// =============================================================================

/// Per-record result of an upsert. Never an error past the Loader boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "lowercase")]
pub enum LoadOutcome {
    Inserted(i64),
    Updated(i64),
    Failed(RecordError),
}

impl LoadOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Row id of the stored record, if any.
    pub fn id(&self) -> Option<i64> {
        match self {
            Self::Inserted(id) | Self::Updated(id) => Some(*id),
            Self::Failed(_) => None,
        }
    }
}
