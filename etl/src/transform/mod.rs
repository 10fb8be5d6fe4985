//! Transformation module.
//!
//! Turns a [`RawTable`] into a [`CleanTable`] plus a [`ValidationReport`]:
//! - Report: issues and structural log for one call
//! - Coerce: closed set of typed coercion rules
//! - Dedup: first-occurrence deduplication
//! - Students: the full seven-step student rule set
//! - Catalog: course and enrollment normalization
//!
//! The report is returned by value, so independent tables can be
//! transformed concurrently.

pub mod catalog;
pub mod coerce;
pub mod dedup;
pub mod report;
pub mod students;

pub use catalog::{transform_courses, transform_enrollments};
pub use coerce::{Coerced, Coercion, Typed};
pub use dedup::dedup_by;
pub use report::{IssueKind, ValidationIssue, ValidationReport};
pub use students::transform_students;

use crate::error::SchemaError;
use crate::extract::RawTable;
use crate::models::{CleanRecord, CleanTable, RecordType};

/// Fail fast on structural problems: no header, or a required column missing.
pub fn check_schema(table: &RawTable, record_type: RecordType) -> Result<(), SchemaError> {
    if table.headers.is_empty() {
        return Err(SchemaError::NoColumns);
    }
    for column in record_type.required_columns() {
        if !table.has_column(column) {
            return Err(SchemaError::MissingColumn {
                record_type,
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

/// Run the rule set for `record_type` over `table`.
///
/// Data-quality problems never fail this call; they are recorded in the
/// returned report.
pub fn transform(
    table: &RawTable,
    record_type: RecordType,
) -> Result<(CleanTable, ValidationReport), SchemaError> {
    check_schema(table, record_type)?;

    let mut report = ValidationReport::new();
    let records: Vec<CleanRecord> = match record_type {
        RecordType::Students => transform_students(table, &mut report)
            .into_iter()
            .map(CleanRecord::Student)
            .collect(),
        RecordType::Courses => transform_courses(table, &mut report)
            .into_iter()
            .map(CleanRecord::Course)
            .collect(),
        RecordType::Enrollments => transform_enrollments(table, &mut report)
            .into_iter()
            .map(CleanRecord::Enrollment)
            .collect(),
    };

    Ok((CleanTable { record_type, records }, report))
}
