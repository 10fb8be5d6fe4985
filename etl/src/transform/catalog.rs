//! Course and enrollment transforms.
//!
//! Narrower than the student rules: codes are trimmed and upper-cased,
//! credits are clamped, and nothing is filtered. These paths add log notes
//! to the report but no issues.

use serde_json::Value;
use tracing::{debug, info};

use super::coerce::{rule_for, Coercion, COURSE_RULES};
use super::report::ValidationReport;
use crate::extract::{RawRecord, RawTable};
use crate::models::{CleanCourse, CleanEnrollment};
use crate::validation::{clean_string, normalize_code, scalar_text};

const CREDITS: Coercion = Coercion::ClampedInteger { min: 1, max: 12, default: 3 };

fn text(record: &RawRecord, column: &str) -> Option<String> {
    record.get(column).and_then(scalar_text)
}

fn cell<'a>(record: &'a RawRecord, column: &str) -> &'a Value {
    record.get(column).unwrap_or(&Value::Null)
}

pub fn transform_courses(table: &RawTable, report: &mut ValidationReport) -> Vec<CleanCourse> {
    info!(rows = table.len(), "Transforming courses");
    let credits_rule = rule_for(COURSE_RULES, "credits").unwrap_or(CREDITS);
    let capacity_rule = rule_for(COURSE_RULES, "max_enrollment").unwrap_or(Coercion::Integer);

    let mut defaulted = 0usize;
    let courses: Vec<CleanCourse> = table
        .rows
        .iter()
        .enumerate()
        .map(|(row, raw)| {
            let credits = credits_rule
                .apply(cell(raw, "credits"))
                .value
                .and_then(|v| v.as_integer())
                .unwrap_or(3);
            let capacity = capacity_rule.apply(cell(raw, "max_enrollment"));
            if capacity.issue.is_some() {
                debug!(row, "Unparseable max_enrollment, using default");
                defaulted += 1;
            }
            CleanCourse {
                row,
                course_code: normalize_code(text(raw, "course_code").as_deref()),
                course_name: clean_string(text(raw, "course_name").as_deref()),
                credits,
                department_code: normalize_code(text(raw, "department_code").as_deref()),
                max_enrollment: capacity.value.and_then(|v| v.as_integer()),
            }
        })
        .collect();

    if defaulted > 0 {
        report.note(format!("Courses: {} unparseable max_enrollment values cleared", defaulted));
    }
    report.note(format!("Courses: normalized {} records", courses.len()));
    courses
}

pub fn transform_enrollments(table: &RawTable, report: &mut ValidationReport) -> Vec<CleanEnrollment> {
    info!(rows = table.len(), "Transforming enrollments");

    let enrollments: Vec<CleanEnrollment> = table
        .rows
        .iter()
        .enumerate()
        .map(|(row, raw)| CleanEnrollment {
            row,
            student_code: normalize_code(text(raw, "student_code").as_deref()),
            course_code: normalize_code(text(raw, "course_code").as_deref()),
            grade: clean_string(text(raw, "grade").as_deref()),
        })
        .collect();

    report.note(format!("Enrollments: normalized {} records", enrollments.len()));
    enrollments
}
