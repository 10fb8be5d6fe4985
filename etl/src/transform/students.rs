//! Student transform: the richest rule set.
//!
//! Steps run in a fixed order over the whole table:
//!
//! 1. normalize free text (names, email, codes, phone, categorical fields)
//! 2. flag invalid emails (rows retained)
//! 3. clamp GPA into `[0.0, 4.0]`
//! 4. flag unknown department, gender and status values and bad phones
//! 5. coerce graduation year and date of birth
//! 6. dedup by email, then by student code, first occurrence wins
//! 7. drop rows whose email is still invalid
//!
//! Only step 6 and step 7 remove rows.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::coerce::{rule_for, Coercion, STUDENT_RULES};
use super::dedup::dedup_by;
use super::report::{IssueKind, ValidationReport};
use crate::extract::{RawRecord, RawTable};
use crate::models::CleanStudent;
use crate::validation::{
    canonical_gender, canonical_status, clean_string, is_valid_department, normalize_code,
    normalize_email, normalize_name, scalar_text, validate_date, validate_email, validate_phone,
    DEFAULT_MIN_YEAR,
};

fn text(record: &RawRecord, column: &str) -> Option<String> {
    record.get(column).and_then(scalar_text)
}

fn cell<'a>(record: &'a RawRecord, column: &str) -> &'a Value {
    record.get(column).unwrap_or(&Value::Null)
}

/// Run the student rule set over a raw table.
pub fn transform_students(table: &RawTable, report: &mut ValidationReport) -> Vec<CleanStudent> {
    info!(rows = table.len(), "Transforming students");

    // Step 1: normalization.
    let mut students: Vec<CleanStudent> = table
        .rows
        .iter()
        .enumerate()
        .map(|(row, raw)| normalize_student(row, raw))
        .collect();

    // Step 2: email.
    for s in &students {
        if !validate_email(s.email.as_deref()) {
            report.record(s.row, "email", s.email.clone(), IssueKind::InvalidEmail);
        }
    }

    // Step 3: GPA.
    if let Some(rule) = rule_for(STUDENT_RULES, "gpa") {
        for (s, raw) in students.iter_mut().zip(&table.rows) {
            let value = cell(raw, "gpa");
            let coerced = rule.apply(value);
            if let Some(kind) = coerced.issue {
                report.record(s.row, "gpa", scalar_text(value), kind);
            }
            s.gpa = coerced.value.and_then(|v| v.as_real());
        }
    }

    // Step 4: categorical fields.
    for s in &students {
        if let Some(dept) = &s.department_code {
            if !is_valid_department(dept) {
                report.record(s.row, "department_code", Some(dept.clone()), IssueKind::UnknownDepartment);
            }
        }
        if let Some(gender) = &s.gender {
            if canonical_gender(gender).is_none() {
                report.record(s.row, "gender", Some(gender.clone()), IssueKind::UnknownGender);
            }
        }
        if let Some(status) = &s.status {
            if canonical_status(status).is_none() {
                report.record(s.row, "status", Some(status.clone()), IssueKind::UnknownStatus);
            }
        }
        if !validate_phone(s.phone.as_deref()) {
            report.record(s.row, "phone", s.phone.clone(), IssueKind::InvalidPhone);
        }
    }

    // Step 5: type coercion.
    for (s, raw) in students.iter_mut().zip(&table.rows) {
        coerce_student(s, raw, report);
    }

    // Step 6: dedup.
    dedup_by(&mut students, "email", report, |s| s.email.clone());
    dedup_by(&mut students, "student_code", report, |s| s.student_code.clone());

    // Step 7: hard filter.
    let before = students.len();
    students.retain(|s| validate_email(s.email.as_deref()));
    let dropped = before - students.len();
    if dropped > 0 {
        warn!(dropped, "Dropped students with invalid email");
        report.note(format!("Filtered {} records with invalid email", dropped));
    }

    info!(
        kept = students.len(),
        issues = report.total_errors(),
        "Student transform complete"
    );
    students
}

fn normalize_student(row: usize, raw: &RawRecord) -> CleanStudent {
    let gender = clean_string(text(raw, "gender").as_deref())
        .map(|g| canonical_gender(&g).map(str::to_string).unwrap_or(g));
    let status = clean_string(text(raw, "status").as_deref())
        .map(|s| canonical_status(&s).map(str::to_string).unwrap_or(s));

    CleanStudent {
        row,
        student_code: normalize_code(text(raw, "student_code").as_deref()),
        first_name: normalize_name(text(raw, "first_name").as_deref()),
        last_name: normalize_name(text(raw, "last_name").as_deref()),
        email: normalize_email(text(raw, "email").as_deref()),
        phone: clean_string(text(raw, "phone").as_deref()),
        date_of_birth: None,
        gender,
        department_code: normalize_code(text(raw, "department_code").as_deref()),
        graduation_year: None,
        gpa: None,
        status,
    }
}

fn coerce_student(s: &mut CleanStudent, raw: &RawRecord, report: &mut ValidationReport) {
    let year_rule = rule_for(STUDENT_RULES, "graduation_year").unwrap_or(Coercion::Integer);
    let year_raw = cell(raw, "graduation_year");
    let year = year_rule.apply(year_raw);
    if let Some(kind) = year.issue {
        report.record(s.row, "graduation_year", scalar_text(year_raw), kind);
    }
    s.graduation_year = year.value.and_then(|v| v.as_integer());

    let dob_rule = rule_for(STUDENT_RULES, "date_of_birth").unwrap_or(Coercion::Date);
    let dob_raw = cell(raw, "date_of_birth");
    let dob = dob_rule.apply(dob_raw);
    if let Some(kind) = dob.issue {
        report.record(s.row, "date_of_birth", scalar_text(dob_raw), kind);
    }
    s.date_of_birth = dob.value.and_then(|v| v.as_date());

    if s.date_of_birth.is_some() {
        let dob_text = scalar_text(dob_raw);
        if !validate_date(dob_text.as_deref(), DEFAULT_MIN_YEAR, None) {
            debug!(row = s.row, "Date of birth outside accepted range");
            report.record(s.row, "date_of_birth", dob_text, IssueKind::DateOutOfRange);
        }
    }
}
