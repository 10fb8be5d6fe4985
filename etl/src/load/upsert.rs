//! Per-record idempotent upsert.
//!
//! Identity per record type:
//! - student: `email` OR `student_code`
//! - course: `course_code`
//! - enrollment: `(student_id, course_id)` resolved from business codes
//!
//! Update statements are generated from the record type's [`UpsertPolicy`].
//! Identity columns are never rewritten.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension};
use tracing::debug;

use crate::error::{LoadError, LoadResult, RecordError};
use crate::models::{
    CleanCourse, CleanEnrollment, CleanRecord, CleanStudent, LoadOutcome, RecordType,
    UpsertPolicy, DEFAULT_ENROLLMENT_STATUS, DEFAULT_MAX_ENROLLMENT, DEFAULT_STUDENT_STATUS,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

const STUDENT_MUTABLE: &[&str] = &[
    "first_name",
    "last_name",
    "date_of_birth",
    "gender",
    "phone",
    "department_id",
    "graduation_year",
    "gpa",
    "status",
];

const COURSE_MUTABLE: &[&str] = &["course_name", "credits", "max_enrollment"];

const ENROLLMENT_MUTABLE: &[&str] = &["grade"];

// =============================================================================
// Failure classification
// =============================================================================

/// A failed step: either already a per-record reason, or a raw SQLite error
/// still to be classified.
#[derive(Debug)]
pub(crate) enum StepError {
    Record(RecordError),
    Sql(rusqlite::Error),
}

impl From<rusqlite::Error> for StepError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sql(e)
    }
}

impl From<RecordError> for StepError {
    fn from(e: RecordError) -> Self {
        Self::Record(e)
    }
}

type StepResult<T> = Result<T, StepError>;

/// Sort a SQLite error into a per-record reason or a fatal connection error.
pub fn classify(err: rusqlite::Error) -> Result<RecordError, LoadError> {
    let (code, extended, message) = match &err {
        rusqlite::Error::SqliteFailure(e, msg) => (
            e.code,
            e.extended_code,
            msg.clone().unwrap_or_else(|| e.to_string()),
        ),
        other => return Ok(RecordError::Storage(other.to_string())),
    };

    match code {
        ErrorCode::ConstraintViolation => {
            if extended == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || extended == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                Ok(RecordError::Conflict(message))
            } else {
                Ok(RecordError::Constraint(message))
            }
        }
        ErrorCode::CannotOpen
        | ErrorCode::DatabaseCorrupt
        | ErrorCode::NotADatabase
        | ErrorCode::SystemIoFailure
        | ErrorCode::DiskFull
        | ErrorCode::DatabaseBusy
        | ErrorCode::DatabaseLocked
        | ErrorCode::PermissionDenied
        | ErrorCode::ReadOnly => Err(LoadError::Connection(err)),
        _ => Ok(RecordError::Storage(message)),
    }
}

fn settle(result: StepResult<LoadOutcome>) -> LoadResult<LoadOutcome> {
    match result {
        Ok(outcome) => Ok(outcome),
        Err(StepError::Record(reason)) => Ok(LoadOutcome::Failed(reason)),
        Err(StepError::Sql(e)) => classify(e).map(LoadOutcome::Failed),
    }
}

// =============================================================================
// SQL generation
// =============================================================================

/// `UPDATE` for an existing row under `policy`. Parameters bind in column
/// order, followed by the row id.
pub fn update_sql(table: &str, id_column: &str, columns: &[&str], policy: UpsertPolicy) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .map(|c| match policy {
            UpsertPolicy::Coalesce => format!("{c} = COALESCE(?, {c})"),
            UpsertPolicy::Overwrite => format!("{c} = ?"),
        })
        .collect();
    format!(
        "UPDATE {table} SET {}, updated_at = CURRENT_TIMESTAMP WHERE {id_column} = ?",
        assignments.join(", ")
    )
}

fn text(v: &Option<String>) -> SqlValue {
    match v {
        Some(s) => SqlValue::Text(s.clone()),
        None => SqlValue::Null,
    }
}

fn integer(v: Option<i64>) -> SqlValue {
    v.map(SqlValue::Integer).unwrap_or(SqlValue::Null)
}

// =============================================================================
// Lookups
// =============================================================================

fn department_id(conn: &Connection, code: &str) -> StepResult<i64> {
    conn.query_row(
        "SELECT department_id FROM departments WHERE department_code = ?1",
        [code],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StepError::Record(RecordError::lookup_miss("Department", code)))
}

fn required<'a>(value: &'a Option<String>, entity: &str) -> StepResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| StepError::Record(RecordError::lookup_miss(entity, "-")))
}

fn student_id_by_code(conn: &Connection, code: &str) -> StepResult<i64> {
    conn.query_row(
        "SELECT student_id FROM students WHERE student_code = ?1",
        [code],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StepError::Record(RecordError::lookup_miss("Student", code)))
}

fn course_id_by_code(conn: &Connection, code: &str) -> StepResult<i64> {
    conn.query_row(
        "SELECT course_id FROM courses WHERE course_code = ?1",
        [code],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StepError::Record(RecordError::lookup_miss("Course", code)))
}

// =============================================================================
// Students
// =============================================================================

fn student_values(s: &CleanStudent, department: Option<i64>) -> Vec<SqlValue> {
    vec![
        text(&s.first_name),
        text(&s.last_name),
        s.date_of_birth
            .map(|d| SqlValue::Text(d.format(DATE_FORMAT).to_string()))
            .unwrap_or(SqlValue::Null),
        text(&s.gender),
        text(&s.phone),
        integer(department),
        integer(s.graduation_year),
        s.gpa.map(SqlValue::Real).unwrap_or(SqlValue::Null),
    ]
}

pub(crate) fn insert_student(conn: &Connection, s: &CleanStudent) -> StepResult<i64> {
    let department = s
        .department_code
        .as_deref()
        .map(|code| department_id(conn, code))
        .transpose()?;

    let mut values = vec![text(&s.student_code), text(&s.email)];
    values.extend(student_values(s, department));
    values.push(SqlValue::Text(DEFAULT_STUDENT_STATUS.to_string()));

    let mut stmt = conn.prepare_cached(
        "INSERT INTO students (
            student_code, email, first_name, last_name, date_of_birth,
            gender, phone, department_id, graduation_year, gpa, status
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    stmt.execute(params_from_iter(values))?;
    Ok(conn.last_insert_rowid())
}

fn upsert_student(conn: &Connection, s: &CleanStudent) -> StepResult<LoadOutcome> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT student_id FROM students WHERE email = ?1 OR student_code = ?2 LIMIT 1",
            (&s.email, &s.student_code),
            |row| row.get(0),
        )
        .optional()?;

    let Some(id) = existing else {
        return insert_student(conn, s).map(LoadOutcome::Inserted);
    };

    let department = s
        .department_code
        .as_deref()
        .map(|code| department_id(conn, code))
        .transpose()?;
    let mut values = student_values(s, department);
    values.push(text(&s.status));
    values.push(SqlValue::Integer(id));

    let sql = update_sql(
        "students",
        "student_id",
        STUDENT_MUTABLE,
        RecordType::Students.upsert_policy(),
    );
    conn.prepare_cached(&sql)?.execute(params_from_iter(values))?;
    Ok(LoadOutcome::Updated(id))
}

// =============================================================================
// Courses
// =============================================================================

pub(crate) fn insert_course(conn: &Connection, c: &CleanCourse) -> StepResult<i64> {
    let department = department_id(conn, required(&c.department_code, "Department")?)?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO courses (course_code, course_name, credits, department_id, max_enrollment)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    stmt.execute((
        &c.course_code,
        &c.course_name,
        c.credits,
        department,
        c.max_enrollment.unwrap_or(DEFAULT_MAX_ENROLLMENT),
    ))?;
    Ok(conn.last_insert_rowid())
}

fn upsert_course(conn: &Connection, c: &CleanCourse) -> StepResult<LoadOutcome> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT course_id FROM courses WHERE course_code = ?1",
            [&c.course_code],
            |row| row.get(0),
        )
        .optional()?;

    let Some(id) = existing else {
        return insert_course(conn, c).map(LoadOutcome::Inserted);
    };

    // Department must still resolve even though it is not rewritten.
    department_id(conn, required(&c.department_code, "Department")?)?;

    let values = vec![
        text(&c.course_name),
        SqlValue::Integer(c.credits),
        SqlValue::Integer(c.max_enrollment.unwrap_or(DEFAULT_MAX_ENROLLMENT)),
        SqlValue::Integer(id),
    ];
    let sql = update_sql(
        "courses",
        "course_id",
        COURSE_MUTABLE,
        RecordType::Courses.upsert_policy(),
    );
    conn.prepare_cached(&sql)?.execute(params_from_iter(values))?;
    Ok(LoadOutcome::Updated(id))
}

// =============================================================================
// Enrollments
// =============================================================================

fn resolve_enrollment(conn: &Connection, e: &CleanEnrollment) -> StepResult<(i64, i64)> {
    let student = student_id_by_code(conn, required(&e.student_code, "Student")?)?;
    let course = course_id_by_code(conn, required(&e.course_code, "Course")?)?;
    Ok((student, course))
}

pub(crate) fn insert_enrollment(conn: &Connection, e: &CleanEnrollment) -> StepResult<i64> {
    let (student, course) = resolve_enrollment(conn, e)?;
    insert_enrollment_ids(conn, student, course, &e.grade)
}

fn insert_enrollment_ids(
    conn: &Connection,
    student: i64,
    course: i64,
    grade: &Option<String>,
) -> StepResult<i64> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO enrollments (student_id, course_id, grade, status) VALUES (?1, ?2, ?3, ?4)",
    )?;
    stmt.execute((student, course, grade, DEFAULT_ENROLLMENT_STATUS))?;
    Ok(conn.last_insert_rowid())
}

fn upsert_enrollment(conn: &Connection, e: &CleanEnrollment) -> StepResult<LoadOutcome> {
    let (student, course) = resolve_enrollment(conn, e)?;
    let existing: Option<i64> = conn
        .query_row(
            "SELECT enrollment_id FROM enrollments WHERE student_id = ?1 AND course_id = ?2",
            (student, course),
            |row| row.get(0),
        )
        .optional()?;

    let Some(id) = existing else {
        return insert_enrollment_ids(conn, student, course, &e.grade).map(LoadOutcome::Inserted);
    };

    let sql = update_sql(
        "enrollments",
        "enrollment_id",
        ENROLLMENT_MUTABLE,
        RecordType::Enrollments.upsert_policy(),
    );
    conn.prepare_cached(&sql)?
        .execute(params_from_iter([text(&e.grade), SqlValue::Integer(id)]))?;
    Ok(LoadOutcome::Updated(id))
}

// =============================================================================
// Entry points
// =============================================================================

/// Upsert one record on an open connection or transaction.
///
/// Per-record problems come back as [`LoadOutcome::Failed`]; only a lost or
/// unusable connection is an `Err`.
pub fn upsert_record(conn: &Connection, record: &CleanRecord) -> LoadResult<LoadOutcome> {
    let result = match record {
        CleanRecord::Student(s) => upsert_student(conn, s),
        CleanRecord::Course(c) => upsert_course(conn, c),
        CleanRecord::Enrollment(e) => upsert_enrollment(conn, e),
    };
    let outcome = settle(result)?;
    debug!(row = record.row(), key = %record.business_key(), ?outcome, "Upserted record");
    Ok(outcome)
}

/// Plain insert with no existence check. Used by the bulk path.
pub fn insert_record(conn: &Connection, record: &CleanRecord) -> LoadResult<LoadOutcome> {
    let result = match record {
        CleanRecord::Student(s) => insert_student(conn, s),
        CleanRecord::Course(c) => insert_course(conn, c),
        CleanRecord::Enrollment(e) => insert_enrollment(conn, e),
    };
    settle(result.map(LoadOutcome::Inserted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.bootstrap().unwrap();
        store
    }

    fn student(email: &str, code: &str) -> CleanStudent {
        CleanStudent {
            email: Some(email.into()),
            student_code: Some(code.into()),
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            department_code: Some("CS".into()),
            gpa: Some(3.9),
            ..Default::default()
        }
    }

    fn course(code: &str, name: &str, credits: i64) -> CleanCourse {
        CleanCourse {
            row: 0,
            course_code: Some(code.into()),
            course_name: Some(name.into()),
            credits,
            department_code: Some("CS".into()),
            max_enrollment: None,
        }
    }

    fn stored_student(store: &Store, email: &str) -> (Option<String>, Option<String>, Option<f64>, String) {
        store
            .connection()
            .query_row(
                "SELECT first_name, phone, gpa, status FROM students WHERE email = ?1",
                [email],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap()
    }

    #[test]
    fn test_update_sql_per_policy() {
        let coalesce = update_sql("t", "id", &["a", "b"], UpsertPolicy::Coalesce);
        assert_eq!(
            coalesce,
            "UPDATE t SET a = COALESCE(?, a), b = COALESCE(?, b), updated_at = CURRENT_TIMESTAMP WHERE id = ?"
        );
        let overwrite = update_sql("t", "id", &["a"], UpsertPolicy::Overwrite);
        assert_eq!(overwrite, "UPDATE t SET a = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?");
    }

    #[test]
    fn test_student_idempotent() {
        let store = store();
        let record = CleanRecord::Student(student("ada@uni.edu", "STU001"));

        let first = upsert_record(store.connection(), &record).unwrap();
        let before = stored_student(&store, "ada@uni.edu");
        let second = upsert_record(store.connection(), &record).unwrap();
        let after = stored_student(&store, "ada@uni.edu");

        assert!(matches!(first, LoadOutcome::Inserted(_)));
        assert!(matches!(second, LoadOutcome::Updated(_)));
        assert_eq!(first.id(), second.id());
        assert_eq!(before, after);
        assert_eq!(after.3, "Active");
        assert_eq!(store.count(RecordType::Students).unwrap(), 1);
    }

    #[test]
    fn test_student_coalesce_keeps_stored_values() {
        let store = store();
        let mut full = student("ada@uni.edu", "STU001");
        full.phone = Some("5550100100".into());
        upsert_record(store.connection(), &CleanRecord::Student(full)).unwrap();

        // Matched by student code only, with most fields absent.
        let sparse = CleanStudent {
            email: Some("ada.new@uni.edu".into()),
            student_code: Some("STU001".into()),
            first_name: Some("Augusta".into()),
            ..Default::default()
        };
        let outcome = upsert_record(store.connection(), &CleanRecord::Student(sparse)).unwrap();
        assert!(matches!(outcome, LoadOutcome::Updated(_)));

        let (first, phone, gpa, _) = stored_student(&store, "ada@uni.edu");
        assert_eq!(first.as_deref(), Some("Augusta"));
        assert_eq!(phone.as_deref(), Some("5550100100"));
        assert_eq!(gpa, Some(3.9));
    }

    #[test]
    fn test_course_overwrite() {
        let store = store();
        let mut c = course("CS101", "Intro", 4);
        c.max_enrollment = Some(50);
        upsert_record(store.connection(), &CleanRecord::Course(c)).unwrap();

        let replacement = course("CS101", "Intro to Computing", 3);
        let outcome = upsert_record(store.connection(), &CleanRecord::Course(replacement)).unwrap();
        assert!(matches!(outcome, LoadOutcome::Updated(_)));

        let (name, credits, cap): (String, i64, i64) = store
            .connection()
            .query_row(
                "SELECT course_name, credits, max_enrollment FROM courses WHERE course_code = 'CS101'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(name, "Intro to Computing");
        assert_eq!(credits, 3);
        assert_eq!(cap, DEFAULT_MAX_ENROLLMENT);
    }

    #[test]
    fn test_unknown_department_is_lookup_miss() {
        let store = store();
        let mut s = student("a@x.com", "S1");
        s.department_code = Some("ART".into());

        let outcome = upsert_record(store.connection(), &CleanRecord::Student(s)).unwrap();

        assert_eq!(
            outcome,
            LoadOutcome::Failed(RecordError::lookup_miss("Department", "ART"))
        );
    }

    #[test]
    fn test_enrollment_lookup_miss_and_upsert() {
        let store = store();
        let enrollment = CleanEnrollment {
            row: 0,
            student_code: Some("STU001".into()),
            course_code: Some("CS101".into()),
            grade: None,
        };

        let missing = upsert_record(store.connection(), &CleanRecord::Enrollment(enrollment.clone())).unwrap();
        assert_eq!(
            missing,
            LoadOutcome::Failed(RecordError::lookup_miss("Student", "STU001"))
        );

        upsert_record(store.connection(), &CleanRecord::Student(student("a@x.com", "STU001"))).unwrap();
        upsert_record(store.connection(), &CleanRecord::Course(course("CS101", "Intro", 4))).unwrap();

        let first = upsert_record(store.connection(), &CleanRecord::Enrollment(enrollment.clone())).unwrap();
        let graded = CleanEnrollment {
            grade: Some("A".into()),
            ..enrollment
        };
        let second = upsert_record(store.connection(), &CleanRecord::Enrollment(graded)).unwrap();

        assert!(matches!(first, LoadOutcome::Inserted(_)));
        assert!(matches!(second, LoadOutcome::Updated(_)));
        let grade: Option<String> = store
            .connection()
            .query_row("SELECT grade FROM enrollments", [], |r| r.get(0))
            .unwrap();
        assert_eq!(grade.as_deref(), Some("A"));
    }

    #[test]
    fn test_constraint_classified() {
        let store = store();
        let mut s = student("a@x.com", "S1");
        s.gender = Some("robot".into());

        let outcome = upsert_record(store.connection(), &CleanRecord::Student(s)).unwrap();

        assert!(matches!(outcome, LoadOutcome::Failed(RecordError::Constraint(_))));
    }

    #[test]
    fn test_plain_insert_conflicts() {
        let store = store();
        let record = CleanRecord::Course(course("CS101", "Intro", 4));
        insert_record(store.connection(), &record).unwrap();

        let again = insert_record(store.connection(), &record).unwrap();

        assert!(matches!(again, LoadOutcome::Failed(RecordError::Conflict(_))));
    }
}
