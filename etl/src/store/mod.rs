//! SQLite storage handle.
//!
//! Owns the single connection a run loads through, bootstraps the schema and
//! seeds the department reference table. The Loader reads departments but
//! never writes them.

use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{LoadError, LoadResult};
use crate::models::RecordType;
use crate::validation::{VALID_GENDERS, VALID_STATUSES};

/// Reference departments: code and display name.
pub const DEPARTMENTS: [(&str, &str); 8] = [
    ("CS", "Computer Science"),
    ("MATH", "Mathematics"),
    ("PHY", "Physics"),
    ("ENG", "Engineering"),
    ("BIO", "Biology"),
    ("CHEM", "Chemistry"),
    ("ECON", "Economics"),
    ("PSY", "Psychology"),
];

const SQLITE_SCHEME: &str = "sqlite://";

fn sql_list(values: &[&str]) -> String {
    values
        .iter()
        .map(|v| format!("'{}'", v.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ")
}

fn schema_sql() -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS departments (
            department_id INTEGER PRIMARY KEY AUTOINCREMENT,
            department_code TEXT NOT NULL UNIQUE,
            department_name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS students (
            student_id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_code TEXT UNIQUE,
            first_name TEXT,
            last_name TEXT,
            email TEXT NOT NULL UNIQUE,
            date_of_birth TEXT,
            gender TEXT CHECK (gender IS NULL OR gender IN ({genders})),
            phone TEXT,
            department_id INTEGER REFERENCES departments(department_id),
            graduation_year INTEGER,
            gpa REAL CHECK (gpa IS NULL OR (gpa >= 0.0 AND gpa <= 4.0)),
            status TEXT NOT NULL DEFAULT 'Active' CHECK (status IN ({statuses})),
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS courses (
            course_id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_code TEXT NOT NULL UNIQUE,
            course_name TEXT NOT NULL,
            credits INTEGER NOT NULL CHECK (credits BETWEEN 1 AND 12),
            department_id INTEGER NOT NULL REFERENCES departments(department_id),
            max_enrollment INTEGER NOT NULL DEFAULT 30,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS enrollments (
            enrollment_id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL REFERENCES students(student_id) ON DELETE CASCADE,
            course_id INTEGER NOT NULL REFERENCES courses(course_id) ON DELETE CASCADE,
            grade TEXT,
            status TEXT NOT NULL DEFAULT 'Enrolled',
            enrolled_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (student_id, course_id)
        );

        CREATE INDEX IF NOT EXISTS idx_students_department ON students(department_id);
        CREATE INDEX IF NOT EXISTS idx_courses_department ON courses(department_id);
        CREATE INDEX IF NOT EXISTS idx_enrollments_course ON enrollments(course_id);
        "#,
        genders = sql_list(&VALID_GENDERS),
        statuses = sql_list(&VALID_STATUSES),
    )
}

fn table_name(record_type: RecordType) -> &'static str {
    match record_type {
        RecordType::Students => "students",
        RecordType::Courses => "courses",
        RecordType::Enrollments => "enrollments",
    }
}

/// A connection to the campus database.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open a database by URL: a file path, optionally `sqlite://`-prefixed,
    /// or `:memory:`.
    pub fn open(url: &str) -> LoadResult<Self> {
        let path = url.strip_prefix(SQLITE_SCHEME).unwrap_or(url);
        if path == ":memory:" {
            return Self::open_in_memory();
        }
        debug!(path, "Opening database");
        let conn = Connection::open(Path::new(path)).map_err(LoadError::Connection)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> LoadResult<Self> {
        let conn = Connection::open_in_memory().map_err(LoadError::Connection)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> LoadResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(LoadError::Connection)?;
        Ok(Self { conn })
    }

    /// Create all tables and indexes if missing. Safe to repeat.
    pub fn init_schema(&self) -> LoadResult<()> {
        self.conn
            .execute_batch(&schema_sql())
            .map_err(LoadError::Connection)?;
        info!("Database schema ready");
        Ok(())
    }

    /// Insert the reference departments that are not present yet.
    ///
    /// Returns the number of rows actually added.
    pub fn seed_departments(&self) -> LoadResult<usize> {
        let mut stmt = self
            .conn
            .prepare("INSERT OR IGNORE INTO departments (department_code, department_name) VALUES (?1, ?2)")
            .map_err(LoadError::Connection)?;
        let mut added = 0;
        for (code, name) in DEPARTMENTS {
            added += stmt.execute((code, name)).map_err(LoadError::Connection)?;
        }
        info!(added, "Departments seeded");
        Ok(added)
    }

    /// Schema plus seed, as done by `init-db`.
    pub fn bootstrap(&self) -> LoadResult<()> {
        self.init_schema()?;
        self.seed_departments()?;
        Ok(())
    }

    /// `SELECT 1` round trip.
    pub fn check(&self) -> LoadResult<()> {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(LoadError::Connection)
    }

    pub fn ping(&self) -> bool {
        match self.check() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Database ping failed");
                false
            }
        }
    }

    /// Number of rows stored for a record type.
    pub fn count(&self, record_type: RecordType) -> LoadResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table_name(record_type));
        self.conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(LoadError::Connection)
    }

    pub fn department_count(&self) -> LoadResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM departments", [], |row| row.get(0))
            .map_err(LoadError::Connection)
    }

    /// Row id of a department code, if seeded.
    pub fn department_id(&self, code: &str) -> LoadResult<Option<i64>> {
        self.conn
            .query_row(
                "SELECT department_id FROM departments WHERE department_code = ?1",
                [code],
                |row| row.get(0),
            )
            .optional()
            .map_err(LoadError::Connection)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}
