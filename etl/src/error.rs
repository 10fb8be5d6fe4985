//! Error types for the campus ETL pipeline.
//!
//! This module defines one error type per concern:
//!
//! - [`ExtractError`] - Source acquisition errors
//! - [`SchemaError`] - Structural table errors (fatal to the Transform phase)
//! - [`RecordError`] - Per-record load failures (data, never propagated)
//! - [`LoadError`] - Errors fatal to a whole Load phase
//! - [`ConfigError`] - Invalid environment settings
//! - [`PipelineError`] - Top-level wrapper used in the phase-error list
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::load::BatchStats;
use crate::models::RecordType;

// =============================================================================
// Extraction Errors
// =============================================================================

/// Errors while acquiring a raw table from a source.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Failed to read file.
    #[error("Failed to read source: {0}")]
    Io(#[from] std::io::Error),

    /// Source file does not exist.
    #[error("Source not found: {0}")]
    NotFound(String),

    /// Invalid CSV content.
    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid JSON content.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Remote fetch failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Empty source.
    #[error("Source is empty")]
    Empty,

    /// Content parsed but is not a table of records.
    #[error("Source is not a table of records: {0}")]
    NotATable(String),
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Structural problems with a raw table. Fatal to the Transform phase.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    /// A column required by the record type is absent.
    #[error("Missing required column '{column}' for {record_type} records")]
    MissingColumn {
        record_type: RecordType,
        column: String,
    },

    /// The table has no header at all.
    #[error("Table has no columns")]
    NoColumns,
}

// =============================================================================
// Per-record Load Failures
// =============================================================================

/// Why a single record could not be persisted.
///
/// These are recorded in [`crate::load::BatchStats`] and never abort a batch.
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RecordError {
    /// Unique constraint violation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Foreign-key resolution failed.
    #[error("{entity} not found: {key}")]
    LookupMiss { entity: String, key: String },

    /// Any other constraint (NOT NULL, CHECK, FOREIGN KEY) rejected the row.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Statement failed for a non-constraint reason.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl RecordError {
    pub fn lookup_miss(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::LookupMiss {
            entity: entity.into(),
            key: key.into(),
        }
    }
}

// =============================================================================
// Load Errors
// =============================================================================

/// Errors fatal to a whole Load phase.
///
/// Batches committed before the error stay committed.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Connection could not be acquired or was lost.
    #[error("Database connection error: {0}")]
    Connection(#[source] rusqlite::Error),

    /// No storage handle was provided for a loading run.
    #[error("No database configured (set DATABASE_URL or pass --database)")]
    NotConfigured,

    /// The bulk path rejected a row and rolled back the whole load.
    #[error("Bulk load rejected at row {row}: {reason}")]
    BulkRejected { row: usize, reason: RecordError },

    /// Connection lost part-way through a batched load. `stats` counts only
    /// the batches committed before the failure.
    #[error("Database connection error after {committed} records in committed batches: {source}")]
    Aborted {
        committed: usize,
        stats: Box<BatchStats>,
        #[source]
        source: rusqlite::Error,
    },
}

impl LoadError {
    /// Counts of whatever was committed before a mid-load failure.
    pub fn partial_stats(&self) -> Option<&BatchStats> {
        match self {
            Self::Aborted { stats, .. } => Some(stats),
            _ => None,
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable has an unusable value.
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Structural failure of one pipeline phase.
///
/// The orchestrator never propagates these; it records their text in
/// [`crate::pipeline::PipelineReport::errors`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Extract phase failed.
    #[error("{0}")]
    Extract(#[from] ExtractError),

    /// Transform phase failed.
    #[error("{0}")]
    Schema(#[from] SchemaError),

    /// Load phase failed.
    #[error("{0}")]
    Load(#[from] LoadError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for extraction.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Result type for the Loader.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for orchestration.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let extract_err = ExtractError::Empty;
        let pipeline_err: PipelineError = extract_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        let schema_err = SchemaError::MissingColumn {
            record_type: RecordType::Students,
            column: "email".into(),
        };
        let pipeline_err: PipelineError = schema_err.into();
        assert!(pipeline_err.to_string().contains("email"));
        assert!(pipeline_err.to_string().contains("students"));
    }

    #[test]
    fn test_record_error_format() {
        let err = RecordError::lookup_miss("Department", "XYZ");
        assert_eq!(err.to_string(), "Department not found: XYZ");

        let err = RecordError::Conflict("UNIQUE constraint failed: students.email".into());
        assert!(err.to_string().starts_with("Conflict"));
    }

    #[test]
    fn test_bulk_rejected_format() {
        let err = LoadError::BulkRejected {
            row: 7,
            reason: RecordError::Constraint("NOT NULL constraint failed".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("row 7"));
        assert!(msg.contains("NOT NULL"));
    }
}
