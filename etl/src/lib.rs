//! # Campus ETL - student, course and enrollment ingestion
//!
//! Campus ETL reads student, course and enrollment tables from CSV, JSON or
//! remote sources, validates and normalizes them, and loads them into SQLite
//! with idempotent upserts committed in batches.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ CSV / JSON  │────▶│   Extract   │────▶│  Transform  │────▶│    Load     │
//! │ URL / Sheet │     │ (auto-enc)  │     │ (+ report)  │     │  (upsert)   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                            ▲                                       │
//!                            └────────── Pipeline (state machine) ───┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use campus_etl::{Pipeline, PipelineOptions, Source, Store};
//!
//! let mut store = Store::open("campus.db").unwrap();
//! store.bootstrap().unwrap();
//!
//! let source = Source::Csv("students.csv".into());
//! let report = Pipeline::new(&source, PipelineOptions::default())
//!     .with_store(&mut store)
//!     .run();
//! println!("Loaded {} records", report.loaded());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Clean records, record types, load outcomes
//! - [`extract`] - Source acquisition with encoding/delimiter detection
//! - [`validation`] - Field validators and normalizers
//! - [`transform`] - Rule sets, coercion, dedup, validation report
//! - [`store`] - SQLite handle and schema
//! - [`load`] - Idempotent batched upsert and bulk insert
//! - [`pipeline`] - Orchestrator and run report
//! - [`config`] - Environment settings
//! - [`logging`] - Tracing subscriber setup

// Core modules
pub mod error;
pub mod models;

// Extraction
pub mod extract;

// Validation and transformation
pub mod transform;
pub mod validation;

// Storage and loading
pub mod load;
pub mod store;

// Orchestration
pub mod pipeline;

// Ambient
pub mod config;
pub mod logging;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    ExtractError,
    LoadError,
    PipelineError,
    RecordError,
    SchemaError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    CleanCourse,
    CleanEnrollment,
    CleanRecord,
    CleanStudent,
    CleanTable,
    LoadOutcome,
    RecordType,
    UpsertPolicy,
};

// =============================================================================
// Re-exports - Extraction
// =============================================================================

pub use extract::{Extract, Format, RawRecord, RawTable, Source};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{transform, IssueKind, ValidationIssue, ValidationReport};

// =============================================================================
// Re-exports - Storage and Loading
// =============================================================================

pub use load::{BatchStats, LoadFailure, Loader};
pub use store::Store;

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use pipeline::{
    LoadStrategy,
    Phase,
    PhaseError,
    Pipeline,
    PipelineOptions,
    PipelineReport,
    PipelineState,
    RunMode,
};

pub use config::Settings;
