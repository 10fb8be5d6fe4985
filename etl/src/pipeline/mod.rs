//! Pipeline orchestrator.
//!
//! Drives one run through Extract, Transform and Load as a state machine:
//!
//! ```text
//! Idle ──▶ Extracting ──▶ Transforming ──▶ Loading ──▶ Completed
//!               │               │  │           │
//!               └───────────────┴──┼───────────┴──▶ Failed
//!                                  └──(dry run)──▶ Completed
//! ```
//!
//! Structural failures (unreadable source, missing column, lost connection)
//! move the run to `Failed` and are captured in the report, never
//! propagated. Data-quality problems and per-record load failures are
//! outcomes, not pipeline failures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{LoadError, PipelineError, PipelineResult};
use crate::extract::{Extract, RawTable};
use crate::load::{BatchStats, Loader, DEFAULT_BATCH_SIZE};
use crate::models::{CleanTable, RecordType};
use crate::store::Store;
use crate::transform::{transform, ValidationReport};

/// Issues logged individually before the rest are summarized.
const ISSUES_TO_LOG: usize = 10;

// =============================================================================
// States and phases
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Extracting,
    Transforming,
    Loading,
    Completed,
    Failed,
}

impl PipelineState {
    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Extracting)
                | (Extracting, Transforming)
                | (Extracting, Failed)
                | (Transforming, Loading)
                | (Transforming, Completed)
                | (Transforming, Failed)
                | (Loading, Completed)
                | (Loading, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Extracting => "extracting",
            Self::Transforming => "transforming",
            Self::Loading => "loading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Extract,
    Transform,
    Load,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Extract => "extract",
            Self::Transform => "transform",
            Self::Load => "load",
        })
    }
}

/// A structural failure captured from one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseError {
    pub phase: Phase,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub phase: Phase,
    pub seconds: f64,
}

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Extract, transform and load.
    Full,
    /// Stop after transforming; never touch storage.
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStrategy {
    /// Per-record upsert with batch commits.
    Upsert,
    /// Conflict-free bulk insert; only for cold loads.
    Bulk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub record_type: RecordType,
    pub mode: RunMode,
    pub strategy: LoadStrategy,
    pub batch_size: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            record_type: RecordType::Students,
            mode: RunMode::Full,
            strategy: LoadStrategy::Upsert,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

// =============================================================================
// Report
// =============================================================================

/// Everything known about one run. Returned whatever the terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub record_type: RecordType,
    pub state: PipelineState,
    pub transitions: Vec<PipelineState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub phases: Vec<PhaseTiming>,
    pub extract_count: usize,
    pub transform_count: usize,
    pub validation: ValidationReport,
    pub load_stats: Option<BatchStats>,
    pub errors: Vec<PhaseError>,
}

impl PipelineReport {
    fn new(record_type: RecordType) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            record_type,
            state: PipelineState::Idle,
            transitions: vec![PipelineState::Idle],
            started_at: Utc::now(),
            finished_at: None,
            duration_seconds: 0.0,
            phases: Vec::new(),
            extract_count: 0,
            transform_count: 0,
            validation: ValidationReport::new(),
            load_stats: None,
            errors: Vec::new(),
        }
    }

    /// Process exit status: non-zero iff any phase failed.
    pub fn exit_code(&self) -> i32 {
        if self.errors.is_empty() {
            0
        } else {
            1
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Completed && self.errors.is_empty()
    }

    /// Records inserted or updated.
    pub fn loaded(&self) -> usize {
        self.load_stats.as_ref().map(BatchStats::succeeded).unwrap_or(0)
    }

    pub fn phase_seconds(&self, phase: Phase) -> Option<f64> {
        self.phases.iter().find(|t| t.phase == phase).map(|t| t.seconds)
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// One run over one source. Holds no state across runs.
pub struct Pipeline<'a> {
    source: &'a dyn Extract,
    store: Option<&'a mut Store>,
    options: PipelineOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(source: &'a dyn Extract, options: PipelineOptions) -> Self {
        Self {
            source,
            store: None,
            options,
        }
    }

    /// Storage to load into. Not needed for dry runs.
    pub fn with_store(mut self, store: &'a mut Store) -> Self {
        self.store = Some(store);
        self
    }

    /// Execute the run to a terminal state.
    pub fn run(&mut self) -> PipelineReport {
        let mut report = PipelineReport::new(self.options.record_type);
        let clock = Instant::now();
        info!(
            run_id = %report.run_id,
            source = %self.source.describe(),
            record_type = %self.options.record_type,
            mode = ?self.options.mode,
            "Pipeline started"
        );

        self.execute(&mut report);
        debug_assert!(report.state.is_terminal(), "run ended in {}", report.state);

        report.finished_at = Some(Utc::now());
        report.duration_seconds = clock.elapsed().as_secs_f64();
        if report.errors.is_empty() {
            info!(
                duration = report.duration_seconds,
                extracted = report.extract_count,
                transformed = report.transform_count,
                loaded = report.loaded(),
                "Pipeline completed successfully"
            );
        } else {
            warn!(errors = report.errors.len(), state = %report.state, "Pipeline finished with errors");
        }
        report
    }

    fn execute(&mut self, report: &mut PipelineReport) {
        // Extract
        advance(report, PipelineState::Extracting);
        let started = Instant::now();
        let extracted = self.source.extract();
        record_timing(report, Phase::Extract, started);
        let table: RawTable = match extracted {
            Ok(t) => t,
            Err(e) => return fail(report, Phase::Extract, PipelineError::from(e)),
        };
        report.extract_count = table.len();
        info!(records = table.len(), "Extract complete");

        // Transform
        advance(report, PipelineState::Transforming);
        let started = Instant::now();
        let transformed = transform(&table, self.options.record_type);
        record_timing(report, Phase::Transform, started);
        let (clean, validation) = match transformed {
            Ok(out) => out,
            Err(e) => return fail(report, Phase::Transform, PipelineError::from(e)),
        };
        drop(table);
        log_validation(&validation);
        report.transform_count = clean.len();
        report.validation = validation;
        info!(records = clean.len(), "Transform complete");

        if self.options.mode == RunMode::DryRun {
            info!("Dry run: skipping load");
            return advance(report, PipelineState::Completed);
        }

        // Load
        advance(report, PipelineState::Loading);
        let started = Instant::now();
        let loaded = self.load(&clean);
        record_timing(report, Phase::Load, started);
        match loaded {
            Ok(stats) => {
                if stats.failed > 0 {
                    warn!(failed = stats.failed, "Some records were not loaded");
                }
                report.load_stats = Some(stats);
                advance(report, PipelineState::Completed);
            }
            Err(e) => {
                if let PipelineError::Load(load_err) = &e {
                    report.load_stats = load_err.partial_stats().cloned();
                }
                fail(report, Phase::Load, e)
            }
        }
    }

    fn load(&mut self, clean: &CleanTable) -> PipelineResult<BatchStats> {
        let store = self.store.as_deref_mut().ok_or(LoadError::NotConfigured)?;
        store.check()?;
        let mut loader = Loader::new(store, self.options.batch_size);
        let stats = match self.options.strategy {
            LoadStrategy::Upsert => loader.load_batch(clean)?,
            LoadStrategy::Bulk => loader.bulk_insert(clean)?,
        };
        Ok(stats)
    }
}

fn advance(report: &mut PipelineReport, next: PipelineState) {
    debug_assert!(
        report.state.can_transition_to(next),
        "illegal transition {} -> {}",
        report.state,
        next
    );
    info!(from = %report.state, to = %next, "Pipeline state");
    report.state = next;
    report.transitions.push(next);
}

fn fail(report: &mut PipelineReport, phase: Phase, err: PipelineError) {
    error!(%phase, error = %err, "Phase failed");
    report.errors.push(PhaseError {
        phase,
        error: err.to_string(),
    });
    advance(report, PipelineState::Failed);
}

fn record_timing(report: &mut PipelineReport, phase: Phase, started: Instant) {
    report.phases.push(PhaseTiming {
        phase,
        seconds: started.elapsed().as_secs_f64(),
    });
}

fn log_validation(validation: &ValidationReport) {
    if validation.is_clean() {
        return;
    }
    warn!(total = validation.total_errors(), "Validation issues recorded");
    for issue in validation.issues.iter().take(ISSUES_TO_LOG) {
        warn!("{}", issue);
    }
}
