//! Validation report returned alongside every cleaned table.
//!
//! Issues are data, not control flow: recording one never removes a row
//! by itself. Each issue keeps the row index from the raw input so it can
//! be traced back after rows before it were deduplicated or filtered.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What was wrong with a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    InvalidEmail,
    InvalidPhone,
    OutOfRange,
    UnparseableNumber,
    UnknownDepartment,
    UnknownGender,
    UnknownStatus,
    UnparseableInteger,
    UnparseableDate,
    DateOutOfRange,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidEmail => "Invalid email format",
            Self::InvalidPhone => "Invalid phone number (expected 10-15 digits)",
            Self::OutOfRange => "Value outside accepted range, clamped",
            Self::UnparseableNumber => "Not a number, cleared",
            Self::UnknownDepartment => "Unknown department code",
            Self::UnknownGender => "Unknown gender value",
            Self::UnknownStatus => "Unknown status value",
            Self::UnparseableInteger => "Not an integer, cleared",
            Self::UnparseableDate => "Unrecognized date format, cleared",
            Self::DateOutOfRange => "Date outside accepted year range",
        };
        f.write_str(msg)
    }
}

/// One soft-fail finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub row: usize,
    pub column: String,
    pub value: Option<String>,
    pub kind: IssueKind,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "Row {}, column '{}' (value '{}'): {}", self.row, self.column, v, self.kind),
            None => write!(f, "Row {}, column '{}': {}", self.row, self.column, self.kind),
        }
    }
}

/// Issues plus a log of structural steps (dedup, filtering) for one transform call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    pub log: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        row: usize,
        column: impl Into<String>,
        value: Option<String>,
        kind: IssueKind,
    ) {
        self.issues.push(ValidationIssue {
            row,
            column: column.into(),
            value,
            kind,
        });
    }

    pub fn note(&mut self, entry: impl Into<String>) {
        self.log.push(entry.into());
    }

    pub fn total_errors(&self) -> usize {
        self.issues.len()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issues recorded against one input row.
    pub fn for_row(&self, row: usize) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.row == row)
    }

    pub fn count_by_kind(&self) -> BTreeMap<IssueKind, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.kind).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_display() {
        let issue = ValidationIssue {
            row: 4,
            column: "gpa".into(),
            value: Some("5.0".into()),
            kind: IssueKind::OutOfRange,
        };
        let msg = issue.to_string();
        assert!(msg.contains("Row 4"));
        assert!(msg.contains("column 'gpa'"));
        assert!(msg.contains("value '5.0'"));
    }

    #[test]
    fn test_counts_and_row_filter() {
        let mut report = ValidationReport::new();
        report.record(0, "email", Some("bad".into()), IssueKind::InvalidEmail);
        report.record(2, "email", None, IssueKind::InvalidEmail);
        report.record(2, "gender", Some("x".into()), IssueKind::UnknownGender);

        assert_eq!(report.total_errors(), 3);
        assert_eq!(report.for_row(2).count(), 2);
        assert_eq!(report.count_by_kind()[&IssueKind::InvalidEmail], 2);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&IssueKind::UnknownDepartment).unwrap();
        assert_eq!(json, "\"unknown_department\"");
    }
}
