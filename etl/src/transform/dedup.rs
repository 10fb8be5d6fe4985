//! Deduplication by business key.
//!
//! The first occurrence in input order wins. Rows whose key is absent are
//! never considered duplicates of each other.

use std::collections::HashSet;
use tracing::info;

use super::report::ValidationReport;

/// Keep the first row for every distinct key, preserving order.
///
/// Returns the number of rows removed. A note is appended to `report`
/// when anything was dropped.
pub fn dedup_by<T, F>(rows: &mut Vec<T>, key_name: &str, report: &mut ValidationReport, key: F) -> usize
where
    F: Fn(&T) -> Option<String>,
{
    let before = rows.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(before);
    rows.retain(|row| match key(row) {
        Some(k) => seen.insert(k),
        None => true,
    });

    let removed = before - rows.len();
    if removed > 0 {
        info!(removed, key = key_name, "Removed duplicate records");
        report.note(format!("Deduplication on {}: removed {} records", key_name, removed));
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Row {
        email: Option<&'static str>,
        v: u32,
    }

    fn email_key(r: &Row) -> Option<String> {
        r.email.map(|e| e.to_string())
    }

    #[test]
    fn test_keep_first() {
        let mut rows = vec![
            Row { email: Some("a@x.com"), v: 1 },
            Row { email: Some("a@x.com"), v: 2 },
        ];
        let mut report = ValidationReport::new();

        let removed = dedup_by(&mut rows, "email", &mut report, email_key);

        assert_eq!(removed, 1);
        assert_eq!(rows, vec![Row { email: Some("a@x.com"), v: 1 }]);
        assert_eq!(report.log.len(), 1);
    }

    #[test]
    fn test_order_preserved_and_absent_kept() {
        let mut rows = vec![
            Row { email: Some("b@x.com"), v: 1 },
            Row { email: None, v: 2 },
            Row { email: Some("a@x.com"), v: 3 },
            Row { email: None, v: 4 },
            Row { email: Some("b@x.com"), v: 5 },
        ];
        let mut report = ValidationReport::new();

        dedup_by(&mut rows, "email", &mut report, email_key);

        let order: Vec<u32> = rows.iter().map(|r| r.v).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_no_duplicates_no_note() {
        let mut rows = vec![Row { email: Some("a@x.com"), v: 1 }];
        let mut report = ValidationReport::new();
        assert_eq!(dedup_by(&mut rows, "email", &mut report, email_key), 0);
        assert!(report.log.is_empty());
    }
}
