//! Type coercion rules.
//!
//! A closed set of rules, looked up per column from static tables rather than
//! by inspecting runtime types. Each application yields the coerced value (or
//! absent) and at most one issue to report.

use chrono::NaiveDate;
use serde_json::Value;

use super::report::IssueKind;
use crate::validation::{is_absent, parse_date, parse_real, scalar_text};

/// How a raw scalar is turned into a typed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coercion {
    /// Whole number; unparseable becomes absent.
    Integer,
    /// Calendar date via the fixed format list; unparseable becomes absent.
    Date,
    /// Real number clamped into `[min, max]`; unparseable becomes absent.
    ClampedReal { min: f64, max: f64 },
    /// Whole number clamped into `[min, max]`; absent or unparseable becomes `default`.
    ClampedInteger { min: i64, max: i64, default: i64 },
}

/// Student columns and their rules, in application order.
pub const STUDENT_RULES: &[(&str, Coercion)] = &[
    ("gpa", Coercion::ClampedReal { min: 0.0, max: 4.0 }),
    ("graduation_year", Coercion::Integer),
    ("date_of_birth", Coercion::Date),
];

/// Course columns and their rules.
pub const COURSE_RULES: &[(&str, Coercion)] = &[
    ("credits", Coercion::ClampedInteger { min: 1, max: 12, default: 3 }),
    ("max_enrollment", Coercion::Integer),
];

/// Look up the rule for a column.
pub fn rule_for(rules: &[(&str, Coercion)], column: &str) -> Option<Coercion> {
    rules.iter().find(|(c, _)| *c == column).map(|(_, r)| *r)
}

/// A coerced value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Typed {
    Integer(i64),
    Real(f64),
    Date(NaiveDate),
}

impl Typed {
    pub fn as_integer(self) -> Option<i64> {
        match self {
            Typed::Integer(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_real(self) -> Option<f64> {
        match self {
            Typed::Real(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_date(self) -> Option<NaiveDate> {
        match self {
            Typed::Date(d) => Some(d),
            _ => None,
        }
    }
}

/// Result of applying one rule to one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub value: Option<Typed>,
    pub issue: Option<IssueKind>,
}

impl Coerced {
    fn ok(value: Option<Typed>) -> Self {
        Self { value, issue: None }
    }

    fn flagged(value: Option<Typed>, issue: IssueKind) -> Self {
        Self {
            value,
            issue: Some(issue),
        }
    }
}

impl Coercion {
    pub fn apply(&self, raw: &Value) -> Coerced {
        match *self {
            Coercion::Integer => {
                if is_absent(raw) {
                    return Coerced::ok(None);
                }
                match parse_integer(raw) {
                    Some(i) => Coerced::ok(Some(Typed::Integer(i))),
                    None => Coerced::flagged(None, IssueKind::UnparseableInteger),
                }
            }
            Coercion::Date => {
                let text = match scalar_text(raw) {
                    Some(t) if !t.trim().is_empty() => t,
                    _ => return Coerced::ok(None),
                };
                match parse_date(&text) {
                    Some(d) => Coerced::ok(Some(Typed::Date(d))),
                    None => Coerced::flagged(None, IssueKind::UnparseableDate),
                }
            }
            Coercion::ClampedReal { min, max } => {
                if is_absent(raw) {
                    return Coerced::ok(None);
                }
                match parse_real(raw) {
                    Some(r) if r < min || r > max => {
                        Coerced::flagged(Some(Typed::Real(r.clamp(min, max))), IssueKind::OutOfRange)
                    }
                    Some(r) => Coerced::ok(Some(Typed::Real(r))),
                    None => Coerced::flagged(None, IssueKind::UnparseableNumber),
                }
            }
            Coercion::ClampedInteger { min, max, default } => {
                let value = parse_real(raw)
                    .map(|r| r.trunc() as i64)
                    .unwrap_or(default)
                    .clamp(min, max);
                Coerced::ok(Some(Typed::Integer(value)))
            }
        }
    }
}

/// Whole numbers, including integral reals such as `"2027.0"`.
fn parse_integer(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const GPA: Coercion = Coercion::ClampedReal { min: 0.0, max: 4.0 };
    const CREDITS: Coercion = Coercion::ClampedInteger { min: 1, max: 12, default: 3 };

    #[test]
    fn test_gpa_clamp() {
        let high = GPA.apply(&json!("5.0"));
        assert_eq!(high.value, Some(Typed::Real(4.0)));
        assert_eq!(high.issue, Some(IssueKind::OutOfRange));

        let low = GPA.apply(&json!(-1.0));
        assert_eq!(low.value, Some(Typed::Real(0.0)));
        assert_eq!(low.issue, Some(IssueKind::OutOfRange));

        let ok = GPA.apply(&json!(3.5));
        assert_eq!(ok.value, Some(Typed::Real(3.5)));
        assert_eq!(ok.issue, None);
    }

    #[test]
    fn test_gpa_unparseable_and_absent() {
        let bad = GPA.apply(&json!("A+"));
        assert_eq!(bad.value, None);
        assert_eq!(bad.issue, Some(IssueKind::UnparseableNumber));

        assert_eq!(GPA.apply(&Value::Null), Coerced::ok(None));
    }

    #[test]
    fn test_integer() {
        assert_eq!(Coercion::Integer.apply(&json!("2027")).value, Some(Typed::Integer(2027)));
        assert_eq!(Coercion::Integer.apply(&json!("2027.0")).value, Some(Typed::Integer(2027)));
        assert_eq!(Coercion::Integer.apply(&json!(2026)).value, Some(Typed::Integer(2026)));

        let bad = Coercion::Integer.apply(&json!("next year"));
        assert_eq!(bad.value, None);
        assert_eq!(bad.issue, Some(IssueKind::UnparseableInteger));
    }

    #[test]
    fn test_date() {
        let d = Coercion::Date.apply(&json!("15/05/2002"));
        assert_eq!(d.value, Some(Typed::Date(NaiveDate::from_ymd_opt(2002, 5, 15).unwrap())));

        let bad = Coercion::Date.apply(&json!("May fifth"));
        assert_eq!(bad.value, None);
        assert_eq!(bad.issue, Some(IssueKind::UnparseableDate));

        assert_eq!(Coercion::Date.apply(&json!("")).issue, None);
    }

    #[test]
    fn test_credits_clamp_and_default() {
        assert_eq!(CREDITS.apply(&json!("4")).value, Some(Typed::Integer(4)));
        assert_eq!(CREDITS.apply(&json!(20)).value, Some(Typed::Integer(12)));
        assert_eq!(CREDITS.apply(&json!("0")).value, Some(Typed::Integer(1)));
        assert_eq!(CREDITS.apply(&json!("three")).value, Some(Typed::Integer(3)));
        assert_eq!(CREDITS.apply(&Value::Null).value, Some(Typed::Integer(3)));
        assert_eq!(CREDITS.apply(&json!("x")).issue, None);
    }

    #[test]
    fn test_rule_lookup() {
        assert_eq!(rule_for(STUDENT_RULES, "graduation_year"), Some(Coercion::Integer));
        assert_eq!(rule_for(COURSE_RULES, "credits"), Some(CREDITS));
        assert_eq!(rule_for(STUDENT_RULES, "email"), None);
    }
}
