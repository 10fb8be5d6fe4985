//! Field validators and normalizers.
//!
//! Every function here is total: it answers `true`/`false` or returns a
//! normalized value (or `None` for absent). Nothing does I/O.
//!
//! # Shared enumerations
//!
//! [`VALID_GENDERS`], [`VALID_DEPARTMENTS`] and [`VALID_STATUSES`] are the
//! same sets the registration API validates against. Changing one side
//! without the other breaks records that cross both paths.
//!
//! # Example
//!
//! ```rust
//! use campus_etl::validation::{normalize_name, validate_email, validate_phone};
//!
//! assert_eq!(normalize_name(Some("  jane   DOE ")), Some("Jane Doe".to_string()));
//! assert!(validate_email(Some("jane.doe@uni.edu")));
//! assert!(validate_phone(Some("+1 (555) 010-0100")));
//! ```

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Accepted gender values, in canonical spelling.
pub const VALID_GENDERS: [&str; 4] = ["Male", "Female", "Other", "Prefer not to say"];

/// Department reference codes.
pub const VALID_DEPARTMENTS: [&str; 8] = ["CS", "MATH", "PHY", "ENG", "BIO", "CHEM", "ECON", "PSY"];

/// Accepted student status values, in canonical spelling.
pub const VALID_STATUSES: [&str; 5] = ["Active", "Inactive", "Graduated", "Suspended", "On Leave"];

/// Date formats tried in order; the first that parses wins.
pub const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d"];

/// Earliest accepted year for dates of birth.
pub const DEFAULT_MIN_YEAR: i32 = 1950;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

static PHONE_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s()\-+]").expect("valid phone regex"));

static PHONE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{10,15}$").expect("valid digits regex"));

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

// =============================================================================
// Scalar helpers
// =============================================================================

/// Render an untyped scalar as text. `null` is absent.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// `null`, a missing cell, or a blank string.
pub fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Parse a scalar as a real number. Blank and `null` are `None`.
pub fn parse_real(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

// =============================================================================
// Validators
// =============================================================================

/// `local@domain.tld`, with at least one dot in the domain and a 2+ letter
/// final label. Absent is invalid.
pub fn validate_email(email: Option<&str>) -> bool {
    match email {
        Some(e) => EMAIL_PATTERN.is_match(e.trim()),
        None => false,
    }
}

/// Absent or blank is valid; otherwise 10 to 15 digits once spaces,
/// parentheses, dashes and plus signs are stripped.
pub fn validate_phone(phone: Option<&str>) -> bool {
    match phone {
        None => true,
        Some(p) if p.trim().is_empty() => true,
        Some(p) => {
            let cleaned = PHONE_NOISE.replace_all(p, "");
            PHONE_DIGITS.is_match(&cleaned)
        }
    }
}

/// Absent is valid; otherwise a real number in `[0.0, 4.0]`.
pub fn validate_gpa(gpa: &Value) -> bool {
    if is_absent(gpa) {
        return true;
    }
    match parse_real(gpa) {
        Some(g) => (0.0..=4.0).contains(&g),
        None => false,
    }
}

/// Parse a date with the first matching entry of [`DATE_FORMATS`].
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Absent or blank is valid; otherwise the value must parse and its year
/// must lie in `[min_year, max_year]` (`max_year` defaults to this year).
pub fn validate_date(date: Option<&str>, min_year: i32, max_year: Option<i32>) -> bool {
    let date = match date {
        None => return true,
        Some(d) if d.trim().is_empty() => return true,
        Some(d) => d,
    };
    let max_year = max_year.unwrap_or_else(current_year);
    match parse_date(date) {
        Some(d) => (min_year..=max_year).contains(&d.year()),
        None => false,
    }
}

pub fn current_year() -> i32 {
    chrono::Local::now().year()
}

pub fn is_valid_department(code: &str) -> bool {
    VALID_DEPARTMENTS.contains(&code)
}

/// Canonical spelling of a gender value, matched case-insensitively.
pub fn canonical_gender(gender: &str) -> Option<&'static str> {
    canonical(&VALID_GENDERS, gender)
}

/// Canonical spelling of a status value, matched case-insensitively.
pub fn canonical_status(status: &str) -> Option<&'static str> {
    canonical(&VALID_STATUSES, status)
}

fn canonical(set: &[&'static str], value: &str) -> Option<&'static str> {
    let wanted = clean_string(Some(value))?;
    set.iter().copied().find(|v| v.eq_ignore_ascii_case(&wanted))
}

// =============================================================================
// Normalizers
// =============================================================================

/// Trim and collapse internal whitespace runs. Blank becomes `None`.
pub fn clean_string(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(WHITESPACE_RUN.replace_all(trimmed, " ").into_owned())
}

/// Cleaned and title-cased ("o'brien  mary-jane" -> "O'Brien Mary-Jane").
pub fn normalize_name(name: Option<&str>) -> Option<String> {
    clean_string(name).map(|s| title_case(&s))
}

/// Cleaned and lower-cased.
pub fn normalize_email(email: Option<&str>) -> Option<String> {
    clean_string(email).map(|s| s.to_lowercase())
}

/// Trimmed and upper-cased, for student, course and department codes.
pub fn normalize_code(code: Option<&str>) -> Option<String> {
    let trimmed = code?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Upper-case the first letter of every alphabetic run, lower-case the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_email() {
        assert!(validate_email(Some("john.doe@university.edu")));
        assert!(validate_email(Some("  a+b@x.co  ")));
        assert!(!validate_email(Some("not-an-email")));
        assert!(!validate_email(Some("a@nodot")));
        assert!(!validate_email(Some("a@x.c")));
        assert!(!validate_email(None));
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone(None));
        assert!(validate_phone(Some("   ")));
        assert!(validate_phone(Some("+1-555-010-0100")));
        assert!(validate_phone(Some("(555) 010 0100")));
        assert!(!validate_phone(Some("555-0100")));
        assert!(!validate_phone(Some("1234567890123456")));
        assert!(!validate_phone(Some("555-CALL-NOW")));
    }

    #[test]
    fn test_validate_gpa() {
        assert!(validate_gpa(&Value::Null));
        assert!(validate_gpa(&json!("")));
        assert!(validate_gpa(&json!(3.5)));
        assert!(validate_gpa(&json!("4.0")));
        assert!(validate_gpa(&json!(0)));
        assert!(!validate_gpa(&json!(5.0)));
        assert!(!validate_gpa(&json!("-1")));
        assert!(!validate_gpa(&json!("abc")));
    }

    #[test]
    fn test_parse_date_first_format_wins() {
        assert_eq!(parse_date("2002-05-15"), NaiveDate::from_ymd_opt(2002, 5, 15));
        // Ambiguous day/month: DD/MM/YYYY is tried before MM/DD/YYYY.
        assert_eq!(parse_date("03/04/2001"), NaiveDate::from_ymd_opt(2001, 4, 3));
        // Only MM/DD/YYYY can read a month-first date with day > 12.
        assert_eq!(parse_date("12/25/2000"), NaiveDate::from_ymd_opt(2000, 12, 25));
        assert_eq!(parse_date("1999/01/31"), NaiveDate::from_ymd_opt(1999, 1, 31));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_validate_date_range() {
        assert!(validate_date(None, 1950, None));
        assert!(validate_date(Some(""), 1950, None));
        assert!(validate_date(Some("2000-01-01"), 1950, Some(2024)));
        assert!(!validate_date(Some("1949-12-31"), 1950, Some(2024)));
        assert!(!validate_date(Some("2030-01-01"), 1950, Some(2024)));
        assert!(!validate_date(Some("31-31-2000"), 1950, Some(2024)));
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name(Some("  jOHN   smith ")), Some("John Smith".into()));
        assert_eq!(normalize_name(Some("o'brien")), Some("O'Brien".into()));
        assert_eq!(normalize_name(Some("   ")), None);
        assert_eq!(normalize_name(None), None);
    }

    #[test]
    fn test_normalize_email_and_code() {
        assert_eq!(normalize_email(Some(" John.Doe@Uni.EDU ")), Some("john.doe@uni.edu".into()));
        assert_eq!(normalize_email(Some("")), None);
        assert_eq!(normalize_code(Some(" cs101 ")), Some("CS101".into()));
        assert_eq!(normalize_code(Some("  ")), None);
    }

    #[test]
    fn test_canonical_enumerations() {
        assert_eq!(canonical_gender("prefer NOT to say"), Some("Prefer not to say"));
        assert_eq!(canonical_gender(" male "), Some("Male"));
        assert_eq!(canonical_gender("unknown"), None);
        assert_eq!(canonical_status("on leave"), Some("On Leave"));
        assert!(is_valid_department("CS"));
        assert!(!is_valid_department("cs"));
        assert_eq!(canonical_gender("Other"), Some("Other"));
    }

    #[test]
    fn test_scalar_helpers() {
        assert_eq!(scalar_text(&json!(2027)), Some("2027".into()));
        assert_eq!(scalar_text(&Value::Null), None);
        assert!(is_absent(&json!("  ")));
        assert!(!is_absent(&json!(0)));
        assert_eq!(parse_real(&json!(" 3.25 ")), Some(3.25));
        assert_eq!(parse_real(&json!("NaN")), None);
    }
}
