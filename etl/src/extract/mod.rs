//! Source acquisition: turns a file, URL or spreadsheet export into a [`RawTable`].
//!
//! CSV input gets encoding and delimiter auto-detection. Cells stay untyped;
//! blank cells become `null` so the Transformer sees them as absent. A row of
//! blank cells is kept as all-`null` so row indices match the source; only
//! empty lines are dropped.
//!
//! # Example
//! ```ignore
//! use campus_etl::extract::{Extract, Source};
//!
//! let table = Source::Csv("data/students.csv".into()).extract()?;
//! println!("{} rows, columns: {}", table.len(), table.headers.join(", "));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ExtractError, ExtractResult};

/// One untyped row: column name to scalar, in column order.
pub type RawRecord = Map<String, Value>;

/// A table of untyped rows with named columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRecord>,
}

impl RawTable {
    /// Build a table from rows, deriving headers from keys in first-seen order.
    pub fn from_records(rows: Vec<RawRecord>) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !headers.iter().any(|h| h == key) {
                    headers.push(key.clone());
                }
            }
        }
        Self { headers, rows }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Anything that can produce a raw table for the pipeline.
pub trait Extract {
    fn extract(&self) -> ExtractResult<RawTable>;

    /// Short description for logs and reports.
    fn describe(&self) -> String;
}

impl Extract for RawTable {
    fn extract(&self) -> ExtractResult<RawTable> {
        Ok(self.clone())
    }

    fn describe(&self) -> String {
        format!("in-memory table ({} rows)", self.rows.len())
    }
}

// =============================================================================
// Sources
// =============================================================================

/// Body format of a remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Csv,
    Json,
}

/// Where a run's raw table comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Csv(PathBuf),
    Json(PathBuf),
    Url {
        url: String,
        format: Format,
        timeout: Duration,
    },
    GoogleSheet {
        sheet_id: String,
        gid: Option<String>,
        timeout: Duration,
    },
}

impl Extract for Source {
    fn extract(&self) -> ExtractResult<RawTable> {
        let table = match self {
            Source::Csv(path) => extract_csv_file(path)?,
            Source::Json(path) => extract_json_file(path)?,
            Source::Url {
                url,
                format,
                timeout,
            } => extract_url(url, *format, *timeout)?,
            Source::GoogleSheet {
                sheet_id,
                gid,
                timeout,
            } => {
                let url = google_sheet_url(sheet_id, gid.as_deref());
                extract_url(&url, Format::Csv, *timeout)?
            }
        };
        info!(source = %self.describe(), rows = table.len(), "Extracted raw table");
        Ok(table)
    }

    fn describe(&self) -> String {
        match self {
            Source::Csv(p) => format!("csv:{}", p.display()),
            Source::Json(p) => format!("json:{}", p.display()),
            Source::Url { url, .. } => format!("url:{}", url),
            Source::GoogleSheet { sheet_id, .. } => format!("google-sheet:{}", sheet_id),
        }
    }
}

/// CSV export URL of a published Google Sheet.
pub fn google_sheet_url(sheet_id: &str, gid: Option<&str>) -> String {
    let mut url = format!(
        "https://docs.google.com/spreadsheets/d/{}/export?format=csv",
        sheet_id
    );
    if let Some(gid) = gid {
        url.push_str("&gid=");
        url.push_str(gid);
    }
    url
}

// =============================================================================
// CSV
// =============================================================================

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes using the given encoding, falling back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Pick the separator that occurs most often in the header line.
pub fn detect_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or("");

    let mut best_sep = b',';
    let mut best_count = 0;
    for sep in [b',', b';', b'\t', b'|'] {
        let count = first_line.matches(sep as char).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }
    best_sep
}

/// Read and parse a CSV file with auto-detection.
pub fn extract_csv_file(path: &Path) -> ExtractResult<RawTable> {
    if !path.exists() {
        return Err(ExtractError::NotFound(path.display().to_string()));
    }
    let bytes = std::fs::read(path)?;
    parse_csv_bytes(&bytes)
}

/// Parse CSV bytes with encoding and delimiter auto-detection.
pub fn parse_csv_bytes(bytes: &[u8]) -> ExtractResult<RawTable> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let content = content.trim_start_matches('\u{feff}');
    if content.trim().is_empty() {
        return Err(ExtractError::Empty);
    }
    let delimiter = detect_delimiter(content);
    debug!(%encoding, delimiter = %(delimiter as char), "Detected CSV dialect");
    parse_csv_str(content, delimiter)
}

/// Parse CSV text with an explicit delimiter.
pub fn parse_csv_str(content: &str, delimiter: u8) -> ExtractResult<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(ExtractError::NotATable("no header row".into()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = Map::new();
        for (i, header) in headers.iter().enumerate() {
            let value = match record.get(i) {
                Some(cell) if !cell.trim().is_empty() => Value::String(cell.to_string()),
                _ => Value::Null,
            };
            row.insert(header.clone(), value);
        }
        rows.push(row);
    }

    Ok(RawTable { headers, rows })
}

// =============================================================================
// JSON
// =============================================================================

/// Read a JSON file holding an array of objects.
pub fn extract_json_file(path: &Path) -> ExtractResult<RawTable> {
    if !path.exists() {
        return Err(ExtractError::NotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    parse_json_str(&content)
}

/// Parse a JSON array of objects into a table.
pub fn parse_json_str(content: &str) -> ExtractResult<RawTable> {
    if content.trim().is_empty() {
        return Err(ExtractError::Empty);
    }
    let value: Value = serde_json::from_str(content)?;
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(ExtractError::NotATable(format!(
                "expected an array of records, found {}",
                json_kind(&other)
            )))
        }
    };

    let mut rows = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => rows.push(map),
            other => {
                return Err(ExtractError::NotATable(format!(
                    "element {} is {}, not an object",
                    i,
                    json_kind(&other)
                )))
            }
        }
    }
    Ok(RawTable::from_records(rows))
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// =============================================================================
// Remote
// =============================================================================

/// Fetch a CSV or JSON document over HTTP and parse it.
pub fn extract_url(url: &str, format: Format, timeout: Duration) -> ExtractResult<RawTable> {
    info!(%url, "Fetching remote source");
    let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
    let response = client.get(url).send()?.error_for_status()?;
    let bytes = response.bytes()?;

    match format {
        Format::Csv => parse_csv_bytes(&bytes),
        Format::Json => parse_json_str(&String::from_utf8_lossy(&bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_simple_csv() {
        let table = parse_csv_str("name,age\nAlice,30\nBob,25", b',').unwrap();

        assert_eq!(table.headers, vec!["name", "age"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0]["name"], "Alice");
        assert_eq!(table.rows[1]["age"], "25");
    }

    #[test]
    fn test_quoted_values_keep_delimiters() {
        let table = parse_csv_str("name;note\n\"Doe; Jane\";\"hi\"", b';').unwrap();
        assert_eq!(table.rows[0]["name"], "Doe; Jane");
        assert_eq!(table.rows[0]["note"], "hi");
    }

    #[test]
    fn test_blank_cells_are_null() {
        let table = parse_csv_str("a,b,c\n1,,3\n4,5", b',').unwrap();
        assert_eq!(table.rows[0]["b"], Value::Null);
        // Ragged row: missing trailing cell.
        assert_eq!(table.rows[1]["c"], Value::Null);
    }

    #[test]
    fn test_empty_lines_skipped_blank_rows_kept() {
        let table = parse_csv_str("a,b\n1,2\n\n,\n3,4\n", b',').unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.rows[1].values().all(Value::is_null));
        assert_eq!(table.rows[2]["a"], "3");
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), b';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), b',');
        assert_eq!(detect_delimiter("a\tb\tc"), b'\t');
        assert_eq!(detect_delimiter("a|b|c"), b'|');
        assert_eq!(detect_delimiter("single"), b',');
    }

    #[test]
    fn test_auto_parse_bytes() {
        let table = parse_csv_bytes(b"email;gpa\na@x.com;3.5\n").unwrap();
        assert_eq!(table.headers, vec!["email", "gpa"]);
        assert_eq!(table.rows[0]["gpa"], "3.5");
    }

    #[test]
    fn test_empty_csv_error() {
        assert!(matches!(parse_csv_bytes(b""), Err(ExtractError::Empty)));
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_json_records() {
        let table = parse_json_str(r#"[{"email":"a@x.com","gpa":3.1},{"email":"b@x.com","phone":null}]"#)
            .unwrap();
        assert_eq!(table.headers, vec!["email", "gpa", "phone"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0]["gpa"], 3.1);
    }

    #[test]
    fn test_json_not_a_table() {
        assert!(matches!(
            parse_json_str(r#"{"email":"a@x.com"}"#),
            Err(ExtractError::NotATable(_))
        ));
        assert!(matches!(parse_json_str("[1, 2]"), Err(ExtractError::NotATable(_))));
    }

    #[test]
    fn test_csv_file_source() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "student_code,email\nSTU1,a@x.com\n").unwrap();

        let table = Source::Csv(file.path().to_path_buf()).extract().unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0]["student_code"], "STU1");
    }

    #[test]
    fn test_missing_file() {
        let source = Source::Csv(PathBuf::from("/definitely/not/here.csv"));
        assert!(matches!(source.extract(), Err(ExtractError::NotFound(_))));
    }

    #[test]
    fn test_google_sheet_url() {
        assert_eq!(
            google_sheet_url("abc", None),
            "https://docs.google.com/spreadsheets/d/abc/export?format=csv"
        );
        assert_eq!(
            google_sheet_url("abc", Some("7")),
            "https://docs.google.com/spreadsheets/d/abc/export?format=csv&gid=7"
        );
    }
}
