//! CSV reader with encoding and delimiter auto-detection.
//!
//! Turns uploaded bytes into [`RawRow`]s keyed by the canonical project
//! columns. Anything that prevents producing rows at all (undecodable bytes,
//! empty file, missing columns, broken quoting) is a [`CsvError`].

use serde::Serialize;
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::models::CsvRow;

pub const ACCOUNT_NAME: &str = "Account Name";
pub const ACCOUNT_MANAGER_EMAIL: &str = "Account Manager Email";
pub const STAGE: &str = "Stage";
pub const PRODUCT: &str = "Product";
pub const CHANNELS: &str = "Channels";
pub const CUSTOMER_ENGINEER_EMAIL: &str = "Customer Engineer Email";
pub const SPOC: &str = "SPOC";
pub const PRIORITY: &str = "Priority";
pub const USE_CASE_SUMMARY: &str = "Use Case Summary";
pub const TARGET_DATE: &str = "Target Date";
pub const STATUS: &str = "Status";
pub const JIRA_TICKET: &str = "Jira Ticket";

/// Canonical column set, in declaration order.
pub const COLUMNS: [&str; 12] = [
    ACCOUNT_NAME,
    ACCOUNT_MANAGER_EMAIL,
    STAGE,
    PRODUCT,
    CHANNELS,
    CUSTOMER_ENGINEER_EMAIL,
    SPOC,
    PRIORITY,
    USE_CASE_SUMMARY,
    TARGET_DATE,
    STATUS,
    JIRA_TICKET,
];

/// Columns that may be left out of the header entirely.
pub const OPTIONAL_COLUMNS: [&str; 3] = [CHANNELS, CUSTOMER_ENGINEER_EMAIL, JIRA_TICKET];

/// One data line, as read. Header → cell, in file column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawRow {
    pub cells: Vec<(String, String)>,
}

impl RawRow {
    /// Build from `(column, value)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            cells: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Cell for a canonical column, or "" when the column is absent.
    pub fn get(&self, column: &str) -> &str {
        self.cells
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(column))
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    }

    /// Project the cells onto the canonical columns.
    pub fn to_csv_row(&self) -> CsvRow {
        CsvRow {
            account_name: self.get(ACCOUNT_NAME).to_string(),
            account_manager_email: self.get(ACCOUNT_MANAGER_EMAIL).to_string(),
            stage: self.get(STAGE).to_string(),
            product: self.get(PRODUCT).to_string(),
            channels: self.get(CHANNELS).to_string(),
            customer_engineer_email: self.get(CUSTOMER_ENGINEER_EMAIL).to_string(),
            spoc: self.get(SPOC).to_string(),
            priority: self.get(PRIORITY).to_string(),
            use_case_summary: self.get(USE_CASE_SUMMARY).to_string(),
            target_date: self.get(TARGET_DATE).to_string(),
            status: self.get(STATUS).to_string(),
            jira_ticket: self.get(JIRA_TICKET).to_string(),
        }
    }
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Data rows with their 1-based file row numbers (first data row = 2)
    pub rows: Vec<(usize, RawRow)>,
    /// Detected encoding
    pub encoding: String,
    /// Detected delimiter
    pub delimiter: char,
    /// Column headers as found in the file
    pub headers: Vec<String>,
}

/// Detect the encoding of raw bytes.
///
/// Valid UTF-8 is always UTF-8. chardet only guesses for other input.
pub fn detect_encoding(bytes: &[u8]) -> String {
    if std::str::from_utf8(bytes).is_ok() {
        return "utf-8".to_string();
    }

    let result = chardet::detect(bytes);
    let charset = result.0;

    // Not UTF-8, so read any other guess as the Windows-1252 superset
    match charset.to_lowercase().as_str() {
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        _ => "windows-1252".to_string(),
    }
}

/// Decode bytes to string using the specified encoding.
///
/// UTF-8 is decoded strictly; invalid sequences reject the upload.
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let text = match encoding.to_lowercase().as_str() {
        // Latin-1 is read as its Windows-1252 superset
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
            encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()
        }
        _ => String::from_utf8(bytes.to_vec())
            .map_err(|e| CsvError::EncodingError(e.to_string()))?,
    };

    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse a CSV file with auto-detection of encoding and delimiter.
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<ParseResult> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(CsvError::EmptyFile);
    }

    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);

    parse_str(&content, delimiter, encoding)
}

/// Parse decoded CSV text with an explicit delimiter.
pub fn parse_str(content: &str, delimiter: char, encoding: String) -> CsvResult<ParseResult> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(to_parse_error)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    check_columns(&headers)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(to_parse_error)?;

        // Whitespace-only lines come through as a single empty field.
        if record.len() == 1 && record[0].is_empty() {
            continue;
        }

        let cells = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header.clone(), record.get(i).unwrap_or("").to_string()))
            .collect();

        let row_number = rows.len() + 2;
        rows.push((row_number, RawRow { cells }));
    }

    if rows.is_empty() {
        return Err(CsvError::NoDataRows);
    }

    Ok(ParseResult {
        rows,
        encoding,
        delimiter,
        headers,
    })
}

/// Every non-optional canonical column must appear (order and case ignored).
fn check_columns(headers: &[String]) -> CsvResult<()> {
    let missing: Vec<String> = COLUMNS
        .iter()
        .filter(|column| !OPTIONAL_COLUMNS.contains(column))
        .filter(|column| !headers.iter().any(|h| h.eq_ignore_ascii_case(column)))
        .map(|column| column.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(CsvError::MissingColumns(missing))
    }
}

fn to_parse_error(e: csv::Error) -> CsvError {
    let line = e.position().map(|p| p.line()).unwrap_or(0);
    CsvError::ParseError {
        line,
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Account Name,Account Manager Email,Stage,Product,Channels,Customer Engineer Email,SPOC,Priority,Use Case Summary,Target Date,Status,Jira Ticket";

    fn parse(content: &str) -> CsvResult<ParseResult> {
        parse_bytes_auto(content.as_bytes())
    }

    #[test]
    fn test_simple_csv() {
        let csv = format!(
            "{HEADER}\nAcme,am@x.com,POC,ANALYTICS,,,Jane,HIGH,Onboarding flow,2024-03-15,IN_PROGRESS,\n"
        );
        let result = parse(&csv).unwrap();

        assert_eq!(result.delimiter, ',');
        assert_eq!(result.rows.len(), 1);
        let (row_number, row) = &result.rows[0];
        assert_eq!(*row_number, 2);
        assert_eq!(row.get(ACCOUNT_NAME), "Acme");
        assert_eq!(row.get(USE_CASE_SUMMARY), "Onboarding flow");
        assert_eq!(row.get(JIRA_TICKET), "");
    }

    #[test]
    fn test_quoted_product_list() {
        let csv = format!(
            "{HEADER}\nAcme,am@x.com,POC,\"ANALYTICS,AI_AGENT\",PSTN,,Jane,HIGH,Bot,2024-03-15,IN_PROGRESS,\n"
        );
        let result = parse(&csv).unwrap();
        assert_eq!(result.rows[0].1.get(PRODUCT), "ANALYTICS,AI_AGENT");
    }

    #[test]
    fn test_header_order_insensitive_and_optional_columns() {
        let csv = "Status;Target Date;Use Case Summary;Priority;SPOC;Product;Stage;Account Manager Email;Account Name\n\
                   DONE;2024-01-01;Flow;LOW;Bob;ANALYTICS;POC;am@x.com;Acme";
        let result = parse(csv).unwrap();

        assert_eq!(result.delimiter, ';');
        let row = &result.rows[0].1;
        assert_eq!(row.get(ACCOUNT_NAME), "Acme");
        assert_eq!(row.get(STATUS), "DONE");
        assert_eq!(row.get(CHANNELS), "");
    }

    #[test]
    fn test_empty_lines_skipped_and_numbering() {
        let csv = format!(
            "{HEADER}\nA,am@x.com,POC,ANALYTICS,,,J,HIGH,One,2024-03-15,IN_PROGRESS,\n\n   \nB,am@x.com,POC,ANALYTICS,,,J,HIGH,Two,2024-03-15,IN_PROGRESS,\n"
        );
        let result = parse(&csv).unwrap();
        let numbers: Vec<usize> = result.rows.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![2, 3]);
    }

    #[test]
    fn test_empty_file_error() {
        assert!(matches!(parse(""), Err(CsvError::EmptyFile)));
        assert!(matches!(parse("  \n "), Err(CsvError::EmptyFile)));
    }

    #[test]
    fn test_header_only_error() {
        assert!(matches!(parse(HEADER), Err(CsvError::NoDataRows)));
    }

    #[test]
    fn test_missing_columns_error() {
        let err = parse("Account Name,Stage\nAcme,POC").unwrap_err();
        match err {
            CsvError::MissingColumns(cols) => {
                assert!(cols.contains(&"Account Manager Email".to_string()));
                assert!(!cols.contains(&"Jira Ticket".to_string()));
                assert!(!cols.contains(&"Stage".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        assert!(matches!(
            decode_content(&[0x41, 0xff, 0xfe, 0x42], "utf-8"),
            Err(CsvError::EncodingError(_))
        ));
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_short_accented_utf8_kept() {
        for name in ["Nestlé", "Société Générale", "Café Müller", "Zürich AG"] {
            let result = parse(&format!("{HEADER}\n{name},am@x.com,POC,ANALYTICS,,,Jane,HIGH,Flow,2024-03-15,IN_PROGRESS,")).unwrap();
            assert_eq!(result.encoding, "utf-8");
            assert_eq!(result.rows[0].1.get("Account Name"), name);
        }
    }

    #[test]
    fn test_latin1_bytes_detected() {
        let mut bytes = format!("{HEADER}\n").into_bytes();
        // "Société Générale" in ISO-8859-1
        bytes.extend_from_slice(b"Soci\xe9t\xe9 G\xe9n\xe9rale,am@x.com,POC,ANALYTICS,,,Jane,HIGH,Flow,2024-03-15,IN_PROGRESS,");

        assert_ne!(detect_encoding(&bytes), "utf-8");
        let result = parse_bytes_auto(&bytes).unwrap();
        assert_eq!(result.rows[0].1.get("Account Name"), "Société Générale");
    }

    #[test]
    fn test_bom_stripped() {
        let decoded = decode_content("\u{feff}a,b".as_bytes(), "utf-8").unwrap();
        assert_eq!(decoded, "a,b");
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a|b|c"), '|');
    }
}
