//! Two-phase import: Preview, then Commit.
//!
//! ```text
//! UPLOADED -> PARSED -> VALIDATED -> MATCHED      preview_*  (no project writes)
//! MATCHED  -> client review, picks confirmed rows
//! CONFIRMED -> COMMITTING -> COMMITTED            commit     (row by row)
//! ```
//!
//! Nothing is kept between the two calls: the client sends the preview rows
//! it accepts back together with the resolved email map.
//!
//! # Example
//!
//! ```rust,ignore
//! use deliverytrack::import::{commit, preview_bytes, CommitRequest};
//! use deliverytrack::store::JsonStore;
//!
//! let store = JsonStore::in_memory();
//! let preview = preview_bytes(&bytes, &store)?;
//! let request = CommitRequest::from_preview(&preview);
//! let result = commit(&request, &actor, &store);
//! println!("{} created, {} updated, {} failed", result.created, result.updated, result.failed);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::matcher::{mark_duplicates, DuplicateIndex};
use super::resolver::{resolve_account_names, resolve_emails};
use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::audit::AuditRecorder;
use crate::error::{CommitError, CommitResult, ImportResult};
use crate::models::{
    Actor, AuditEntry, ImportBatchResult, Outcome, ParsedRow, RowOutcome,
};
use crate::parser::{parse_bytes_auto, parse_csv_file_auto, ParseResult, RawRow};
use crate::store::ImportBackend;
use crate::validation::validate;

/// CSV file information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: String,
    pub headers: Vec<String>,
}

/// Output of the Preview phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub rows: Vec<ParsedRow>,
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub duplicate_rows: usize,
    /// Lower-cased email → user id.
    pub resolved_email_to_id: BTreeMap<String, String>,
    /// Account name → account name id.
    pub resolved_account_name_to_id: BTreeMap<String, String>,
    pub csv_info: Option<CsvInfo>,
}

/// Input of the Commit phase: the confirmed rows of a preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub rows: Vec<ParsedRow>,
    pub resolved_email_to_id: BTreeMap<String, String>,
}

impl CommitRequest {
    /// Confirm every valid row of a preview.
    pub fn from_preview(preview: &PreviewResponse) -> Self {
        Self {
            rows: preview.rows.iter().filter(|r| r.is_valid).cloned().collect(),
            resolved_email_to_id: preview.resolved_email_to_id.clone(),
        }
    }
}

// =============================================================================
// Preview
// =============================================================================

/// Preview an uploaded file.
pub fn preview_bytes<S: ImportBackend + ?Sized>(
    bytes: &[u8],
    store: &S,
) -> ImportResult<PreviewResponse> {
    log_info("📖 Reading CSV file...");
    let parsed = parse_bytes_auto(bytes)?;
    preview_parsed(parsed, store)
}

/// Preview a file on disk.
pub fn preview_file<S: ImportBackend + ?Sized>(
    path: &Path,
    store: &S,
) -> ImportResult<PreviewResponse> {
    log_info(format!("📖 Reading {}...", path.display()));
    let parsed = parse_csv_file_auto(path)?;
    preview_parsed(parsed, store)
}

fn preview_parsed<S: ImportBackend + ?Sized>(
    parsed: ParseResult,
    store: &S,
) -> ImportResult<PreviewResponse> {
    log_success(format!("Detected encoding: {}", parsed.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(parsed.delimiter)));
    log_success(format!("Read {} rows", parsed.rows.len()));

    let csv_info = CsvInfo {
        encoding: parsed.encoding,
        delimiter: format_delimiter(parsed.delimiter).to_string(),
        headers: parsed.headers,
    };

    let mut response = preview_rows(parsed.rows, store)?;
    response.csv_info = Some(csv_info);
    Ok(response)
}

/// Validate, resolve and match already-read rows.
pub fn preview_rows<S: ImportBackend + ?Sized>(
    raw_rows: Vec<(usize, RawRow)>,
    store: &S,
) -> ImportResult<PreviewResponse> {
    log_info("✔️  Validating rows...");
    let mut rows: Vec<ParsedRow> = raw_rows
        .iter()
        .map(|(row_number, raw)| validate(raw, *row_number))
        .collect();
    let field_invalid = rows.iter().filter(|r| !r.is_valid).count();
    if field_invalid > 0 {
        log_warning(format!("{} rows failed field validation", field_invalid));
    }

    log_info("👥 Resolving users...");
    let resolved_email_to_id = resolve_emails(&mut rows, store)?;
    log_success(format!("{} users resolved", resolved_email_to_id.len()));

    log_info("🏢 Resolving account names...");
    let resolved_account_name_to_id = resolve_account_names(&rows, store)?;
    log_success(format!("{} account names", resolved_account_name_to_id.len()));

    log_info("🔎 Matching existing projects...");
    let index = DuplicateIndex::build(&store.existing_project_keys()?);
    let duplicate_rows = mark_duplicates(&mut rows, &index);

    let total_rows = rows.len();
    let valid_rows = rows.iter().filter(|r| r.is_valid).count();
    let invalid_rows = total_rows - valid_rows;

    if invalid_rows == 0 {
        log_success(format!("All {} rows valid ({} duplicates)", total_rows, duplicate_rows));
    } else {
        log_success(format!("Valid: {}", valid_rows));
        log_error(format!("Invalid: {}", invalid_rows));
        for row in rows.iter().filter(|r| !r.is_valid).take(5) {
            let messages: Vec<&str> = row.validation_errors.iter().map(|e| e.message.as_str()).collect();
            log_error(format!("Row {}: {}", row.row_number, messages.join("; ")));
        }
    }

    Ok(PreviewResponse {
        rows,
        total_rows,
        valid_rows,
        invalid_rows,
        duplicate_rows,
        resolved_email_to_id,
        resolved_account_name_to_id,
        csv_info: None,
    })
}

// =============================================================================
// Commit
// =============================================================================

/// Apply confirmed rows one by one.
///
/// A failing row is recorded and the next row is attempted; the result
/// always satisfies `created + updated + failed == request.rows.len()`.
pub fn commit<S: ImportBackend + ?Sized>(
    request: &CommitRequest,
    actor: &Actor,
    store: &S,
) -> ImportBatchResult {
    log_info(format!("💾 Committing {} rows...", request.rows.len()));

    let emails: BTreeMap<String, String> = request
        .resolved_email_to_id
        .iter()
        .map(|(email, id)| (email.trim().to_lowercase(), id.clone()))
        .collect();
    let recorder = AuditRecorder::new(store);

    let mut result = ImportBatchResult::default();
    for row in &request.rows {
        let outcome = match commit_row(row, &emails, actor, store, &recorder) {
            Ok((outcome, record_id)) => RowOutcome {
                row_number: row.row_number,
                outcome,
                record_id: Some(record_id),
                error: None,
            },
            Err(e) => {
                log_error(format!("Row {}: {}", row.row_number, e));
                RowOutcome {
                    row_number: row.row_number,
                    outcome: Outcome::Failed,
                    record_id: None,
                    error: Some(e.to_string()),
                }
            }
        };
        result.push(outcome);
    }

    if result.failed == 0 {
        log_success(format!("Created {}, updated {}", result.created, result.updated));
    } else {
        log_warning(format!(
            "Created {}, updated {}, failed {}",
            result.created, result.updated, result.failed
        ));
    }

    result
}

fn commit_row<S: ImportBackend + ?Sized>(
    row: &ParsedRow,
    emails: &BTreeMap<String, String>,
    actor: &Actor,
    store: &S,
    recorder: &AuditRecorder<'_, S>,
) -> CommitResult<(Outcome, String)> {
    let fields = match (&row.fields, row.is_valid) {
        (Some(fields), true) => fields,
        _ => return Err(CommitError::NotValid(row.row_number)),
    };

    let account_name_id = store.get_or_create_account_name(&fields.account_name)?;

    let account_manager_id = emails
        .get(&fields.account_manager_email)
        .cloned()
        .ok_or_else(|| CommitError::AccountManagerNotFound(fields.account_manager_email.clone()))?;

    let customer_engineer_id = match &fields.customer_engineer_email {
        Some(email) => Some(
            emails
                .get(email)
                .cloned()
                .ok_or_else(|| CommitError::CustomerEngineerNotFound(email.clone()))?,
        ),
        None => None,
    };

    let payload = fields.to_payload(account_name_id, account_manager_id, customer_engineer_id);

    let (outcome, record_id) = match (row.is_duplicate, &row.matched_record_id) {
        (true, Some(id)) => {
            store.update_project(id, &payload)?;
            (Outcome::Updated, id.clone())
        }
        _ => (Outcome::Created, store.insert_project(&payload)?),
    };

    let entry = match outcome {
        Outcome::Updated => AuditEntry::bulk_updated(&record_id, actor),
        _ => AuditEntry::bulk_created(&record_id, actor),
    };
    recorder.record(entry);

    Ok((outcome, record_id))
}

/// Format delimiter for display
fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        '|' => "|",
        _ => "?",
    }
}
