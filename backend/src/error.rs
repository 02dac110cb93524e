//! Error types for the import pipeline.
//!
//! Errors are split by tier:
//!
//! - [`CsvError`] - batch-level input errors (fatal to the whole upload)
//! - [`StoreError`] - collaborator/storage failures
//! - [`CommitError`] - a single row failing during Commit
//! - [`ImportError`] - top-level orchestration errors
//! - [`ServerError`] - HTTP layer errors
//!
//! Row-level *validation* problems are not errors at all: they are data,
//! carried on [`crate::models::ParsedRow::validation_errors`].

use thiserror::Error;

// =============================================================================
// CSV Input Errors
// =============================================================================

/// Errors that reject a whole upload before any row is produced.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Content could not be decoded as text.
    #[error("Failed to decode file: {0}")]
    EncodingError(String),

    /// Structurally invalid CSV.
    #[error("Invalid CSV format at line {line}: {message}")]
    ParseError { line: u64, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// Header present but no data rows.
    #[error("CSV file contains no data rows")]
    NoDataRows,

    /// Required columns absent from the header.
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors raised by the persistence collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Unique constraint violated.
    #[error("Unique constraint violated on {field}: {value}")]
    Conflict { field: &'static str, value: String },

    /// Lock poisoned by a panicking writer.
    #[error("Store lock poisoned")]
    Poisoned,

    /// IO error while persisting.
    #[error("Store IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error while persisting.
    #[error("Store JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Commit Errors (per row)
// =============================================================================

/// Reasons a single confirmed row fails to commit.
#[derive(Debug, Error)]
pub enum CommitError {
    /// The row was submitted without passing Preview.
    #[error("Row {0} failed validation and cannot be imported")]
    NotValid(usize),

    /// Account manager email missing from the resolved map.
    #[error("Account manager not found: {0}")]
    AccountManagerNotFound(String),

    /// Customer engineer email missing from the resolved map.
    #[error("Customer engineer not found: {0}")]
    CustomerEngineerNotFound(String),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// =============================================================================
// Import Errors (top-level)
// =============================================================================

/// Top-level import errors. Only batch-level failures end up here.
#[derive(Debug, Error)]
pub enum ImportError {
    /// CSV input error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Storage error during Preview.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Import error.
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for a single row commit.
pub type CommitResult<T> = Result<T, CommitError>;

/// Result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let csv_err = CsvError::EmptyFile;
        let import_err: ImportError = csv_err.into();
        assert!(import_err.to_string().contains("empty"));

        let store_err = StoreError::NotFound { kind: "Project", id: "p1".into() };
        let commit_err: CommitError = store_err.into();
        assert_eq!(commit_err.to_string(), "Project not found: p1");
    }

    #[test]
    fn test_missing_columns_format() {
        let err = CsvError::MissingColumns(vec!["Stage".into(), "SPOC".into()]);
        assert_eq!(err.to_string(), "Missing required columns: Stage, SPOC");
    }

    #[test]
    fn test_commit_error_messages() {
        let err = CommitError::AccountManagerNotFound("am@x.com".into());
        assert_eq!(err.to_string(), "Account manager not found: am@x.com");
        assert_eq!(
            CommitError::NotValid(4).to_string(),
            "Row 4 failed validation and cannot be imported"
        );
    }
}
