//! # Deliverytrack - bulk CSV import for customer delivery projects
//!
//! Deliverytrack ingests spreadsheets of delivery projects, validates each
//! row, resolves people and accounts to internal ids, matches rows against
//! existing projects and, once the user confirms, inserts or updates them
//! with an audit trail.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐
//! │ CSV File │──▶│  Parser  │──▶│ Validator │──▶│ Resolver │──▶│ Matcher  │──▶ Preview
//! │(UTF8/ISO)│   │(auto-enc)│   │ (per row) │   │(batched) │   │(nat. key)│
//! └──────────┘   └──────────┘   └───────────┘   └──────────┘   └──────────┘
//!
//! Preview ──(client confirms rows)──▶ Commit ──▶ ProjectStore + AuditSink
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use deliverytrack::{commit, preview_file, Actor, CommitRequest, JsonStore};
//!
//! let store = JsonStore::open(".deliverytrack")?;
//! let preview = preview_file("projects.csv".as_ref(), &store)?;
//! let result = commit(&CommitRequest::from_preview(&preview), &actor, &store);
//! println!("{} created, {} updated", result.created, result.updated);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Domain models (Project, ParsedRow, AuditEntry)
//! - [`parser`] - CSV parsing with auto-detection
//! - [`validation`] - Per-row field validation
//! - [`store`] - Collaborator traits and the JSON-file store
//! - [`import`] - Resolver, matcher and the Preview/Commit pipeline
//! - [`audit`] - Audit recording and querying
//! - [`export`] - CSV exports
//! - [`config`] - Runtime configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Validation
pub mod validation;

// Persistence
pub mod store;

// Import pipeline
pub mod import;

// Audit
pub mod audit;

// Export
pub mod export;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{CommitError, CsvError, ImportError, ServerError, StoreError};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    AccountName, Actor, AuditAction, AuditEntry, Channel, CsvRow, FieldError,
    ImportBatchResult, Outcome, ParsedRow, Priority, Product, Project, ProjectPayload,
    RowOutcome, Stage, Status, User, Vocabulary,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_csv_file_auto,
    ParseResult, RawRow,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{validate, validate_csv_row};

// =============================================================================
// Re-exports - Store
// =============================================================================

pub use store::{
    AccountRegistry, AuditSink, ImportBackend, JsonStore, ProjectKey, ProjectStore,
    UserDirectory,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use import::{
    commit, compute_key, preview_bytes, preview_file, preview_rows, CommitRequest, CsvInfo,
    DuplicateIndex, PreviewResponse,
};

// =============================================================================
// Re-exports - Audit & Export
// =============================================================================

pub use audit::{AuditQuery, AuditRecorder};
pub use export::{audit_csv, projects_csv, ProjectFilter};

// =============================================================================
// Re-exports - Config & API
// =============================================================================

pub use config::Config;
pub use api::types::error_response;

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
