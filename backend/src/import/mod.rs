//! Bulk CSV import of projects.
//!
//! - [`resolver`] - email and account-name resolution
//! - [`matcher`] - natural-key duplicate detection
//! - [`pipeline`] - the Preview / Commit protocol

pub mod matcher;
pub mod pipeline;
pub mod resolver;

pub use matcher::{compute_key, mark_duplicates, DuplicateIndex};
pub use pipeline::*;
pub use resolver::{resolve_account_names, resolve_emails};
