//! Domain models for the import pipeline.
//!
//! - Closed vocabularies: [`Stage`], [`Product`], [`Channel`], [`Priority`], [`Status`]
//! - Directory records: [`User`], [`AccountName`]
//! - Persisted records: [`Project`], [`ProjectPayload`], [`AuditEntry`]
//! - Pipeline units: [`CsvRow`], [`ParsedRow`], [`ProjectFields`], [`FieldError`]
//! - Commit output: [`RowOutcome`], [`ImportBatchResult`]

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Closed vocabularies
// =============================================================================

/// A closed set of upper-case string values.
pub trait Vocabulary: Sized + Copy + 'static {
    /// Every member, in canonical order.
    const ALL: &'static [Self];

    /// Canonical upper-case label.
    fn as_str(&self) -> &'static str;

    /// Case-insensitive lookup after trimming.
    fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_uppercase();
        Self::ALL.iter().copied().find(|v| v.as_str() == normalized)
    }

    /// "A, B, C" listing used in validation messages.
    fn listing() -> String {
        Self::ALL
            .iter()
            .map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Delivery stage of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Poc,
    Onboarding,
    Production,
}

impl Vocabulary for Stage {
    const ALL: &'static [Self] = &[Self::Poc, Self::Onboarding, Self::Production];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Poc => "POC",
            Self::Onboarding => "ONBOARDING",
            Self::Production => "PRODUCTION",
        }
    }
}

/// Product line sold to the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Product {
    Analytics,
    AiAgent,
}

impl Vocabulary for Product {
    const ALL: &'static [Self] = &[Self::Analytics, Self::AiAgent];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Analytics => "ANALYTICS",
            Self::AiAgent => "AI_AGENT",
        }
    }
}

/// Channel an AI agent is deployed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Pstn,
    Whatsapp,
}

impl Vocabulary for Channel {
    const ALL: &'static [Self] = &[Self::Pstn, Self::Whatsapp];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Pstn => "PSTN",
            Self::Whatsapp => "WHATSAPP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Vocabulary for Priority {
    const ALL: &'static [Self] = &[Self::High, Self::Medium, Self::Low];

    fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

/// Project status. Spaces in input are read as underscores ("NOT STARTED").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    NotStarted,
    InProgress,
    OnHold,
    Completed,
    Blocked,
}

impl Vocabulary for Status {
    const ALL: &'static [Self] = &[
        Self::NotStarted,
        Self::InProgress,
        Self::OnHold,
        Self::Completed,
        Self::Blocked,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::OnHold => "ON_HOLD",
            Self::Completed => "COMPLETED",
            Self::Blocked => "BLOCKED",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_uppercase().replace(' ', "_");
        Self::ALL.iter().copied().find(|v| v.as_str() == normalized)
    }
}

/// Kind of change recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl Vocabulary for AuditAction {
    const ALL: &'static [Self] = &[Self::Create, Self::Update, Self::Delete];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

// =============================================================================
// Directory records
// =============================================================================

/// A person known to the directory. Imports never create users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

impl User {
    /// Name if set, otherwise the email.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

/// Shared vocabulary of customer account names. `name` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountName {
    pub id: String,
    pub name: String,
}

// =============================================================================
// Persisted records
// =============================================================================

/// Everything written for a project on insert or update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPayload {
    pub account_name_id: String,
    pub account_manager_id: String,
    pub stage: Stage,
    pub products: Vec<Product>,
    pub channels: Vec<Channel>,
    pub customer_engineer_id: Option<String>,
    pub spoc: String,
    pub priority: Priority,
    pub use_case_summary: String,
    pub target_date: NaiveDate,
    pub status: Status,
    pub jira_ticket: Option<String>,
}

/// A persisted project row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    #[serde(flatten)]
    pub payload: ProjectPayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable change record. Never updated or deleted once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub subject_record_id: String,
    pub actor_id: String,
    pub actor_label: String,
    pub action: AuditAction,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The user on whose behalf a write happens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    pub label: String,
}

// =============================================================================
// Pipeline units
// =============================================================================

/// Raw cell values of one CSV line, keyed by canonical column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvRow {
    pub account_name: String,
    pub account_manager_email: String,
    pub stage: String,
    pub product: String,
    pub channels: String,
    pub customer_engineer_email: String,
    pub spoc: String,
    pub priority: String,
    pub use_case_summary: String,
    pub target_date: String,
    pub status: String,
    pub jira_ticket: String,
}

/// A problem with one field of one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    /// Canonical column label, e.g. "Account Manager Email".
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Normalized, typed values of a row that passed field validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFields {
    pub account_name: String,
    /// Lower-cased.
    pub account_manager_email: String,
    pub stage: Stage,
    pub products: Vec<Product>,
    pub channels: Vec<Channel>,
    /// Lower-cased.
    pub customer_engineer_email: Option<String>,
    pub spoc: String,
    pub priority: Priority,
    pub use_case_summary: String,
    pub target_date: NaiveDate,
    pub status: Status,
    pub jira_ticket: Option<String>,
}

impl ProjectFields {
    /// Payload for the store once the references are resolved.
    pub fn to_payload(
        &self,
        account_name_id: String,
        account_manager_id: String,
        customer_engineer_id: Option<String>,
    ) -> ProjectPayload {
        ProjectPayload {
            account_name_id,
            account_manager_id,
            stage: self.stage,
            products: self.products.clone(),
            channels: self.channels.clone(),
            customer_engineer_id,
            spoc: self.spoc.clone(),
            priority: self.priority,
            use_case_summary: self.use_case_summary.clone(),
            target_date: self.target_date,
            status: self.status,
            jira_ticket: self.jira_ticket.clone(),
        }
    }
}

/// The unit of work through Preview and Commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRow {
    /// 1-based file position; the first data row is 2.
    pub row_number: usize,
    pub data: CsvRow,
    /// Present iff field validation found no errors.
    pub fields: Option<ProjectFields>,
    pub validation_errors: Vec<FieldError>,
    pub is_valid: bool,
    pub is_duplicate: bool,
    pub matched_record_id: Option<String>,
    /// Non-blocking notes for the reviewer.
    #[serde(default)]
    pub warnings: Vec<FieldError>,
}

impl ParsedRow {
    /// Append an error and mark the row invalid.
    pub fn invalidate(&mut self, error: FieldError) {
        self.validation_errors.push(error);
        self.is_valid = false;
    }
}

// =============================================================================
// Commit output
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Created,
    Updated,
    Failed,
}

/// Result of committing one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowOutcome {
    pub row_number: usize,
    pub outcome: Outcome,
    /// Id of the created or updated project.
    pub record_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowFailure {
    pub row_number: usize,
    pub error: String,
}

/// Aggregate response of one Commit call. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBatchResult {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<RowFailure>,
    pub outcomes: Vec<RowOutcome>,
}

impl ImportBatchResult {
    /// Fold one row outcome into the counters.
    pub fn push(&mut self, outcome: RowOutcome) {
        match outcome.outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Failed => {
                self.failed += 1;
                self.errors.push(RowFailure {
                    row_number: outcome.row_number,
                    error: outcome.error.clone().unwrap_or_default(),
                });
            }
        }
        self.outcomes.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_parse_case_insensitive() {
        assert_eq!(Stage::parse(" poc "), Some(Stage::Poc));
        assert_eq!(Product::parse("ai_agent"), Some(Product::AiAgent));
        assert_eq!(Priority::parse("URGENT"), None);
    }

    #[test]
    fn test_status_accepts_spaces() {
        assert_eq!(Status::parse("NOT STARTED"), Some(Status::NotStarted));
        assert_eq!(Status::parse("on hold"), Some(Status::OnHold));
        assert_eq!(Status::parse("in-progress"), None);
    }

    #[test]
    fn test_listing() {
        assert_eq!(Stage::listing(), "POC, ONBOARDING, PRODUCTION");
    }

    #[test]
    fn test_serde_labels_match_vocabulary() {
        for status in Status::ALL {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, status.as_str());
        }
        assert_eq!(serde_json::to_value(Product::AiAgent).unwrap(), "AI_AGENT");
    }

    #[test]
    fn test_batch_result_counts() {
        let mut result = ImportBatchResult::default();
        result.push(RowOutcome { row_number: 2, outcome: Outcome::Created, record_id: Some("a".into()), error: None });
        result.push(RowOutcome { row_number: 3, outcome: Outcome::Failed, record_id: None, error: Some("boom".into()) });
        assert_eq!((result.created, result.updated, result.failed), (1, 0, 1));
        assert_eq!(result.errors[0].row_number, 3);
        assert_eq!(result.total(), 2);
    }
}
