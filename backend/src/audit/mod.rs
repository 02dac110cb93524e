//! Audit trail for project writes.
//!
//! [`AuditRecorder`] appends entries through an [`AuditSink`] and never
//! propagates a sink failure: by the time an entry is recorded the project
//! write it describes is already durable.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::logs::log_warning;
use crate::models::{Actor, AuditAction, AuditEntry, Vocabulary};
use crate::store::AuditSink;

/// Field name recorded for bulk import entries.
pub const CSV_IMPORT_FIELD: &str = "CSV Import";

/// Best-effort writer in front of an [`AuditSink`].
pub struct AuditRecorder<'a, S: AuditSink + ?Sized> {
    sink: &'a S,
}

impl<'a, S: AuditSink + ?Sized> AuditRecorder<'a, S> {
    pub fn new(sink: &'a S) -> Self {
        Self { sink }
    }

    /// Append `entry`. Returns whether the sink accepted it.
    pub fn record(&self, entry: AuditEntry) -> bool {
        match self.sink.append_audit_entry(&entry) {
            Ok(()) => true,
            Err(e) => {
                log_warning(format!(
                    "Audit entry for {} ({}) not recorded: {}",
                    entry.subject_record_id,
                    entry.action.as_str(),
                    e
                ));
                false
            }
        }
    }
}

impl AuditEntry {
    /// Entry for a project created by a CSV import.
    pub fn bulk_created(subject_record_id: &str, actor: &Actor) -> Self {
        Self::bulk_import(subject_record_id, actor, AuditAction::Create, "Created via CSV import")
    }

    /// Entry for a project updated by a CSV import.
    pub fn bulk_updated(subject_record_id: &str, actor: &Actor) -> Self {
        Self::bulk_import(subject_record_id, actor, AuditAction::Update, "Bulk updated via CSV import")
    }

    /// Bulk imports record that the operation happened, not a per-field diff.
    fn bulk_import(
        subject_record_id: &str,
        actor: &Actor,
        action: AuditAction,
        new_value: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            subject_record_id: subject_record_id.to_string(),
            actor_id: actor.id.clone(),
            actor_label: actor.label.clone(),
            action,
            field_name: Some(CSV_IMPORT_FIELD.to_string()),
            old_value: Some(String::new()),
            new_value: Some(new_value.to_string()),
            timestamp: Utc::now(),
        }
    }
}

/// Filters for listing audit entries. Every set field must match.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub action: Option<AuditAction>,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of actor label, field name, old or new value.
    pub search: Option<String>,
}

impl AuditQuery {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if self.action.is_some_and(|a| a != entry.action) {
            return false;
        }
        if self.user_id.as_ref().is_some_and(|u| *u != entry.actor_id) {
            return false;
        }
        if self.project_id.as_ref().is_some_and(|p| *p != entry.subject_record_id) {
            return false;
        }
        if self.date_from.is_some_and(|from| entry.timestamp < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| entry.timestamp > to) {
            return false;
        }
        match self.search.as_deref().map(str::to_lowercase) {
            Some(needle) if !needle.is_empty() => [
                Some(&entry.actor_label),
                entry.field_name.as_ref(),
                entry.old_value.as_ref(),
                entry.new_value.as_ref(),
            ]
            .into_iter()
            .flatten()
            .any(|text| text.to_lowercase().contains(&needle)),
            _ => true,
        }
    }

    /// Matching entries, newest first.
    pub fn apply(&self, entries: Vec<AuditEntry>) -> Vec<AuditEntry> {
        let mut matched: Vec<AuditEntry> = entries.into_iter().filter(|e| self.matches(e)).collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::store::JsonStore;
    use chrono::Duration;

    struct BrokenSink;

    impl AuditSink for BrokenSink {
        fn append_audit_entry(&self, _entry: &AuditEntry) -> StoreResult<()> {
            Err(StoreError::Poisoned)
        }
    }

    fn actor() -> Actor {
        Actor { id: "u1".into(), label: "Importer".into() }
    }

    #[test]
    fn test_record_appends() {
        let store = JsonStore::in_memory();
        let recorder = AuditRecorder::new(&store);
        assert!(recorder.record(AuditEntry::bulk_created("p1", &actor())));

        let entries = store.audit_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field_name.as_deref(), Some("CSV Import"));
        assert_eq!(entries[0].new_value.as_deref(), Some("Created via CSV import"));
        assert_eq!(entries[0].actor_label, "Importer");
    }

    #[test]
    fn test_bulk_entries_carry_action_and_text() {
        let created = AuditEntry::bulk_created("p1", &actor());
        assert_eq!(created.action, AuditAction::Create);
        assert_eq!(created.old_value.as_deref(), Some(""));

        let updated = AuditEntry::bulk_updated("p1", &actor());
        assert_eq!(updated.action, AuditAction::Update);
        assert_eq!(updated.new_value.as_deref(), Some("Bulk updated via CSV import"));
        assert_ne!(created.id, updated.id);
    }

    #[test]
    fn test_record_swallows_sink_failure() {
        let recorder = AuditRecorder::new(&BrokenSink);
        assert!(!recorder.record(AuditEntry::bulk_updated("p1", &actor())));
    }

    #[test]
    fn test_query_filters_and_orders() {
        let mut older = AuditEntry::bulk_created("p1", &actor());
        older.timestamp = Utc::now() - Duration::days(2);
        let newer = AuditEntry::bulk_updated("p2", &actor());

        let all = AuditQuery::default().apply(vec![older.clone(), newer.clone()]);
        assert_eq!(all, vec![newer.clone(), older.clone()]);

        let updates = AuditQuery { action: Some(AuditAction::Update), ..Default::default() };
        assert_eq!(updates.apply(vec![older.clone(), newer.clone()]), vec![newer.clone()]);

        let recent = AuditQuery { date_from: Some(Utc::now() - Duration::days(1)), ..Default::default() };
        assert_eq!(recent.apply(vec![older.clone(), newer.clone()]).len(), 1);

        let search = AuditQuery { search: Some("BULK".into()), ..Default::default() };
        assert_eq!(search.apply(vec![older, newer.clone()]), vec![newer]);
    }
}
