//! CSV exports of projects and of the audit log.

use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;

use crate::audit::AuditQuery;
use crate::error::{ServerError, ServerResult, StoreResult};
use crate::models::{Priority, Product, Project, Stage, Status, Vocabulary};
use crate::store::JsonStore;

const PROJECT_HEADERS: [&str; 11] = [
    "Account Name",
    "Account Manager",
    "Stage",
    "Product",
    "SPOC",
    "Priority",
    "Use Case Summary",
    "Target Date",
    "Status",
    "Jira Ticket",
    "Created At",
];

const AUDIT_HEADERS: [&str; 7] = [
    "Timestamp",
    "User",
    "Project",
    "Action",
    "Field Changed",
    "Old Value",
    "New Value",
];

/// Filters for the project export. Every set field must match.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFilter {
    pub stage: Option<Stage>,
    pub product: Option<Product>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub account_manager_id: Option<String>,
}

impl ProjectFilter {
    pub fn matches(&self, project: &Project) -> bool {
        let p = &project.payload;
        self.stage.map_or(true, |s| s == p.stage)
            && self.product.map_or(true, |prod| p.products.contains(&prod))
            && self.priority.map_or(true, |pr| pr == p.priority)
            && self.status.map_or(true, |s| s == p.status)
            && self
                .account_manager_id
                .as_ref()
                .map_or(true, |id| *id == p.account_manager_id)
    }
}

/// Matching projects as CSV, newest first.
pub fn projects_csv(store: &JsonStore, filter: &ProjectFilter) -> ServerResult<String> {
    let accounts = account_names_by_id(store)?;
    let users: HashMap<String, String> = store
        .users()?
        .into_iter()
        .map(|u| (u.id.clone(), u.display_name().to_string()))
        .collect();

    let mut projects: Vec<Project> = store
        .projects()?
        .into_iter()
        .filter(|p| filter.matches(p))
        .collect();
    projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut writer = csv::Writer::from_writer(Vec::new());
    write_record(&mut writer, PROJECT_HEADERS)?;

    for project in &projects {
        let p = &project.payload;
        let products: Vec<&str> = p.products.iter().map(|x| x.as_str()).collect();
        write_record(
            &mut writer,
            [
                accounts.get(&p.account_name_id).map(String::as_str).unwrap_or(""),
                users.get(&p.account_manager_id).map(String::as_str).unwrap_or("Unknown"),
                p.stage.as_str(),
                &products.join(","),
                &p.spoc,
                p.priority.as_str(),
                &p.use_case_summary,
                &p.target_date.format("%Y-%m-%d").to_string(),
                p.status.as_str(),
                p.jira_ticket.as_deref().unwrap_or(""),
                &project.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ],
        )?;
    }

    finish(writer)
}

/// Matching audit entries as CSV, newest first.
pub fn audit_csv(store: &JsonStore, query: &AuditQuery) -> ServerResult<String> {
    let accounts = account_names_by_id(store)?;
    let project_accounts: HashMap<String, String> = store
        .projects()?
        .into_iter()
        .map(|p| (p.id, p.payload.account_name_id))
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    write_record(&mut writer, AUDIT_HEADERS)?;

    for entry in query.apply(store.audit_entries()?) {
        let project = project_accounts
            .get(&entry.subject_record_id)
            .and_then(|account_id| accounts.get(account_id))
            .map(String::as_str)
            .unwrap_or("Deleted Project");

        write_record(
            &mut writer,
            [
                &entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                entry.actor_label.as_str(),
                project,
                entry.action.as_str(),
                entry.field_name.as_deref().unwrap_or(""),
                entry.old_value.as_deref().unwrap_or(""),
                entry.new_value.as_deref().unwrap_or(""),
            ],
        )?;
    }

    finish(writer)
}

/// `"{prefix}-YYYY-MM-DD.csv"` for the Content-Disposition header.
pub fn export_file_name(prefix: &str) -> String {
    format!("{}-{}.csv", prefix, Utc::now().format("%Y-%m-%d"))
}

fn account_names_by_id(store: &JsonStore) -> StoreResult<HashMap<String, String>> {
    Ok(store
        .account_names()?
        .into_iter()
        .map(|a| (a.id, a.name))
        .collect())
}

fn write_record<'a, I>(writer: &mut csv::Writer<Vec<u8>>, record: I) -> ServerResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    writer
        .write_record(record)
        .map_err(|e| ServerError::Internal(format!("CSV write failed: {}", e)))
}

fn finish(writer: csv::Writer<Vec<u8>>) -> ServerResult<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| ServerError::Internal(format!("CSV flush failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| ServerError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Actor, AuditEntry};
    use crate::store::tests::payload;
    use crate::store::{AccountRegistry, AuditSink, ProjectStore};

    fn seeded() -> (JsonStore, String) {
        let store = JsonStore::in_memory();
        let user = store.add_user("am@x.com", Some("Ann Manager")).unwrap();
        let account = store.get_or_create_account_name("Acme").unwrap();
        let mut p = payload(&account, &user, "Flow, with \"quotes\"");
        p.products = vec![Product::Analytics, Product::AiAgent];
        let id = store.insert_project(&p).unwrap();
        (store, id)
    }

    #[test]
    fn test_projects_csv() {
        let (store, _) = seeded();
        let csv = projects_csv(&store, &ProjectFilter::default()).unwrap();
        let mut lines = csv.lines();

        assert_eq!(lines.next().unwrap(), PROJECT_HEADERS.join(","));
        let row = lines.next().unwrap();
        assert!(row.starts_with("Acme,Ann Manager,POC,\"ANALYTICS,AI_AGENT\",Jane,HIGH,"));
        assert!(row.contains("\"Flow, with \"\"quotes\"\"\""));
        assert!(row.contains(",2024-03-15,IN_PROGRESS,,"));
    }

    #[test]
    fn test_projects_csv_filtered() {
        let (store, _) = seeded();
        let filter = ProjectFilter { stage: Some(Stage::Production), ..Default::default() };
        let csv = projects_csv(&store, &filter).unwrap();
        assert_eq!(csv.lines().count(), 1);

        let filter = ProjectFilter { product: Some(Product::AiAgent), ..Default::default() };
        assert_eq!(projects_csv(&store, &filter).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_audit_csv_marks_deleted_projects() {
        let (store, id) = seeded();
        let actor = Actor { id: "u1".into(), label: "Ann".into() };
        store.append_audit_entry(&AuditEntry::bulk_created(&id, &actor)).unwrap();
        store.append_audit_entry(&AuditEntry::bulk_updated("gone", &actor)).unwrap();

        let csv = audit_csv(&store, &AuditQuery::default()).unwrap();
        assert!(csv.starts_with("Timestamp,User,Project,Action,Field Changed,Old Value,New Value"));
        assert!(csv.contains(",Ann,Acme,CREATE,CSV Import,,Created via CSV import"));
        assert!(csv.contains(",Ann,Deleted Project,UPDATE,CSV Import,,Bulk updated via CSV import"));
    }

    #[test]
    fn test_export_file_name() {
        let name = export_file_name("projects");
        assert!(name.starts_with("projects-"));
        assert!(name.ends_with(".csv"));
    }
}
