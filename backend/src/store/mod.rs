//! Persistence collaborators and the JSON snapshot store.
//!
//! The import pipeline only talks to the traits in this module:
//!
//! - [`UserDirectory`] - user lookup by email (read-only)
//! - [`AccountRegistry`] - get-or-create account names
//! - [`ProjectStore`] - project reads and writes
//! - [`AuditSink`] - append-only audit log
//!
//! [`JsonStore`] implements all of them over in-memory state, optionally
//! saved as a single JSON document in a data directory after every write.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{AccountName, AuditEntry, Project, ProjectPayload, User};

/// File name of the snapshot inside the data directory.
const SNAPSHOT_FILE: &str = "store.json";

// =============================================================================
// Collaborator traits
// =============================================================================

/// Read-only view of the user directory.
pub trait UserDirectory {
    /// Batched lookup. Returns lower-cased email → user id for every match.
    fn find_users_by_email(&self, emails: &[String]) -> StoreResult<HashMap<String, String>>;

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<String>> {
        let key = email.trim().to_lowercase();
        Ok(self.find_users_by_email(&[key.clone()])?.remove(&key))
    }
}

/// Shared vocabulary of account names.
pub trait AccountRegistry {
    /// Exact, case-sensitive match on `name`; created when absent.
    fn get_or_create_account_name(&self, name: &str) -> StoreResult<String>;
}

/// Natural-key view of one existing project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectKey {
    pub project_id: String,
    pub account_name: String,
    pub use_case_summary: String,
}

pub trait ProjectStore {
    /// Every existing project with its account name, for duplicate indexing.
    fn existing_project_keys(&self) -> StoreResult<Vec<ProjectKey>>;

    /// Point lookup on the natural key for single-record callers. Commit
    /// does not use it: it works from the Preview snapshot of
    /// [`ProjectStore::existing_project_keys`].
    fn find_project_by_account_and_summary(
        &self,
        account_name_id: &str,
        use_case_summary: &str,
    ) -> StoreResult<Option<String>>;

    fn insert_project(&self, payload: &ProjectPayload) -> StoreResult<String>;

    /// Fails with [`StoreError::NotFound`] when `id` does not exist.
    fn update_project(&self, id: &str, payload: &ProjectPayload) -> StoreResult<()>;
}

/// Append-only audit log.
pub trait AuditSink {
    fn append_audit_entry(&self, entry: &AuditEntry) -> StoreResult<()>;
}

/// Everything the import pipeline needs from storage.
pub trait ImportBackend: UserDirectory + AccountRegistry + ProjectStore + AuditSink {}

impl<T: UserDirectory + AccountRegistry + ProjectStore + AuditSink + ?Sized> ImportBackend for T {}

// =============================================================================
// JSON snapshot store
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreState {
    users: Vec<User>,
    account_names: Vec<AccountName>,
    projects: Vec<Project>,
    audit_log: Vec<AuditEntry>,
}

/// In-memory store, optionally saved to `<dir>/store.json`.
pub struct JsonStore {
    /// Directory holding the snapshot; `None` keeps everything in memory.
    data_dir: Option<PathBuf>,
    state: RwLock<StoreState>,
}

impl JsonStore {
    /// Create an empty store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Open a store backed by `dir`, loading the existing snapshot if any.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let data_dir = PathBuf::from(dir.as_ref());
        let path = data_dir.join(SNAPSHOT_FILE);

        let state = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            StoreState::default()
        };

        Ok(Self {
            data_dir: Some(data_dir),
            state: RwLock::new(state),
        })
    }

    /// Register a user. Emails are unique case-insensitively.
    pub fn add_user(&self, email: &str, name: Option<&str>) -> StoreResult<String> {
        let email = email.trim().to_lowercase();

        self.transact(|state| {
            if state.users.iter().any(|u| u.email.to_lowercase() == email) {
                return Err(StoreError::Conflict { field: "email", value: email });
            }

            let id = new_id();
            state.users.push(User {
                id: id.clone(),
                email,
                name: name.map(String::from),
            });
            Ok(id)
        })
    }

    pub fn users(&self) -> StoreResult<Vec<User>> {
        Ok(self.read()?.users.clone())
    }

    pub fn user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.iter().find(|u| u.id == id).cloned())
    }

    /// All account names sorted by name.
    pub fn account_names(&self) -> StoreResult<Vec<AccountName>> {
        let mut names = self.read()?.account_names.clone();
        names.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(names)
    }

    pub fn account_name(&self, id: &str) -> StoreResult<Option<AccountName>> {
        Ok(self.read()?.account_names.iter().find(|a| a.id == id).cloned())
    }

    pub fn projects(&self) -> StoreResult<Vec<Project>> {
        Ok(self.read()?.projects.clone())
    }

    pub fn project(&self, id: &str) -> StoreResult<Option<Project>> {
        Ok(self.read()?.projects.iter().find(|p| p.id == id).cloned())
    }

    /// Audit entries in append order.
    pub fn audit_entries(&self) -> StoreResult<Vec<AuditEntry>> {
        Ok(self.read()?.audit_log.clone())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, StoreState>> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, StoreState>> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }

    /// Apply `change` to a copy of the state, persist the copy, then swap it
    /// in. A failed change or a failed write leaves the store untouched.
    fn transact<T, F>(&self, change: F) -> StoreResult<T>
    where
        F: FnOnce(&mut StoreState) -> StoreResult<T>,
    {
        let mut state = self.write()?;
        let mut next = state.clone();
        let value = change(&mut next)?;
        self.persist(&next)?;
        *state = next;
        Ok(value)
    }

    /// Write the snapshot through a temp file so a crash never truncates it.
    fn persist(&self, state: &StoreState) -> StoreResult<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        fs::create_dir_all(dir)?;

        let path = dir.join(SNAPSHOT_FILE);
        let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        let content = serde_json::to_string_pretty(state)?;
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl Default for JsonStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl UserDirectory for JsonStore {
    fn find_users_by_email(&self, emails: &[String]) -> StoreResult<HashMap<String, String>> {
        let state = self.read()?;
        let wanted: Vec<String> = emails.iter().map(|e| e.trim().to_lowercase()).collect();

        Ok(state
            .users
            .iter()
            .map(|u| (u.email.to_lowercase(), u.id.clone()))
            .filter(|(email, _)| wanted.contains(email))
            .collect())
    }
}

impl AccountRegistry for JsonStore {
    fn get_or_create_account_name(&self, name: &str) -> StoreResult<String> {
        if let Some(existing) = self.read()?.account_names.iter().find(|a| a.name == name) {
            return Ok(existing.id.clone());
        }

        self.transact(|state| {
            // Another writer may have created it since the read
            if let Some(existing) = state.account_names.iter().find(|a| a.name == name) {
                return Ok(existing.id.clone());
            }

            let id = new_id();
            state.account_names.push(AccountName {
                id: id.clone(),
                name: name.to_string(),
            });
            Ok(id)
        })
    }
}

impl ProjectStore for JsonStore {
    fn existing_project_keys(&self) -> StoreResult<Vec<ProjectKey>> {
        let state = self.read()?;
        let names: HashMap<&str, &str> = state
            .account_names
            .iter()
            .map(|a| (a.id.as_str(), a.name.as_str()))
            .collect();

        Ok(state
            .projects
            .iter()
            .filter_map(|p| {
                names.get(p.payload.account_name_id.as_str()).map(|name| ProjectKey {
                    project_id: p.id.clone(),
                    account_name: name.to_string(),
                    use_case_summary: p.payload.use_case_summary.clone(),
                })
            })
            .collect())
    }

    fn find_project_by_account_and_summary(
        &self,
        account_name_id: &str,
        use_case_summary: &str,
    ) -> StoreResult<Option<String>> {
        let wanted = use_case_summary.trim().to_lowercase();
        Ok(self
            .read()?
            .projects
            .iter()
            .find(|p| {
                p.payload.account_name_id == account_name_id
                    && p.payload.use_case_summary.trim().to_lowercase() == wanted
            })
            .map(|p| p.id.clone()))
    }

    fn insert_project(&self, payload: &ProjectPayload) -> StoreResult<String> {
        self.transact(|state| {
            check_references(state, payload)?;

            let now = Utc::now();
            let id = new_id();
            state.projects.push(Project {
                id: id.clone(),
                payload: payload.clone(),
                created_at: now,
                updated_at: now,
            });
            Ok(id)
        })
    }

    fn update_project(&self, id: &str, payload: &ProjectPayload) -> StoreResult<()> {
        self.transact(|state| {
            check_references(state, payload)?;

            let project = state
                .projects
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| StoreError::NotFound { kind: "Project", id: id.to_string() })?;
            project.payload = payload.clone();
            project.updated_at = Utc::now();
            Ok(())
        })
    }
}

impl AuditSink for JsonStore {
    fn append_audit_entry(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.transact(|state| {
            state.audit_log.push(entry.clone());
            Ok(())
        })
    }
}

/// Foreign-key checks a relational store would enforce.
fn check_references(state: &StoreState, payload: &ProjectPayload) -> StoreResult<()> {
    if !state.account_names.iter().any(|a| a.id == payload.account_name_id) {
        return Err(StoreError::NotFound {
            kind: "Account name",
            id: payload.account_name_id.clone(),
        });
    }

    let user_ids = std::iter::once(&payload.account_manager_id)
        .chain(payload.customer_engineer_id.as_ref());
    for user_id in user_ids {
        if !state.users.iter().any(|u| &u.id == user_id) {
            return Err(StoreError::NotFound { kind: "User", id: user_id.clone() });
        }
    }
    Ok(())
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}
