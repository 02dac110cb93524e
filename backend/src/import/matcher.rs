//! Duplicate detection on the natural key (account name + use-case summary).
//!
//! The index is a snapshot of the store taken once per import. Rows in the
//! same upload are not matched against each other: two rows sharing a key
//! both probe the pre-batch snapshot. On Commit they either update the same
//! project in row order (last one wins) or each insert a new project. Such
//! collisions are surfaced as row warnings.

use std::collections::HashMap;

use crate::api::logs::log_warning;
use crate::models::{FieldError, ParsedRow};
use crate::parser::USE_CASE_SUMMARY;
use crate::store::ProjectKey;

const KEY_SEPARATOR: &str = "::";

/// Case- and whitespace-insensitive natural key.
pub fn compute_key(account_name: &str, use_case_summary: &str) -> String {
    format!(
        "{}{}{}",
        account_name.trim().to_lowercase(),
        KEY_SEPARATOR,
        use_case_summary.trim().to_lowercase()
    )
}

/// Natural key → existing project id.
#[derive(Debug, Clone, Default)]
pub struct DuplicateIndex {
    by_key: HashMap<String, String>,
}

impl DuplicateIndex {
    pub fn build(existing: &[ProjectKey]) -> Self {
        let by_key = existing
            .iter()
            .map(|p| (compute_key(&p.account_name, &p.use_case_summary), p.project_id.clone()))
            .collect();
        Self { by_key }
    }

    pub fn probe(&self, key: &str) -> Option<&str> {
        self.by_key.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Flag valid rows whose key exists in `index`. Returns the duplicate count.
pub fn mark_duplicates(rows: &mut [ParsedRow], index: &DuplicateIndex) -> usize {
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut duplicates = 0;

    for row in rows.iter_mut().filter(|row| row.is_valid) {
        let Some(fields) = row.fields.as_ref() else {
            continue;
        };
        let key = compute_key(&fields.account_name, &fields.use_case_summary);

        let matched = index.probe(&key);
        if let Some(id) = matched {
            row.is_duplicate = true;
            row.matched_record_id = Some(id.to_string());
            duplicates += 1;
        }

        match first_seen.get(&key) {
            Some(&earlier) => {
                log_warning(format!(
                    "Row {} has the same account and use case as row {}",
                    row.row_number, earlier
                ));
                let consequence = if matched.is_some() {
                    "both update the same project and this row is applied last"
                } else {
                    "each row creates its own project"
                };
                row.warnings.push(FieldError::new(
                    USE_CASE_SUMMARY,
                    format!("Same Account Name and Use Case Summary as row {earlier}; {consequence}"),
                ));
            }
            None => {
                first_seen.insert(key, row.row_number);
            }
        }
    }

    duplicates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CsvRow;
    use crate::validation::validate_csv_row;

    fn row(account: &str, summary: &str, row_number: usize) -> ParsedRow {
        validate_csv_row(
            CsvRow {
                account_name: account.into(),
                account_manager_email: "am@x.com".into(),
                stage: "POC".into(),
                product: "ANALYTICS".into(),
                spoc: "Jane".into(),
                priority: "HIGH".into(),
                use_case_summary: summary.into(),
                target_date: "2024-03-15".into(),
                status: "IN_PROGRESS".into(),
                ..CsvRow::default()
            },
            row_number,
        )
    }

    fn existing(id: &str, account: &str, summary: &str) -> ProjectKey {
        ProjectKey {
            project_id: id.into(),
            account_name: account.into(),
            use_case_summary: summary.into(),
        }
    }

    #[test]
    fn test_key_is_case_and_whitespace_insensitive() {
        assert_eq!(compute_key("Acme", "x"), compute_key(" acme ", "X"));
        assert_eq!(compute_key("Acme", "Onboarding flow"), "acme::onboarding flow");
        assert_ne!(compute_key("Acme", "x"), compute_key("Acme", "y"));
    }

    #[test]
    fn test_probe() {
        let index = DuplicateIndex::build(&[existing("p1", "Acme", "Flow")]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.probe(&compute_key("ACME", " flow")), Some("p1"));
        assert_eq!(index.probe(&compute_key("Acme", "Other")), None);
    }

    #[test]
    fn test_mark_duplicates() {
        let index = DuplicateIndex::build(&[existing("p1", "Acme", "Flow")]);
        let mut rows = vec![row("acme", "FLOW", 2), row("Acme", "New thing", 3)];

        assert_eq!(mark_duplicates(&mut rows, &index), 1);
        assert!(rows[0].is_duplicate);
        assert_eq!(rows[0].matched_record_id.as_deref(), Some("p1"));
        assert!(!rows[1].is_duplicate);
        assert_eq!(rows[1].matched_record_id, None);
    }

    #[test]
    fn test_invalid_rows_never_marked() {
        let index = DuplicateIndex::build(&[existing("p1", "Acme", "Flow")]);
        let mut rows = vec![row("Acme", "Flow", 2)];
        rows[0].invalidate(FieldError::new("Account Manager Email", "User not found: am@x.com"));

        assert_eq!(mark_duplicates(&mut rows, &index), 0);
        assert!(!rows[0].is_duplicate);
    }

    #[test]
    fn test_intra_batch_collisions_match_snapshot_and_warn() {
        let index = DuplicateIndex::build(&[existing("p1", "Acme", "Flow")]);
        let mut rows = vec![row("Acme", "Flow", 2), row("ACME", "flow", 3)];

        assert_eq!(mark_duplicates(&mut rows, &index), 2);
        assert_eq!(rows[0].matched_record_id.as_deref(), Some("p1"));
        assert_eq!(rows[1].matched_record_id.as_deref(), Some("p1"));
        assert!(rows[0].warnings.is_empty());
        assert_eq!(rows[1].warnings.len(), 1);
        assert!(rows[1].warnings[0].message.contains("row 2"));
        assert!(rows[1].warnings[0].message.ends_with("this row is applied last"));
        assert!(rows[1].is_valid);
    }

    #[test]
    fn test_intra_batch_collision_without_match_warns_of_two_projects() {
        let index = DuplicateIndex::default();
        let mut rows = vec![row("Acme", "Flow", 2), row("acme", " FLOW", 3)];

        assert_eq!(mark_duplicates(&mut rows, &index), 0);
        assert!(!rows[1].is_duplicate);
        assert_eq!(
            rows[1].warnings[0].message,
            "Same Account Name and Use Case Summary as row 2; each row creates its own project"
        );
    }
}
