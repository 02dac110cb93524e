//! Resolve human-readable references of valid rows into internal ids.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::StoreResult;
use crate::models::{FieldError, ParsedRow};
use crate::parser::{ACCOUNT_MANAGER_EMAIL, CUSTOMER_ENGINEER_EMAIL};
use crate::store::{AccountRegistry, UserDirectory};

/// Look up every distinct email of the valid rows in one directory call.
///
/// Unknown emails are not an error here: each affected row gets a
/// "User not found" validation error and is marked invalid.
pub fn resolve_emails<D: UserDirectory + ?Sized>(
    rows: &mut [ParsedRow],
    directory: &D,
) -> StoreResult<BTreeMap<String, String>> {
    let emails: BTreeSet<String> = rows
        .iter()
        .filter(|row| row.is_valid)
        .filter_map(|row| row.fields.as_ref())
        .flat_map(|fields| {
            std::iter::once(fields.account_manager_email.clone())
                .chain(fields.customer_engineer_email.clone())
        })
        .collect();

    if emails.is_empty() {
        return Ok(BTreeMap::new());
    }

    let lookup: Vec<String> = emails.into_iter().collect();
    let resolved: BTreeMap<String, String> = directory
        .find_users_by_email(&lookup)?
        .into_iter()
        .map(|(email, id)| (email.to_lowercase(), id))
        .collect();

    for row in rows.iter_mut().filter(|row| row.is_valid) {
        let Some(fields) = row.fields.clone() else {
            continue;
        };

        if !resolved.contains_key(&fields.account_manager_email) {
            let shown = row.data.account_manager_email.trim().to_string();
            row.invalidate(FieldError::new(
                ACCOUNT_MANAGER_EMAIL,
                format!("User not found: {shown}"),
            ));
        }

        if let Some(email) = &fields.customer_engineer_email {
            if !resolved.contains_key(email) {
                let shown = row.data.customer_engineer_email.trim().to_string();
                row.invalidate(FieldError::new(
                    CUSTOMER_ENGINEER_EMAIL,
                    format!("User not found: {shown}"),
                ));
            }
        }
    }

    Ok(resolved)
}

/// Get-or-create every distinct account name of the valid rows.
pub fn resolve_account_names<R: AccountRegistry + ?Sized>(
    rows: &[ParsedRow],
    registry: &R,
) -> StoreResult<BTreeMap<String, String>> {
    let names: BTreeSet<&str> = rows
        .iter()
        .filter(|row| row.is_valid)
        .filter_map(|row| row.fields.as_ref())
        .map(|fields| fields.account_name.as_str())
        .collect();

    let mut resolved = BTreeMap::new();
    for name in names {
        let id = registry.get_or_create_account_name(name)?;
        resolved.insert(name.to_string(), id);
    }
    Ok(resolved)
}
