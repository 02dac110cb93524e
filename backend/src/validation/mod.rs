//! Field-level validation of imported project rows.
//!
//! [`validate`] is pure and total: every malformed input yields a
//! [`ParsedRow`] carrying its [`FieldError`]s, never a panic or an `Err`.
//! All violations are collected, in column declaration order, so the same
//! input always produces the same error report.
//!
//! # Example
//!
//! ```rust,ignore
//! use deliverytrack::parser::RawRow;
//! use deliverytrack::validation::validate;
//!
//! let raw = RawRow::from_pairs([("Account Name", "Acme"), ("Stage", "POC")]);
//! let row = validate(&raw, 2);
//! assert!(!row.is_valid);
//! ```

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{
    Channel, CsvRow, FieldError, ParsedRow, Priority, Product, ProjectFields, Stage, Status,
    Vocabulary,
};
use crate::parser::{
    RawRow, ACCOUNT_MANAGER_EMAIL, ACCOUNT_NAME, CHANNELS, CUSTOMER_ENGINEER_EMAIL, PRIORITY,
    PRODUCT, SPOC, STAGE, STATUS, TARGET_DATE, USE_CASE_SUMMARY,
};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})").expect("valid ISO date regex"));

static US_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})").expect("valid US date regex"));

/// Textual forms accepted after ISO and before `MM/DD/YYYY`.
const TEXT_DATE_FORMATS: [&str; 6] = [
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
    "%Y/%m/%d",
    "%a, %d %b %Y",
];

/// Validate one raw row.
pub fn validate(raw: &RawRow, row_number: usize) -> ParsedRow {
    validate_csv_row(raw.to_csv_row(), row_number)
}

/// Validate a row already projected onto the canonical columns.
pub fn validate_csv_row(data: CsvRow, row_number: usize) -> ParsedRow {
    let mut errors = Vec::new();

    let account_name = required(&data.account_name, ACCOUNT_NAME, &mut errors);

    let account_manager_email = required(&data.account_manager_email, ACCOUNT_MANAGER_EMAIL, &mut errors)
        .and_then(|email| checked_email(email, ACCOUNT_MANAGER_EMAIL, &mut errors));

    let stage = required(&data.stage, STAGE, &mut errors)
        .and_then(|v| member::<Stage>(v, "stage", STAGE, &mut errors));

    let products = required(&data.product, PRODUCT, &mut errors)
        .and_then(|v| product_set(v, &mut errors));

    // Evaluated on a fresh parse so it runs even when the product cell failed.
    let wants_channels = split_list(&data.product)
        .iter()
        .any(|p| Product::parse(p) == Some(Product::AiAgent));
    let channels = channel_set(&data.channels, wants_channels, &mut errors);

    let customer_engineer_email = match data.customer_engineer_email.trim() {
        "" => Some(None),
        email => checked_email(email, CUSTOMER_ENGINEER_EMAIL, &mut errors).map(Some),
    };

    let spoc = required(&data.spoc, SPOC, &mut errors);

    let priority = required(&data.priority, PRIORITY, &mut errors)
        .and_then(|v| member::<Priority>(v, "priority", PRIORITY, &mut errors));

    let use_case_summary = required(&data.use_case_summary, USE_CASE_SUMMARY, &mut errors);

    let target_date = required(&data.target_date, TARGET_DATE, &mut errors).and_then(|v| {
        let parsed = parse_date(v);
        if parsed.is_none() {
            errors.push(FieldError::new(TARGET_DATE, "Invalid date format"));
        }
        parsed
    });

    let status = required(&data.status, STATUS, &mut errors)
        .and_then(|v| member::<Status>(v, "status", STATUS, &mut errors));

    let fields = if errors.is_empty() {
        match (
            account_name,
            account_manager_email,
            stage,
            products,
            channels,
            customer_engineer_email,
            spoc,
            priority,
            use_case_summary,
            target_date,
            status,
        ) {
            (
                Some(account_name),
                Some(account_manager_email),
                Some(stage),
                Some(products),
                Some(channels),
                Some(customer_engineer_email),
                Some(spoc),
                Some(priority),
                Some(use_case_summary),
                Some(target_date),
                Some(status),
            ) => Some(ProjectFields {
                account_name: account_name.to_string(),
                account_manager_email,
                stage,
                products,
                channels,
                customer_engineer_email,
                spoc: spoc.to_string(),
                priority,
                use_case_summary: use_case_summary.to_string(),
                target_date,
                status,
                jira_ticket: Some(data.jira_ticket.trim())
                    .filter(|t| !t.is_empty())
                    .map(String::from),
            }),
            _ => None,
        }
    } else {
        None
    };

    ParsedRow {
        row_number,
        is_valid: errors.is_empty(),
        data,
        fields,
        validation_errors: errors,
        is_duplicate: false,
        matched_record_id: None,
        warnings: Vec::new(),
    }
}

/// Whether `value` looks like `local@domain.tld`.
pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value.trim())
}

/// Parse a target date: ISO prefix, then textual forms, then `MM/DD/YYYY`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(caps) = ISO_DATE_RE.captures(value) {
        let date = ymd(&caps[1], &caps[2], &caps[3]);
        if date.is_some() {
            return date;
        }
    }

    if let Some(date) = parse_text_date(value) {
        return Some(date);
    }

    US_DATE_RE
        .captures(value)
        .and_then(|caps| ymd(&caps[3], &caps[1], &caps[2]))
}

fn parse_text_date(value: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.date_naive());
    }
    TEXT_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// Split a list cell given as a JSON array or comma-separated text.
/// Elements are trimmed and upper-cased; empty elements are dropped.
pub fn split_list(value: &str) -> Vec<String> {
    let value = value.trim();
    if value.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(value) {
            return items
                .iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }
    value
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn required<'a>(value: &'a str, label: &str, errors: &mut Vec<FieldError>) -> Option<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.push(FieldError::new(label, format!("{label} is required")));
        None
    } else {
        Some(trimmed)
    }
}

fn checked_email(value: &str, label: &str, errors: &mut Vec<FieldError>) -> Option<String> {
    if is_valid_email(value) {
        Some(value.trim().to_lowercase())
    } else {
        errors.push(FieldError::new(label, "Invalid email format"));
        None
    }
}

fn member<V: Vocabulary>(
    value: &str,
    noun: &str,
    label: &str,
    errors: &mut Vec<FieldError>,
) -> Option<V> {
    let parsed = V::parse(value);
    if parsed.is_none() {
        errors.push(FieldError::new(
            label,
            format!("Invalid {noun}. Must be one of: {}", V::listing()),
        ));
    }
    parsed
}

/// Deduplicated members of a list cell; one error per unknown element.
fn members<V: Vocabulary + PartialEq>(
    items: &[String],
    noun: &str,
    label: &str,
    errors: &mut Vec<FieldError>,
) -> Option<Vec<V>> {
    let mut set = Vec::new();
    let mut ok = true;
    for item in items {
        match V::parse(item) {
            Some(v) if !set.contains(&v) => set.push(v),
            Some(_) => {}
            None => {
                ok = false;
                errors.push(FieldError::new(
                    label,
                    format!("Invalid {noun}: {item}. Must be: {}", V::listing()),
                ));
            }
        }
    }
    ok.then_some(set)
}

fn product_set(value: &str, errors: &mut Vec<FieldError>) -> Option<Vec<Product>> {
    let items = split_list(value);
    if items.is_empty() {
        errors.push(FieldError::new(PRODUCT, format!("{PRODUCT} is required")));
        return None;
    }
    members(&items, "product", PRODUCT, errors)
}

fn channel_set(
    value: &str,
    wants_channels: bool,
    errors: &mut Vec<FieldError>,
) -> Option<Vec<Channel>> {
    let items = split_list(value);
    match (wants_channels, items.is_empty()) {
        (true, true) => {
            errors.push(FieldError::new(
                CHANNELS,
                "Channels required when AI Agent is selected",
            ));
            None
        }
        (true, false) => members(&items, "channel", CHANNELS, errors),
        (false, true) => Some(Vec::new()),
        (false, false) => {
            errors.push(FieldError::new(
                CHANNELS,
                "Channels are only allowed when AI Agent is selected",
            ));
            None
        }
    }
}
