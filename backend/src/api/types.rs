//! Request and response types of the REST API.

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ImportError, ServerError, StoreError};
use crate::models::{Actor, AuditEntry};

/// Header carrying the acting user's id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the acting user's display label.
pub const USER_NAME_HEADER: &str = "x-user-name";

/// Error half of every handler's `Result`.
pub type ApiError = (StatusCode, Json<Value>);

/// Body of `POST /api/account-names`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountNameRequest {
    pub name: String,
}

/// Body of `GET /api/audit-logs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogResponse {
    pub entries: Vec<AuditEntry>,
    pub total: usize,
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

pub fn bad_request(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(error_response(message)))
}

/// Map a server error to its status code and JSON body.
///
/// CSV input errors reach the client with their own message, without the
/// wrapping prefixes.
pub fn reject(error: ServerError) -> ApiError {
    let (status, message) = match &error {
        ServerError::Import(ImportError::Csv(e)) => (StatusCode::BAD_REQUEST, e.to_string()),
        ServerError::Import(ImportError::Store(e)) | ServerError::Store(e) => {
            (store_status(e), e.to_string())
        }
        ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
        ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    };
    (status, Json(error_response(&message)))
}

fn store_status(error: &StoreError) -> StatusCode {
    match error {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Conflict { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Acting user from the request headers, or `fallback` when absent.
///
/// Without a name header the id doubles as the label.
pub fn actor_from_headers(headers: &HeaderMap, fallback: Actor) -> Actor {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    match (header(USER_ID_HEADER), header(USER_NAME_HEADER)) {
        (Some(id), Some(label)) => Actor { id, label },
        (Some(id), None) => Actor { label: id.clone(), id },
        (None, _) => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CsvError;
    use axum::http::HeaderValue;

    fn system() -> Actor {
        Actor { id: "system".into(), label: "System".into() }
    }

    #[test]
    fn test_actor_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(actor_from_headers(&headers, system()), system());

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u-7"));
        assert_eq!(actor_from_headers(&headers, system()).label, "u-7");

        headers.insert(USER_NAME_HEADER, HeaderValue::from_static("Ann"));
        assert_eq!(
            actor_from_headers(&headers, system()),
            Actor { id: "u-7".into(), label: "Ann".into() }
        );
    }

    #[test]
    fn test_reject_csv_error_is_bad_request() {
        let err = ServerError::Import(ImportError::Csv(CsvError::MissingColumns(vec![
            "Stage".into(),
            "Status".into(),
        ])));
        let (status, Json(body)) = reject(err);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required columns: Stage, Status");
    }

    #[test]
    fn test_reject_store_errors() {
        let (status, _) = reject(ServerError::Store(StoreError::Conflict {
            field: "name",
            value: "Acme".into(),
        }));
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = reject(ServerError::Store(StoreError::Poisoned));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
