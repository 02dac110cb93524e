//! HTTP server for the delivery tracker import API.
//!
//! # API Endpoints
//!
//! | Method | Path                           | Description                          |
//! |--------|--------------------------------|--------------------------------------|
//! | GET    | `/health`                      | Health check                         |
//! | POST   | `/api/projects/import`         | Upload CSV, returns the preview      |
//! | POST   | `/api/projects/import/confirm` | Commit confirmed preview rows        |
//! | GET    | `/api/projects/export`         | Projects as CSV                      |
//! | GET    | `/api/audit-logs`              | Audit entries as JSON                |
//! | GET    | `/api/audit-logs/export`       | Audit entries as CSV                 |
//! | GET    | `/api/account-names`           | Account names, sorted                |
//! | POST   | `/api/account-names`           | Get-or-create an account name        |
//! | GET    | `/api/logs`                    | SSE stream for real-time logs        |

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, HeaderMap, HeaderName, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{
    actor_from_headers, bad_request, reject, AccountNameRequest, ApiError, AuditLogResponse,
    USER_ID_HEADER, USER_NAME_HEADER,
};
use crate::audit::AuditQuery;
use crate::config::Config;
use crate::error::{ServerError, ServerResult};
use crate::export::{audit_csv, export_file_name, projects_csv, ProjectFilter};
use crate::import::{commit, preview_bytes, CommitRequest, PreviewResponse};
use crate::models::{AccountName, ImportBatchResult};
use crate::store::{AccountRegistry, JsonStore};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JsonStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: JsonStore, config: Config) -> Self {
        Self { store: Arc::new(store), config: Arc::new(config) }
    }
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = JsonStore::open(&config.data_dir)?;
    let port = config.port;
    let app = router(AppState::new(store, config.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Delivery tracker server running on http://localhost:{}", port);
    println!("   POST /api/projects/import         - Upload CSV for preview");
    println!("   POST /api/projects/import/confirm - Commit confirmed rows");
    println!("   GET  /api/projects/export         - Export projects as CSV");
    println!("   GET  /api/audit-logs              - Audit log");
    println!("   GET  /api/logs                    - SSE log stream");
    println!("   GET  /health                      - Health check");
    println!();
    println!("💾 Data directory: {}", config.data_dir.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(USER_NAME_HEADER),
        ])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    let upload_limit = state.config.max_upload_size;

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/projects/import", post(import_preview))
        .route("/api/projects/import/confirm", post(import_confirm))
        .route("/api/projects/export", get(export_projects))
        .route("/api/audit-logs", get(audit_logs))
        .route("/api/audit-logs/export", get(export_audit_logs))
        .route("/api/account-names", get(list_account_names).post(create_account_name))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "deliverytrack",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "import": "POST /api/projects/import",
            "confirm": "POST /api/projects/import/confirm",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers skip what they missed
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload endpoint: parse, validate, resolve and match. Writes no project.
async fn import_preview(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PreviewResponse>, ApiError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            file_data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(&format!("Read error: {}", e)))?
                    .to_vec(),
            );
        }
    }

    let bytes = file_data.ok_or_else(|| bad_request("No file provided"))?;
    if let Some(name) = &file_name {
        if !name.to_lowercase().ends_with(".csv") {
            return Err(bad_request("File must be a CSV"));
        }
    }

    log_info(format!(
        "📄 Import upload: {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let preview = preview_bytes(&bytes, state.store.as_ref())
        .map_err(|e| reject(ServerError::from(e)))?;
    Ok(Json(preview))
}

/// Commit the rows the client confirmed.
async fn import_confirm(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CommitRequest>,
) -> Json<ImportBatchResult> {
    let actor = actor_from_headers(&headers, state.config.default_actor());
    Json(commit(&request, &actor, state.store.as_ref()))
}

async fn export_projects(
    State(state): State<AppState>,
    Query(filter): Query<ProjectFilter>,
) -> Result<Response, ApiError> {
    let body = projects_csv(&state.store, &filter).map_err(reject)?;
    Ok(csv_attachment(&export_file_name("projects"), body))
}

async fn audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditLogResponse>, ApiError> {
    let entries = state
        .store
        .audit_entries()
        .map_err(|e| reject(ServerError::from(e)))?;
    let entries = query.apply(entries);
    Ok(Json(AuditLogResponse { total: entries.len(), entries }))
}

async fn export_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Response, ApiError> {
    let body = audit_csv(&state.store, &query).map_err(reject)?;
    Ok(csv_attachment(&export_file_name("audit-logs"), body))
}

async fn list_account_names(
    State(state): State<AppState>,
) -> Result<Json<Vec<AccountName>>, ApiError> {
    let names = state
        .store
        .account_names()
        .map_err(|e| reject(ServerError::from(e)))?;
    Ok(Json(names))
}

async fn create_account_name(
    State(state): State<AppState>,
    Json(request): Json<AccountNameRequest>,
) -> Result<(StatusCode, Json<AccountName>), ApiError> {
    let account = get_or_create(&state.store, &request.name).map_err(reject)?;
    Ok((StatusCode::CREATED, Json(account)))
}

fn get_or_create(store: &JsonStore, name: &str) -> ServerResult<AccountName> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServerError::BadRequest("Account name is required".to_string()));
    }
    let id = store.get_or_create_account_name(name)?;
    Ok(AccountName { id, name: name.to_string() })
}

fn csv_attachment(file_name: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file_name)),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Actor, AuditEntry};
    use crate::store::AuditSink;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    const HEADER: &str = "Account Name,Account Manager Email,Customer Engineer Email,Stage,Product,Channels,SPOC,Priority,Use Case Summary,Target Date,Status,Jira Ticket";

    fn state() -> AppState {
        let store = JsonStore::in_memory();
        store.add_user("am@example.com", Some("Ann Manager")).unwrap();
        AppState::new(store, Config::default())
    }

    fn multipart_request(file_name: &str, content: &str) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: text/csv\r\n\r\n{c}\r\n--{b}--\r\n",
            b = boundary,
            f = file_name,
            c = content
        );
        Request::builder()
            .method("POST")
            .uri("/api/projects/import")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary))
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_preview_then_confirm() {
        let state = state();
        let csv = format!(
            "{}\nAcme,am@example.com,,POC,ANALYTICS,,Jane,HIGH,Onboarding flow,2024-03-15,IN_PROGRESS,\nBeta,ghost@example.com,,POC,ANALYTICS,,Jane,HIGH,Other,2024-03-15,IN_PROGRESS,",
            HEADER
        );

        let response = router(state.clone())
            .oneshot(multipart_request("projects.csv", &csv))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let preview: PreviewResponse =
            serde_json::from_value(json_body(response).await).unwrap();
        assert_eq!(preview.total_rows, 2);
        assert_eq!(preview.valid_rows, 1);
        assert_eq!(preview.invalid_rows, 1);

        let request = CommitRequest::from_preview(&preview);
        let response = router(state.clone())
            .oneshot(
                Request::post("/api/projects/import/confirm")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(USER_ID_HEADER, "u-9")
                    .header(USER_NAME_HEADER, "Importer")
                    .body(Body::from(serde_json::to_vec(&request).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let result = json_body(response).await;
        assert_eq!(result["created"], 1);
        assert_eq!(result["failed"], 0);

        let audit = state.store.audit_entries().unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].actor_label, "Importer");
    }

    #[tokio::test]
    async fn test_preview_rejects_missing_columns() {
        let response = router(state())
            .oneshot(multipart_request("projects.csv", "Account Name,Stage\nAcme,POC"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().starts_with("Missing required columns: "));
    }

    #[tokio::test]
    async fn test_preview_rejects_non_csv() {
        let response = router(state())
            .oneshot(multipart_request("projects.xlsx", HEADER))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "File must be a CSV");
    }

    #[tokio::test]
    async fn test_confirm_without_rows_returns_zero_counts() {
        let response = router(state())
            .oneshot(
                Request::post("/api/projects/import/confirm")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"rows":[],"resolvedEmailToId":{}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let result = json_body(response).await;
        assert_eq!(result["created"], 0);
        assert_eq!(result["updated"], 0);
        assert_eq!(result["failed"], 0);
        assert_eq!(result["errors"], json!([]));
    }

    #[tokio::test]
    async fn test_account_names() {
        let state = state();
        for name in ["Zeta", "Acme", "Zeta"] {
            let response = router(state.clone())
                .oneshot(
                    Request::post("/api/account-names")
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(json!({ "name": name }).to_string()))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = router(state)
            .oneshot(Request::get("/api/account-names").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let names = json_body(response).await;
        assert_eq!(names.as_array().unwrap().len(), 2);
        assert_eq!(names[0]["name"], "Acme");
    }

    #[tokio::test]
    async fn test_audit_logs_filtered_by_action() {
        let state = state();
        let actor = Actor { id: "u1".into(), label: "Ann".into() };
        state.store.append_audit_entry(&AuditEntry::bulk_created("p1", &actor)).unwrap();
        state.store.append_audit_entry(&AuditEntry::bulk_updated("p1", &actor)).unwrap();

        let response = router(state)
            .oneshot(Request::get("/api/audit-logs?action=UPDATE").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["entries"][0]["action"], "UPDATE");
    }

    #[tokio::test]
    async fn test_project_export_headers() {
        let response = router(state())
            .oneshot(Request::get("/api/projects/export").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).starts_with("Account Name,Account Manager,"));
    }
}
