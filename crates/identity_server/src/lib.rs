//! HTTP surface for identity reconciliation.
//!
//! # Responsibility
//! - Route `GET /` and `POST /identify` onto the core resolver.
//! - Map core errors onto the fixed HTTP error contract.
//! - Answer cross-origin requests from any origin.
//!
//! # Invariants
//! - Validation failures answer 400 with the validation message.
//! - Every other failure answers 500 with a fixed body; details stay in the
//!   server log.
//! - One database connection is shared by all requests and reconciliations
//!   run one at a time against it, on the blocking thread pool.

pub mod config;
pub mod request;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use identity_core::{
    IdentifyError, IdentifyResponse, IdentityResolver, SqliteContactStore, StoreResult,
};
use log::{error, info, warn};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

pub use config::{ConfigError, ServerConfig};
pub use request::{parse_identify_request, IdentifyRequest, PhoneField};

pub const HEALTH_MESSAGE: &str = "Identity Reconciliation API";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// State shared by every request handler.
pub struct AppState {
    conn: Mutex<Connection>,
}

impl AppState {
    /// Wraps a migrated connection.
    ///
    /// Fails when the connection was not opened through `identity_core::db`.
    pub fn new(conn: Connection) -> StoreResult<Self> {
        SqliteContactStore::try_new(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

pub type SharedState = Arc<AppState>;

/// `GET /` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// Error body shared by 400 and 500 answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Failure of one `/identify` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Client-side problem; the message is returned verbatim.
    BadRequest(String),
    /// Anything else; the caller only sees the fixed message.
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorResponse {
        let error = match self {
            Self::BadRequest(message) => message.clone(),
            Self::Internal => INTERNAL_ERROR_MESSAGE.to_string(),
        };
        ErrorResponse { error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Builds the application router. Every route accepts cross-origin calls.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/identify", post(identify))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: HEALTH_MESSAGE.to_string(),
    })
}

pub async fn identify(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<IdentifyResponse>, ApiError> {
    // SQLite calls block, and may wait out the busy timeout.
    tokio::task::spawn_blocking(move || identify_body(&state, &body))
        .await
        .map_err(|err| {
            error!(
                "event=http_identify module=server status=error error_code=worker_join_failed error={err}"
            );
            ApiError::Internal
        })?
        .map(Json)
}

/// Parses a raw `/identify` body and reconciles it.
pub fn identify_body(state: &AppState, body: &[u8]) -> Result<IdentifyResponse, ApiError> {
    let request_id = Uuid::new_v4();
    let started_at = Instant::now();

    let request = parse_identify_request(body).map_err(|message| {
        warn!(
            "event=http_identify module=server status=rejected request_id={request_id} reason=malformed_body"
        );
        ApiError::BadRequest(message)
    })?;

    let conn = state.conn.lock().map_err(|_| {
        error!(
            "event=http_identify module=server status=error request_id={request_id} error_code=state_lock_poisoned"
        );
        ApiError::Internal
    })?;
    let store = SqliteContactStore::try_new(&conn).map_err(|err| {
        error!(
            "event=http_identify module=server status=error request_id={request_id} error_code=store_unavailable error={err}"
        );
        ApiError::Internal
    })?;

    let phone_number = request.phone_text();
    let resolver = IdentityResolver::new(store);

    match resolver.identify(request.email.as_deref(), phone_number.as_deref()) {
        Ok(summary) => {
            info!(
                "event=http_identify module=server status=ok request_id={request_id} primary_id={} duration_ms={}",
                summary.primary_contact_id,
                started_at.elapsed().as_millis()
            );
            Ok(IdentifyResponse::from(summary))
        }
        Err(IdentifyError::Validation(err)) => {
            warn!(
                "event=http_identify module=server status=rejected request_id={request_id} reason=missing_identifier"
            );
            Err(ApiError::BadRequest(err.to_string()))
        }
        Err(IdentifyError::Storage(err)) => {
            error!(
                "event=http_identify module=server status=error request_id={request_id} error_code=storage_failed duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            );
            Err(ApiError::Internal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        health, identify, identify_body, router, ApiError, AppState, HEALTH_MESSAGE,
        INTERNAL_ERROR_MESSAGE,
    };
    use axum::body::{Body, Bytes};
    use axum::extract::State;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::response::IntoResponse;
    use identity_core::db::open_db_in_memory;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState::new(open_db_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn app_state_rejects_unmigrated_connection() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        assert!(AppState::new(conn).is_err());
    }

    #[test]
    fn identify_body_creates_then_extends_cluster() {
        let state = state();

        let first = identify_body(
            &state,
            br#"{"email":"lorraine@hillvalley.edu","phoneNumber":"123456"}"#,
        )
        .unwrap();
        let primary_id = first.contact.primary_contact_id;
        assert!(first.contact.secondary_contact_ids.is_empty());

        let second = identify_body(
            &state,
            br#"{"email":"mcfly@hillvalley.edu","phoneNumber":123456}"#,
        )
        .unwrap();
        assert_eq!(second.contact.primary_contact_id, primary_id);
        assert_eq!(
            second.contact.emails,
            vec!["lorraine@hillvalley.edu", "mcfly@hillvalley.edu"]
        );
        assert_eq!(second.contact.phone_numbers, vec!["123456"]);
        assert_eq!(second.contact.secondary_contact_ids.len(), 1);
    }

    #[test]
    fn missing_identifiers_map_to_bad_request() {
        let state = state();

        for body in [
            &br#"{}"#[..],
            &br#"{"email":null,"phoneNumber":null}"#[..],
            &br#"{"email":"  ","phoneNumber":""}"#[..],
            &b""[..],
        ] {
            let err = identify_body(&state, body).unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
            assert!(err.body().error.contains("At least one of email or phoneNumber"));
        }
    }

    #[test]
    fn malformed_json_maps_to_bad_request() {
        let state = state();
        let err = identify_body(&state, b"{not json").unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn internal_error_hides_details() {
        let err = ApiError::Internal;
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body().error, INTERNAL_ERROR_MESSAGE);
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = health().await;
        assert_eq!(response.0.status, "ok");
        assert_eq!(response.0.message, HEALTH_MESSAGE);
    }

    #[tokio::test]
    async fn identify_handler_serializes_wire_contract() {
        let shared = Arc::new(state());
        let _app = router(shared.clone());

        let response = identify(
            State(shared),
            Bytes::from_static(br#"{"email":"doc@hillvalley.edu"}"#),
        )
        .await
        .unwrap();

        let json = serde_json::to_value(&response.0).unwrap();
        assert!(json["contact"]["primaryContatctId"].is_number());
        assert_eq!(
            json["contact"]["emails"],
            serde_json::json!(["doc@hillvalley.edu"])
        );
        assert_eq!(json["contact"]["phoneNumbers"], serde_json::json!([]));
        assert_eq!(json["contact"]["secondaryContactIds"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn preflight_allows_any_origin() {
        let app = router(Arc::new(state()));
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/identify")
            .header(header::ORIGIN, "https://shop.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert!(response.status().is_success());
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    }

    #[tokio::test]
    async fn cross_origin_identify_carries_allow_origin() {
        let app = router(Arc::new(state()));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/identify")
            .header(header::ORIGIN, "https://shop.example")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"email":"marty@hillvalley.edu"}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[tokio::test]
    async fn identify_handler_maps_validation_to_bad_request() {
        let shared = Arc::new(state());
        let err = identify(State(shared), Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
