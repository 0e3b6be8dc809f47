//! Axum routes for the Revision Kernel service.

use axum::{
    extract::{rejection::FormRejection, Form, Json, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

use crate::action::{dispatch, ActionRequest, ActionResponse, PageAction};
use crate::error::{EngineError, ErrorEnvelope};
use crate::store::PageStore;
use crate::types::{SiteId, UserId};
use crate::REVISION_KERNEL_SCHEMA_VERSION;

use super::middleware::record_action_metrics;
use super::state::ServiceState;

/// Header carrying the already-authenticated acting user id.
pub const ACTING_USER_HEADER: &str = "x-acting-user-id";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Detailed health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Revision schema version.
    pub schema_version: String,
    /// Active missing-token policy.
    pub token_policy: String,
    /// Whether the store answered its health check.
    pub store_healthy: bool,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    /// Always `alive`.
    pub status: String,
}

/// Readiness response with dependency status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Whether the service can take traffic.
    pub ready: bool,
    /// Whether the store is reachable.
    pub store: bool,
    /// Reason when not ready.
    pub details: Option<String>,
}

/// Engine error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl ApiError {
    /// HTTP status for the wrapped error.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::ConcurrencyConflict { .. } | EngineError::SlugConflict { .. } => {
                StatusCode::CONFLICT
            }
            EngineError::InvalidLink { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Validation { .. } => StatusCode::BAD_REQUEST,
            EngineError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "Request failed");
        } else {
            tracing::warn!(code = self.0.code(), error = %self.0, "Request rejected");
        }
        (status, Json(ErrorEnvelope::from(&self.0))).into_response()
    }
}

// ============================================================================
// Extraction helpers
// ============================================================================

fn acting_user(headers: &HeaderMap) -> Result<Option<UserId>, EngineError> {
    let Some(value) = headers.get(ACTING_USER_HEADER) else {
        return Ok(None);
    };
    let text = value
        .to_str()
        .map_err(|_| EngineError::validation(ACTING_USER_HEADER, "is not valid text"))?;
    text.parse::<UserId>()
        .map(Some)
        .map_err(|e| EngineError::validation(ACTING_USER_HEADER, e.to_string()))
}

fn parse_site(raw: &str) -> Result<SiteId, EngineError> {
    raw.parse::<SiteId>()
        .map_err(|e| EngineError::validation("site_id", e.to_string()))
}

/// Form body, where a missing body counts as an empty form.
fn form_fields(
    body: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Result<HashMap<String, String>, EngineError> {
    match body {
        Ok(Form(fields)) => Ok(fields),
        Err(FormRejection::InvalidFormContentType(_)) => Ok(HashMap::new()),
        Err(rejection) => Err(EngineError::validation("body", rejection.body_text())),
    }
}

async fn run_action<S: PageStore + 'static>(
    state: &ServiceState<S>,
    action: PageAction,
    site: &str,
    slug: &str,
    headers: &HeaderMap,
    fields: &HashMap<String, String>,
) -> Result<Json<ActionResponse>, ApiError> {
    let start = Instant::now();
    let result = async {
        let site_id = parse_site(site)?;
        let user_id = acting_user(headers)?;
        let request = ActionRequest::from_form(action, site_id, slug, user_id, fields)?;
        dispatch(&state.engine, request).await
    }
    .await;

    let outcome = match &result {
        Ok(_) => "ok",
        Err(error) => error.code(),
    };
    record_action_metrics(action, outcome, start.elapsed().as_millis() as u64);

    Ok(Json(result?))
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Run any page action named in the path.
async fn action_handler<S: PageStore + 'static>(
    State(state): State<ServiceState<S>>,
    Path((site, slug, action)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Result<Json<ActionResponse>, ApiError> {
    let action: PageAction = action.parse()?;
    let fields = form_fields(body)?;
    run_action(&state, action, &site, &slug, &headers, &fields).await
}

/// Delete a page. The body carries the same form fields as other mutations.
async fn delete_handler<S: PageStore + 'static>(
    State(state): State<ServiceState<S>>,
    Path((site, slug)): Path<(String, String)>,
    headers: HeaderMap,
    body: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Result<Json<ActionResponse>, ApiError> {
    let fields = form_fields(body)?;
    run_action(&state, PageAction::Delete, &site, &slug, &headers, &fields).await
}

/// Health check endpoint (detailed).
async fn health_handler<S: PageStore + 'static>(
    State(state): State<ServiceState<S>>,
) -> Json<HealthResponse> {
    let store_healthy = state.engine.store().is_healthy().await;

    Json(HealthResponse {
        status: if store_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        schema_version: REVISION_KERNEL_SCHEMA_VERSION.to_string(),
        token_policy: state.engine.config().token_policy.as_str().to_string(),
        store_healthy,
    })
}

/// Liveness probe endpoint.
///
/// Does NOT check dependencies.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 if the store answers, 503 otherwise.
async fn readiness_handler<S: PageStore + 'static>(
    State(state): State<ServiceState<S>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    if state.engine.store().is_healthy().await {
        Ok(Json(ReadinessResponse {
            ready: true,
            store: true,
            details: None,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                store: false,
                details: Some("Page store is unavailable".to_string()),
            }),
        ))
    }
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the Revision Kernel service.
pub fn create_router<S: PageStore + 'static>(state: ServiceState<S>) -> Router {
    Router::new()
        .route("/api/sites/:site_id/pages/:slug/:action", post(action_handler::<S>))
        .route("/api/sites/:site_id/pages/:slug", delete(delete_handler::<S>))
        .route("/health", get(health_handler::<S>))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler::<S>))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::store::InMemoryPageStore;
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_router() -> Router {
        create_router(ServiceState::from_store(
            InMemoryPageStore::new(),
            EngineConfig::default(),
        ))
    }

    fn form_request(method: &str, uri: &str, user: Option<i64>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(user) = user {
            builder = builder.header(ACTING_USER_HEADER, user.to_string());
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    // ─── Actions ───

    #[tokio::test]
    async fn test_edit_then_get() {
        let router = test_router();

        let (status, body) = send(
            &router,
            form_request(
                "POST",
                "/api/sites/1/pages/scp-173/edit",
                Some(7),
                "wikitext=Hello&title=SCP-173&tags=keter+euclid",
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["action"], "edit");
        assert_eq!(body["result"]["revision_number"], 1);
        assert_eq!(body["result"]["created"], true);

        let (status, body) = send(
            &router,
            form_request("POST", "/api/sites/1/pages/scp-173/get", None, "wikitext=true"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["page"]["title"], "SCP-173");
        assert_eq!(body["result"]["wikitext"], "Hello");
    }

    #[tokio::test]
    async fn test_stale_token_is_conflict() {
        let router = test_router();
        let create = form_request("POST", "/api/sites/1/pages/start/edit", Some(1), "wikitext=one");
        assert_eq!(send(&router, create).await.0, StatusCode::OK);
        let second = form_request(
            "POST",
            "/api/sites/1/pages/start/edit",
            Some(1),
            "wikitext=two&last-revision-id=1",
        );
        assert_eq!(send(&router, second).await.0, StatusCode::OK);

        let stale = form_request(
            "POST",
            "/api/sites/1/pages/start/edit",
            Some(2),
            "wikitext=three&last-revision-id=1",
        );
        let (status, body) = send(&router, stale).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "concurrency_conflict");
        assert_eq!(body["data"]["current_revision_number"], 2);
    }

    #[tokio::test]
    async fn test_delete_route() {
        let router = test_router();
        let create = form_request("POST", "/api/sites/1/pages/old/edit", Some(1), "wikitext=x");
        send(&router, create).await;

        let (status, body) = send(
            &router,
            form_request("DELETE", "/api/sites/1/pages/old", Some(1), "comments=cleanup"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["action"], "delete");
        assert_eq!(body["result"]["kind"], "delete");

        let (status, body) = send(
            &router,
            form_request("POST", "/api/sites/1/pages/old/exists", None, ""),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], false);
    }

    // ─── Errors ───

    #[tokio::test]
    async fn test_missing_page_is_not_found() {
        let router = test_router();
        let (status, body) = send(
            &router,
            form_request("POST", "/api/sites/1/pages/nowhere/history", None, ""),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn test_unknown_action_is_bad_request() {
        let router = test_router();
        let (status, body) = send(
            &router,
            form_request("POST", "/api/sites/1/pages/start/explode", None, ""),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation_error");
    }

    #[tokio::test]
    async fn test_bad_user_header_is_bad_request() {
        let router = test_router();
        let request = Request::builder()
            .method("POST")
            .uri("/api/sites/1/pages/start/edit")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACTING_USER_HEADER, "someone")
            .body(Body::from("wikitext=x"))
            .unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["data"]["field"], ACTING_USER_HEADER);
    }

    #[tokio::test]
    async fn test_anonymous_edit_is_forbidden() {
        let router = test_router();
        let (status, body) = send(
            &router,
            form_request("POST", "/api/sites/1/pages/start/edit", None, "wikitext=x"),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "unauthorized");
    }

    // ─── Health ───

    #[tokio::test]
    async fn test_health_endpoints() {
        let router = test_router();
        let request = Request::builder().uri("/health/ready").body(Body::empty()).unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (_, body) = send(&router, request).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["schema_version"], REVISION_KERNEL_SCHEMA_VERSION);
    }
}
