//! `waypost serve` - read-only HTTP API over the audit trail.

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::get};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use waypost_audit::{
    AuditError, AuditService, Process, ProcessDetails, ProcessFilter, ProcessStatus, StoredEvent,
};

const DEFAULT_LIMIT: usize = 100;

/// Errors returned by the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) | ApiError::Audit(AuditError::QueryFailed(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Audit(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Query parameters of `GET /processes`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub org: Option<u32>,
    pub status: Option<String>,
    pub resource: Option<String>,
    #[serde(rename = "type")]
    pub process_type: Option<String>,
    pub parent: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListQuery {
    fn into_filter(self) -> Result<ProcessFilter, ApiError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<ProcessStatus>)
            .transpose()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        Ok(ProcessFilter {
            org_id: self.org,
            parent_id: self.parent,
            resource_id: self.resource,
            process_type: self.process_type,
            status,
            limit: Some(self.limit.unwrap_or(DEFAULT_LIMIT)),
            offset: self.offset,
        })
    }
}

/// Build the API router.
pub fn create_router(service: Arc<AuditService>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/processes", get(list_processes))
        .route("/processes/{id}", get(get_process))
        .route("/processes/{id}/events", get(list_events))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

pub async fn run(service: Arc<AuditService>, bind: &str) -> Result<()> {
    let app = create_router(service);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("waypost listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}

async fn healthz(State(service): State<Arc<AuditService>>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "service": "waypost",
        "audit_enabled": service.is_enabled(),
    }))
}

async fn list_processes(
    State(service): State<Arc<AuditService>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Process>>, ApiError> {
    let filter = query.into_filter()?;
    Ok(Json(service.list_processes(&filter).await?))
}

async fn get_process(
    State(service): State<Arc<AuditService>>,
    Path(id): Path<String>,
) -> Result<Json<ProcessDetails>, ApiError> {
    service
        .process_details(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("process '{}'", id)))
}

async fn list_events(
    State(service): State<Arc<AuditService>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StoredEvent>>, ApiError> {
    if service.get_process(&id).await?.is_none() {
        return Err(ApiError::NotFound(format!("process '{}'", id)));
    }
    Ok(Json(service.list_events(&id).await?))
}
