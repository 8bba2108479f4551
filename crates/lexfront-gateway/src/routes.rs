//! API route handlers for the gateway.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use lexfront_core::error::LexfrontError;
use serde_json::json;

use crate::server::AppState;

/// Error wrapper that maps the engine's taxonomy onto HTTP statuses.
pub struct ApiError(LexfrontError);

impl From<LexfrontError> for ApiError {
    fn from(e: LexfrontError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LexfrontError::NotFound(_) => StatusCode::NOT_FOUND,
            LexfrontError::InvalidState(_) => StatusCode::CONFLICT,
            LexfrontError::InvalidTrigger(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LexfrontError::Validation(_) => StatusCode::BAD_REQUEST,
            LexfrontError::Dispatch(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("❌ Gateway error: {}", self.0);
        }
        (status, Json(json!({"ok": false, "error": self.0.to_string()}))).into_response()
    }
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

/// Pull an RFC 3339 timestamp out of a JSON body field.
fn parse_time(body: &serde_json::Value, key: &str) -> Result<DateTime<Utc>, ApiError> {
    let raw = body[key].as_str().ok_or_else(|| {
        ApiError(LexfrontError::InvalidTrigger(format!("missing field '{key}'")))
    })?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ApiError(LexfrontError::InvalidTrigger(format!("bad timestamp '{raw}': {e}"))))
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "lexfront-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ─── Posts ──────────────────────────────────────

pub async fn create_post(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let title = body["title"].as_str().unwrap_or("Untitled");
    let slug = body["slug"].as_str().unwrap_or("untitled");
    let text = body["body"].as_str().unwrap_or("");
    let post = state.service.create_post(title, slug, text)?;
    Ok(Json(json!({"ok": true, "post": post})))
}

pub async fn list_posts(State(state): State<AppState>) -> ApiResult {
    let posts = state.service.db().list_posts()?;
    Ok(Json(json!({"ok": true, "posts": posts})))
}

pub async fn get_post(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let post = state.service.db().get_post(&id)?;
    Ok(Json(json!({"ok": true, "post": post})))
}

pub async fn schedule_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let at = parse_time(&body, "publish_at")?;
    let post = state.service.schedule_post(&id, at)?;
    Ok(Json(json!({"ok": true, "post": post})))
}

pub async fn cancel_post_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult {
    let post = state.service.cancel_post_schedule(&id)?;
    Ok(Json(json!({"ok": true, "post": post})))
}

pub async fn publish_post(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let post = state.service.publish_post_now(&id).await?;
    Ok(Json(json!({"ok": true, "post": post})))
}

pub async fn unpublish_post(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let post = state.service.unpublish_post(&id)?;
    Ok(Json(json!({"ok": true, "post": post})))
}

// ─── Campaigns ──────────────────────────────────────

pub async fn create_campaign(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let subject = body["subject"].as_str().unwrap_or("Untitled");
    let html = body["body_html"].as_str().unwrap_or("");
    let campaign = state.service.create_campaign(subject, html)?;
    Ok(Json(json!({"ok": true, "campaign": campaign})))
}

pub async fn list_campaigns(State(state): State<AppState>) -> ApiResult {
    let campaigns = state.service.db().list_campaigns()?;
    Ok(Json(json!({"ok": true, "campaigns": campaigns})))
}

pub async fn get_campaign(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let campaign = state.service.db().get_campaign(&id)?;
    Ok(Json(json!({"ok": true, "campaign": campaign})))
}

pub async fn schedule_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let at = parse_time(&body, "scheduled_for")?;
    let campaign = state.service.schedule_campaign(&id, at)?;
    Ok(Json(json!({"ok": true, "campaign": campaign})))
}

pub async fn cancel_campaign_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult {
    let campaign = state.service.cancel_campaign_schedule(&id)?;
    Ok(Json(json!({"ok": true, "campaign": campaign})))
}

pub async fn send_campaign(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let campaign = state.service.send_campaign_now(&id).await?;
    Ok(Json(json!({"ok": true, "campaign": campaign})))
}

pub async fn track_open(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    state.service.db().record_open(&id)?;
    Ok(Json(json!({"ok": true})))
}

pub async fn track_click(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    state.service.db().record_click(&id)?;
    Ok(Json(json!({"ok": true})))
}

// ─── Scheduling views ──────────────────────────────────────

pub async fn scheduled_posts(State(state): State<AppState>) -> ApiResult {
    let posts = state.service.list_scheduled_posts()?;
    Ok(Json(json!({"ok": true, "posts": posts})))
}

pub async fn scheduled_campaigns(State(state): State<AppState>) -> ApiResult {
    let campaigns = state.service.list_scheduled_campaigns()?;
    Ok(Json(json!({"ok": true, "campaigns": campaigns})))
}

// ─── Subscribers ──────────────────────────────────────

pub async fn subscribe(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let email = body["email"].as_str().unwrap_or("").trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError(LexfrontError::Validation(
            "invalid email address".into(),
        )));
    }
    state.service.db().add_subscriber(email)?;
    Ok(Json(json!({"ok": true})))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult {
    let email = body["email"].as_str().unwrap_or("").trim();
    let removed = state.service.db().unsubscribe(email)?;
    Ok(Json(json!({"ok": true, "removed": removed})))
}
