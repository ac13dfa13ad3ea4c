use super::{ApiError, AppState, SpeechRequest, TranslateRequest, TranslateResponse, MISSING_PARAMETERS};
use crate::auth::{require_role, AuthError, Identity, Role};
use crate::languages::{LanguageRegistry, LanguageSpec};
use crate::metrics::MetricsReport;
use crate::users::{SubscriptionTier, UserDirectory, UserSummary};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    Ok(require_role(state.identity.resolve(headers), Role::Admin)?)
}

fn directory(state: &AppState) -> Result<&Arc<dyn UserDirectory>, ApiError> {
    state.users.as_ref().ok_or(ApiError::DirectoryUnavailable)
}

/// Present and non-empty
fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            warn!("Rejected request body: {}", rejection);
            Err(ApiError::BadRequest(MISSING_PARAMETERS.to_string()))
        }
    }
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn languages() -> Json<&'static [LanguageSpec]> {
    Json(LanguageRegistry::get().all())
}

pub async fn translate(
    State(state): State<AppState>,
    payload: Result<Json<TranslateRequest>, JsonRejection>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let request = body(payload)?;
    let (Some(text), Some(from), Some(to)) = (
        required(request.text),
        required(request.from),
        required(request.to),
    ) else {
        return Err(ApiError::BadRequest(MISSING_PARAMETERS.to_string()));
    };

    let translated_text = state.translator.translate(&text, &from, &to).await?;
    Ok(Json(TranslateResponse { translated_text }))
}

pub async fn speech(
    State(state): State<AppState>,
    payload: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = body(payload)?;
    let (Some(text), Some(language)) = (required(request.text), required(request.language)) else {
        return Err(ApiError::BadRequest(MISSING_PARAMETERS.to_string()));
    };

    let audio = state.speech.synthesize(&text, &language).await?;
    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    user: Identity,
}

pub async fn session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, ApiError> {
    let user = state
        .identity
        .resolve(&headers)
        .ok_or(AuthError::Unauthenticated)?;
    Ok(Json(SessionResponse { user }))
}

// ==================== User administration ====================

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    action: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    users: Vec<UserSummary>,
    total: usize,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserCountResponse {
    count: i64,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    user: UserSummary,
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    tier: SubscriptionTier,
}

pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UsersQuery>,
) -> Result<Response, ApiError> {
    require_admin(&state, &headers)?;
    let users = directory(&state)?;

    match query.action.as_deref() {
        Some("count") => {
            let count = users.user_count().await?;
            Ok(Json(UserCountResponse { count }).into_response())
        }
        _ => {
            let users = users.all_users().await?;
            Ok(Json(UserListResponse {
                total: users.len(),
                users,
                timestamp: Utc::now(),
            })
            .into_response())
        }
    }
}

pub async fn user_by_id(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let user = directory(&state)?
        .user_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(UserResponse { user }))
}

pub async fn update_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<RoleUpdate>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let admin = require_admin(&state, &headers)?;
    let users = directory(&state)?;

    let role: Role = required(body(payload)?.role)
        .ok_or_else(|| ApiError::BadRequest(MISSING_PARAMETERS.to_string()))?
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid role".to_string()))?;

    if !users.update_role(&id, role).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }
    info!("{} set role of {} to {}", admin.user_id, id, role);

    let user = users
        .user_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(UserResponse { user }))
}

pub async fn subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let tier = directory(&state)?
        .subscription_tier(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(SubscriptionResponse { tier }))
}

pub async fn metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MetricsReport>, ApiError> {
    require_admin(&state, &headers)?;
    Ok(Json(state.metrics.report()))
}
