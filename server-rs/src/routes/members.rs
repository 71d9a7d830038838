use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::models::{MemberInput, PaymentInput};
use crate::services::roster::RosterFilter;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub level: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub recent: Option<String>,
}

fn parse_id(raw: &str) -> AppResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid member id `{raw}`")))
}

/// Version the client last saw, from `If-Match`. `*` matches anything.
fn if_match(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::IF_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().trim_start_matches("W/").trim_matches('"').to_string())
        .filter(|v| !v.is_empty() && v != "*")
}

fn etag(version: &str) -> [(header::HeaderName, String); 1] {
    [(header::ETAG, format!("\"{version}\""))]
}

pub async fn list_members(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Response> {
    let filter = RosterFilter::from_query(
        query.search.as_deref(),
        query.level.as_deref(),
        query.status.as_deref(),
    )
    .map_err(AppError::BadRequest)?;

    let listed = state.members.list(&filter).await?;
    let total = listed.value.len();
    Ok((
        etag(&listed.version),
        Json(json!({ "members": listed.value, "total": total })),
    )
        .into_response())
}

pub async fn get_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let found = state.members.get(parse_id(&id)?).await?;
    Ok((etag(&found.version), Json(json!({ "member": found.value }))).into_response())
}

pub async fn member_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id = parse_id(&id)?;
    let standing = state.members.standing(id).await?;
    Ok(Json(json!({ "memberId": id, "standing": standing })).into_response())
}

pub async fn summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> AppResult<Response> {
    let recent = match query.recent.as_deref().map(str::trim) {
        None | Some("") => state.config.roster.recent_limit,
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Invalid recent count `{raw}`")))?,
    };

    let summary = state.members.summary(recent).await?;
    Ok((etag(&summary.version), Json(json!({ "summary": summary.value }))).into_response())
}

pub async fn create_member(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Json(body): Json<MemberInput>,
) -> AppResult<Response> {
    let expected = if_match(&headers);
    let created = state
        .members
        .create(user.role, body, expected.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        etag(&created.version),
        Json(json!({ "member": created.value })),
    )
        .into_response())
}

pub async fn update_member(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<MemberInput>,
) -> AppResult<Response> {
    let id = parse_id(&id)?;
    let expected = if_match(&headers);
    let updated = state
        .members
        .update(user.role, id, body, expected.as_deref())
        .await?;
    Ok((etag(&updated.version), Json(json!({ "member": updated.value }))).into_response())
}

pub async fn delete_member(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let id = parse_id(&id)?;
    let expected = if_match(&headers);
    let version = state
        .members
        .delete(user.role, id, expected.as_deref())
        .await?;
    Ok((StatusCode::NO_CONTENT, etag(&version)).into_response())
}

pub async fn add_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<PaymentInput>,
) -> AppResult<Response> {
    let id = parse_id(&id)?;
    let expected = if_match(&headers);
    let updated = state
        .members
        .add_payment(user.role, id, body, expected.as_deref())
        .await?;
    let recorded = updated.value.member.payments.last().cloned();
    Ok((
        StatusCode::CREATED,
        etag(&updated.version),
        Json(json!({
            "payment": recorded,
            "member": updated.value,
        })),
    )
        .into_response())
}
