//! Unified request feed and approve/reject endpoints.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{Actor, RequestKind, Role};
use crate::requests::{
    list_requests, resolve, Decision, Request, RequestFilters, RequestLookup, RequestScope,
    UnifiedRequest,
};
use crate::AppState;

use super::auth::require_role;
use super::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub request_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct KindQuery {
    pub kind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionBody {
    pub teacher_comment: Option<String>,
}

impl DecisionBody {
    /// An empty body means no comment. Anything else must be valid JSON.
    fn from_bytes(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| {
            if e.is_data() {
                ApiError::validation_field("teacherComment", "Must be a string or null")
            } else {
                ApiError::bad_request(format!("Invalid JSON body: {}", e))
            }
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub message: String,
    pub kind: RequestKind,
    pub request: Request,
}

async fn feed(
    state: &AppState,
    actor: &Actor,
    view: Role,
    query: &FeedQuery,
) -> Result<Json<Vec<UnifiedRequest>>, ApiError> {
    require_role(actor, view)?;
    let filters = RequestFilters::parse(query.status.as_deref(), query.request_type.as_deref())?;
    let requests = list_requests(&state.db, RequestScope::for_actor(actor), &filters).await?;
    Ok(Json(requests))
}

/// GET /api/requests/admin
pub async fn list_admin_requests(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<UnifiedRequest>>, ApiError> {
    feed(&state, &actor, Role::Admin, &query).await
}

/// GET /api/requests/teacher
pub async fn list_teacher_requests(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<UnifiedRequest>>, ApiError> {
    feed(&state, &actor, Role::Teacher, &query).await
}

/// GET /api/requests/student
pub async fn list_student_requests(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<UnifiedRequest>>, ApiError> {
    feed(&state, &actor, Role::Student, &query).await
}

async fn decide(
    state: &AppState,
    actor: &Actor,
    id: i64,
    kind: Option<&str>,
    decision: Decision,
    body: DecisionBody,
) -> Result<Json<DecisionResponse>, ApiError> {
    let kind = match kind.map(str::trim).filter(|k| !k.is_empty()) {
        Some(k) => Some(k.parse::<RequestKind>().map_err(|_| {
            ApiError::validation_field("kind", "Must be one of: accommodation, absence")
        })?),
        None => None,
    };

    let resolution = resolve(
        &state.db,
        actor,
        RequestLookup::new(id, kind),
        decision,
        body.teacher_comment.as_deref(),
    )
    .await?;

    let message = match decision {
        Decision::Approved => "Request approved",
        Decision::Rejected => "Request rejected",
    };

    Ok(Json(DecisionResponse {
        message: message.to_string(),
        kind: resolution.kind,
        request: resolution.request,
    }))
}

/// PATCH /api/requests/:id/approve
pub async fn approve_request(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i64>,
    Query(query): Query<KindQuery>,
    body: Bytes,
) -> Result<Json<DecisionResponse>, ApiError> {
    let body = DecisionBody::from_bytes(&body)?;
    decide(&state, &actor, id, query.kind.as_deref(), Decision::Approved, body).await
}

/// PATCH /api/requests/:id/reject
pub async fn reject_request(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i64>,
    Query(query): Query<KindQuery>,
    body: Bytes,
) -> Result<Json<DecisionResponse>, ApiError> {
    let body = DecisionBody::from_bytes(&body)?;
    decide(&state, &actor, id, query.kind.as_deref(), Decision::Rejected, body).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_body_parsing() {
        assert_eq!(DecisionBody::from_bytes(b"").unwrap().teacher_comment, None);
        assert_eq!(DecisionBody::from_bytes(b"  \n").unwrap().teacher_comment, None);
        assert_eq!(DecisionBody::from_bytes(b"{}").unwrap().teacher_comment, None);
        assert_eq!(
            DecisionBody::from_bytes(br#"{"teacherComment":"ok"}"#)
                .unwrap()
                .teacher_comment
                .as_deref(),
            Some("ok")
        );

        let err = DecisionBody::from_bytes(br#"{"teacherComment":42}"#).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        let err = DecisionBody::from_bytes(b"{not json").unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
