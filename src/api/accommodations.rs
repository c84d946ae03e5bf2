//! Accommodation request endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

use crate::db::{
    get_accommodation, get_course, now_timestamp, Accommodation, AccommodationType, Actor,
    CreateAccommodationRequest, RequestStatus, Role, UpdateAccommodationRequest,
};
use crate::requests::RequestFilters;
use crate::AppState;

use super::auth::require_role;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_date, validate_extension_days, validate_optional_date, validate_optional_text,
    validate_required, MAX_TEXT_LENGTH,
};

#[derive(Debug, Deserialize)]
pub struct AccommodationQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub request_type: Option<String>,
}

fn validate_create_request(req: &CreateAccommodationRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if req.request_type.parse::<AccommodationType>().is_err() {
        let allowed: Vec<&str> = AccommodationType::ALL.iter().map(|t| t.as_str()).collect();
        errors.add("type", format!("Must be one of: {}", allowed.join(", ")));
    }
    errors.check("description", validate_required("Description", &req.description, MAX_TEXT_LENGTH));
    errors.check("requestedDate", validate_date("Requested date", &req.requested_date));
    errors.check("newDate", validate_optional_date("New date", req.new_date.as_deref()));
    errors.check("originalDate", validate_optional_date("Original date", req.original_date.as_deref()));
    errors.check("proposedDate", validate_optional_date("Proposed date", req.proposed_date.as_deref()));
    errors.check("extensionDays", validate_extension_days(req.extension_days));
    errors.check("motivo", validate_optional_text("Motivo", req.motivo.as_deref()));

    errors.finish()
}

/// Work out whose request is being filed.
///
/// Students file for themselves; administrators must name the student.
pub(crate) async fn filing_student(
    pool: &SqlitePool,
    actor: &Actor,
    student_id: Option<i64>,
) -> Result<i64, ApiError> {
    match actor.role {
        Role::Student => Ok(actor.id),
        Role::Teacher => Err(ApiError::forbidden("Teachers cannot file requests")),
        Role::Admin => {
            let student_id = student_id
                .ok_or_else(|| ApiError::validation_field("studentId", "Student ID is required"))?;
            let role: Option<(String,)> = sqlx::query_as("SELECT role FROM users WHERE id = ?")
                .bind(student_id)
                .fetch_optional(pool)
                .await?;
            match role {
                Some((role,)) if role == Role::Student.as_str() => Ok(student_id),
                Some(_) => Err(ApiError::validation_field("studentId", "User is not a student")),
                None => Err(ApiError::not_found("Student not found")),
            }
        }
    }
}

async fn fetch_accommodation(pool: &SqlitePool, id: i64) -> Result<Accommodation, ApiError> {
    get_accommodation(pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Accommodation not found"))
}

/// File an accommodation request
pub async fn create_accommodation(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<CreateAccommodationRequest>,
) -> Result<(StatusCode, Json<Accommodation>), ApiError> {
    let student_id = filing_student(&state.db, &actor, req.student_id).await?;
    validate_create_request(&req)?;

    let course = get_course(&state.db, req.course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Course not found"))?;

    let now = now_timestamp();
    let row: Accommodation = sqlx::query_as(
        r#"
        INSERT INTO accommodations (
            request_type, status, description, motivo, requested_date, new_date,
            original_date, proposed_date, new_classroom, extension_days,
            student_id, course_id, teacher_id, created_at, updated_at
        )
        VALUES (?, 'pending', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(req.request_type.trim().to_lowercase())
    .bind(req.description.trim())
    .bind(&req.motivo)
    .bind(req.requested_date.trim())
    .bind(&req.new_date)
    .bind(&req.original_date)
    .bind(&req.proposed_date)
    .bind(&req.new_classroom)
    .bind(req.extension_days)
    .bind(student_id)
    .bind(course.id)
    .bind(course.teacher_id)
    .bind(&now)
    .bind(&now)
    .fetch_one(&state.db)
    .await?;

    info!(
        accommodation_id = row.id,
        student_id,
        course_id = course.id,
        request_type = %row.request_type,
        "Accommodation request filed"
    );

    Ok((StatusCode::CREATED, Json(row)))
}

/// The acting student's accommodation requests
pub async fn list_student_accommodations(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Accommodation>>, ApiError> {
    require_role(&actor, Role::Student)?;

    let rows = sqlx::query_as::<_, Accommodation>(
        "SELECT * FROM accommodations WHERE student_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(actor.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows))
}

/// Requests addressed to the acting teacher; administrators see every request
pub async fn list_teacher_accommodations(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<AccommodationQuery>,
) -> Result<Json<Vec<Accommodation>>, ApiError> {
    if actor.role == Role::Student {
        return Err(ApiError::forbidden("Students cannot use this view"));
    }
    let filters = RequestFilters::parse(query.status.as_deref(), query.request_type.as_deref())?;

    let mut conditions: Vec<&str> = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if actor.role == Role::Teacher {
        conditions.push("teacher_id = ?");
        bindings.push(actor.id.to_string());
    }
    if let Some(status) = filters.status {
        conditions.push("status = ?");
        bindings.push(status.as_str().to_string());
    }
    if let Some(request_type) = filters.request_type {
        conditions.push("request_type = ?");
        bindings.push(request_type.as_str().to_string());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    let sql = format!(
        "SELECT * FROM accommodations {} ORDER BY created_at DESC, id DESC",
        where_clause
    );

    let mut q = sqlx::query_as::<_, Accommodation>(&sql);
    for binding in &bindings {
        q = q.bind(binding);
    }
    let rows = q.fetch_all(&state.db).await?;

    Ok(Json(rows))
}

/// Get a single accommodation request (administrator or a party to it)
pub async fn get_accommodation_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<Accommodation>, ApiError> {
    let row = fetch_accommodation(&state.db, id).await?;
    if !actor.is_admin() && actor.id != row.student_id && actor.id != row.teacher_id {
        return Err(ApiError::forbidden("Not authorized to view this request"));
    }
    Ok(Json(row))
}

/// Teacher-side update of status and response
pub async fn update_accommodation(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAccommodationRequest>,
) -> Result<Json<Accommodation>, ApiError> {
    let row = fetch_accommodation(&state.db, id).await?;
    if !actor.is_admin() && !(actor.role == Role::Teacher && actor.id == row.teacher_id) {
        return Err(ApiError::forbidden("Not authorized to update this request"));
    }

    let status = match req.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Some(s.parse::<RequestStatus>().map_err(|_| {
            ApiError::validation_field("status", "Must be one of: pending, approved, rejected")
        })?),
        None => None,
    };
    if let Err(e) = validate_optional_text("Teacher response", req.teacher_response.as_deref()) {
        return Err(ApiError::validation_field("teacherResponse", e));
    }

    sqlx::query(
        r#"
        UPDATE accommodations
        SET status = COALESCE(?, status), teacher_response = COALESCE(?, teacher_response), updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(status.map(|s| s.as_str()))
    .bind(&req.teacher_response)
    .bind(now_timestamp())
    .bind(id)
    .execute(&state.db)
    .await?;

    info!(accommodation_id = id, by = actor.id, status = ?status, "Updated accommodation request");

    Ok(Json(fetch_accommodation(&state.db, id).await?))
}

/// Withdraw an accommodation request
pub async fn delete_accommodation(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let row = fetch_accommodation(&state.db, id).await?;
    if !actor.is_admin() && !(actor.role == Role::Student && actor.id == row.student_id) {
        return Err(ApiError::forbidden("Not authorized to delete this request"));
    }

    sqlx::query("DELETE FROM accommodations WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;

    info!(accommodation_id = id, by = actor.id, "Deleted accommodation request");
    Ok(StatusCode::NO_CONTENT)
}
