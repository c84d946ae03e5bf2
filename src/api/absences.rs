//! Absence notice endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

use crate::db::{
    get_absence, get_course, now_timestamp, Absence, AbsenceTeacherQuery, AbsenceType, Actor,
    CreateAbsenceRequest, Role, UpdateAbsenceRequest,
};
use crate::AppState;

use super::accommodations::filing_student;
use super::auth::require_role;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_date, validate_optional_text, validate_required, MAX_NAME_LENGTH};

fn parse_tipo(value: Option<&str>) -> Result<Option<AbsenceType>, String> {
    match value.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => t
            .parse::<AbsenceType>()
            .map(Some)
            .map_err(|_| "Must be one of: justificada, injustificada, prevista".to_string()),
        None => Ok(None),
    }
}

fn validate_create_request(req: &CreateAbsenceRequest) -> Result<AbsenceType, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    errors.check("fecha", validate_date("Fecha", &req.fecha));
    errors.check("materia", validate_required("Materia", &req.materia, MAX_NAME_LENGTH));
    errors.check("motivo", validate_optional_text("Motivo", req.motivo.as_deref()));
    let tipo = match parse_tipo(req.tipo.as_deref()) {
        Ok(tipo) => tipo.unwrap_or_default(),
        Err(e) => {
            errors.add("tipo", e);
            AbsenceType::default()
        }
    };

    errors.finish()?;
    Ok(tipo)
}

async fn fetch_absence(pool: &SqlitePool, id: i64) -> Result<Absence, ApiError> {
    get_absence(pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Absence not found"))
}

/// Declare an absence
pub async fn create_absence(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<CreateAbsenceRequest>,
) -> Result<(StatusCode, Json<Absence>), ApiError> {
    let student_id = filing_student(&state.db, &actor, req.student_id).await?;
    let tipo = validate_create_request(&req)?;

    let course = get_course(&state.db, req.course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Course not found"))?;

    let now = now_timestamp();
    let row: Absence = sqlx::query_as(
        r#"
        INSERT INTO absences (fecha, materia, motivo, tipo, student_id, course_id, teacher_id, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
        RETURNING *
        "#,
    )
    .bind(req.fecha.trim())
    .bind(req.materia.trim())
    .bind(&req.motivo)
    .bind(tipo.as_str())
    .bind(student_id)
    .bind(course.id)
    .bind(course.teacher_id)
    .bind(&now)
    .bind(&now)
    .fetch_one(&state.db)
    .await?;

    info!(absence_id = row.id, student_id, course_id = course.id, tipo = %tipo, "Absence declared");

    Ok((StatusCode::CREATED, Json(row)))
}

/// The acting student's absences, latest date first
pub async fn list_student_absences(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Absence>>, ApiError> {
    require_role(&actor, Role::Student)?;

    let rows = sqlx::query_as::<_, Absence>(
        "SELECT * FROM absences WHERE student_id = ? ORDER BY fecha DESC, id DESC",
    )
    .bind(actor.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows))
}

/// Absences addressed to the acting teacher, optionally for one student
pub async fn list_teacher_absences(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<AbsenceTeacherQuery>,
) -> Result<Json<Vec<Absence>>, ApiError> {
    if actor.role == Role::Student {
        return Err(ApiError::forbidden("Students cannot use this view"));
    }

    let mut conditions: Vec<&str> = Vec::new();
    let mut bindings: Vec<i64> = Vec::new();

    if actor.role == Role::Teacher {
        conditions.push("teacher_id = ?");
        bindings.push(actor.id);
    }
    if let Some(student_id) = query.student_id {
        conditions.push("student_id = ?");
        bindings.push(student_id);
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    let sql = format!(
        "SELECT * FROM absences {} ORDER BY fecha DESC, id DESC",
        where_clause
    );

    let mut q = sqlx::query_as::<_, Absence>(&sql);
    for binding in bindings {
        q = q.bind(binding);
    }
    let rows = q.fetch_all(&state.db).await?;

    Ok(Json(rows))
}

/// Get a single absence (administrator or a party to it)
pub async fn get_absence_handler(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<Absence>, ApiError> {
    let row = fetch_absence(&state.db, id).await?;
    if !actor.is_admin() && actor.id != row.student_id && actor.id != row.teacher_id {
        return Err(ApiError::forbidden("Not authorized to view this absence"));
    }
    Ok(Json(row))
}

/// Reclassify an absence or add observations
pub async fn update_absence(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAbsenceRequest>,
) -> Result<Json<Absence>, ApiError> {
    let row = fetch_absence(&state.db, id).await?;
    if !actor.is_admin() && !(actor.role == Role::Teacher && actor.id == row.teacher_id) {
        return Err(ApiError::forbidden("Not authorized to update this absence"));
    }

    let mut errors = ValidationErrorBuilder::new();
    let tipo = match parse_tipo(req.tipo.as_deref()) {
        Ok(tipo) => tipo,
        Err(e) => {
            errors.add("tipo", e);
            None
        }
    };
    errors.check("observaciones", validate_optional_text("Observaciones", req.observaciones.as_deref()));
    errors.finish()?;

    sqlx::query(
        r#"
        UPDATE absences
        SET tipo = COALESCE(?, tipo), observaciones = COALESCE(?, observaciones), updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(tipo.map(|t| t.as_str()))
    .bind(&req.observaciones)
    .bind(now_timestamp())
    .bind(id)
    .execute(&state.db)
    .await?;

    info!(absence_id = id, by = actor.id, "Updated absence");

    Ok(Json(fetch_absence(&state.db, id).await?))
}

/// Withdraw an absence notice
pub async fn delete_absence(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let row = fetch_absence(&state.db, id).await?;
    if !actor.is_admin() && !(actor.role == Role::Student && actor.id == row.student_id) {
        return Err(ApiError::forbidden("Not authorized to delete this absence"));
    }

    sqlx::query("DELETE FROM absences WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;

    info!(absence_id = id, by = actor.id, "Deleted absence");
    Ok(StatusCode::NO_CONTENT)
}
