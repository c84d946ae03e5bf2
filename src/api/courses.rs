//! Course endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::db::{
    get_course, now_timestamp, Actor, Course, CourseWithTeacher, CreateCourseRequest, Role,
    UpdateCourseRequest, User, UserResponse,
};
use crate::AppState;

use super::auth::require_role;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_course_code, validate_optional_text, validate_required, MAX_NAME_LENGTH};

fn validate_create_request(req: &CreateCourseRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_required("Course name", &req.name, MAX_NAME_LENGTH));
    errors.check("code", validate_course_code(req.code.trim()));
    errors.check("schedule", validate_required("Schedule", &req.schedule, MAX_NAME_LENGTH));
    errors.check("classroom", validate_required("Classroom", &req.classroom, MAX_NAME_LENGTH));
    errors.check("description", validate_optional_text("Description", req.description.as_deref()));
    errors.finish()
}

fn validate_update_request(req: &UpdateCourseRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref name) = req.name {
        errors.check("name", validate_required("Course name", name, MAX_NAME_LENGTH));
    }
    if let Some(ref schedule) = req.schedule {
        errors.check("schedule", validate_required("Schedule", schedule, MAX_NAME_LENGTH));
    }
    if let Some(ref classroom) = req.classroom {
        errors.check("classroom", validate_required("Classroom", classroom, MAX_NAME_LENGTH));
    }
    errors.check("description", validate_optional_text("Description", req.description.as_deref()));
    errors.finish()
}

/// Attach each course's teacher, loading every teacher once
async fn with_teachers(pool: &SqlitePool, courses: Vec<Course>) -> Result<Vec<CourseWithTeacher>, ApiError> {
    let teachers: HashMap<i64, UserResponse> =
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE role = 'teacher'")
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(|u| (u.id, UserResponse::from(u)))
            .collect();

    Ok(courses
        .into_iter()
        .map(|course| {
            let teacher = teachers.get(&course.teacher_id).cloned();
            CourseWithTeacher { course, teacher }
        })
        .collect())
}

async fn fetch_course(pool: &SqlitePool, id: i64) -> Result<Course, ApiError> {
    get_course(pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Course not found"))
}

fn require_course_owner(actor: &Actor, course: &Course) -> Result<(), ApiError> {
    if actor.is_admin() || (actor.role == Role::Teacher && actor.id == course.teacher_id) {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only the course teacher or an administrator can change this course"))
    }
}

/// List all courses
pub async fn list_courses(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
) -> Result<Json<Vec<CourseWithTeacher>>, ApiError> {
    let courses = sqlx::query_as::<_, Course>("SELECT * FROM courses ORDER BY name ASC, id ASC")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(with_teachers(&state.db, courses).await?))
}

/// Courses taught by the acting teacher
pub async fn list_teacher_courses(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<CourseWithTeacher>>, ApiError> {
    require_role(&actor, Role::Teacher)?;

    let courses = sqlx::query_as::<_, Course>(
        "SELECT * FROM courses WHERE teacher_id = ? ORDER BY name ASC, id ASC",
    )
    .bind(actor.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(with_teachers(&state.db, courses).await?))
}

/// Courses a student may file requests against (all of them)
pub async fn list_student_courses(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<CourseWithTeacher>>, ApiError> {
    require_role(&actor, Role::Student)?;
    list_courses(State(state), actor).await
}

/// Get a single course
pub async fn get_course_handler(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<CourseWithTeacher>, ApiError> {
    let course = fetch_course(&state.db, id).await?;
    let mut courses = with_teachers(&state.db, vec![course]).await?;
    courses
        .pop()
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Course not found"))
}

/// Create a course
pub async fn create_course(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<CreateCourseRequest>,
) -> Result<(StatusCode, Json<CourseWithTeacher>), ApiError> {
    let teacher_id = match actor.role {
        Role::Teacher => actor.id,
        Role::Admin => req
            .teacher_id
            .ok_or_else(|| ApiError::validation_field("teacherId", "Teacher ID is required"))?,
        Role::Student => return Err(ApiError::forbidden("Students cannot create courses")),
    };

    validate_create_request(&req)?;

    let teacher_role: Option<(String,)> = sqlx::query_as("SELECT role FROM users WHERE id = ?")
        .bind(teacher_id)
        .fetch_optional(&state.db)
        .await?;
    match teacher_role {
        Some((role,)) if role == Role::Teacher.as_str() => {}
        Some(_) => {
            return Err(ApiError::validation_field("teacherId", "User is not a teacher"));
        }
        None => return Err(ApiError::not_found("Teacher not found")),
    }

    let code = req.code.trim().to_uppercase();
    let taken: Option<(i64,)> = sqlx::query_as("SELECT id FROM courses WHERE code = ?")
        .bind(&code)
        .fetch_optional(&state.db)
        .await?;
    if taken.is_some() {
        return Err(ApiError::conflict("A course with this code already exists"));
    }

    let now = now_timestamp();
    let course: Course = sqlx::query_as(
        r#"
        INSERT INTO courses (name, code, description, schedule, classroom, teacher_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(req.name.trim())
    .bind(&code)
    .bind(req.description.as_deref().map(str::trim).filter(|d| !d.is_empty()))
    .bind(req.schedule.trim())
    .bind(req.classroom.trim())
    .bind(teacher_id)
    .bind(&now)
    .bind(&now)
    .fetch_one(&state.db)
    .await?;

    info!(course_id = course.id, code = %course.code, teacher_id, "Created course");

    let mut created = with_teachers(&state.db, vec![course]).await?;
    let created = created
        .pop()
        .ok_or_else(|| ApiError::internal("Course vanished after insert"))?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update course details
pub async fn update_course(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCourseRequest>,
) -> Result<Json<CourseWithTeacher>, ApiError> {
    let course = fetch_course(&state.db, id).await?;
    require_course_owner(&actor, &course)?;
    validate_update_request(&req)?;

    sqlx::query(
        r#"
        UPDATE courses SET name = ?, description = ?, schedule = ?, classroom = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(req.name.as_deref().map(str::trim).unwrap_or(&course.name))
    .bind(req.description.as_deref().or(course.description.as_deref()))
    .bind(req.schedule.as_deref().map(str::trim).unwrap_or(&course.schedule))
    .bind(req.classroom.as_deref().map(str::trim).unwrap_or(&course.classroom))
    .bind(now_timestamp())
    .bind(id)
    .execute(&state.db)
    .await?;

    info!(course_id = id, by = actor.id, "Updated course");

    let course = fetch_course(&state.db, id).await?;
    let mut updated = with_teachers(&state.db, vec![course]).await?;
    updated
        .pop()
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Course not found"))
}

/// Delete a course together with the requests filed against it
pub async fn delete_course(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let course = fetch_course(&state.db, id).await?;
    require_course_owner(&actor, &course)?;

    sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;

    info!(course_id = id, by = actor.id, "Deleted course");
    Ok(StatusCode::NO_CONTENT)
}
