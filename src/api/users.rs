//! User directory endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

use crate::db::{
    now_timestamp, Actor, CreateUserRequest, Role, UpdateProfileRequest, UpdateUserRequest, User,
    UserResponse,
};
use crate::AppState;

use super::auth::{hash_password, require_admin};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_email, validate_name, validate_password, validate_required};

/// Fields of a user about to be inserted
pub(crate) struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub role: Role,
    pub student_id: Option<&'a str>,
    pub faculty: Option<&'a str>,
}

/// Student ids only make sense for students; blank values count as absent.
fn student_id_for(role: Role, student_id: Option<&str>) -> Option<String> {
    match role {
        Role::Student => student_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

async fn ensure_email_free(pool: &SqlitePool, email: &str, except: Option<i64>) -> Result<(), ApiError> {
    let taken: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE email = ? AND id != ?")
        .bind(email)
        .bind(except.unwrap_or(0))
        .fetch_optional(pool)
        .await?;
    match taken {
        Some(_) => Err(ApiError::conflict("Email is already registered")),
        None => Ok(()),
    }
}

async fn ensure_student_id_free(
    pool: &SqlitePool,
    student_id: Option<&str>,
    except: Option<i64>,
) -> Result<(), ApiError> {
    let Some(student_id) = student_id else {
        return Ok(());
    };
    let taken: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE student_id = ? AND id != ?")
        .bind(student_id)
        .bind(except.unwrap_or(0))
        .fetch_optional(pool)
        .await?;
    match taken {
        Some(_) => Err(ApiError::conflict("Student ID is already registered")),
        None => Ok(()),
    }
}

/// Validate and insert a user, returning the stored row
pub(crate) async fn insert_user(pool: &SqlitePool, new: NewUser<'_>) -> Result<User, ApiError> {
    let email = new.email.trim().to_lowercase();

    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_name(new.name));
    errors.check("email", validate_email(&email));
    errors.check("password", validate_password(new.password));
    errors.finish()?;

    let student_id = student_id_for(new.role, new.student_id);
    ensure_email_free(pool, &email, None).await?;
    ensure_student_id_free(pool, student_id.as_deref(), None).await?;

    let password_hash = hash_password(new.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;
    let now = now_timestamp();

    let user: User = sqlx::query_as(
        r#"
        INSERT INTO users (name, email, password_hash, role, student_id, faculty, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(new.name.trim())
    .bind(&email)
    .bind(&password_hash)
    .bind(new.role.as_str())
    .bind(&student_id)
    .bind(new.faculty.map(str::trim).filter(|f| !f.is_empty()))
    .bind(&now)
    .bind(&now)
    .fetch_one(pool)
    .await?;

    Ok(user)
}

async fn fetch_user(pool: &SqlitePool, id: i64) -> Result<User, ApiError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

fn require_admin_or_self(actor: &Actor, id: i64) -> Result<(), ApiError> {
    if actor.is_admin() || actor.id == id {
        Ok(())
    } else {
        Err(ApiError::forbidden("You can only access your own account"))
    }
}

/// List all users, newest first
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    require_admin(&actor)?;

    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC, id DESC")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Create a user with any role
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    require_admin(&actor)?;

    let role: Role = req
        .role
        .parse()
        .map_err(|_| ApiError::validation_field("role", "Role must be student, teacher or admin"))?;

    let user = insert_user(
        &state.db,
        NewUser {
            name: &req.name,
            email: &req.email,
            password: &req.password,
            role,
            student_id: req.student_id.as_deref(),
            faculty: req.faculty.as_deref(),
        },
    )
    .await?;

    info!(user_id = user.id, role = %role, by = actor.id, "Created user");

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Get a single user
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    require_admin_or_self(&actor, id)?;
    let user = fetch_user(&state.db, id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Full update of a user, including role and password
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    require_admin(&actor)?;
    fetch_user(&state.db, id).await?;

    let email = req.email.trim().to_lowercase();
    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_name(&req.name));
    errors.check("email", validate_email(&email));
    if let Some(ref password) = req.password {
        errors.check("password", validate_password(password));
    }
    let role = match req.role.parse::<Role>() {
        Ok(role) => Some(role),
        Err(_) => {
            errors.add("role", "Role must be student, teacher or admin");
            None
        }
    };
    errors.finish()?;
    let role = role.unwrap_or(Role::Student);

    let student_id = student_id_for(role, req.student_id.as_deref());
    ensure_email_free(&state.db, &email, Some(id)).await?;
    ensure_student_id_free(&state.db, student_id.as_deref(), Some(id)).await?;

    let now = now_timestamp();
    sqlx::query(
        r#"
        UPDATE users SET name = ?, email = ?, role = ?, student_id = ?, faculty = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(req.name.trim())
    .bind(&email)
    .bind(role.as_str())
    .bind(&student_id)
    .bind(req.faculty.as_deref().map(str::trim).filter(|f| !f.is_empty()))
    .bind(&now)
    .bind(id)
    .execute(&state.db)
    .await?;

    if let Some(ref password) = req.password {
        let password_hash = hash_password(password)
            .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;
        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(&password_hash)
            .bind(id)
            .execute(&state.db)
            .await?;
        // Existing sessions were issued for the old password
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(id)
            .execute(&state.db)
            .await?;
    }

    info!(user_id = id, role = %role, by = actor.id, "Updated user");

    let user = fetch_user(&state.db, id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Profile update by the user themselves or an administrator
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    require_admin_or_self(&actor, id)?;
    let user = fetch_user(&state.db, id).await?;

    let email = req.email.as_deref().map(|e| e.trim().to_lowercase());
    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref name) = req.name {
        errors.check("name", validate_name(name));
    }
    if let Some(ref email) = email {
        errors.check("email", validate_email(email));
    }
    if let Some(ref faculty) = req.faculty {
        errors.check("faculty", validate_required("Faculty", faculty, 100));
    }
    errors.finish()?;

    let email = email.unwrap_or_else(|| user.email.clone());
    let student_id = match req.student_id.as_deref() {
        Some(s) => student_id_for(user.role(), Some(s)),
        None => user.student_id.clone(),
    };
    ensure_email_free(&state.db, &email, Some(id)).await?;
    ensure_student_id_free(&state.db, student_id.as_deref(), Some(id)).await?;

    sqlx::query(
        "UPDATE users SET name = ?, email = ?, student_id = ?, faculty = ?, updated_at = ? WHERE id = ?",
    )
    .bind(req.name.as_deref().map(str::trim).unwrap_or(&user.name))
    .bind(&email)
    .bind(&student_id)
    .bind(req.faculty.as_deref().map(str::trim).or(user.faculty.as_deref()))
    .bind(now_timestamp())
    .bind(id)
    .execute(&state.db)
    .await?;

    info!(user_id = id, by = actor.id, "Updated profile");

    let user = fetch_user(&state.db, id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Delete a user and everything they own
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    require_admin(&actor)?;
    let user = fetch_user(&state.db, id).await?;

    if user.role().is_admin() {
        return Err(ApiError::bad_request("Administrators cannot be deleted"));
    }

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;

    info!(user_id = id, by = actor.id, "Deleted user");
    Ok(StatusCode::NO_CONTENT)
}
