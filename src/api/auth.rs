use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::db::{
    now_timestamp, Actor, LoginRequest, LoginResponse, RegisterRequest, Role, Session, User,
    UserResponse,
};
use crate::AppState;

use super::error::ApiError;
use super::users::{insert_user, NewUser};

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract the token from request headers
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get("Authorization").and_then(|h| h.to_str().ok()) {
        return Some(
            auth_header
                .strip_prefix("Bearer ")
                .unwrap_or(auth_header)
                .trim()
                .to_string(),
        );
    }

    headers
        .get("X-API-Key")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
}

/// Start a session for the user and return the raw token.
///
/// Only the SHA-256 of the token is stored.
async fn create_session(pool: &SqlitePool, user_id: i64, ttl_hours: i64) -> Result<String, ApiError> {
    let token = generate_token();
    let token_hash = hash_token(&token);

    let expires_at = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(ttl_hours))
        .ok_or_else(|| ApiError::internal("Session lifetime out of range"))?
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    let session_id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&session_id)
    .bind(user_id)
    .bind(&token_hash)
    .bind(&expires_at)
    .bind(now_timestamp())
    .execute(pool)
    .await?;

    Ok(token)
}

/// Resolve a bearer token to the acting user.
///
/// The configured admin token maps to a synthetic administrator; anything
/// else must match an unexpired session.
pub async fn resolve_actor(
    pool: &SqlitePool,
    config: &crate::config::Config,
    token: &str,
) -> Result<Actor, ApiError> {
    let admin_token = config.auth.admin_token.as_bytes();
    let provided_token = token.as_bytes();

    // Only compare if lengths match (constant-time check)
    if !admin_token.is_empty()
        && admin_token.len() == provided_token.len()
        && bool::from(admin_token.ct_eq(provided_token))
    {
        return Ok(Actor::system());
    }

    let token_hash = hash_token(token);
    let session: Option<Session> =
        sqlx::query_as("SELECT * FROM sessions WHERE token_hash = ? AND expires_at > ?")
            .bind(&token_hash)
            .bind(now_timestamp())
            .fetch_optional(pool)
            .await?;

    let session = session.ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(session.user_id)
        .fetch_optional(pool)
        .await?;

    user.map(|u| Actor::from(&u))
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(request.email.trim().to_lowercase())
        .fetch_optional(&state.db)
        .await?;

    let user = match user {
        Some(u) if verify_password(&request.password, &u.password_hash) => u,
        _ => {
            warn!(email = %request.email, "Failed login attempt");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
    };

    let token = create_session(&state.db, user.id, state.config.auth.session_ttl_hours).await?;

    info!(user_id = user.id, role = %user.role, "User logged in");

    Ok(Json(LoginResponse {
        token,
        user: UserResponse::from(user),
    }))
}

/// Self-service registration for students and teachers
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), ApiError> {
    let role = match request.role.parse::<Role>() {
        Ok(Role::Admin) | Err(_) => {
            return Err(ApiError::validation_field(
                "role",
                "Role must be student or teacher",
            ))
        }
        Ok(role) => role,
    };

    let user = insert_user(
        &state.db,
        NewUser {
            name: &request.name,
            email: &request.email,
            password: &request.password,
            role,
            student_id: request.student_id.as_deref(),
            faculty: request.faculty.as_deref(),
        },
    )
    .await?;

    let token = create_session(&state.db, user.id, state.config.auth.session_ttl_hours).await?;

    info!(user_id = user.id, role = %role, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            token,
            user: UserResponse::from(user),
        }),
    ))
}

/// Current user endpoint
pub async fn me(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<UserResponse>, ApiError> {
    if actor.id == Actor::system().id {
        return Ok(Json(UserResponse {
            id: actor.id,
            name: actor.name,
            email: actor.email,
            role: actor.role.as_str().to_string(),
            student_id: None,
            faculty: None,
        }));
    }

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(actor.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;

    Ok(Json(UserResponse::from(user)))
}

/// Logout endpoint, ends the session the token belongs to
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    if let Some(token) = extract_token(&headers) {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(hash_token(&token))
            .execute(&state.db)
            .await?;
        if result.rows_affected() > 0 {
            info!("Session ended");
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Auth middleware that validates tokens and attaches the [`Actor`]
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    let actor = resolve_actor(&state.db, &state.config, &token).await?;
    request.extensions_mut().insert(actor);

    Ok(next.run(request).await)
}

/// Create the configured bootstrap administrator when no user has that email.
/// Returns whether a user was created.
pub async fn ensure_admin_user(pool: &SqlitePool, email: &str, password: &str) -> anyhow::Result<bool> {
    // Stored the same way login looks it up
    let email = email.trim().to_lowercase();
    let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(false);
    }

    let password_hash = hash_password(password)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;
    let now = now_timestamp();

    sqlx::query(
        "INSERT INTO users (name, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, 'admin', ?, ?)",
    )
    .bind("Administrator")
    .bind(&email)
    .bind(&password_hash)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    info!(email = %email, "Created bootstrap administrator");
    Ok(true)
}

/// Extractor for the acting user, set by [`auth_middleware`]
#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Actor>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Reject anyone but an administrator
pub(crate) fn require_admin(actor: &Actor) -> Result<(), ApiError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Administrator access required"))
    }
}

/// Reject actors whose role is not `role`
pub(crate) fn require_role(actor: &Actor, role: Role) -> Result<(), ApiError> {
    if actor.role == role {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!("Only a {} can use this view", role)))
    }
}
