//! User, role and session models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Roles a user can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Submits accommodation requests and absence notices
    Student,
    /// Owns courses and decides on requests addressed to them
    Teacher,
    /// Manages users and courses, sees and decides on everything
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(Role::Student)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub student_id: Option<String>,
    pub faculty: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn role(&self) -> Role {
        Role::from(self.role.clone())
    }
}

/// A user as exposed over the API (never carries the password hash)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub student_id: Option<String>,
    pub faculty: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            student_id: user.student_id,
            faculty: user.faculty,
        }
    }
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self::from(user.clone())
    }
}

/// The authenticated user on whose behalf an operation runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
    pub name: String,
    pub email: String,
}

impl Actor {
    /// Synthetic administrator used for the static admin token
    pub fn system() -> Self {
        Self {
            id: 0,
            role: Role::Admin,
            name: "System Admin".to_string(),
            email: "system@campus-requests.local".to_string(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

/// Self-service registration (students and teachers)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub student_id: Option<String>,
    pub faculty: Option<String>,
}

/// Admin-side user creation, any role
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub student_id: Option<String>,
    pub faculty: Option<String>,
}

/// Full update by an administrator
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: String,
    pub email: String,
    pub role: String,
    pub student_id: Option<String>,
    pub faculty: Option<String>,
    pub password: Option<String>,
}

/// Profile fields a user may change on their own account
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub student_id: Option<String>,
    pub faculty: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("student".parse::<Role>().unwrap(), Role::Student);
        assert_eq!("Teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_unknown_stored_role_is_least_privileged() {
        assert_eq!(Role::from("janitor".to_string()), Role::Student);
    }

    #[test]
    fn test_user_response_hides_password() {
        let user = User {
            id: 7,
            name: "María García".to_string(),
            email: "maria@campus.test".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            role: "student".to_string(),
            student_id: Some("2024001".to_string()),
            faculty: Some("Psicología".to_string()),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        };

        let json = serde_json::to_value(UserResponse::from(&user)).unwrap();
        assert_eq!(json["studentId"], "2024001");
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password_hash").is_none());
    }
}
