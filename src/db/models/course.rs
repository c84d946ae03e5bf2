//! Course models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::user::UserResponse;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub schedule: String,
    pub classroom: String,
    pub teacher_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Course joined with its teacher
#[derive(Debug, Clone, Serialize)]
pub struct CourseWithTeacher {
    #[serde(flatten)]
    pub course: Course,
    pub teacher: Option<UserResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseRequest {
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub schedule: String,
    pub classroom: String,
    /// Required when an administrator creates the course
    pub teacher_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourseRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub schedule: Option<String>,
    pub classroom: Option<String>,
}

pub async fn get_course(pool: &SqlitePool, id: i64) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}
