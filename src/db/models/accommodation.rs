//! Accommodation request models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::request::RequestStatus;

/// What an accommodation request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccommodationType {
    ExamDateChange,
    ClassroomChange,
    NotesRequest,
    AssignmentExtension,
    DeadlineExtension,
    ExamChange,
    AbsenceNotification,
}

impl AccommodationType {
    pub const ALL: [AccommodationType; 7] = [
        AccommodationType::ExamDateChange,
        AccommodationType::ClassroomChange,
        AccommodationType::NotesRequest,
        AccommodationType::AssignmentExtension,
        AccommodationType::DeadlineExtension,
        AccommodationType::ExamChange,
        AccommodationType::AbsenceNotification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccommodationType::ExamDateChange => "exam_date_change",
            AccommodationType::ClassroomChange => "classroom_change",
            AccommodationType::NotesRequest => "notes_request",
            AccommodationType::AssignmentExtension => "assignment_extension",
            AccommodationType::DeadlineExtension => "deadline_extension",
            AccommodationType::ExamChange => "exam_change",
            AccommodationType::AbsenceNotification => "absence_notification",
        }
    }
}

impl std::fmt::Display for AccommodationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccommodationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccommodationType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Invalid accommodation type: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Accommodation {
    pub id: i64,
    #[serde(rename = "type")]
    pub request_type: String,
    pub status: String,
    pub description: String,
    pub motivo: Option<String>,
    pub requested_date: String,
    pub new_date: Option<String>,
    pub original_date: Option<String>,
    pub proposed_date: Option<String>,
    pub new_classroom: Option<String>,
    pub extension_days: Option<i64>,
    pub teacher_response: Option<String>,
    pub student_id: i64,
    pub course_id: i64,
    pub teacher_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Accommodation {
    pub fn status(&self) -> RequestStatus {
        RequestStatus::from_stored(Some(&self.status))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccommodationRequest {
    #[serde(rename = "type")]
    pub request_type: String,
    pub description: String,
    pub requested_date: String,
    pub new_date: Option<String>,
    pub new_classroom: Option<String>,
    pub extension_days: Option<i64>,
    pub course_id: i64,
    pub motivo: Option<String>,
    pub original_date: Option<String>,
    pub proposed_date: Option<String>,
    /// Only honoured for administrators; students always file for themselves
    pub student_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccommodationRequest {
    pub status: Option<String>,
    pub teacher_response: Option<String>,
}

pub async fn get_accommodation(
    pool: &SqlitePool,
    id: i64,
) -> Result<Option<Accommodation>, sqlx::Error> {
    sqlx::query_as::<_, Accommodation>("SELECT * FROM accommodations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}
