//! Absence notice models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::request::RequestStatus;

/// Classification of an absence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbsenceType {
    Justificada,
    Injustificada,
    /// Announced ahead of time by the student
    Prevista,
}

impl AbsenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbsenceType::Justificada => "justificada",
            AbsenceType::Injustificada => "injustificada",
            AbsenceType::Prevista => "prevista",
        }
    }
}

impl Default for AbsenceType {
    fn default() -> Self {
        Self::Prevista
    }
}

impl std::fmt::Display for AbsenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AbsenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "justificada" => Ok(AbsenceType::Justificada),
            "injustificada" => Ok(AbsenceType::Injustificada),
            "prevista" => Ok(AbsenceType::Prevista),
            _ => Err(format!("Invalid absence type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Absence {
    pub id: i64,
    pub fecha: String,
    pub materia: String,
    pub motivo: Option<String>,
    pub tipo: String,
    pub observaciones: Option<String>,
    pub student_id: i64,
    pub course_id: i64,
    pub teacher_id: i64,
    pub created_at: String,
    pub updated_at: String,
    /// NULL on rows written before absences carried a decision
    pub status: Option<String>,
}

impl Absence {
    pub fn status(&self) -> RequestStatus {
        RequestStatus::from_stored(self.status.as_deref())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAbsenceRequest {
    pub fecha: String,
    pub materia: String,
    pub motivo: Option<String>,
    pub course_id: i64,
    pub tipo: Option<String>,
    /// Only honoured for administrators; students always file for themselves
    pub student_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAbsenceRequest {
    pub tipo: Option<String>,
    pub observaciones: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsenceTeacherQuery {
    pub student_id: Option<i64>,
}

pub async fn get_absence(pool: &SqlitePool, id: i64) -> Result<Option<Absence>, sqlx::Error> {
    sqlx::query_as::<_, Absence>("SELECT * FROM absences WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absence_type_parse() {
        assert_eq!("prevista".parse::<AbsenceType>().unwrap(), AbsenceType::Prevista);
        assert_eq!(AbsenceType::default(), AbsenceType::Prevista);
        assert!("excused".parse::<AbsenceType>().is_err());
    }

    #[test]
    fn test_legacy_row_without_status_is_pending() {
        let row = Absence {
            id: 4,
            fecha: "2026-03-02".to_string(),
            materia: "Bases de Datos".to_string(),
            motivo: Some("Cita médica".to_string()),
            tipo: "prevista".to_string(),
            observaciones: None,
            student_id: 3,
            course_id: 2,
            teacher_id: 2,
            created_at: "2026-02-28T09:00:00Z".to_string(),
            updated_at: "2026-02-28T09:00:00Z".to_string(),
            status: None,
        };
        assert_eq!(row.status(), RequestStatus::Pending);
    }
}
