//! Merged, role-scoped feed of accommodations and absences.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use crate::db::{
    Absence, Accommodation, AccommodationType, Actor, Course, RequestKind, RequestStatus, Role,
    User, UserResponse,
};

use super::RequestError;

/// Which rows an actor may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestScope {
    All,
    Student(i64),
    Teacher(i64),
}

impl RequestScope {
    pub fn for_role(role: Role, actor_id: i64) -> Self {
        match role {
            Role::Admin => RequestScope::All,
            Role::Teacher => RequestScope::Teacher(actor_id),
            Role::Student => RequestScope::Student(actor_id),
        }
    }

    pub fn for_actor(actor: &Actor) -> Self {
        Self::for_role(actor.role, actor.id)
    }

    fn condition(&self) -> Option<(&'static str, i64)> {
        match self {
            RequestScope::All => None,
            RequestScope::Student(id) => Some(("student_id = ?", *id)),
            RequestScope::Teacher(id) => Some(("teacher_id = ?", *id)),
        }
    }
}

/// Optional query filters. `request_type` only narrows accommodations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFilters {
    pub status: Option<RequestStatus>,
    pub request_type: Option<AccommodationType>,
}

impl RequestFilters {
    /// Parse raw query values. Empty strings count as absent.
    pub fn parse(status: Option<&str>, request_type: Option<&str>) -> Result<Self, RequestError> {
        let status = match status.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => Some(s.parse::<RequestStatus>().map_err(|_| {
                RequestError::validation("status", "Must be one of: pending, approved, rejected")
            })?),
            None => None,
        };

        let request_type = match request_type.map(str::trim).filter(|s| !s.is_empty()) {
            Some(t) => Some(
                t.parse::<AccommodationType>()
                    .map_err(|e| RequestError::validation("type", e))?,
            ),
            None => None,
        };

        Ok(Self {
            status,
            request_type,
        })
    }
}

/// Student, teacher and course a request refers to
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Parties {
    pub student: Option<UserResponse>,
    pub teacher: Option<UserResponse>,
    pub course: Option<Course>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccommodationEntry {
    pub id: i64,
    #[serde(flatten)]
    pub parties: Parties,
    pub status: RequestStatus,
    pub motivo: Option<String>,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
    pub teacher_comment: Option<String>,
    pub accommodation_type: String,
    pub requested_date: String,
    pub new_date: Option<String>,
    pub new_classroom: Option<String>,
    pub extension_days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsenceEntry {
    pub id: i64,
    #[serde(flatten)]
    pub parties: Parties,
    pub status: RequestStatus,
    pub motivo: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub teacher_comment: Option<String>,
    pub fecha: String,
    pub materia: String,
    pub tipo: String,
}

/// One entry of the unified feed, tagged with its origin in `type`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UnifiedRequest {
    Accommodation(AccommodationEntry),
    Absence(AbsenceEntry),
}

impl UnifiedRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            UnifiedRequest::Accommodation(_) => RequestKind::Accommodation,
            UnifiedRequest::Absence(_) => RequestKind::Absence,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            UnifiedRequest::Accommodation(e) => e.id,
            UnifiedRequest::Absence(e) => e.id,
        }
    }

    pub fn status(&self) -> RequestStatus {
        match self {
            UnifiedRequest::Accommodation(e) => e.status,
            UnifiedRequest::Absence(e) => e.status,
        }
    }

    pub fn created_at(&self) -> &str {
        match self {
            UnifiedRequest::Accommodation(e) => &e.created_at,
            UnifiedRequest::Absence(e) => &e.created_at,
        }
    }

    pub fn parties(&self) -> &Parties {
        match self {
            UnifiedRequest::Accommodation(e) => &e.parties,
            UnifiedRequest::Absence(e) => &e.parties,
        }
    }

    fn from_accommodation(row: Accommodation, parties: Parties) -> Self {
        let status = row.status();
        UnifiedRequest::Accommodation(AccommodationEntry {
            id: row.id,
            parties,
            status,
            motivo: row.motivo,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            teacher_comment: row.teacher_response,
            accommodation_type: row.request_type,
            requested_date: row.requested_date,
            new_date: row.new_date,
            new_classroom: row.new_classroom,
            extension_days: row.extension_days,
        })
    }

    fn from_absence(row: Absence, parties: Parties) -> Self {
        let status = row.status();
        UnifiedRequest::Absence(AbsenceEntry {
            id: row.id,
            parties,
            status,
            motivo: row.motivo,
            created_at: row.created_at,
            updated_at: row.updated_at,
            teacher_comment: row.observaciones,
            fecha: row.fecha,
            materia: row.materia,
            tipo: row.tipo,
        })
    }
}

/// Parse a stored timestamp. Accepts RFC 3339 and SQLite's `datetime()` form.
fn timestamp_key(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Concatenate absences then accommodations and order newest first.
///
/// The sort is stable, so entries with equal `createdAt` keep their
/// concatenation order. Unparseable timestamps sort last.
pub fn merge_feed(
    absences: Vec<UnifiedRequest>,
    accommodations: Vec<UnifiedRequest>,
) -> Vec<UnifiedRequest> {
    let mut feed = absences;
    feed.extend(accommodations);
    feed.sort_by_cached_key(|entry| Reverse(timestamp_key(entry.created_at())));
    feed
}

/// Ids bound per `IN (...)` query, well under SQLite's host parameter limit
const DIRECTORY_CHUNK_SIZE: usize = 500;

/// Users and courses referenced by a batch of requests
struct Directory {
    users: HashMap<i64, UserResponse>,
    courses: HashMap<i64, Course>,
}

impl Directory {
    async fn load(
        pool: &SqlitePool,
        user_ids: &BTreeSet<i64>,
        course_ids: &BTreeSet<i64>,
    ) -> Result<Self, sqlx::Error> {
        Self::load_chunked(pool, user_ids, course_ids, DIRECTORY_CHUNK_SIZE).await
    }

    async fn load_chunked(
        pool: &SqlitePool,
        user_ids: &BTreeSet<i64>,
        course_ids: &BTreeSet<i64>,
        chunk_size: usize,
    ) -> Result<Self, sqlx::Error> {
        let user_ids: Vec<i64> = user_ids.iter().copied().collect();
        let course_ids: Vec<i64> = course_ids.iter().copied().collect();

        let mut users = HashMap::new();
        for chunk in user_ids.chunks(chunk_size) {
            let sql = format!("SELECT * FROM users WHERE id IN ({})", placeholders(chunk.len()));
            let mut query = sqlx::query_as::<_, User>(&sql);
            for id in chunk {
                query = query.bind(id);
            }
            for user in query.fetch_all(pool).await? {
                users.insert(user.id, UserResponse::from(user));
            }
        }

        let mut courses = HashMap::new();
        for chunk in course_ids.chunks(chunk_size) {
            let sql = format!("SELECT * FROM courses WHERE id IN ({})", placeholders(chunk.len()));
            let mut query = sqlx::query_as::<_, Course>(&sql);
            for id in chunk {
                query = query.bind(id);
            }
            for course in query.fetch_all(pool).await? {
                courses.insert(course.id, course);
            }
        }

        Ok(Self { users, courses })
    }

    fn parties(&self, student_id: i64, teacher_id: i64, course_id: i64) -> Parties {
        Parties {
            student: self.users.get(&student_id).cloned(),
            teacher: self.users.get(&teacher_id).cloned(),
            course: self.courses.get(&course_id).cloned(),
        }
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

async fn fetch_accommodations(
    pool: &SqlitePool,
    scope: RequestScope,
    filters: &RequestFilters,
) -> Result<Vec<Accommodation>, sqlx::Error> {
    let mut conditions = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(status) = filters.status {
        conditions.push("status = ?");
        bindings.push(status.as_str().to_string());
    }

    if let Some(request_type) = filters.request_type {
        conditions.push("request_type = ?");
        bindings.push(request_type.as_str().to_string());
    }

    let scope = scope.condition();
    if let Some((condition, _)) = scope {
        conditions.push(condition);
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
    let mut query = sqlx::query_as::<_, Accommodation>(&sql);
    for binding in &bindings {
        query = query.bind(binding);
    }
    if let Some((_, actor_id)) = scope {
        query = query.bind(actor_id);
    }

    query.fetch_all(pool).await
}

async fn fetch_absences(
    pool: &SqlitePool,
    scope: RequestScope,
    filters: &RequestFilters,
) -> Result<Vec<Absence>, sqlx::Error> {
    let mut conditions = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(status) = filters.status {
        conditions.push("COALESCE(status, 'pending') = ?");
        bindings.push(status.as_str().to_string());
    }

    let scope = scope.condition();
    if let Some((condition, _)) = scope {
        conditions.push(condition);
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT * FROM absences {} ORDER BY created_at DESC, id DESC",
        where_clause
    );
    let mut query = sqlx::query_as::<_, Absence>(&sql);
    for binding in &bindings {
        query = query.bind(binding);
    }
    if let Some((_, actor_id)) = scope {
        query = query.bind(actor_id);
    }

    query.fetch_all(pool).await
}

/// Build the unified feed visible under `scope`, newest first.
///
/// Never writes to the store.
pub async fn list_requests(
    pool: &SqlitePool,
    scope: RequestScope,
    filters: &RequestFilters,
) -> Result<Vec<UnifiedRequest>, RequestError> {
    let accommodations = fetch_accommodations(pool, scope, filters).await?;
    let absences = fetch_absences(pool, scope, filters).await?;

    let mut user_ids = BTreeSet::new();
    let mut course_ids = BTreeSet::new();
    for a in &accommodations {
        user_ids.extend([a.student_id, a.teacher_id]);
        course_ids.insert(a.course_id);
    }
    for a in &absences {
        user_ids.extend([a.student_id, a.teacher_id]);
        course_ids.insert(a.course_id);
    }

    let directory = Directory::load(pool, &user_ids, &course_ids).await?;

    let absences = absences
        .into_iter()
        .map(|row| {
            let parties = directory.parties(row.student_id, row.teacher_id, row.course_id);
            UnifiedRequest::from_absence(row, parties)
        })
        .collect();
    let accommodations = accommodations
        .into_iter()
        .map(|row| {
            let parties = directory.parties(row.student_id, row.teacher_id, row.course_id);
            UnifiedRequest::from_accommodation(row, parties)
        })
        .collect();

    Ok(merge_feed(absences, accommodations))
}
