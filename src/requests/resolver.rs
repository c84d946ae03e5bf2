//! Approve/reject decisions on requests of either kind.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::api::metrics::record_request_decision;
use crate::db::{get_absence, get_accommodation, now_timestamp, Actor, RequestKind, RequestStatus, Role};

use super::{Request, RequestError};

/// Outcome a teacher or administrator can apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn status(&self) -> RequestStatus {
        match self {
            Decision::Approved => RequestStatus::Approved,
            Decision::Rejected => RequestStatus::Rejected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.status().as_str()
    }
}

/// How a request is addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestLookup {
    /// Bare numeric id: accommodations are searched before absences
    Any(i64),
    /// Kind plus id, unambiguous across both tables
    Keyed(RequestKind, i64),
}

impl RequestLookup {
    pub fn new(id: i64, kind: Option<RequestKind>) -> Self {
        match kind {
            Some(kind) => RequestLookup::Keyed(kind, id),
            None => RequestLookup::Any(id),
        }
    }
}

/// Updated request plus which table it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub kind: RequestKind,
    pub request: Request,
}

async fn find(pool: &SqlitePool, kind: RequestKind, id: i64) -> Result<Option<Request>, sqlx::Error> {
    Ok(match kind {
        RequestKind::Accommodation => get_accommodation(pool, id).await?.map(Request::Accommodation),
        RequestKind::Absence => get_absence(pool, id).await?.map(Request::Absence),
    })
}

async fn lookup(pool: &SqlitePool, lookup: RequestLookup) -> Result<Request, RequestError> {
    let found = match lookup {
        RequestLookup::Keyed(kind, id) => find(pool, kind, id).await?,
        RequestLookup::Any(id) => match find(pool, RequestKind::Accommodation, id).await? {
            Some(request) => Some(request),
            None => find(pool, RequestKind::Absence, id).await?,
        },
    };

    found.ok_or_else(|| RequestError::NotFound("Request not found".to_string()))
}

/// Students never decide; teachers only on requests addressed to them.
fn authorize(actor: &Actor, request: &Request) -> Result<(), RequestError> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Teacher if request.teacher_id() == actor.id => Ok(()),
        Role::Teacher => Err(RequestError::Forbidden(
            "Not authorized to resolve this request".to_string(),
        )),
        Role::Student => Err(RequestError::Forbidden(
            "Students cannot approve or reject requests".to_string(),
        )),
    }
}

async fn write_status(
    pool: &SqlitePool,
    kind: RequestKind,
    id: i64,
    status: RequestStatus,
    comment: Option<&str>,
) -> Result<(), RequestError> {
    let sql = match kind {
        RequestKind::Accommodation => {
            "UPDATE accommodations SET status = ?, teacher_response = COALESCE(?, teacher_response), updated_at = ? WHERE id = ?"
        }
        RequestKind::Absence => {
            "UPDATE absences SET status = ?, observaciones = COALESCE(?, observaciones), updated_at = ? WHERE id = ?"
        }
    };

    let result = sqlx::query(sql)
        .bind(status.as_str())
        .bind(comment)
        .bind(now_timestamp())
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(RequestError::NotFound("Request not found".to_string()));
    }
    Ok(())
}

/// Apply `decision` to the request found by `target`.
///
/// A `None` comment keeps whatever comment is stored. Deciding again on an
/// already decided request overwrites the previous decision.
pub async fn resolve(
    pool: &SqlitePool,
    actor: &Actor,
    target: RequestLookup,
    decision: Decision,
    comment: Option<&str>,
) -> Result<Resolution, RequestError> {
    let request = lookup(pool, target).await?;
    authorize(actor, &request)?;

    let kind = request.kind();
    let id = request.id();
    let previous = request.status();

    write_status(pool, kind, id, decision.status(), comment).await?;

    let request = lookup(pool, RequestLookup::Keyed(kind, id)).await?;

    record_request_decision(kind, decision);
    if previous.is_terminal() {
        info!(kind = %kind, id = id, previous = %previous, "Overwriting earlier decision");
    }
    info!(
        kind = %kind,
        id = id,
        actor_id = actor.id,
        from = %previous,
        to = %decision.status(),
        "Request resolved"
    );

    Ok(Resolution { kind, request })
}

/// Put a request back to pending. Operator tool, not exposed over HTTP.
pub async fn reset_status(
    pool: &SqlitePool,
    kind: RequestKind,
    id: i64,
) -> Result<Request, RequestError> {
    let table = kind.table();
    let result = sqlx::query(&format!(
        "UPDATE {} SET status = 'pending', updated_at = ? WHERE id = ?",
        table
    ))
    .bind(now_timestamp())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RequestError::NotFound(format!("No {} with id {}", kind, id)));
    }

    info!(kind = %kind, id = id, "Request status reset to pending");
    lookup(pool, RequestLookup::Keyed(kind, id)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;

    struct Fixture {
        pool: SqlitePool,
        teacher: Actor,
        other_teacher: Actor,
        student: Actor,
        course: i64,
    }

    fn actor(id: i64, role: Role) -> Actor {
        Actor {
            id,
            role,
            name: format!("user-{}", id),
            email: format!("user-{}@campus.test", id),
        }
    }

    async fn fixture() -> Fixture {
        let pool = crate::db::init_memory().await.unwrap();
        let teacher = insert_user(&pool, "Teacher A", "teacher").await;
        let other_teacher = insert_user(&pool, "Teacher B", "teacher").await;
        let student = insert_user(&pool, "Student S", "student").await;
        let course = insert_course(&pool, "PW-1", teacher).await;
        Fixture {
            pool,
            teacher: actor(teacher, Role::Teacher),
            other_teacher: actor(other_teacher, Role::Teacher),
            student: actor(student, Role::Student),
            course,
        }
    }

    #[tokio::test]
    async fn test_resolve_accommodation_sets_status_and_response() {
        let f = fixture().await;
        let id = insert_accommodation(
            &f.pool, f.student.id, f.course, f.teacher.id, "deadline_extension", "pending", "2026-01-01T00:00:00Z",
        )
        .await;

        let resolution = resolve(&f.pool, &f.teacher, RequestLookup::Any(id), Decision::Approved, Some("Granted"))
            .await
            .unwrap();

        assert_eq!(resolution.kind, RequestKind::Accommodation);
        assert_eq!(resolution.request.status(), RequestStatus::Approved);
        assert_eq!(resolution.request.teacher_comment(), Some("Granted"));
        match &resolution.request {
            Request::Accommodation(row) => assert_ne!(row.updated_at, row.created_at),
            other => panic!("expected accommodation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bare_id_falls_back_to_absence() {
        let f = fixture().await;
        let id = insert_absence(&f.pool, f.student.id, f.course, f.teacher.id, None, "2026-01-01T00:00:00Z").await;

        let resolution = resolve(&f.pool, &f.teacher, RequestLookup::Any(id), Decision::Rejected, Some("No proof"))
            .await
            .unwrap();

        assert_eq!(resolution.kind, RequestKind::Absence);
        assert_eq!(resolution.request.status(), RequestStatus::Rejected);
        assert_eq!(resolution.request.teacher_comment(), Some("No proof"));
    }

    #[tokio::test]
    async fn test_bare_id_prefers_accommodation_on_collision() {
        let f = fixture().await;
        let acc = insert_accommodation(
            &f.pool, f.student.id, f.course, f.teacher.id, "exam_change", "pending", "2026-01-01T00:00:00Z",
        )
        .await;
        let abs = insert_absence(&f.pool, f.student.id, f.course, f.teacher.id, None, "2026-01-01T00:00:00Z").await;
        assert_eq!(acc, abs);

        let resolution = resolve(&f.pool, &f.teacher, RequestLookup::Any(acc), Decision::Approved, None)
            .await
            .unwrap();
        assert_eq!(resolution.kind, RequestKind::Accommodation);

        // The keyed form reaches the absence that shares the number
        let resolution = resolve(
            &f.pool,
            &f.teacher,
            RequestLookup::Keyed(RequestKind::Absence, abs),
            Decision::Approved,
            None,
        )
        .await
        .unwrap();
        assert_eq!(resolution.kind, RequestKind::Absence);
        assert_eq!(resolution.request.status(), RequestStatus::Approved);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let f = fixture().await;
        let admin = Actor::system();
        let err = resolve(&f.pool, &admin, RequestLookup::Any(999), Decision::Approved, Some(""))
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_repeated_approval_is_idempotent() {
        let f = fixture().await;
        let id = insert_accommodation(
            &f.pool, f.student.id, f.course, f.teacher.id, "notes_request", "pending", "2026-01-01T00:00:00Z",
        )
        .await;

        let first = resolve(&f.pool, &f.teacher, RequestLookup::Any(id), Decision::Approved, Some("ok"))
            .await
            .unwrap();
        let second = resolve(&f.pool, &f.teacher, RequestLookup::Any(id), Decision::Approved, Some("ok"))
            .await
            .unwrap();

        for resolution in [&first, &second] {
            assert_eq!(resolution.request.status(), RequestStatus::Approved);
            assert_eq!(resolution.request.teacher_comment(), Some("ok"));
        }
    }

    #[tokio::test]
    async fn test_decision_can_be_overwritten() {
        let f = fixture().await;
        let id = insert_absence(&f.pool, f.student.id, f.course, f.teacher.id, Some("pending"), "2026-01-01T00:00:00Z").await;
        let target = RequestLookup::Keyed(RequestKind::Absence, id);

        resolve(&f.pool, &f.teacher, target, Decision::Approved, Some("fine")).await.unwrap();
        let resolution = resolve(&f.pool, &f.teacher, target, Decision::Rejected, None).await.unwrap();

        assert_eq!(resolution.request.status(), RequestStatus::Rejected);
        // Omitted comment keeps the earlier one
        assert_eq!(resolution.request.teacher_comment(), Some("fine"));
    }

    #[tokio::test]
    async fn test_only_assigned_teacher_or_admin_may_resolve() {
        let f = fixture().await;
        let id = insert_accommodation(
            &f.pool, f.student.id, f.course, f.teacher.id, "classroom_change", "pending", "2026-01-01T00:00:00Z",
        )
        .await;

        let err = resolve(&f.pool, &f.other_teacher, RequestLookup::Any(id), Decision::Approved, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Forbidden(_)));

        let err = resolve(&f.pool, &f.student, RequestLookup::Any(id), Decision::Approved, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Forbidden(_)));

        // Nothing was written by the rejected attempts
        let row = get_accommodation(&f.pool, id).await.unwrap().unwrap();
        assert_eq!(row.status(), RequestStatus::Pending);

        let resolution = resolve(&f.pool, &Actor::system(), RequestLookup::Any(id), Decision::Rejected, None)
            .await
            .unwrap();
        assert_eq!(resolution.request.status(), RequestStatus::Rejected);
    }

    #[tokio::test]
    async fn test_reset_status() {
        let f = fixture().await;
        let id = insert_accommodation(
            &f.pool, f.student.id, f.course, f.teacher.id, "exam_change", "rejected", "2026-01-01T00:00:00Z",
        )
        .await;

        let request = reset_status(&f.pool, RequestKind::Accommodation, id).await.unwrap();
        assert_eq!(request.status(), RequestStatus::Pending);

        let err = reset_status(&f.pool, RequestKind::Absence, 42).await.unwrap_err();
        assert!(matches!(err, RequestError::NotFound(_)));
    }
}
