//! HTTP integration tests for the request feed and decisions

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use campus_requests::config::Config;
use campus_requests::db::{init_memory, DbPool};
use campus_requests::{api::create_router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const ADMIN_TOKEN: &str = "integration-admin-token-0123456789";

async fn setup_app() -> (Router, DbPool) {
    let pool = init_memory().await.expect("Failed to create in-memory database");

    let mut config = Config::default();
    config.auth.admin_token = ADMIN_TOKEN.to_string();

    let state = Arc::new(AppState::new(config, pool.clone()));
    (create_router(state), pool)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };
    (status, value)
}

async fn register(app: &Router, name: &str, email: &str, role: &str, student_id: Option<&str>) -> (i64, String) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "name": name,
            "email": email,
            "password": "clave2026",
            "role": role,
            "studentId": student_id,
            "faculty": "Psicología",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    (
        body["user"]["id"].as_i64().unwrap(),
        body["token"].as_str().unwrap().to_string(),
    )
}

async fn create_course(app: &Router, teacher_token: &str, code: &str) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/courses",
        Some(teacher_token),
        Some(json!({
            "name": format!("Curso {}", code),
            "code": code,
            "schedule": "Lunes 8:00",
            "classroom": "A-101",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create course failed: {}", body);
    body["id"].as_i64().unwrap()
}

async fn file_accommodation(app: &Router, student_token: &str, course_id: i64) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/accommodations",
        Some(student_token),
        Some(json!({
            "type": "exam_date_change",
            "description": "Coincide con otro examen",
            "requestedDate": "2026-03-14",
            "newDate": "2026-03-21",
            "courseId": course_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create accommodation failed: {}", body);
    assert_eq!(body["status"], "pending");
    body["id"].as_i64().unwrap()
}

async fn file_absence(app: &Router, student_token: &str, course_id: i64) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/absences",
        Some(student_token),
        Some(json!({
            "fecha": "2026-03-10",
            "materia": "Psicología General",
            "motivo": "Cita médica",
            "courseId": course_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create absence failed: {}", body);
    assert_eq!(body["tipo"], "prevista");
    body["id"].as_i64().unwrap()
}

async fn set_created_at(pool: &DbPool, table: &str, id: i64, created_at: &str) {
    sqlx::query(&format!("UPDATE {} SET created_at = ? WHERE id = ?", table))
        .bind(created_at)
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
}

struct Campus {
    app: Router,
    pool: DbPool,
    teacher_id: i64,
    teacher_token: String,
    student_token: String,
    course_id: i64,
}

async fn campus() -> Campus {
    let (app, pool) = setup_app().await;
    let (teacher_id, teacher_token) =
        register(&app, "Juan Pérez", "juan.perez@campus.test", "teacher", None).await;
    let (_, student_token) =
        register(&app, "María García", "maria.garcia@campus.test", "student", Some("2024001")).await;
    let course_id = create_course(&app, &teacher_token, "PSI101").await;

    Campus {
        app,
        pool,
        teacher_id,
        teacher_token,
        student_token,
        course_id,
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _pool) = setup_app().await;
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let (app, _pool) = setup_app().await;

    let (status, body) = send(&app, Method::GET, "/api/requests/admin", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, _) = send(&app, Method::GET, "/api/requests/admin", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_login_and_me() {
    let (app, _pool) = setup_app().await;
    let (id, token) = register(&app, "Ana Martínez", "ana@campus.test", "student", Some("2024003")).await;

    let (status, me) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"].as_i64(), Some(id));
    assert_eq!(me["studentId"], "2024003");
    assert!(me.get("passwordHash").is_none());

    let (status, login) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": "ana@campus.test", "password": "clave2026"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(login["token"].as_str().unwrap(), token);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": "ana@campus.test", "password": "wrong-password1"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_rejects_admin_and_duplicates() {
    let (app, _pool) = setup_app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({"name": "Eve", "email": "eve@campus.test", "password": "clave2026", "role": "admin"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");

    register(&app, "Eve", "eve@campus.test", "student", None).await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({"name": "Eve 2", "email": "eve@campus.test", "password": "clave2026", "role": "teacher"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_feed_merges_kinds_newest_first() {
    let c = campus().await;
    let accommodation = file_accommodation(&c.app, &c.student_token, c.course_id).await;
    let absence = file_absence(&c.app, &c.student_token, c.course_id).await;
    assert_eq!(accommodation, 1);
    assert_eq!(absence, 1);

    set_created_at(&c.pool, "accommodations", accommodation, "2026-03-01T10:00:00Z").await;
    set_created_at(&c.pool, "absences", absence, "2026-03-02T10:00:00Z").await;

    let (status, feed) = send(&c.app, Method::GET, "/api/requests/admin", Some(ADMIN_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);

    let feed = feed.as_array().unwrap();
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0]["type"], "absence");
    assert_eq!(feed[0]["id"], 1);
    assert_eq!(feed[0]["status"], "pending");
    assert_eq!(feed[0]["materia"], "Psicología General");
    assert!(feed[0].get("requestedDate").is_none());

    assert_eq!(feed[1]["type"], "accommodation");
    assert_eq!(feed[1]["id"], 1);
    assert_eq!(feed[1]["requestedDate"], "2026-03-14");
    assert!(feed[1].get("fecha").is_none());
    assert_eq!(feed[1]["teacher"]["id"].as_i64(), Some(c.teacher_id));
    assert_eq!(feed[1]["course"]["code"], "PSI101");
    assert!(feed[1]["student"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_feed_view_must_match_role() {
    let c = campus().await;

    let (status, _) = send(&c.app, Method::GET, "/api/requests/admin", Some(&c.student_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&c.app, Method::GET, "/api/requests/student", Some(&c.teacher_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, feed) = send(&c.app, Method::GET, "/api/requests/student", Some(&c.student_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed, json!([]));
}

#[tokio::test]
async fn test_feed_filters_validated() {
    let c = campus().await;
    file_accommodation(&c.app, &c.student_token, c.course_id).await;

    let (status, body) = send(
        &c.app,
        Method::GET,
        "/api/requests/admin?status=maybe",
        Some(ADMIN_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["details"]["status"].is_array());

    let (status, _) = send(&c.app, Method::GET, "/api/requests/admin?type=vacation", Some(ADMIN_TOKEN), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, feed) = send(
        &c.app,
        Method::GET,
        "/api/requests/admin?status=&type=",
        Some(ADMIN_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_teacher_feed_is_scoped_and_filtered() {
    let c = campus().await;
    let (_, other_teacher_token) =
        register(&c.app, "Laura Ríos", "laura.rios@campus.test", "teacher", None).await;
    let other_course = create_course(&c.app, &other_teacher_token, "TEL201").await;

    let mine = file_accommodation(&c.app, &c.student_token, c.course_id).await;
    let mine_pending = file_absence(&c.app, &c.student_token, c.course_id).await;
    let theirs = file_accommodation(&c.app, &c.student_token, other_course).await;

    for (token, id) in [(&c.teacher_token, mine), (&other_teacher_token, theirs)] {
        let (status, _) = send(
            &c.app,
            Method::PATCH,
            &format!("/api/requests/{}/approve?kind=accommodation", id),
            Some(token),
            Some(json!({"teacherComment": "De acuerdo"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, feed) = send(
        &c.app,
        Method::GET,
        "/api/requests/teacher?status=approved",
        Some(&c.teacher_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let feed = feed.as_array().unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0]["type"], "accommodation");
    assert_eq!(feed[0]["id"].as_i64(), Some(mine));
    assert_eq!(feed[0]["teacherComment"], "De acuerdo");

    let (_, pending) = send(
        &c.app,
        Method::GET,
        "/api/requests/teacher?status=pending",
        Some(&c.teacher_token),
        None,
    )
    .await;
    let pending = pending.as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["type"], "absence");
    assert_eq!(pending[0]["id"].as_i64(), Some(mine_pending));
}

#[tokio::test]
async fn test_resolve_unknown_id_is_not_found() {
    let (app, _pool) = setup_app().await;
    let (status, body) = send(
        &app,
        Method::PATCH,
        "/api/requests/999/approve",
        Some(ADMIN_TOKEN),
        Some(json!({"teacherComment": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_students_cannot_resolve() {
    let c = campus().await;
    let id = file_accommodation(&c.app, &c.student_token, c.course_id).await;

    let (status, _) = send(
        &c.app,
        Method::PATCH,
        &format!("/api/requests/{}/approve", id),
        Some(&c.student_token),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_bare_id_prefers_accommodation_and_kind_selects_absence() {
    let c = campus().await;
    file_accommodation(&c.app, &c.student_token, c.course_id).await;
    file_absence(&c.app, &c.student_token, c.course_id).await;

    let (status, body) = send(
        &c.app,
        Method::PATCH,
        "/api/requests/1/reject",
        Some(&c.teacher_token),
        Some(json!({"teacherComment": "Fuera de plazo"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Request rejected");
    assert_eq!(body["kind"], "accommodation");
    assert_eq!(body["request"]["status"], "rejected");
    assert_eq!(body["request"]["teacherResponse"], "Fuera de plazo");

    let (status, body) = send(
        &c.app,
        Method::PATCH,
        "/api/requests/1/approve?kind=absence",
        Some(&c.teacher_token),
        Some(json!({"teacherComment": "Justificante recibido"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "absence");
    assert_eq!(body["request"]["status"], "approved");
    assert_eq!(body["request"]["observaciones"], "Justificante recibido");

    let (status, _) = send(
        &c.app,
        Method::PATCH,
        "/api/requests/1/approve?kind=grade",
        Some(&c.teacher_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resolve_twice_is_idempotent() {
    let c = campus().await;
    let id = file_accommodation(&c.app, &c.student_token, c.course_id).await;
    let uri = format!("/api/requests/{}/approve", id);

    let mut results = Vec::new();
    for _ in 0..2 {
        let (status, body) = send(
            &c.app,
            Method::PATCH,
            &uri,
            Some(&c.teacher_token),
            Some(json!({"teacherComment": "Aprobado"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        results.push((body["request"]["status"].clone(), body["request"]["teacherResponse"].clone()));
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0].0, "approved");
}

async fn patch_raw(app: &Router, uri: &str, token: &str, body: &'static str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::PATCH)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_malformed_decision_body_changes_nothing() {
    let c = campus().await;
    let id = file_accommodation(&c.app, &c.student_token, c.course_id).await;

    let (status, body) = patch_raw(
        &c.app,
        &format!("/api/requests/{}/approve", id),
        &c.teacher_token,
        r#"{"teacherComment":42}"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    assert!(body["error"]["details"]["teacherComment"].is_array());

    let (status, body) = patch_raw(
        &c.app,
        &format!("/api/requests/{}/reject", id),
        &c.teacher_token,
        "{not json",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let stored: (String, Option<String>) =
        sqlx::query_as("SELECT status, teacher_response FROM accommodations WHERE id = ?")
            .bind(id)
            .fetch_one(&c.pool)
            .await
            .unwrap();
    assert_eq!(stored, ("pending".to_string(), None));

    // No body at all is still a valid decision without a comment
    let (status, body) = send(
        &c.app,
        Method::PATCH,
        &format!("/api/requests/{}/approve", id),
        Some(&c.teacher_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"]["status"], "approved");
}

#[tokio::test]
async fn test_admin_must_name_student_when_filing() {
    let c = campus().await;

    let (status, body) = send(
        &c.app,
        Method::POST,
        "/api/absences",
        Some(ADMIN_TOKEN),
        Some(json!({"fecha": "2026-03-10", "materia": "Redes", "courseId": c.course_id})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Student ID is required");

    let (status, _) = send(
        &c.app,
        Method::POST,
        "/api/accommodations",
        Some(&c.teacher_token),
        Some(json!({
            "type": "notes_request",
            "description": "Apuntes",
            "requestedDate": "2026-03-14",
            "courseId": c.course_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &c.app,
        Method::POST,
        "/api/accommodations",
        Some(&c.student_token),
        Some(json!({
            "type": "notes_request",
            "description": "Apuntes",
            "requestedDate": "2026-03-14",
            "courseId": 999,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
