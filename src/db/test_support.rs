//! Fixture helpers for database-backed unit tests.

use sqlx::SqlitePool;

pub async fn insert_user(pool: &SqlitePool, name: &str, role: &str) -> i64 {
    let email = format!("{}@campus.test", name.to_lowercase().replace(' ', "."));
    sqlx::query_scalar(
        "INSERT INTO users (name, email, password_hash, role) VALUES (?, ?, 'x', ?) RETURNING id",
    )
    .bind(name)
    .bind(&email)
    .bind(role)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_course(pool: &SqlitePool, code: &str, teacher_id: i64) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO courses (name, code, schedule, classroom, teacher_id) VALUES (?, ?, 'Lunes 8:00', 'A-101', ?) RETURNING id",
    )
    .bind(format!("Course {}", code))
    .bind(code)
    .bind(teacher_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_accommodation(
    pool: &SqlitePool,
    student_id: i64,
    course_id: i64,
    teacher_id: i64,
    request_type: &str,
    status: &str,
    created_at: &str,
) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO accommodations
            (request_type, status, description, requested_date, student_id, course_id, teacher_id, created_at, updated_at)
        VALUES (?, ?, 'Please', '2026-05-01', ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(request_type)
    .bind(status)
    .bind(student_id)
    .bind(course_id)
    .bind(teacher_id)
    .bind(created_at)
    .bind(created_at)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_absence(
    pool: &SqlitePool,
    student_id: i64,
    course_id: i64,
    teacher_id: i64,
    status: Option<&str>,
    created_at: &str,
) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO absences
            (fecha, materia, tipo, status, student_id, course_id, teacher_id, created_at, updated_at)
        VALUES ('2026-05-02', 'Redes', 'prevista', ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(status)
    .bind(student_id)
    .bind(course_id)
    .bind(teacher_id)
    .bind(created_at)
    .bind(created_at)
    .fetch_one(pool)
    .await
    .unwrap()
}
