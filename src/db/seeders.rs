//! Database seeders for demo data
//!
//! Populates a fresh database with a small campus: one administrator, one
//! teacher, three students and the teacher's courses. Rows that already
//! exist (matched by email or course code) are left untouched.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

use crate::api::auth::hash_password;

/// Summary of what a seeding run inserted
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub users_created: usize,
    pub courses_created: usize,
}

/// Seed demo users and courses
pub async fn seed_demo_data(pool: &SqlitePool) -> Result<SeedReport> {
    info!("Seeding demo users and courses...");

    let mut report = SeedReport::default();

    // Format: (name, email, password, role, student_id, faculty)
    let users: Vec<(&str, &str, &str, &str, Option<&str>, &str)> = vec![
        ("Admin Principal", "admin@campus.test", "Admin-Campus-2024!", "admin", None, "Psicología"),
        ("Juan Pérez", "juan.perez@campus.test", "Profesor-2024!", "teacher", None, "Telemática"),
        ("María García", "maria.garcia@campus.test", "Estudiante-2024!", "student", Some("2024001"), "Psicología"),
        ("Carlos López", "carlos.lopez@campus.test", "Estudiante-2024!", "student", Some("2024002"), "Telemática"),
        ("Ana Martínez", "ana.martinez@campus.test", "Estudiante-2024!", "student", Some("2024003"), "Ciencias de la Educación"),
    ];

    for (name, email, password, role, student_id, faculty) in users {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(pool)
            .await?;
        if exists.is_some() {
            continue;
        }

        let password_hash = hash_password(password)
            .map_err(|e| anyhow::anyhow!("Failed to hash password for {}: {}", email, e))?;
        let now = super::now_timestamp();

        sqlx::query(
            r#"
            INSERT INTO users (name, email, password_hash, role, student_id, faculty, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(&password_hash)
        .bind(role)
        .bind(student_id)
        .bind(faculty)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to seed user {}", email))?;

        report.users_created += 1;
    }

    let teacher_id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind("juan.perez@campus.test")
        .fetch_one(pool)
        .await
        .context("Demo teacher is missing")?;

    // Format: (name, code, description, schedule, classroom)
    let courses: Vec<(&str, &str, &str, &str, &str)> = vec![
        (
            "Programación Web",
            "PW-2024-001",
            "Desarrollo web con HTML, CSS, JavaScript y frameworks modernos",
            "Lunes y Miércoles 8:00-10:00",
            "Laboratorio A-101",
        ),
        (
            "Bases de Datos",
            "BD-2024-001",
            "Diseño e implementación de bases de datos relacionales",
            "Martes y Jueves 10:00-12:00",
            "Aula B-205",
        ),
        (
            "Psicología Cognitiva",
            "PC-2024-001",
            "Estudio de los procesos mentales y cognitivos",
            "Lunes, Miércoles y Viernes 14:00-16:00",
            "Aula C-301",
        ),
        (
            "Redes de Computadoras",
            "RC-2024-001",
            "Fundamentos de redes, protocolos y comunicaciones",
            "Martes y Jueves 16:00-18:00",
            "Laboratorio D-102",
        ),
    ];

    for (name, code, description, schedule, classroom) in courses {
        let now = super::now_timestamp();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO courses (name, code, description, schedule, classroom, teacher_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(code)
        .bind(description)
        .bind(schedule)
        .bind(classroom)
        .bind(teacher_id)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to seed course {}", code))?;

        report.courses_created += result.rows_affected() as usize;
    }

    info!(
        users = report.users_created,
        courses = report.courses_created,
        "Demo data seeded"
    );
    Ok(report)
}
