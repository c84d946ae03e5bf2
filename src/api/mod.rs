mod absences;
mod accommodations;
pub mod auth;
mod courses;
pub mod error;
pub mod metrics;
mod requests;
mod users;
mod validation;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public)
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register));

    // Protected API routes
    let api_routes = Router::new()
        // Session
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .patch(users::update_profile)
                .delete(users::delete_user),
        )
        // Courses
        .route("/courses", get(courses::list_courses).post(courses::create_course))
        .route("/courses/teacher", get(courses::list_teacher_courses))
        .route("/courses/student", get(courses::list_student_courses))
        .route(
            "/courses/:id",
            get(courses::get_course_handler)
                .patch(courses::update_course)
                .delete(courses::delete_course),
        )
        // Accommodation requests
        .route("/accommodations", post(accommodations::create_accommodation))
        .route("/accommodations/student", get(accommodations::list_student_accommodations))
        .route("/accommodations/teacher", get(accommodations::list_teacher_accommodations))
        .route(
            "/accommodations/:id",
            get(accommodations::get_accommodation_handler)
                .patch(accommodations::update_accommodation)
                .delete(accommodations::delete_accommodation),
        )
        // Absence notices
        .route("/absences", post(absences::create_absence))
        .route("/absences/student", get(absences::list_student_absences))
        .route("/absences/teacher", get(absences::list_teacher_absences))
        .route(
            "/absences/:id",
            get(absences::get_absence_handler)
                .patch(absences::update_absence)
                .delete(absences::delete_absence),
        )
        // Unified feed and decisions
        .route("/requests/admin", get(requests::list_admin_requests))
        .route("/requests/teacher", get(requests::list_teacher_requests))
        .route("/requests/student", get(requests::list_student_requests))
        .route("/requests/:id/approve", patch(requests::approve_request))
        .route("/requests/:id/reject", patch(requests::reject_request))
        // Protected by auth
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
