//! Unified handling of accommodation requests and absence notices.
//!
//! The two record types live in separate tables with their own id sequences.
//! [`Request`] is the sum type over both rows; [`list_requests`] merges them
//! into one feed scoped to the acting user, and [`resolve`] applies an
//! approve/reject decision to either kind.

mod aggregator;
mod resolver;

pub use aggregator::{
    list_requests, merge_feed, AbsenceEntry, AccommodationEntry, Parties, RequestFilters,
    RequestScope, UnifiedRequest,
};
pub use resolver::{reset_status, resolve, Decision, RequestLookup, Resolution};

use serde::Serialize;
use thiserror::Error;

use crate::api::error::ApiError;
use crate::db::{Absence, Accommodation, RequestKind, RequestStatus};

/// Errors raised by the request aggregator and resolver
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("failed to fetch requests: {0}")]
    Database(#[from] sqlx::Error),
}

impl RequestError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        RequestError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::NotFound(msg) => ApiError::not_found(msg),
            RequestError::Forbidden(msg) => ApiError::forbidden(msg),
            RequestError::Validation { field, message } => {
                ApiError::validation_field(&field, message)
            }
            RequestError::Database(e) => ApiError::from(e),
        }
    }
}

/// A stored request of either kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Request {
    Accommodation(Accommodation),
    Absence(Absence),
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Accommodation(_) => RequestKind::Accommodation,
            Request::Absence(_) => RequestKind::Absence,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Request::Accommodation(a) => a.id,
            Request::Absence(a) => a.id,
        }
    }

    pub fn student_id(&self) -> i64 {
        match self {
            Request::Accommodation(a) => a.student_id,
            Request::Absence(a) => a.student_id,
        }
    }

    pub fn teacher_id(&self) -> i64 {
        match self {
            Request::Accommodation(a) => a.teacher_id,
            Request::Absence(a) => a.teacher_id,
        }
    }

    pub fn status(&self) -> RequestStatus {
        match self {
            Request::Accommodation(a) => a.status(),
            Request::Absence(a) => a.status(),
        }
    }

    /// Teacher comment attached by the last decision
    pub fn teacher_comment(&self) -> Option<&str> {
        match self {
            Request::Accommodation(a) => a.teacher_response.as_deref(),
            Request::Absence(a) => a.observaciones.as_deref(),
        }
    }
}
