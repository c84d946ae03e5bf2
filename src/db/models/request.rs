//! Status and kind shared by accommodation requests and absence notices.

use serde::{Deserialize, Serialize};

/// Decision state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    /// Read a stored status column. Missing or unrecognised values are pending.
    pub fn from_stored(value: Option<&str>) -> Self {
        value
            .and_then(|s| s.parse().ok())
            .unwrap_or(RequestStatus::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

/// Which table a request lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Accommodation,
    Absence,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Accommodation => "accommodation",
            RequestKind::Absence => "absence",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            RequestKind::Accommodation => "accommodations",
            RequestKind::Absence => "absences",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accommodation" => Ok(RequestKind::Accommodation),
            "absence" => Ok(RequestKind::Absence),
            _ => Err(format!("Invalid request kind: {}", s)),
        }
    }
}
