//! Database models split into domain-specific modules.

pub mod absence;
pub mod accommodation;
pub mod course;
pub mod request;
pub mod user;

pub use absence::*;
pub use accommodation::*;
pub use course::*;
pub use request::*;
pub use user::*;
