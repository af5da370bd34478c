//! Data access layer (Repository pattern)

pub mod application;
pub mod rbac;
pub mod user;

use crate::error::AppError;

pub use application::ApplicationRepository;
pub use rbac::RbacRepository;
pub use user::UserRepository;

/// `?, ?, ?` for an `IN (...)` clause with `count` bound values
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Turn a MySQL duplicate-key failure (1062) into `Conflict`, pass anything else through
pub(crate) fn map_conflict_if_duplicate(
    error: sqlx::Error,
    message: impl FnOnce() -> String,
) -> AppError {
    if let sqlx::Error::Database(db_err) = &error {
        if db_err.is_unique_violation() || db_err.code().as_deref() == Some("1062") {
            return AppError::Conflict(message());
        }
    }
    AppError::Database(error)
}
