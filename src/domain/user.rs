//! User domain model

use super::common::StringUuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// User entity; `display_name` is the lookup key for authorization checks
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: StringUuid,
    pub display_name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Default for User {
    fn default() -> Self {
        Self {
            id: StringUuid::new_v4(),
            display_name: String::new(),
            email: None,
            created_at: Utc::now(),
        }
    }
}

/// Input for creating a user
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserInput {
    #[validate(length(min = 1, max = 255))]
    pub display_name: String,
    #[validate(email)]
    pub email: Option<String>,
}

/// Caller identity as presented to the policy engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub roles: Vec<String>,
}

impl Principal {
    /// Build a principal from a user and the names of their roles.
    /// Role names are lower-cased to match the remote rule entries.
    pub fn new(id: impl Into<String>, roles: impl IntoIterator<Item = String>) -> Self {
        let mut roles: Vec<String> = roles.into_iter().map(|r| r.to_lowercase()).collect();
        roles.sort();
        roles.dedup();
        Self {
            id: id.into(),
            roles,
        }
    }
}
