//! RBAC (Role-Based Access Control) domain models

use super::common::StringUuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Role entity
///
/// `name` is the join key into the remote rule set. It is stored upper-cased
/// locally and written lower-cased to the policy engine.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: StringUuid,
    pub name: String,
    pub application_id: Option<StringUuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Role {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: StringUuid::new_v4(),
            name: String::new(),
            application_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Permission entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: StringUuid,
    /// Unique, case-insensitive. Lower-cased it becomes the remote action.
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
}

impl Default for Permission {
    fn default() -> Self {
        Self {
            id: StringUuid::new_v4(),
            name: String::new(),
            display_name: String::new(),
            description: None,
        }
    }
}

impl Permission {
    /// Action string as written into policy rules
    pub fn action(&self) -> String {
        self.name.to_lowercase()
    }
}

/// Application entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Application {
    pub id: StringUuid,
    pub name: String,
}

/// Application-Permission link; identified by the pair alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct ApplicationPermission {
    pub application_id: StringUuid,
    pub permission_id: StringUuid,
}

/// Role merged with the actions the policy engine grants it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleView {
    pub id: StringUuid,
    pub name: String,
    pub permissions: Vec<String>,
}

/// Input for creating a role
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRoleInput {
    #[validate(length(min = 1, max = 100), custom(function = "validate_name"))]
    pub name: String,
    pub application_id: Option<StringUuid>,
}

/// Input for creating a permission
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePermissionInput {
    #[validate(length(min = 1, max = 100), custom(function = "validate_name"))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub display_name: String,
    pub description: Option<String>,
}

/// Input for creating an application
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateApplicationInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
}

fn validate_name(name: &str) -> Result<(), validator::ValidationError> {
    if NAME_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_name"))
    }
}

lazy_static::lazy_static! {
    /// Role and permission names: a letter followed by letters, digits, `_`, `-`, `:` or `.`
    pub static ref NAME_REGEX: regex::Regex =
        regex::Regex::new(r"^[A-Za-z][A-Za-z0-9_:.\-]*$").unwrap();
}
