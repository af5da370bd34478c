//! Domain models for Roleguard Core

pub mod common;
pub mod rbac;
pub mod user;

pub use common::StringUuid;
pub use rbac::*;
pub use user::*;
