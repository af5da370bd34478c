//! Roleguard Core
//!
//! Keeps a local role/permission store in step with a remote policy engine
//! and answers authorization questions through that engine.

pub mod config;
pub mod domain;
pub mod error;
pub mod migration;
pub mod policy_store;
pub mod repository;
pub mod service;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
