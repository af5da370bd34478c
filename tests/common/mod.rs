//! Common test utilities

use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::sync::Once;

/// Ensure .env file is loaded once
static ENV_INIT: Once = Once::new();

fn init_env() {
    ENV_INIT.call_once(|| {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();
    });
}

/// Pool on a fresh logical database with migrations applied.
///
/// Returns `None` when DATABASE_URL is not set so database tests can be
/// skipped on machines without MySQL.
pub async fn get_test_pool() -> Option<MySqlPool> {
    init_env();

    let url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            eprintln!("DATABASE_URL not set, skipping database test");
            return None;
        }
    };

    // Strip the database name (and any options) to reach the server itself
    let server_url = match url.rfind('/') {
        Some(pos) => url[..pos].to_string(),
        None => url.clone(),
    };

    let root_pool = MySqlPoolOptions::new()
        .max_connections(1)
        .connect(&server_url)
        .await
        .expect("Failed to connect to MySQL server");

    let db_name = format!("roleguard_test_{}", uuid::Uuid::new_v4().simple());
    sqlx::query(&format!("CREATE DATABASE `{}`", db_name))
        .execute(&root_pool)
        .await
        .expect("Failed to create test database");
    root_pool.close().await;

    let pool = MySqlPoolOptions::new()
        .max_connections(5)
        .connect(&format!("{}/{}", server_url, db_name))
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    Some(pool)
}
