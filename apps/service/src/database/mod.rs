/// Zone store
///
/// Durable storage for the single status zone record and the latest
/// auxiliary statuses, backed by a local LibSQL (SQLite) file.

pub mod repository;
pub mod migrations;
pub mod models;

pub use repository::{DatabaseImpl, ZoneStore};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
