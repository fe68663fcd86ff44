//! Database configuration module.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs without hand-written SQL.

use crate::entities::KvEntry;
use crate::errors::{Error, Result};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use std::path::Path;
use tracing::{debug, info};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/ledger_quest.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable or returns the
/// default local `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Creates the parent directory of a file-backed `SQLite` URL.
///
/// In-memory and non-`SQLite` URLs are ignored.
pub fn ensure_database_dir(url: &str) -> Result<()> {
    let Some(path) = url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        debug!("Ensuring database directory {:?}", parent);
        std::fs::create_dir_all(parent).map_err(|e| Error::Config {
            message: format!("Failed to create database directory {parent:?}: {e}"),
        })?;
    }
    Ok(())
}

/// Establishes a connection to the database named by [`get_database_url`].
pub async fn create_connection() -> Result<DatabaseConnection> {
    let url = get_database_url();
    ensure_database_dir(&url)?;
    let db = Database::connect(&url).await?;
    info!("Connected to database");
    Ok(db)
}

/// Creates the key/value table if it does not exist yet.
///
/// Safe to call on every start: an existing table is left untouched.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut kv_table = schema.create_table_from_entity(KvEntry);
    kv_table.if_not_exists();

    db.execute(builder.build(&kv_table)).await?;

    Ok(())
}
