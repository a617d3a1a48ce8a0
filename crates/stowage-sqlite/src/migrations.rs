//! Schema migrations.
//!
//! Applications hand the store an ordered list of migrations. Each one runs
//! at most once per database; applied versions are tracked in the
//! `stowage_migrations` table.

use std::collections::HashSet;

use rusqlite::Connection;
use stowage_common::{TableMeta, ValidationError, ValidationResult};
use tracing::{debug, info};

use crate::StowageResult;

/// Name of the table that records applied migrations.
pub const MIGRATIONS_TABLE: &str = "stowage_migrations";

/// One schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub name: String,
    pub sql: String,
}

impl Migration {
    pub fn new(version: u32, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            sql: sql.into(),
        }
    }

    /// Migration creating the table described by `meta`.
    pub fn create_table(version: u32, meta: &TableMeta) -> Self {
        Self::new(
            version,
            format!("create_{}", meta.table()),
            meta.create_table_sql(),
        )
    }
}

/// Rejects lists in which two migrations share a version.
pub fn validate(migrations: &[Migration]) -> ValidationResult<()> {
    let mut seen = HashSet::with_capacity(migrations.len());
    for migration in migrations {
        if !seen.insert(migration.version) {
            return Err(ValidationError::DuplicateMigration {
                version: migration.version,
            });
        }
    }
    Ok(())
}

/// Run all pending migrations in version order.
///
/// Returns the versions applied by this call.
pub fn run_migrations(conn: &Connection, migrations: &[Migration]) -> StowageResult<Vec<u32>> {
    validate(migrations)?;

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )"
        ),
        [],
    )?;

    let applied = applied_versions(conn)?;
    let mut pending: Vec<&Migration> = migrations
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .collect();
    pending.sort_by_key(|m| m.version);

    info!(
        applied = applied.len(),
        pending = pending.len(),
        "Running migrations"
    );

    let mut ran = Vec::with_capacity(pending.len());
    for migration in pending {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(&migration.sql)?;
        tx.execute(
            &format!("INSERT INTO {MIGRATIONS_TABLE} (version, name) VALUES (?1, ?2)"),
            rusqlite::params![migration.version, migration.name],
        )?;
        tx.commit()?;
        debug!(version = migration.version, name = %migration.name, "Migration applied");
        ran.push(migration.version);
    }

    info!("Migrations complete");
    Ok(ran)
}

/// Versions already recorded in the migrations table.
pub fn applied_versions(conn: &Connection) -> StowageResult<HashSet<u32>> {
    let mut statement = conn.prepare(&format!("SELECT version FROM {MIGRATIONS_TABLE}"))?;
    let versions = statement
        .query_map([], |row| row.get::<_, u32>(0))?
        .collect::<rusqlite::Result<HashSet<u32>>>()?;
    Ok(versions)
}
