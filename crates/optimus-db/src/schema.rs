//! Schema definitions and migration runner for SurrealDB.
//!
//! Tables are SCHEMAFULL. Enumerations (kind, store, status) are stored
//! as their lowercase string forms and guarded with ASSERT clauses.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Resources (tenant + store scope)
-- =======================================================================
DEFINE TABLE resource SCHEMAFULL;
DEFINE FIELD full_name ON TABLE resource TYPE string;
DEFINE FIELD kind ON TABLE resource TYPE string \
    ASSERT $value IN ['dataset', 'table', 'view', 'external_table'];
DEFINE FIELD store ON TABLE resource TYPE string \
    ASSERT $value IN ['bigquery'];
DEFINE FIELD project_name ON TABLE resource TYPE string;
DEFINE FIELD namespace_name ON TABLE resource TYPE string;
DEFINE FIELD metadata ON TABLE resource TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD spec ON TABLE resource TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD urn ON TABLE resource TYPE string DEFAULT '';
DEFINE FIELD status ON TABLE resource TYPE string \
    ASSERT $value IN ['unknown', 'validation_success', \
    'validation_failure', 'to_create', 'to_update', 'skipped', \
    'create_failure', 'update_failure', 'exist_in_store', 'success'];
DEFINE FIELD created_at ON TABLE resource TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE resource TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_resource_identity ON TABLE resource \
    COLUMNS project_name, namespace_name, store, full_name UNIQUE;

-- =======================================================================
-- Backups (tenant + store scope)
-- =======================================================================
DEFINE TABLE backup SCHEMAFULL;
DEFINE FIELD store ON TABLE backup TYPE string \
    ASSERT $value IN ['bigquery'];
DEFINE FIELD project_name ON TABLE backup TYPE string;
DEFINE FIELD namespace_name ON TABLE backup TYPE string;
DEFINE FIELD description ON TABLE backup TYPE string DEFAULT '';
DEFINE FIELD resource_names ON TABLE backup TYPE array;
DEFINE FIELD resource_names.* ON TABLE backup TYPE string;
DEFINE FIELD config ON TABLE backup TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD created_at ON TABLE backup TYPE datetime;
DEFINE FIELD updated_at ON TABLE backup TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_backup_tenant ON TABLE backup \
    COLUMNS project_name, namespace_name, store;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "Migration v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query(
            "CREATE _migration SET version = $version, \
             name = $name",
        )
        .bind(("version", migration.version))
        .bind(("name", migration.name))
        .await?
        .check()
        .map_err(|e| {
            DbError::Migration(format!(
                "Failed to record migration v{}: {}",
                migration.version, e,
            ))
        })?;

        info!(version = migration.version, "Migration applied");
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
