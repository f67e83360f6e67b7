//! Database schema for jobs.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};
use anyhow::Result;
use rusqlite::Connection;

// =============================================================================
// Jobs Table - Version 0
// =============================================================================

const JOBS_TABLE_V0: Table = Table {
    name: "jobs",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("type_key", &SqlType::Text, non_null = true),
        sqlite_column!(
            "failure_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("serialized_data", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_jobs_type_key", "type_key")],
};

// =============================================================================
// Jobs Table - Version 1 (cancellation flag)
// =============================================================================

const JOBS_TABLE_V1: Table = Table {
    name: "jobs",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("type_key", &SqlType::Text, non_null = true),
        sqlite_column!(
            "failure_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("serialized_data", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "canceled",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[("idx_jobs_type_key", "type_key")],
};

fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "ALTER TABLE jobs ADD COLUMN canceled INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

pub const JOBS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[JOBS_TABLE_V0],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[JOBS_TABLE_V1],
        migration: Some(migrate_v0_to_v1),
    },
];
