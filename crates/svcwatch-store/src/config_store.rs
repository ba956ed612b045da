//! `System` table: `(Category, Setting) -> Value` configuration rows.
//!
//! Synchronous handlers run by the worker against its connection. Writes are
//! upserts keyed by the unique `(Category, Setting)` index.

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, instrument};

use crate::error::StoreResult;
use crate::models::ConfigEntry;

/// Every row, ordered by category then setting.
#[instrument(skip(conn))]
pub fn get_all(conn: &Connection) -> StoreResult<Vec<ConfigEntry>> {
    let mut stmt = conn.prepare_cached(
        "SELECT Category, Setting, Value FROM System ORDER BY Category ASC, Setting ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ConfigEntry {
                category: row.get(0)?,
                setting: row.get(1)?,
                value: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// A single value, or `None` if the key is absent.
#[instrument(skip(conn))]
pub fn get(conn: &Connection, category: &str, setting: &str) -> StoreResult<Option<String>> {
    let value = conn
        .query_row(
            "SELECT Value FROM System WHERE Category = ?1 AND Setting = ?2",
            rusqlite::params![category, setting],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(value.flatten())
}

/// Insert or replace the value for `(category, setting)`.
#[instrument(skip(conn, entry), fields(category = %entry.category, setting = %entry.setting))]
pub fn upsert(conn: &Connection, entry: &ConfigEntry) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO System (Category, Setting, Value) VALUES (?1, ?2, ?3) \
         ON CONFLICT(Category, Setting) DO UPDATE SET Value = excluded.Value",
        rusqlite::params![entry.category, entry.setting, entry.value],
    )?;
    debug!("config value updated");
    Ok(())
}

// ── tests ────────────────────────────────────────────────────────────
