//! Connection tuning and whole-database checks.
//!
//! See <https://www.sqlite.org/pragma.html> for the pragmas used here.

use log::warn;
use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::statement::{quote_identifier, validate_identifier};

pub const DEFAULT_MMAP_SIZE: u64 = 16 * 1024 * 1024;

/// Switch to WAL journaling, optionally with `synchronous = NORMAL`.
///
/// With several attached databases WAL is only atomic per database file.
pub fn enable_wal_mode(conn: &Connection, relax_sync_mode: bool) -> Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        // in-memory databases stay in "memory" mode
        warn!("journal_mode is {mode} after requesting WAL");
    }
    if relax_sync_mode {
        conn.pragma_update(None, "synchronous", "NORMAL")?;
    }
    Ok(())
}

pub fn enable_tmp_store_at_memory(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(())
}

pub fn enable_mmap(conn: &Connection, mmap_size: u64) -> Result<()> {
    let size = i64::try_from(mmap_size).unwrap_or(i64::MAX);
    // the pragma answers with the size in effect
    let _: Option<i64> = conn
        .pragma_update_and_check(None, "mmap_size", size, |row| row.get(0))
        .optional()?;
    Ok(())
}

/// Run `PRAGMA integrity_check`, for the whole database or one table.
///
/// Returns `false` and logs the findings if any problem is reported.
pub fn check_db_integrity(conn: &Connection, table_name: Option<&str>) -> Result<bool> {
    let query = match table_name {
        Some(table) => {
            validate_identifier(table)?;
            format!("PRAGMA integrity_check({});", quote_identifier(table))
        }
        None => "PRAGMA integrity_check;".to_string(),
    };
    let mut stmt = conn.prepare(&query)?;
    let findings = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if findings.len() == 1 && findings[0] == "ok" {
        return Ok(true);
    }
    warn!("database integrity check ({query}) finds problem: {findings:?}");
    Ok(false)
}

/// Whether a table called `table_name` exists.
pub fn lookup_table(conn: &Connection, table_name: &str) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table_name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}
