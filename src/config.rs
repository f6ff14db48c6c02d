//! Connection configuration.

use std::time::Duration;

use log::debug;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::utils;

pub const MEMORY_DB_PATH: &str = ":memory:";

/// How to open and tune a store connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Path to the SQLite database file, or `:memory:`.
    pub db_path: String,
    /// Use WAL journaling.
    pub wal_mode: bool,
    /// `synchronous = NORMAL` when WAL is on.
    pub relax_sync_mode: bool,
    /// Memory-mapped I/O size in bytes; `None` keeps the store default.
    pub mmap_size: Option<u64>,
    /// Keep temporary tables and indices in memory.
    pub temp_store_in_memory: bool,
    /// How long to wait on a locked database before failing.
    pub busy_timeout_ms: Option<u64>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            db_path: MEMORY_DB_PATH.to_string(),
            wal_mode: false,
            relax_sync_mode: true,
            mmap_size: None,
            temp_store_in_memory: false,
            busy_timeout_ms: None,
        }
    }
}

impl ConnectionConfig {
    /// Create a config for the database at `db_path`.
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Default::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    /// WAL, in-memory temp store and a 16 MiB mmap.
    pub fn tuned(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            wal_mode: true,
            relax_sync_mode: true,
            mmap_size: Some(utils::DEFAULT_MMAP_SIZE),
            temp_store_in_memory: true,
            busy_timeout_ms: None,
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Open a connection and apply the configured pragmas.
    pub fn open(&self) -> Result<Connection> {
        debug!("opening sqlite database at {}", self.db_path);
        let conn = if self.db_path == MEMORY_DB_PATH {
            Connection::open_in_memory()?
        } else {
            Connection::open(&self.db_path)?
        };
        if let Some(timeout) = self.busy_timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        }
        if self.wal_mode {
            utils::enable_wal_mode(&conn, self.relax_sync_mode)?;
        }
        if let Some(size) = self.mmap_size {
            utils::enable_mmap(&conn, size)?;
        }
        if self.temp_store_in_memory {
            utils::enable_tmp_store_at_memory(&conn)?;
        }
        Ok(conn)
    }
}
