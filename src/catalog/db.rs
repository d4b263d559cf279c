//! SQLite-backed persistence for the catalog.
//!
//! All catalog state is relational rows in a single database file. Mutations
//! run inside `BEGIN IMMEDIATE` transactions so a crash mid-write can never
//! leave partially updated rows; structural tree changes additionally take an
//! exclusive advisory file lock (see [`Database::exclusive_lock`]) so interval
//! relabeling and reconciliation passes never interleave.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use rusqlite::Connection;
use tracing::debug;

use crate::error::{CatalogError, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS content_nodes (
    id                TEXT PRIMARY KEY,
    parent_id         TEXT REFERENCES content_nodes(id) ON DELETE CASCADE,
    content_id        TEXT NOT NULL,
    channel_id        TEXT NOT NULL,
    title             TEXT NOT NULL,
    description       TEXT,
    kind              TEXT NOT NULL,
    sort_order        REAL,
    author            TEXT NOT NULL DEFAULT '',
    license_owner     TEXT NOT NULL DEFAULT '',
    license_id        INTEGER REFERENCES licenses(id),
    lang_id           TEXT REFERENCES languages(id),
    available         INTEGER NOT NULL DEFAULT 0,
    stemmed_metaphone TEXT NOT NULL DEFAULT '',
    lft               INTEGER NOT NULL DEFAULT 0,
    rght              INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_nodes_parent ON content_nodes(parent_id);
CREATE INDEX IF NOT EXISTS idx_nodes_lft ON content_nodes(lft);
CREATE INDEX IF NOT EXISTS idx_nodes_content ON content_nodes(content_id);

CREATE TABLE IF NOT EXISTS local_files (
    id        TEXT PRIMARY KEY,
    extension TEXT NOT NULL,
    file_size INTEGER,
    available INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS files (
    id            TEXT PRIMARY KEY,
    node_id       TEXT REFERENCES content_nodes(id) ON DELETE CASCADE,
    local_file_id TEXT NOT NULL REFERENCES local_files(id),
    preset        TEXT NOT NULL DEFAULT '',
    lang_id       TEXT REFERENCES languages(id),
    supplementary INTEGER NOT NULL DEFAULT 0,
    thumbnail     INTEGER NOT NULL DEFAULT 0,
    priority      INTEGER,
    available     INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_files_node ON files(node_id);
CREATE INDEX IF NOT EXISTS idx_files_local ON files(local_file_id);

CREATE TABLE IF NOT EXISTS languages (
    id             TEXT PRIMARY KEY,
    lang_code      TEXT NOT NULL,
    lang_subcode   TEXT,
    lang_name      TEXT,
    lang_direction TEXT NOT NULL DEFAULT 'ltr'
);

CREATE TABLE IF NOT EXISTS licenses (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    license_name        TEXT NOT NULL,
    license_description TEXT
);

CREATE TABLE IF NOT EXISTS content_tags (
    id       TEXT PRIMARY KEY,
    tag_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS node_tags (
    node_id TEXT NOT NULL REFERENCES content_nodes(id) ON DELETE CASCADE,
    tag_id  TEXT NOT NULL REFERENCES content_tags(id) ON DELETE CASCADE,
    PRIMARY KEY (node_id, tag_id)
);

CREATE TABLE IF NOT EXISTS node_prerequisites (
    node_id     TEXT NOT NULL REFERENCES content_nodes(id) ON DELETE CASCADE,
    required_id TEXT NOT NULL REFERENCES content_nodes(id) ON DELETE CASCADE,
    PRIMARY KEY (node_id, required_id)
);

CREATE TABLE IF NOT EXISTS node_related (
    first_id  TEXT NOT NULL REFERENCES content_nodes(id) ON DELETE CASCADE,
    second_id TEXT NOT NULL REFERENCES content_nodes(id) ON DELETE CASCADE,
    PRIMARY KEY (first_id, second_id)
);

CREATE TABLE IF NOT EXISTS channels (
    id                   TEXT PRIMARY KEY,
    name                 TEXT NOT NULL,
    description          TEXT NOT NULL DEFAULT '',
    author               TEXT NOT NULL DEFAULT '',
    version              INTEGER NOT NULL DEFAULT 0,
    thumbnail            TEXT NOT NULL DEFAULT '',
    last_updated         TEXT,
    min_platform_version TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS assessment_metadata (
    id                    TEXT PRIMARY KEY,
    node_id               TEXT NOT NULL UNIQUE REFERENCES content_nodes(id) ON DELETE CASCADE,
    assessment_item_ids   TEXT NOT NULL,
    number_of_assessments INTEGER NOT NULL,
    mastery_model         TEXT NOT NULL,
    randomize             INTEGER NOT NULL DEFAULT 0,
    is_manipulable        INTEGER NOT NULL DEFAULT 0
);
"#;

/// Handle to the catalog database.
pub struct Database {
    conn: Connection,
    lock_path: PathBuf,
}

impl Database {
    /// Open (creating if needed) the catalog database at `path`.
    ///
    /// The advisory lock file lives next to the database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CatalogError::storage_io(parent.display().to_string(), e))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;

        let lock_path = path.with_extension("lock");
        debug!("opened catalog database at {}", path.display());

        Ok(Self { conn, lock_path })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// Commits on `Ok`, rolls back on `Err`. IMMEDIATE takes the write lock
    /// up front so two writers cannot interleave their row updates.
    pub fn immediate<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(&self.conn) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Take the exclusive advisory lock guarding structural mutations and
    /// reconciliation passes.
    ///
    /// Non-blocking: contention is returned as an error so no caller can wait
    /// forever on another pass. The lock releases when the guard drops.
    pub fn exclusive_lock(&self) -> Result<LockGuard> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| CatalogError::storage_io(self.lock_path.display().to_string(), e))?;

        file.try_lock_exclusive()
            .map_err(|e| CatalogError::storage_io(self.lock_path.display().to_string(), e))?;

        Ok(LockGuard { file })
    }
}

/// Holds the advisory lock until dropped.
pub struct LockGuard {
    file: std::fs::File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
