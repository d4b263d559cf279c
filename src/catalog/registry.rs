//! Association between catalog nodes' logical files and deduplicated blobs.

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use crate::domain::{preset_label, File, LocalFile, ObjectId};
use crate::error::{CatalogError, Result};

use super::db::Database;

/// Longest filename we will hand out for downloads.
const MAX_FILENAME_LEN: usize = 255;

const FILE_COLUMNS: &str =
    "id, node_id, local_file_id, preset, lang_id, supplementary, thumbnail, priority, available";

/// File and local-file bookkeeping.
pub struct FileRegistry<'a> {
    db: &'a Database,
}

impl<'a> FileRegistry<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Register a deduplicated blob record. Registering the same hash twice
    /// is a no-op; the first record wins.
    pub fn add_local_file(&self, local: &LocalFile) -> Result<()> {
        self.db.conn().execute(
            "INSERT OR IGNORE INTO local_files (id, extension, file_size, available) \
             VALUES (?1, ?2, ?3, ?4)",
            params![local.id, local.extension, local.file_size, local.available],
        )?;
        Ok(())
    }

    pub fn local_file(&self, hash: &ObjectId) -> Result<Option<LocalFile>> {
        Ok(self
            .db
            .conn()
            .query_row(
                "SELECT id, extension, file_size, available FROM local_files WHERE id = ?1",
                params![hash],
                row_to_local,
            )
            .optional()?)
    }

    /// Attach a logical file to the catalog.
    ///
    /// The referenced local file must already be registered; a dangling
    /// reference is a `ConsistencyViolation`.
    pub fn add_file(&self, file: &File) -> Result<()> {
        self.db.immediate(|conn| {
            let known: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM local_files WHERE id = ?1)",
                params![file.local_file],
                |r| r.get(0),
            )?;
            if !known {
                return Err(CatalogError::ConsistencyViolation(format!(
                    "file {} references unknown local file {}",
                    file.id, file.local_file
                )));
            }

            conn.execute(
                "INSERT INTO files (id, node_id, local_file_id, preset, lang_id, supplementary, \
                 thumbnail, priority, available) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    file.id,
                    file.node,
                    file.local_file,
                    file.preset,
                    file.lang,
                    file.supplementary,
                    file.thumbnail,
                    file.priority,
                    file.available,
                ],
            )?;
            Ok(())
        })
    }

    pub fn file(&self, id: &ObjectId) -> Result<File> {
        self.db
            .conn()
            .query_row(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1"),
                params![id],
                row_to_file,
            )
            .optional()?
            .ok_or_else(|| CatalogError::not_found("file", id.as_str()))
    }

    /// Files of a node, priority ascending with NULLs last, id as tiebreak.
    pub fn files_for(&self, node: &ObjectId) -> Result<Vec<File>> {
        let mut stmt = self.db.conn().prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE node_id = ?1 \
             ORDER BY priority IS NULL, priority, id"
        ))?;
        let rows = stmt.query_map(params![node], row_to_file)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Update one file's availability flag.
    ///
    /// Deliberately does not touch the node tree; the reconciler owns the
    /// ordering of cascades.
    pub fn mark_file_availability(&self, id: &ObjectId, available: bool) -> Result<()> {
        let updated = self.db.conn().execute(
            "UPDATE files SET available = ?1 WHERE id = ?2",
            params![available, id],
        )?;
        if updated == 0 {
            return Err(CatalogError::not_found("file", id.as_str()));
        }
        Ok(())
    }

    /// `"{title} ({preset label}).{extension}"`, sanitized for filesystems.
    pub fn download_filename(&self, id: &ObjectId) -> Result<String> {
        let file = self.file(id)?;
        let node_id = file.node.ok_or_else(|| {
            CatalogError::ConsistencyViolation(format!("file {} has no owning node", file.id))
        })?;

        let title: String = self.db.conn().query_row(
            "SELECT title FROM content_nodes WHERE id = ?1",
            params![node_id],
            |r| r.get(0),
        )?;
        let extension: String = self.db.conn().query_row(
            "SELECT extension FROM local_files WHERE id = ?1",
            params![file.local_file],
            |r| r.get(0),
        )?;

        let raw = format!("{} ({}).{}", title, preset_label(&file.preset), extension);
        Ok(valid_filename(&raw))
    }

    // Reconciliation queries. Liveness is always recomputed from the current
    // reference graph, never cached.

    pub fn available_local_files(&self) -> Result<Vec<LocalFile>> {
        self.local_files_where("available = 1")
    }

    pub fn unavailable_local_files(&self) -> Result<Vec<LocalFile>> {
        self.local_files_where("available = 0")
    }

    /// Local files with no reference path from any available node. These are
    /// the only rows eligible for physical purge.
    ///
    /// Eligibility ignores the row's own availability flag: a blob whose
    /// referencing nodes were all deleted or marked unavailable is orphaned
    /// even while the row still says available.
    pub fn orphaned_local_files(&self) -> Result<Vec<LocalFile>> {
        self.local_files_where(
            "NOT EXISTS (\
               SELECT 1 FROM files f JOIN content_nodes n ON n.id = f.node_id \
               WHERE f.local_file_id = local_files.id AND n.available = 1)",
        )
    }

    /// Mark a blob missing: the local file and every referencing file row go
    /// unavailable in one transaction. Returns the affected node ids.
    pub fn mark_local_file_missing(&self, hash: &ObjectId) -> Result<Vec<ObjectId>> {
        self.db.immediate(|conn| {
            conn.execute(
                "UPDATE local_files SET available = 0 WHERE id = ?1",
                params![hash],
            )?;
            conn.execute(
                "UPDATE files SET available = 0 WHERE local_file_id = ?1",
                params![hash],
            )?;
            nodes_referencing(conn, hash)
        })
    }

    /// Inverse of [`mark_local_file_missing`], for blobs that appeared on
    /// disk since the last pass.
    pub fn mark_local_file_present(
        &self,
        hash: &ObjectId,
        file_size: Option<u64>,
    ) -> Result<Vec<ObjectId>> {
        self.db.immediate(|conn| {
            conn.execute(
                "UPDATE local_files SET available = 1, \
                 file_size = COALESCE(?2, file_size) WHERE id = ?1",
                params![hash, file_size],
            )?;
            conn.execute(
                "UPDATE files SET available = 1 WHERE local_file_id = ?1",
                params![hash],
            )?;
            nodes_referencing(conn, hash)
        })
    }

    /// Drop a local file record. Only the reconciler calls this, after the
    /// blob is gone and no available node references the hash.
    pub fn delete_local_file(&self, hash: &ObjectId) -> Result<()> {
        debug!("deleting local file record {hash}");
        self.db.conn().execute(
            "DELETE FROM local_files WHERE id = ?1",
            params![hash],
        )?;
        Ok(())
    }

    /// Leaf availability policy: at least one file, and every essential
    /// (non-supplementary) file available.
    pub fn node_files_available(&self, node: &ObjectId) -> Result<bool> {
        let conn = self.db.conn();
        let has_files: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM files WHERE node_id = ?1)",
            params![node],
            |r| r.get(0),
        )?;
        if !has_files {
            return Ok(false);
        }
        let missing_essential: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM files \
             WHERE node_id = ?1 AND supplementary = 0 AND available = 0)",
            params![node],
            |r| r.get(0),
        )?;
        Ok(!missing_essential)
    }

    fn local_files_where(&self, predicate: &str) -> Result<Vec<LocalFile>> {
        let mut stmt = self.db.conn().prepare(&format!(
            "SELECT id, extension, file_size, available FROM local_files \
             WHERE {predicate} ORDER BY id"
        ))?;
        let rows = stmt.query_map([], row_to_local)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

fn nodes_referencing(conn: &rusqlite::Connection, hash: &ObjectId) -> Result<Vec<ObjectId>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT node_id FROM files \
         WHERE local_file_id = ?1 AND node_id IS NOT NULL",
    )?;
    let rows = stmt.query_map(params![hash], |r| r.get(0))?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<File> {
    Ok(File {
        id: row.get(0)?,
        node: row.get(1)?,
        local_file: row.get(2)?,
        preset: row.get(3)?,
        lang: row.get(4)?,
        supplementary: row.get(5)?,
        thumbnail: row.get(6)?,
        priority: row.get(7)?,
        available: row.get(8)?,
    })
}

fn row_to_local(row: &rusqlite::Row) -> rusqlite::Result<LocalFile> {
    Ok(LocalFile {
        id: row.get(0)?,
        extension: row.get(1)?,
        file_size: row.get(2)?,
        available: row.get(3)?,
    })
}

/// Reduce a display name to a filesystem-safe form.
///
/// Spaces become underscores; anything outside `[A-Za-z0-9._-]` is dropped.
/// Long names are truncated with the extension kept intact.
fn valid_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    if cleaned.len() <= MAX_FILENAME_LEN {
        return cleaned;
    }
    match cleaned.rfind('.') {
        Some(dot) if cleaned.len() - dot < MAX_FILENAME_LEN => {
            let ext = &cleaned[dot..];
            format!("{}{}", &cleaned[..MAX_FILENAME_LEN - ext.len()], ext)
        }
        _ => cleaned[..MAX_FILENAME_LEN].to_string(),
    }
}
