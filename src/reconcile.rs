//! Availability reconciliation and orphaned-blob cleanup.
//!
//! One pass brings File/LocalFile/ContentNode availability back in line with
//! what is actually on disk, then reclaims storage nothing available refers
//! to. A pass is one logical unit of work under the catalog's exclusive
//! advisory lock, but disk I/O is deliberately not atomic with the database:
//! a crash between "marked unavailable" and "blob deleted" is recovered by
//! the next pass, because eligibility is recomputed from scratch every time.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::catalog::{CatalogTree, Database, FileRegistry};
use crate::domain::ObjectId;
use crate::error::Result;
use crate::storage::BlobStore;

/// What one reconciliation pass did.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Available local files whose presence was verified against disk
    pub verified: usize,

    /// Local files found missing and cascaded to unavailable
    pub marked_missing: usize,

    /// Local files found back on disk and cascaded to available
    pub marked_available: usize,

    /// Physical blob files removed
    pub blobs_deleted: usize,

    /// Local file records removed
    pub records_deleted: usize,

    /// Per-item failures; the items stay put and are retried next pass
    pub errors: Vec<String>,
}

impl ReconcileReport {
    /// True when the pass changed nothing and hit no errors.
    pub fn is_noop(&self) -> bool {
        self.marked_missing == 0
            && self.marked_available == 0
            && self.blobs_deleted == 0
            && self.records_deleted == 0
            && self.errors.is_empty()
    }
}

impl std::fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "verified {}, marked {} missing, {} available, deleted {} blobs and {} records, {} errors",
            self.verified,
            self.marked_missing,
            self.marked_available,
            self.blobs_deleted,
            self.records_deleted,
            self.errors.len()
        )
    }
}

/// Batch job syncing availability state with disk contents.
pub struct Reconciler<'a> {
    db: &'a Database,
    store: &'a BlobStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(db: &'a Database, store: &'a BlobStore) -> Self {
        Self { db, store }
    }

    /// Run one full pass.
    ///
    /// Order matters: blobs that came back are re-marked available *before*
    /// the orphan purge, so freshly downloaded content is never reclaimed in
    /// the same pass that would otherwise see its rows as dead. Running a
    /// pass twice with no disk change in between is a no-op the second time.
    pub fn run(&self) -> Result<ReconcileReport> {
        let _lock = self.db.exclusive_lock()?;
        let registry = FileRegistry::new(self.db);
        let tree = CatalogTree::new(self.db);
        let mut report = ReconcileReport::default();

        self.mark_missing(&registry, &tree, &mut report)?;
        self.mark_present(&registry, &tree, &mut report)?;
        self.purge_orphans(&registry, &mut report)?;

        info!("reconciliation pass: {report}");
        Ok(report)
    }

    /// Any local file marked available whose blob is gone goes unavailable,
    /// along with every file row referencing it, and the owning nodes are
    /// re-evaluated upward.
    fn mark_missing(
        &self,
        registry: &FileRegistry,
        tree: &CatalogTree,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        for local in registry.available_local_files()? {
            report.verified += 1;
            if self.store.exists(&local.id) {
                continue;
            }

            warn!("blob {} missing from storage, marking unavailable", local.id);
            let nodes = registry.mark_local_file_missing(&local.id)?;
            report.marked_missing += 1;
            self.refresh_nodes(registry, tree, &nodes)?;
        }
        Ok(())
    }

    /// Inverse direction: local files marked unavailable whose blob is now on
    /// disk (newly downloaded or restored) come back, size refreshed from the
    /// actual file.
    fn mark_present(
        &self,
        registry: &FileRegistry,
        tree: &CatalogTree,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let unavailable = registry.unavailable_local_files()?;
        if unavailable.is_empty() {
            return Ok(());
        }

        let present: HashSet<ObjectId> = self.store.list_present_hashes().collect();
        for local in unavailable {
            if !present.contains(&local.id) {
                continue;
            }

            let size = self.store.size(&local.id);
            let nodes = registry.mark_local_file_present(&local.id, size)?;
            report.marked_available += 1;
            self.refresh_nodes(registry, tree, &nodes)?;
        }
        Ok(())
    }

    /// Delete blobs and records for local files no available node can reach.
    ///
    /// Eligibility comes from the reference graph as it is *now*, after the
    /// two marking phases. Per-item disk failures are logged and skipped; the
    /// row survives for the next pass.
    fn purge_orphans(&self, registry: &FileRegistry, report: &mut ReconcileReport) -> Result<()> {
        for local in registry.orphaned_local_files()? {
            let was_present = self.store.exists(&local.id);
            if let Err(e) = self.store.delete(&local.id) {
                warn!("could not delete blob {}: {e}", local.id);
                report.errors.push(format!("{}: {e}", local.id));
                continue;
            }
            if was_present {
                report.blobs_deleted += 1;
            }
            registry.delete_local_file(&local.id)?;
            report.records_deleted += 1;
        }
        Ok(())
    }

    fn refresh_nodes(
        &self,
        registry: &FileRegistry,
        tree: &CatalogTree,
        nodes: &[ObjectId],
    ) -> Result<()> {
        for node in nodes {
            let available = registry.node_files_available(node)?;
            tree.propagate_availability(node, available)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContentKind, ContentNode, File, FileExtension, LocalFile};
    use tempfile::TempDir;

    struct Fixture {
        db: Database,
        store: BlobStore,
        _temp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let db = Database::open(&temp.path().join("catalog.db")).unwrap();
            let store = BlobStore::new(temp.path().join("storage"));
            Self {
                db,
                store,
                _temp: temp,
            }
        }

        fn write_blob(&self, bytes: &[u8], ext: FileExtension) -> ObjectId {
            let hash = ObjectId::from_content(bytes);
            let path = self.store.path_for(&hash, ext);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, bytes).unwrap();
            hash
        }

        /// Topic root with one video leaf holding one available file.
        fn video_with_blob(&self, bytes: &[u8]) -> (ObjectId, ObjectId, ObjectId) {
            let tree = CatalogTree::new(&self.db);
            let registry = FileRegistry::new(&self.db);
            let channel = ObjectId::random();

            let root = tree
                .insert(
                    ContentNode::new("Root", ContentKind::Topic, channel.clone()),
                    None,
                )
                .unwrap();
            let leaf = tree
                .insert(
                    ContentNode::new("Video", ContentKind::Video, channel),
                    Some(&root),
                )
                .unwrap();

            let hash = self.write_blob(bytes, FileExtension::Mp4);
            let mut local = LocalFile::new(hash.clone(), FileExtension::Mp4);
            local.available = true;
            registry.add_local_file(&local).unwrap();

            let mut file = File::new(leaf.clone(), hash.clone(), "high_res_video");
            file.available = true;
            registry.add_file(&file).unwrap();

            tree.propagate_availability(&leaf, true).unwrap();
            (root, leaf, hash)
        }
    }

    #[test]
    fn test_missing_blob_cascades_and_record_is_purged() {
        let fx = Fixture::new();
        let (root, leaf, hash) = fx.video_with_blob(b"video bytes");
        let tree = CatalogTree::new(&fx.db);
        let registry = FileRegistry::new(&fx.db);

        // Blob vanishes out-of-band
        fx.store.delete(&hash).unwrap();

        let report = Reconciler::new(&fx.db, &fx.store).run().unwrap();
        assert_eq!(report.marked_missing, 1);
        assert_eq!(report.records_deleted, 1);
        assert_eq!(report.blobs_deleted, 0);

        assert!(!tree.node(&leaf).unwrap().available);
        assert!(!tree.node(&root).unwrap().available);
        assert!(registry.local_file(&hash).unwrap().is_none());
        let files = registry.files_for(&leaf).unwrap();
        assert!(!files[0].available);
    }

    #[test]
    fn test_shared_blob_survives_deleting_one_referrer() {
        let fx = Fixture::new();
        let (_root, leaf, hash) = fx.video_with_blob(b"video bytes");
        let tree = CatalogTree::new(&fx.db);
        let registry = FileRegistry::new(&fx.db);
        let channel = ObjectId::random();

        // Second copy of the same content in another channel, never made
        // available, referencing the same blob.
        let other_root = tree
            .insert(
                ContentNode::new("Other", ContentKind::Topic, channel.clone()),
                None,
            )
            .unwrap();
        let other_leaf = tree
            .insert(
                ContentNode::new("Copy", ContentKind::Video, channel),
                Some(&other_root),
            )
            .unwrap();
        registry
            .add_file(&File::new(other_leaf.clone(), hash.clone(), "high_res_video"))
            .unwrap();

        tree.delete_subtree(&other_root).unwrap();
        let report = Reconciler::new(&fx.db, &fx.store).run().unwrap();

        // The first referrer is still available, so the blob must stay
        assert_eq!(report.blobs_deleted, 0);
        assert_eq!(report.records_deleted, 0);
        assert!(fx.store.exists(&hash));
        assert!(registry.local_file(&hash).unwrap().is_some());
        assert!(tree.node(&leaf).unwrap().available);
    }

    #[test]
    fn test_referenced_missing_blob_keeps_metadata_record() {
        let fx = Fixture::new();
        let (_root, leaf, _video_hash) = fx.video_with_blob(b"video bytes");
        let registry = FileRegistry::new(&fx.db);
        let tree = CatalogTree::new(&fx.db);

        // Supplementary subtitle on the same leaf; its blob goes missing.
        let sub_hash = fx.write_blob(b"subtitle bytes", FileExtension::Vtt);
        let mut sub_local = LocalFile::new(sub_hash.clone(), FileExtension::Vtt);
        sub_local.available = true;
        registry.add_local_file(&sub_local).unwrap();
        let mut sub_file =
            File::new(leaf.clone(), sub_hash.clone(), "video_subtitle").supplementary();
        sub_file.available = true;
        registry.add_file(&sub_file).unwrap();

        fx.store.delete(&sub_hash).unwrap();
        let report = Reconciler::new(&fx.db, &fx.store).run().unwrap();
        assert_eq!(report.marked_missing, 1);
        assert_eq!(report.records_deleted, 0);

        // The leaf stays available (only a supplementary file is gone), so
        // the hash is still referenced through an available node and its row
        // is kept as a metadata-only record.
        assert!(tree.node(&leaf).unwrap().available);
        let kept = registry.local_file(&sub_hash).unwrap().unwrap();
        assert!(!kept.available);
    }

    #[test]
    fn test_new_blob_marks_available_and_survives_purge() {
        let fx = Fixture::new();
        let tree = CatalogTree::new(&fx.db);
        let registry = FileRegistry::new(&fx.db);
        let channel = ObjectId::random();

        let root = tree
            .insert(
                ContentNode::new("Root", ContentKind::Topic, channel.clone()),
                None,
            )
            .unwrap();
        let leaf = tree
            .insert(
                ContentNode::new("Doc", ContentKind::Document, channel),
                Some(&root),
            )
            .unwrap();

        // Import registered the rows, download completed afterwards
        let hash = fx.write_blob(b"pdf bytes", FileExtension::Pdf);
        registry
            .add_local_file(&LocalFile::new(hash.clone(), FileExtension::Pdf))
            .unwrap();
        registry
            .add_file(&File::new(leaf.clone(), hash.clone(), "document"))
            .unwrap();

        let report = Reconciler::new(&fx.db, &fx.store).run().unwrap();
        assert_eq!(report.marked_available, 1);
        assert_eq!(report.blobs_deleted, 0);
        assert_eq!(report.records_deleted, 0);

        let local = registry.local_file(&hash).unwrap().unwrap();
        assert!(local.available);
        assert_eq!(local.file_size, Some(9));
        assert!(tree.node(&leaf).unwrap().available);
        assert!(tree.node(&root).unwrap().available);
        assert!(fx.store.exists(&hash));
    }

    #[test]
    fn test_pass_is_idempotent() {
        let fx = Fixture::new();
        let (_root, _leaf, hash) = fx.video_with_blob(b"video bytes");
        fx.store.delete(&hash).unwrap();

        let first = Reconciler::new(&fx.db, &fx.store).run().unwrap();
        assert!(!first.is_noop());

        let second = Reconciler::new(&fx.db, &fx.store).run().unwrap();
        assert!(second.is_noop(), "second pass should change nothing");
    }
}
