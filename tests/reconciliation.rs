//! Reconciliation Integration Tests
//!
//! End-to-end scenarios driving import-shaped writes, out-of-band disk
//! changes, and reconciliation passes against a real temp directory.

use depot::{
    BlobStore, CatalogTree, ContentKind, ContentNode, Database, File, FileExtension, FileRegistry,
    LocalFile, ObjectId, Reconciler,
};
use tempfile::TempDir;

struct Harness {
    db: Database,
    store: BlobStore,
    channel: ObjectId,
    _temp: TempDir,
}

impl Harness {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let db = Database::open(&temp.path().join("catalog.db")).unwrap();
        let store = BlobStore::new(temp.path().join("storage"));
        Self {
            db,
            store,
            channel: ObjectId::random(),
            _temp: temp,
        }
    }

    fn reconcile(&self) -> depot::ReconcileReport {
        Reconciler::new(&self.db, &self.store).run().unwrap()
    }

    fn topic(&self, title: &str, parent: Option<&ObjectId>) -> ObjectId {
        CatalogTree::new(&self.db)
            .insert(
                ContentNode::new(title, ContentKind::Topic, self.channel.clone()),
                parent,
            )
            .unwrap()
    }

    fn leaf(&self, title: &str, kind: ContentKind, parent: &ObjectId) -> ObjectId {
        CatalogTree::new(&self.db)
            .insert(
                ContentNode::new(title, kind, self.channel.clone()),
                Some(parent),
            )
            .unwrap()
    }

    /// Import-shaped write: register the rows unavailable, then write the
    /// blob to disk so reconciliation can pick it up.
    fn attach_downloaded_file(
        &self,
        node: &ObjectId,
        bytes: &[u8],
        ext: FileExtension,
        preset: &str,
    ) -> (ObjectId, ObjectId) {
        let registry = FileRegistry::new(&self.db);
        let hash = ObjectId::from_content(bytes);

        let path = self.store.path_for(&hash, ext);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();

        registry
            .add_local_file(&LocalFile::new(hash.clone(), ext))
            .unwrap();
        let file = File::new(node.clone(), hash.clone(), preset);
        registry.add_file(&file).unwrap();
        (file.id, hash)
    }

    fn node_available(&self, id: &ObjectId) -> bool {
        CatalogTree::new(&self.db).node(id).unwrap().available
    }
}

#[test]
fn test_download_then_loss_round_trip() {
    let h = Harness::new();
    let root = h.topic("Maths", None);
    let video = h.leaf("Fractions intro", ContentKind::Video, &root);
    let (file_id, hash) = h.attach_downloaded_file(
        &video,
        b"mp4 payload",
        FileExtension::Mp4,
        "high_res_video",
    );

    // First pass notices the downloaded blob and lights everything up
    let report = h.reconcile();
    assert_eq!(report.marked_available, 1);
    assert!(h.node_available(&video));
    assert!(h.node_available(&root));

    let registry = FileRegistry::new(&h.db);
    assert!(registry.file(&file_id).unwrap().available);

    // Blob disappears out-of-band; next pass tears it all back down
    h.store.delete(&hash).unwrap();
    let report = h.reconcile();
    assert_eq!(report.marked_missing, 1);
    assert_eq!(report.records_deleted, 1);

    assert!(!registry.file(&file_id).unwrap().available);
    assert!(!h.node_available(&video));
    assert!(!h.node_available(&root));
    assert!(registry.local_file(&hash).unwrap().is_none());
}

#[test]
fn test_topic_availability_matches_children_after_pass() {
    let h = Harness::new();
    let root = h.topic("Root", None);
    let sub_full = h.topic("Has content", Some(&root));
    let sub_empty = h.topic("Empty", Some(&root));
    let video = h.leaf("Clip", ContentKind::Video, &sub_full);
    h.attach_downloaded_file(&video, b"clip", FileExtension::Mp4, "high_res_video");

    h.reconcile();

    let tree = CatalogTree::new(&h.db);
    // Every topic available iff at least one child is available
    for topic in [&root, &sub_full, &sub_empty] {
        let children = tree.children(topic).unwrap();
        let any_child = children.iter().any(|c| c.available);
        assert_eq!(
            tree.node(topic).unwrap().available,
            any_child,
            "topic availability out of sync"
        );
    }
    assert!(h.node_available(&sub_full));
    assert!(!h.node_available(&sub_empty));
}

#[test]
fn test_unreferenced_record_is_purged() {
    let h = Harness::new();
    let registry = FileRegistry::new(&h.db);

    // A local file nothing references at all, blob already gone
    let hash = ObjectId::from_content(b"abandoned");
    registry
        .add_local_file(&LocalFile::new(hash.clone(), FileExtension::Zip))
        .unwrap();

    let report = h.reconcile();
    assert_eq!(report.records_deleted, 1);
    assert!(registry.local_file(&hash).unwrap().is_none());
}

#[test]
fn test_orphaned_blob_is_deleted_from_disk() {
    let h = Harness::new();
    let root = h.topic("Root", None);
    let video = h.leaf("Clip", ContentKind::Video, &root);
    let (_file, hash) =
        h.attach_downloaded_file(&video, b"clip bytes", FileExtension::Mp4, "high_res_video");
    h.reconcile();
    assert!(h.node_available(&video));

    // The whole subtree goes away; the blob is now orphaned on disk
    CatalogTree::new(&h.db).delete_subtree(&root).unwrap();
    let report = h.reconcile();

    assert_eq!(report.marked_missing, 0);
    assert_eq!(report.blobs_deleted, 1);
    assert_eq!(report.records_deleted, 1);
    assert!(!h.store.exists(&hash));
}

#[test]
fn test_shared_hash_protected_by_live_referrer() {
    let h = Harness::new();
    let root_a = h.topic("Channel A", None);
    let root_b = h.topic("Channel B", None);
    let video_a = h.leaf("Copy A", ContentKind::Video, &root_a);
    let video_b = h.leaf("Copy B", ContentKind::Video, &root_b);

    // Same bytes in both places: one blob, two file rows
    let (_file_a, hash) =
        h.attach_downloaded_file(&video_a, b"shared video", FileExtension::Mp4, "high_res_video");
    let registry = FileRegistry::new(&h.db);
    registry
        .add_file(&File::new(video_b.clone(), hash.clone(), "high_res_video"))
        .unwrap();

    h.reconcile();
    assert!(h.node_available(&video_a));
    assert!(h.node_available(&video_b));

    // Dropping one referrer must not reclaim the shared blob
    CatalogTree::new(&h.db).delete_subtree(&root_b).unwrap();
    let report = h.reconcile();
    assert_eq!(report.blobs_deleted, 0);
    assert!(h.store.exists(&hash));
    assert!(h.node_available(&video_a));

    // Dropping the last referrer finally frees it
    CatalogTree::new(&h.db).delete_subtree(&root_a).unwrap();
    let report = h.reconcile();
    assert_eq!(report.blobs_deleted, 1);
    assert!(!h.store.exists(&hash));
}

#[test]
fn test_double_pass_is_noop() {
    let h = Harness::new();
    let root = h.topic("Root", None);

    // A bit of everything: live content, a lost blob, an orphan record
    let video = h.leaf("Clip", ContentKind::Video, &root);
    h.attach_downloaded_file(&video, b"kept", FileExtension::Mp4, "high_res_video");
    let doc = h.leaf("Doc", ContentKind::Document, &root);
    let (_f, lost) = h.attach_downloaded_file(&doc, b"lost", FileExtension::Pdf, "document");
    h.store.delete(&lost).unwrap();
    FileRegistry::new(&h.db)
        .add_local_file(&LocalFile::new(
            ObjectId::from_content(b"abandoned"),
            FileExtension::Zip,
        ))
        .unwrap();

    let first = h.reconcile();
    assert!(!first.is_noop());

    let second = h.reconcile();
    assert!(second.is_noop(), "second pass changed state: {second}");
}

#[test]
fn test_download_filename_and_storage_url() {
    let h = Harness::new();
    let root = h.topic("Root", None);
    let video = h.leaf("Intro: fractions / decimals", ContentKind::Video, &root);
    let (file_id, hash) =
        h.attach_downloaded_file(&video, b"payload", FileExtension::Mp4, "high_res_video");
    h.reconcile();

    let registry = FileRegistry::new(&h.db);
    let name = registry.download_filename(&file_id).unwrap();
    assert!(!name.contains('/') && !name.contains(':'));
    assert!(name.ends_with(".mp4"));

    let local = registry.local_file(&hash).unwrap().unwrap();
    let url = h.store.storage_url(&local).unwrap();
    assert!(url.starts_with("/content/storage/"));
    assert!(url.ends_with(&format!("{hash}.mp4")));
}
