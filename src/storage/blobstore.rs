//! Content-addressed blob files on local disk.
//!
//! Blobs are stored as `<root>/<h0>/<h1>/<hash>.<extension>` where `h0`/`h1`
//! are the first two hex characters of the hash, which bounds directory
//! fan-out. The store never caches existence: deletion and sync can happen
//! out-of-band, so every call reflects the disk as it is right now.

use std::fs::{self, ReadDir};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::domain::{FileExtension, LocalFile, ObjectId};
use crate::error::{CatalogError, Result};

/// URL prefix the serving layer mounts the storage root under.
const STORAGE_URL_PREFIX: &str = "/content/storage";

/// Disk-backed blob store.
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic storage path for a blob.
    pub fn path_for(&self, hash: &ObjectId, extension: FileExtension) -> PathBuf {
        self.shard_dir(hash)
            .join(format!("{}.{}", hash, extension))
    }

    /// Whether a blob with this hash is present, regardless of extension.
    pub fn exists(&self, hash: &ObjectId) -> bool {
        self.find(hash).is_some()
    }

    /// Size in bytes of the blob, when present and readable.
    pub fn size(&self, hash: &ObjectId) -> Option<u64> {
        let path = self.find(hash)?;
        fs::metadata(&path).ok().map(|m| m.len())
    }

    /// Remove the blob from disk. Idempotent: an absent blob is success.
    pub fn delete(&self, hash: &ObjectId) -> Result<()> {
        let Some(path) = self.find(hash) else {
            return Ok(());
        };
        fs::remove_file(&path)
            .map_err(|e| CatalogError::storage_io(path.display().to_string(), e))?;
        debug!("deleted blob {}", path.display());
        Ok(())
    }

    /// Fresh scan of every hash currently on disk.
    ///
    /// The iterator consumes its directory handles as it goes; start a new
    /// scan for a second pass. Unreadable entries and foreign files are
    /// logged and skipped rather than aborting the scan.
    pub fn list_present_hashes(&self) -> HashScan {
        HashScan::new(&self.root)
    }

    /// URL the serving layer exposes the blob under, or `None` while the
    /// blob is unavailable.
    pub fn storage_url(&self, local: &LocalFile) -> Option<String> {
        if !local.available {
            return None;
        }
        let hash = local.id.as_str();
        Some(format!(
            "{}/{}/{}/{}",
            STORAGE_URL_PREFIX,
            &hash[..1],
            &hash[1..2],
            local.filename()
        ))
    }

    fn shard_dir(&self, hash: &ObjectId) -> PathBuf {
        let hash = hash.as_str();
        self.root.join(&hash[..1]).join(&hash[1..2])
    }

    fn find(&self, hash: &ObjectId) -> Option<PathBuf> {
        let dir = self.shard_dir(hash);
        let entries = fs::read_dir(&dir).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && path.file_stem().and_then(|s| s.to_str()) == Some(hash.as_str()) {
                return Some(path);
            }
        }
        None
    }
}

/// One pass over the sharded storage tree, yielding blob hashes.
pub struct HashScan {
    pending_dirs: Vec<PathBuf>,
    current: Option<ReadDir>,
}

impl HashScan {
    fn new(root: &Path) -> Self {
        // Two shard levels below the root; walk them breadth-last so the
        // scan holds at most one directory handle at a time.
        let mut pending_dirs = Vec::new();
        for level1 in read_dir_sorted(root) {
            for level2 in read_dir_sorted(&level1) {
                pending_dirs.push(level2);
            }
        }
        pending_dirs.reverse();
        Self {
            pending_dirs,
            current: None,
        }
    }
}

fn read_dir_sorted(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}

impl Iterator for HashScan {
    type Item = ObjectId;

    fn next(&mut self) -> Option<ObjectId> {
        loop {
            if let Some(reader) = &mut self.current {
                for entry in reader.by_ref() {
                    let entry = match entry {
                        Ok(e) => e,
                        Err(e) => {
                            warn!("skipping unreadable storage entry: {e}");
                            continue;
                        }
                    };
                    let path = entry.path();
                    if !path.is_file() {
                        continue;
                    }
                    match path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .and_then(ObjectId::parse)
                    {
                        Some(hash) => return Some(hash),
                        None => {
                            debug!("ignoring foreign file in storage: {}", path.display());
                        }
                    }
                }
            }

            // Current directory exhausted; move on to the next shard
            self.current = None;
            let dir = self.pending_dirs.pop()?;
            match fs::read_dir(&dir) {
                Ok(reader) => self.current = Some(reader),
                Err(e) => warn!("skipping unreadable storage dir {}: {e}", dir.display()),
            }
        }
    }
}
