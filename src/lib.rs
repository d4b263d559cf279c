//! depot - offline content catalog with a deduplicated local file store
//!
//! Manages a hierarchical catalog of learning content (topics, videos,
//! exercises, ...) whose files are deduplicated by content hash into a
//! shared blob store on local disk.
//!
//! # Architecture
//!
//! Three layers kept consistent under partial sync:
//! - The node tree carries nested-interval bounds for fast range queries,
//!   relabeled on every structural change
//! - File rows map nodes onto content-hashed local files, many-to-one
//! - Availability flows bottom-up, from blob on disk through local file,
//!   file and node to ancestor topics; reconciliation re-derives it from
//!   disk and reclaims orphaned blobs
//!
//! # Modules
//!
//! - `catalog`: SQLite persistence, tree index, file registry, assessments
//! - `storage`: content-addressed blob files on disk
//! - `reconcile`: the availability/orphan-cleanup batch job
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Sync availability with disk and purge orphaned blobs
//! depot reconcile
//!
//! # Inspect the catalog
//! depot status
//! depot ls
//! depot show <node-id>
//! ```

pub mod catalog;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod reconcile;
pub mod storage;

// Re-export main types at crate root for convenience
pub use catalog::{
    AssessmentIndex, CatalogTree, ChannelStore, Database, FileRegistry, RefDataStore,
};
pub use domain::{
    AssessmentMetaData, ChannelMetadata, ContentKind, ContentNode, File, FileExtension, LocalFile,
    ObjectId,
};
pub use error::{CatalogError, Result};
pub use reconcile::{ReconcileReport, Reconciler};
pub use storage::BlobStore;
