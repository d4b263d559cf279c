//! Local blob storage.
//!
//! # Storage Layout
//!
//! ```text
//! <home>/storage/
//! ├── c/
//! │   └── 9/
//! │       └── c91f...e2.mp4     # <hash>.<extension>, hash = dedup key
//! └── 0/
//!     └── a/
//!         └── 0a47...91.pdf
//! ```

pub mod blobstore;

pub use blobstore::{BlobStore, HashScan};
