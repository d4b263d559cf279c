//! Per-channel descriptors for imported content databases.

use chrono::{DateTime, Utc};

use super::id::ObjectId;

/// Metadata about one imported channel.
///
/// One row per channel; written by import, read back by the core. Channels
/// are flat; the hierarchy lives entirely in the content nodes.
#[derive(Debug, Clone)]
pub struct ChannelMetadata {
    pub id: ObjectId,
    pub name: String,
    pub description: String,
    pub author: String,

    /// Import version; bumped each time the channel is re-imported
    pub version: i64,

    /// Inline thumbnail (data URI or empty)
    pub thumbnail: String,

    pub last_updated: Option<DateTime<Utc>>,

    /// Minimum platform version this channel's database is compatible with
    pub min_platform_version: String,
}

impl ChannelMetadata {
    pub fn new(id: ObjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            author: String::new(),
            version: 0,
            thumbnail: String::new(),
            last_updated: None,
            min_platform_version: String::new(),
        }
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn with_last_updated(mut self, at: DateTime<Utc>) -> Self {
        self.last_updated = Some(at);
        self
    }
}
