//! Channel metadata rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::domain::{ChannelMetadata, ObjectId};
use crate::error::Result;

use super::db::Database;

/// Per-channel descriptors, one row per imported channel.
pub struct ChannelStore<'a> {
    db: &'a Database,
}

impl<'a> ChannelStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert or replace a channel descriptor. Import bumps `version` and
    /// `last_updated`; the core only reads them back.
    pub fn upsert(&self, channel: &ChannelMetadata) -> Result<()> {
        self.db.conn().execute(
            "INSERT INTO channels (id, name, description, author, version, thumbnail, \
             last_updated, min_platform_version) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(id) DO UPDATE SET \
             name = excluded.name, description = excluded.description, \
             author = excluded.author, version = excluded.version, \
             thumbnail = excluded.thumbnail, last_updated = excluded.last_updated, \
             min_platform_version = excluded.min_platform_version",
            params![
                channel.id,
                channel.name,
                channel.description,
                channel.author,
                channel.version,
                channel.thumbnail,
                channel.last_updated.map(|t| t.to_rfc3339()),
                channel.min_platform_version,
            ],
        )?;
        Ok(())
    }

    pub fn channel(&self, id: &ObjectId) -> Result<Option<ChannelMetadata>> {
        Ok(self
            .db
            .conn()
            .query_row(
                "SELECT id, name, description, author, version, thumbnail, last_updated, \
                 min_platform_version FROM channels WHERE id = ?1",
                params![id],
                row_to_channel,
            )
            .optional()?)
    }

    /// All channels, ordered by name.
    pub fn channels(&self) -> Result<Vec<ChannelMetadata>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, name, description, author, version, thumbnail, last_updated, \
             min_platform_version FROM channels ORDER BY name, id",
        )?;
        let rows = stmt.query_map([], row_to_channel)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

fn row_to_channel(row: &rusqlite::Row) -> rusqlite::Result<ChannelMetadata> {
    let last_updated: Option<String> = row.get(6)?;
    Ok(ChannelMetadata {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        author: row.get(3)?,
        version: row.get(4)?,
        thumbnail: row.get(5)?,
        last_updated: last_updated
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc)),
        min_platform_version: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_upsert_replaces_on_reimport() {
        let temp = TempDir::new().unwrap();
        let db = Database::open(&temp.path().join("catalog.db")).unwrap();
        let store = ChannelStore::new(&db);

        let id = ObjectId::random();
        store
            .upsert(&ChannelMetadata::new(id.clone(), "Khan Academy").with_version(1))
            .unwrap();
        store
            .upsert(
                &ChannelMetadata::new(id.clone(), "Khan Academy")
                    .with_version(2)
                    .with_last_updated(Utc::now()),
            )
            .unwrap();

        let channel = store.channel(&id).unwrap().unwrap();
        assert_eq!(channel.version, 2);
        assert!(channel.last_updated.is_some());
        assert_eq!(store.channels().unwrap().len(), 1);
    }
}
