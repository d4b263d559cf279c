//! Language, license and tag reference rows.
//!
//! Written by import alongside nodes; the core only needs them resolvable.

use rusqlite::{params, OptionalExtension};

use crate::domain::{LangDirection, Language, License};
use crate::error::Result;

use super::db::Database;

pub struct RefDataStore<'a> {
    db: &'a Database,
}

impl<'a> RefDataStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn add_language(&self, language: &Language) -> Result<()> {
        self.db.conn().execute(
            "INSERT OR REPLACE INTO languages (id, lang_code, lang_subcode, lang_name, \
             lang_direction) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                language.id,
                language.lang_code,
                language.lang_subcode,
                language.lang_name,
                language.lang_direction.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn language(&self, id: &str) -> Result<Option<Language>> {
        Ok(self
            .db
            .conn()
            .query_row(
                "SELECT id, lang_code, lang_subcode, lang_name, lang_direction \
                 FROM languages WHERE id = ?1",
                params![id],
                |r| {
                    Ok(Language {
                        id: r.get(0)?,
                        lang_code: r.get(1)?,
                        lang_subcode: r.get(2)?,
                        lang_name: r.get(3)?,
                        lang_direction: LangDirection::parse(&r.get::<_, String>(4)?),
                    })
                },
            )
            .optional()?)
    }

    /// Returns the row id of the inserted license.
    pub fn add_license(&self, name: &str, description: Option<&str>) -> Result<i64> {
        self.db.conn().execute(
            "INSERT INTO licenses (license_name, license_description) VALUES (?1, ?2)",
            params![name, description],
        )?;
        Ok(self.db.conn().last_insert_rowid())
    }

    pub fn license(&self, id: i64) -> Result<Option<License>> {
        Ok(self
            .db
            .conn()
            .query_row(
                "SELECT id, license_name, license_description FROM licenses WHERE id = ?1",
                params![id],
                |r| {
                    Ok(License {
                        id: r.get(0)?,
                        license_name: r.get(1)?,
                        license_description: r.get(2)?,
                    })
                },
            )
            .optional()?)
    }
}
