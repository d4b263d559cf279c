//! 128-bit hex identifiers shared by all catalog entities.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A 128-bit identifier rendered as 32 lowercase hex characters.
///
/// Used for content node ids, content ids, channel ids and file row ids.
/// Local file ids are the same shape but derived from content
/// ([`ObjectId::from_content`]), which is what makes them a dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Generate a fresh random identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Derive an identifier from raw content bytes.
    ///
    /// First 16 bytes of SHA-256, hex encoded. Identical bytes always produce
    /// the same id, which is the property the blob store relies on.
    pub fn from_content(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..16]))
    }

    /// Parse and validate a 32-char hex string.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(s.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for ObjectId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for ObjectId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        ObjectId::parse(s).ok_or_else(|| FromSqlError::Other(format!("not a hex id: {s}").into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_content_is_deterministic() {
        let a = ObjectId::from_content(b"some video bytes");
        let b = ObjectId::from_content(b"some video bytes");
        let c = ObjectId::from_content(b"other bytes");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(ObjectId::parse("deadbeef").is_none());
        assert!(ObjectId::parse(&"g".repeat(32)).is_none());
        assert!(ObjectId::parse(&"a".repeat(32)).is_some());
    }

    #[test]
    fn test_random_is_valid() {
        let id = ObjectId::random();
        assert!(ObjectId::parse(id.as_str()).is_some());
    }
}
