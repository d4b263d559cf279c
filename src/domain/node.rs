//! Content nodes: the hierarchical layer of the catalog.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use super::id::ObjectId;

/// What a content node represents.
///
/// `Topic` nodes are containers; every other kind is a leaf that carries
/// files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Topic,
    Video,
    Audio,
    Exercise,
    Document,
    Html5,
}

impl ContentKind {
    pub fn is_topic(self) -> bool {
        matches!(self, ContentKind::Topic)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Topic => "topic",
            ContentKind::Video => "video",
            ContentKind::Audio => "audio",
            ContentKind::Exercise => "exercise",
            ContentKind::Document => "document",
            ContentKind::Html5 => "html5",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "topic" => Ok(ContentKind::Topic),
            "video" => Ok(ContentKind::Video),
            "audio" => Ok(ContentKind::Audio),
            "exercise" => Ok(ContentKind::Exercise),
            "document" => Ok(ContentKind::Document),
            "html5" => Ok(ContentKind::Html5),
            other => Err(format!("unknown content kind: {other}")),
        }
    }
}

impl ToSql for ContentKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ContentKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// One entry in the hierarchical catalog.
#[derive(Debug, Clone)]
pub struct ContentNode {
    /// Unique identifier of this copy of the content
    pub id: ObjectId,

    /// Parent node; `None` for channel roots
    pub parent: Option<ObjectId>,

    /// Groups substantially-similar copies of the same content, so user
    /// progress can be tracked across channels. Distinct from `id`.
    pub content_id: ObjectId,

    /// Channel this node was imported from
    pub channel_id: ObjectId,

    pub title: String,
    pub description: Option<String>,
    pub kind: ContentKind,

    /// Siblings are ordered by this, then by id as a deterministic tiebreak
    pub sort_order: Option<f64>,

    pub author: String,
    pub license_owner: String,

    /// License row id, when known
    pub license: Option<i64>,

    /// Language id, when known
    pub lang: Option<String>,

    /// Whether this node (or, for topics, any child) is usable offline
    pub available: bool,

    /// Phonetic/stemmed form of title and description for fuzzy search
    pub stemmed_metaphone: String,

    /// Nested-interval bounds, maintained by the tree on every structural
    /// change. `lft < rght` always holds; a node contains another iff the
    /// other's bounds fall inside its own.
    pub lft: i64,
    pub rght: i64,
}

impl ContentNode {
    /// Create a node with the given title and kind; everything else defaults.
    pub fn new(title: impl Into<String>, kind: ContentKind, channel_id: ObjectId) -> Self {
        Self {
            id: ObjectId::random(),
            parent: None,
            content_id: ObjectId::random(),
            channel_id,
            title: title.into(),
            description: None,
            kind,
            sort_order: None,
            author: String::new(),
            license_owner: String::new(),
            license: None,
            lang: None,
            available: false,
            stemmed_metaphone: String::new(),
            lft: 0,
            rght: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_sort_order(mut self, sort_order: f64) -> Self {
        self.sort_order = Some(sort_order);
        self
    }

    pub fn with_content_id(mut self, content_id: ObjectId) -> Self {
        self.content_id = content_id;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }
}
