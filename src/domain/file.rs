//! Logical files and the deduplicated local files they point at.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use super::id::ObjectId;

/// Sentinel label for preset codes this build does not know about.
pub const UNKNOWN_FORMAT: &str = "Unknown format";

/// Display label for a file preset code.
///
/// Preset codes describe the role a file plays for its node (main video,
/// subtitle track, thumbnail, ...). Unknown codes fall back to
/// [`UNKNOWN_FORMAT`] instead of failing, since channels can be produced by
/// newer tooling than this build.
pub fn preset_label(code: &str) -> &'static str {
    match code {
        "high_res_video" => "High Resolution",
        "low_res_video" => "Low Resolution",
        "video_thumbnail" => "Thumbnail",
        "video_subtitle" => "Subtitle",
        "audio" => "Audio",
        "audio_thumbnail" => "Thumbnail",
        "document" => "Document",
        "document_thumbnail" => "Thumbnail",
        "exercise" => "Exercise",
        "exercise_thumbnail" => "Thumbnail",
        "exercise_image" => "Exercise Image",
        "html5_zip" => "HTML5 Zip",
        "html5_thumbnail" => "HTML5 Thumbnail",
        "topic_thumbnail" => "Thumbnail",
        "channel_thumbnail" => "Channel Thumbnail",
        _ => UNKNOWN_FORMAT,
    }
}

/// Known on-disk file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileExtension {
    Mp4,
    Mp3,
    Vtt,
    Pdf,
    Epub,
    Zip,
    Png,
    Jpg,
    Jpeg,
    Svg,
    Json,
}

impl FileExtension {
    pub fn as_str(self) -> &'static str {
        match self {
            FileExtension::Mp4 => "mp4",
            FileExtension::Mp3 => "mp3",
            FileExtension::Vtt => "vtt",
            FileExtension::Pdf => "pdf",
            FileExtension::Epub => "epub",
            FileExtension::Zip => "zip",
            FileExtension::Png => "png",
            FileExtension::Jpg => "jpg",
            FileExtension::Jpeg => "jpeg",
            FileExtension::Svg => "svg",
            FileExtension::Json => "json",
        }
    }
}

impl std::fmt::Display for FileExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FileExtension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mp4" => Ok(FileExtension::Mp4),
            "mp3" => Ok(FileExtension::Mp3),
            "vtt" => Ok(FileExtension::Vtt),
            "pdf" => Ok(FileExtension::Pdf),
            "epub" => Ok(FileExtension::Epub),
            "zip" => Ok(FileExtension::Zip),
            "png" => Ok(FileExtension::Png),
            "jpg" => Ok(FileExtension::Jpg),
            "jpeg" => Ok(FileExtension::Jpeg),
            "svg" => Ok(FileExtension::Svg),
            "json" => Ok(FileExtension::Json),
            other => Err(format!("unknown file extension: {other}")),
        }
    }
}

impl ToSql for FileExtension {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for FileExtension {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// A logical file attached to a content node.
///
/// Many `File` rows can point at the same [`LocalFile`]; that is how the same
/// video reused across channels is stored once on disk.
#[derive(Debug, Clone)]
pub struct File {
    pub id: ObjectId,

    /// Owning node. Nullable so imports can stage rows, but a file without a
    /// node is never reachable from any query path.
    pub node: Option<ObjectId>,

    /// Content hash of the backing blob
    pub local_file: ObjectId,

    /// Preset code, e.g. `high_res_video`. Stored as text so codes from newer
    /// tooling survive a round trip.
    pub preset: String,

    pub lang: Option<String>,

    /// Non-core file (captions in a second language, attachments, ...).
    /// Supplementary files do not gate node availability.
    pub supplementary: bool,
    pub thumbnail: bool,

    /// Download/display order among the node's files; `None` sorts last
    pub priority: Option<i64>,

    /// Mirror of the local file's availability, kept in sync by
    /// reconciliation
    pub available: bool,
}

impl File {
    pub fn new(node: ObjectId, local_file: ObjectId, preset: impl Into<String>) -> Self {
        Self {
            id: ObjectId::random(),
            node: Some(node),
            local_file,
            preset: preset.into(),
            lang: None,
            supplementary: false,
            thumbnail: false,
            priority: None,
            available: false,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn supplementary(mut self) -> Self {
        self.supplementary = true;
        self
    }

    pub fn thumbnail(mut self) -> Self {
        self.thumbnail = true;
        self
    }
}

/// The on-disk state of one deduplicated blob.
#[derive(Debug, Clone)]
pub struct LocalFile {
    /// Content hash of the blob; the deduplication key
    pub id: ObjectId,

    pub extension: FileExtension,

    /// Size in bytes, when known
    pub file_size: Option<u64>,

    /// Whether the blob is currently present on disk
    pub available: bool,
}

impl LocalFile {
    pub fn new(id: ObjectId, extension: FileExtension) -> Self {
        Self {
            id,
            extension,
            file_size: None,
            available: false,
        }
    }

    /// `<hash>.<extension>`, the name the blob is stored under.
    pub fn filename(&self) -> String {
        format!("{}.{}", self.id, self.extension)
    }
}
