//! Reference entities: languages, licenses and tags.

use super::id::ObjectId;

/// Text direction of a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LangDirection {
    Ltr,
    Rtl,
}

impl LangDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            LangDirection::Ltr => "ltr",
            LangDirection::Rtl => "rtl",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "rtl" {
            LangDirection::Rtl
        } else {
            LangDirection::Ltr
        }
    }
}

#[derive(Debug, Clone)]
pub struct Language {
    /// Full language id, e.g. `pt-BR`
    pub id: String,
    pub lang_code: String,
    pub lang_subcode: Option<String>,
    /// Localized display name
    pub lang_name: Option<String>,
    pub lang_direction: LangDirection,
}

#[derive(Debug, Clone)]
pub struct License {
    pub id: i64,
    pub license_name: String,
    pub license_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContentTag {
    pub id: ObjectId,
    pub tag_name: String,
}
