//! Normalized resolution result.
//!
//! A [`ResultRecord`] is what `Engine::resolve` returns and what the
//! whole-record cache stores. Its JSON form uses the field names `src`,
//! `domain`, `meta` and `snippets`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Resolved metadata for one URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Source URL, credentials stripped.
    pub src: String,
    /// Id of the domain rule that handled the URL.
    pub domain: String,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub snippets: Vec<Snippet>,
    /// Fields added by custom steps.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Page-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub site: String,
    #[serde(default)]
    pub description: String,
}

/// Value stored in [`Snippet::media`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaValue {
    Number(f64),
    Text(String),
}

impl MediaValue {
    /// Numeric view; text is parsed the way a lenient float parser would
    /// (leading number, trailing garbage ignored).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => parse_leading_float(s),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    /// `true` for values a template would consider present.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Text(s) => !s.is_empty(),
        }
    }

    /// Convert a JSON scalar (oEmbed field) into a media value.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl From<f64> for MediaValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for MediaValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MediaValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

pub type Media = BTreeMap<String, MediaValue>;

/// One embeddable asset found for the URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    /// MIME type, or `image` for pictures. `None` until detected.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub href: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub media: Media,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl Snippet {
    pub fn new(kind: Option<&str>, href: impl Into<String>, tags: &[&str]) -> Self {
        Self {
            kind: kind.map(str::to_string),
            href: Some(href.into()),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            media: Media::new(),
            html: None,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Append a tag unless already present.
    pub fn add_tag(&mut self, tag: &str) {
        if !self.has_tag(tag) {
            self.tags.push(tag.to_string());
        }
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind.as_deref() == Some(kind)
    }

    /// Set a media field when a value is available.
    pub fn set_media(&mut self, key: &str, value: Option<MediaValue>) {
        if let Some(value) = value {
            self.media.insert(key.to_string(), value);
        }
    }

    pub fn media_f64(&self, key: &str) -> Option<f64> {
        self.media.get(key).and_then(MediaValue::as_f64)
    }
}

fn parse_leading_float(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .take_while(|&(i, c)| {
            c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || ((c == '-' || c == '+') && i == 0)
        })
        .map(|(i, c)| i + c.len_utf8())
        .last()?;

    // Back off until the prefix parses ("12e" -> "12").
    (1..=end).rev().find_map(|i| s[..i].parse::<f64>().ok())
}
