//! Per-resolution execution context.
//!
//! A fresh [`Env`] is built for every `resolve()` call that misses the
//! cache. Fetchers fill [`Env::data`], mixins derive
//! [`Env::result`] from it, mixins-after normalize the result.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::engine::Engine;
use crate::record::{MediaValue, ResultRecord};

/// One `<meta>` (or `<title>`) record from the document head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTag {
    pub name: String,
    pub value: String,
}

impl MetaTag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Attributes of one `<link>` element.
pub type LinkAttrs = HashMap<String, String>;

/// Intermediate data deposited by fetchers.
#[derive(Debug, Clone, Default)]
pub struct Scratch {
    pub meta: Vec<MetaTag>,
    /// `rel` -> links with that rel, in document order.
    pub links: IndexMap<String, Vec<LinkAttrs>>,
    pub oembed: Option<Map<String, Value>>,
    /// Free-form data for custom fetchers.
    pub values: HashMap<String, Value>,
}

/// Mutable state shared by the steps of one resolution.
pub struct Env<'a> {
    /// Source URL, credentials stripped.
    pub src: String,
    /// Whitelist entry for the domain, if configured.
    pub whitelist: Option<Value>,
    /// Domain rule config (autoplay parameter name, API keys).
    pub config: Map<String, Value>,
    pub data: Scratch,
    pub result: ResultRecord,
    pub engine: &'a Engine,
}

impl<'a> Env<'a> {
    pub fn new(engine: &'a Engine, src: impl Into<String>, domain: impl Into<String>) -> Self {
        let src = src.into();
        Self {
            result: ResultRecord {
                src: src.clone(),
                domain: domain.into(),
                ..ResultRecord::default()
            },
            src,
            whitelist: None,
            config: Map::new(),
            data: Scratch::default(),
            engine,
        }
    }

    pub fn whitelist(&self) -> Option<&Value> {
        self.whitelist.as_ref()
    }

    /// oEmbed field as a string. Numbers are stringified.
    pub fn oembed_str(&self, key: &str) -> Option<String> {
        match self.data.oembed.as_ref()?.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// oEmbed field as a media value.
    pub fn oembed_media(&self, key: &str) -> Option<MediaValue> {
        self.data
            .oembed
            .as_ref()?
            .get(key)
            .and_then(MediaValue::from_json)
    }
}

/// Value of the first meta named in `names` (priority order).
pub fn find_meta<'m>(meta: &'m [MetaTag], names: &[&str]) -> Option<&'m str> {
    names.iter().find_map(|name| {
        meta.iter()
            .find(|m| m.name == *name)
            .map(|m| m.value.as_str())
    })
}

/// Split the records of a namespace (`og:image`, `og:video`) into groups,
/// one per described object.
///
/// A new group starts when a `group_by` name repeats within the current
/// group:
///
/// ```text
/// og:image, og:image:width, og:image, og:image:width
/// -> [og:image, og:image:width], [og:image, og:image:width]
/// ```
pub fn group_meta(meta: &[MetaTag], namespace: &str, group_by: &[&str]) -> Vec<Vec<MetaTag>> {
    let mut groups = Vec::new();
    let mut current: Vec<MetaTag> = Vec::new();

    for record in meta
        .iter()
        .filter(|m| m.name.to_lowercase().starts_with(namespace))
    {
        let repeats = current.iter().any(|m| m.name == record.name);
        if repeats && group_by.contains(&record.name.as_str()) {
            groups.push(std::mem::take(&mut current));
        }
        current.push(record.clone());
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}
