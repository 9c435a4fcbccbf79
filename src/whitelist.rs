//! Per-domain extraction permissions.
//!
//! An entry is a nested map such as `{ oembed = { video = ["allow", "autoplay"] } }`.
//! Mixins ask [`check`] whether a given behaviour is permitted before
//! emitting a snippet.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;

const BUILTIN: &str = include_str!("../config/whitelist.toml");

#[derive(Deserialize)]
struct WhitelistFile {
    #[serde(default)]
    domains: HashMap<String, Value>,
}

/// Domain name -> permission entry.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    domains: HashMap<String, Value>,
}

impl Whitelist {
    /// The whitelist shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: WhitelistFile = toml::from_str(content)?;
        Ok(Self {
            domains: file.domains,
        })
    }

    /// Add or replace entries.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = (String, Value)>) {
        self.domains.extend(entries);
    }

    pub fn insert(&mut self, domain: impl Into<String>, entry: Value) {
        self.domains.insert(domain.into(), entry);
    }

    /// Find the entry for a domain id, trying `id`, `www.id` and `*.id`
    /// in that order.
    pub fn lookup(&self, id: &str) -> Option<&Value> {
        [id.to_string(), format!("www.{id}"), format!("*.{id}")]
            .iter()
            .find_map(|key| self.domains.get(key))
    }
}

/// Is `value` permitted at dotted `path` of `entry`?
///
/// A string record must equal `value`; a list record must contain it.
/// Missing entries and missing records deny.
pub fn check(entry: Option<&Value>, path: &str, value: &str) -> bool {
    let Some(mut node) = entry else {
        return false;
    };
    for key in path.split('.') {
        match node.get(key) {
            Some(next) => node = next,
            None => return false,
        }
    }

    match node {
        Value::String(s) => s == value,
        Value::Array(items) => items.iter().any(|i| i.as_str() == Some(value)),
        _ => false,
    }
}

/// Shorthand for `check(entry, path, "allow")`.
pub fn allows(entry: Option<&Value>, path: &str) -> bool {
    check(entry, path, "allow")
}
