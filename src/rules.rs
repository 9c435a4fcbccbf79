//! Domain rules: how URLs of one provider are recognized and which steps
//! process them.
//!
//! A rule is described with the [`Domain`] builder and stored as a
//! [`DomainRule`] once defaults are applied:
//!
//! ```rust
//! use embedkit::rules::{Domain, StepRef};
//!
//! # fn main() -> embedkit::Result<()> {
//! // Bare name: wildcard steps, `^https?://(?:www\.)?example\.com.*`
//! let simple = Domain::from("example.com");
//!
//! let custom = Domain::new("example.org")
//!     .pattern(r"^https?://example\.org/video/\d+")?
//!     .mixins(vec![StepRef::from("meta"), StepRef::from("og-thumbnail")]);
//! # let _ = (simple, custom);
//! # Ok(())
//! # }
//! ```

use std::fmt;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Map, Value};

use crate::config::EnabledProviders;
use crate::error::Result;
use crate::registry::Handler;

/// Reference to a step inside a rule's step list.
#[derive(Clone)]
pub enum StepRef {
    /// Every step of the catalog, in registration order.
    Wildcard,
    /// One registered step.
    Id(String),
    /// A rule-local step (priority `0` for fetchers).
    Inline(Handler),
    /// A rule-local fetcher with an explicit priority.
    InlineWithPriority { priority: i32, handler: Handler },
}

impl From<&str> for StepRef {
    fn from(id: &str) -> Self {
        if id == "*" {
            Self::Wildcard
        } else {
            Self::Id(id.to_string())
        }
    }
}

impl From<Handler> for StepRef {
    fn from(handler: Handler) -> Self {
        Self::Inline(handler)
    }
}

impl fmt::Debug for StepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => f.write_str("*"),
            Self::Id(id) => write!(f, "{id:?}"),
            Self::Inline(_) => f.write_str("<inline>"),
            Self::InlineWithPriority { priority, .. } => write!(f, "<inline priority={priority}>"),
        }
    }
}

fn wildcard() -> Vec<StepRef> {
    vec![StepRef::Wildcard]
}

/// Builder for a domain rule. Unset fields get defaults when the rule is
/// added to an engine.
#[derive(Debug, Clone)]
pub struct Domain {
    id: String,
    patterns: Vec<Regex>,
    fetchers: Option<Vec<StepRef>>,
    mixins: Option<Vec<StepRef>>,
    mixins_after: Option<Vec<StepRef>>,
    enabled: Option<bool>,
    config: Map<String, Value>,
}

impl Domain {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            patterns: Vec::new(),
            fetchers: None,
            mixins: None,
            mixins_after: None,
            enabled: None,
            config: Map::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Add a match pattern from regex source.
    pub fn pattern(self, source: &str) -> Result<Self> {
        Ok(self.matching(Regex::new(source)?))
    }

    /// Add several match patterns from regex sources.
    pub fn patterns(self, sources: &[&str]) -> Result<Self> {
        sources.iter().try_fold(self, |domain, source| domain.pattern(source))
    }

    /// Add a compiled match pattern.
    #[must_use]
    pub fn matching(mut self, pattern: Regex) -> Self {
        self.patterns.push(pattern);
        self
    }

    #[must_use]
    pub fn fetchers(mut self, refs: Vec<StepRef>) -> Self {
        self.fetchers = Some(refs);
        self
    }

    #[must_use]
    pub fn mixins(mut self, refs: Vec<StepRef>) -> Self {
        self.mixins = Some(refs);
        self
    }

    #[must_use]
    pub fn mixins_after(mut self, refs: Vec<StepRef>) -> Self {
        self.mixins_after = Some(refs);
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// Apply defaults and produce the stored rule.
    pub(crate) fn into_rule(self, policy: &EnabledProviders) -> Result<DomainRule> {
        let patterns = if self.patterns.is_empty() {
            vec![default_pattern(&self.id)?]
        } else {
            self.patterns
        };
        let enabled = self.enabled.unwrap_or_else(|| policy.allows(&self.id));

        Ok(DomainRule {
            id: self.id,
            patterns,
            fetchers: self.fetchers.unwrap_or_else(wildcard),
            mixins: self.mixins.unwrap_or_else(wildcard),
            mixins_after: self.mixins_after.unwrap_or_else(wildcard),
            enabled,
            config: self.config,
        })
    }
}

impl From<&str> for Domain {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Domain {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// `^https?://(?:www\.)?<id>.*`
fn default_pattern(id: &str) -> Result<Regex> {
    Ok(Regex::new(&format!(
        r"^https?://(?:www\.)?{}.*",
        regex::escape(id)
    ))?)
}

/// A registered domain rule.
#[derive(Debug, Clone)]
pub struct DomainRule {
    pub id: String,
    /// Always at least one pattern. Matching is case-insensitive.
    pub patterns: Vec<Regex>,
    pub fetchers: Vec<StepRef>,
    pub mixins: Vec<StepRef>,
    pub mixins_after: Vec<StepRef>,
    pub enabled: bool,
    pub config: Map<String, Value>,
}

/// Domain rules in registration order.
#[derive(Debug, Clone, Default)]
pub struct DomainTable {
    rules: IndexMap<String, DomainRule>,
}

impl DomainTable {
    /// Insert a rule, replacing any rule with the same id in place.
    pub fn insert(&mut self, rule: DomainRule) {
        self.rules.insert(rule.id.clone(), rule);
    }

    pub fn get(&self, id: &str) -> Option<&DomainRule> {
        self.rules.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut DomainRule> {
        self.rules.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rules.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainRule> {
        self.rules.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DomainRule> {
        self.rules.values_mut()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_gets_defaults() {
        let rule = Domain::from("example.com")
            .into_rule(&EnabledProviders::All)
            .unwrap();

        assert_eq!(rule.id, "example.com");
        assert!(rule.enabled);
        assert_eq!(rule.patterns.len(), 1);
        assert!(rule.patterns[0].is_match("https://www.example.com/page"));
        assert!(rule.patterns[0].is_match("http://example.com"));
        assert!(!rule.patterns[0].is_match("https://exampleXcom/"));
        assert!(matches!(rule.fetchers.as_slice(), [StepRef::Wildcard]));
        assert!(matches!(rule.mixins.as_slice(), [StepRef::Wildcard]));
        assert!(matches!(rule.mixins_after.as_slice(), [StepRef::Wildcard]));
        assert!(rule.config.is_empty());
    }

    #[test]
    fn enabled_follows_provider_policy() {
        let policy = EnabledProviders::Only(vec!["test.com".into()]);
        assert!(Domain::from("test.com").into_rule(&policy).unwrap().enabled);
        assert!(!Domain::from("example.com").into_rule(&policy).unwrap().enabled);
        assert!(Domain::from("example.com")
            .enabled(true)
            .into_rule(&policy)
            .unwrap()
            .enabled);
    }

    #[test]
    fn explicit_patterns_replace_default() {
        let rule = Domain::new("example.com")
            .pattern(r"^https?://example\.com/.*")
            .unwrap()
            .into_rule(&EnabledProviders::All)
            .unwrap();
        assert_eq!(rule.patterns.len(), 1);
        assert!(!rule.patterns[0].is_match("https://www.example.com/x"));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let err = Domain::new("x").pattern("[invalid").unwrap_err();
        assert_eq!(err.code(), "ECONFIG");
    }

    #[test]
    fn star_string_is_wildcard() {
        assert!(matches!(StepRef::from("*"), StepRef::Wildcard));
        assert!(matches!(StepRef::from("meta"), StepRef::Id(ref id) if id == "meta"));
    }

    #[test]
    fn table_keeps_position_on_replace() {
        let mut table = DomainTable::default();
        for id in ["a.com", "b.com", "a.com"] {
            table.insert(Domain::from(id).into_rule(&EnabledProviders::All).unwrap());
        }
        let ids: Vec<_> = table.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a.com", "b.com"]);
    }
}
