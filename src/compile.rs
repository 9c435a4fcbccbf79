//! Rule compilation.
//!
//! Turns the registry and the domain table into a [`CompiledTable`]: one
//! case-insensitive matcher per enabled domain, concrete step lists with
//! wildcards expanded and ids resolved, and a global matcher used as a
//! fast pre-check. The table is immutable; the engine discards it on any
//! registry or rule mutation and compiles a new one on next use.

use std::fmt;

use indexmap::IndexMap;
use regex::{Regex, RegexSet, RegexSetBuilder};
use tracing::{debug, warn};

use crate::error::Result;
use crate::registry::{same_handler, Fetcher, Handler, Mixin, Registry};
use crate::rules::{DomainRule, DomainTable, StepRef};

/// Execution plan of one enabled domain.
#[derive(Clone)]
pub struct CompiledDomain {
    /// Each pattern is compiled on its own, so capture names may repeat.
    pub matcher: RegexSet,
    /// Sorted by priority, ascending; ties keep expansion order.
    pub fetchers: Vec<Fetcher>,
    pub mixins: Vec<Handler>,
    pub mixins_after: Vec<Handler>,
}

impl fmt::Debug for CompiledDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledDomain")
            .field("patterns", &self.matcher.patterns())
            .field("fetchers", &self.fetchers)
            .field("mixins", &self.mixins.len())
            .field("mixins_after", &self.mixins_after.len())
            .finish_non_exhaustive()
    }
}

/// Compiled plans of all enabled domains.
#[derive(Clone, Default)]
pub struct CompiledTable {
    domains: IndexMap<String, CompiledDomain>,
    /// `None` when no domain is enabled: matches nothing.
    matcher: Option<RegexSet>,
}

impl fmt::Debug for CompiledTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTable")
            .field("domains", &self.domains)
            .finish_non_exhaustive()
    }
}

impl CompiledTable {
    /// Fast pre-check against the union of all domain matchers.
    pub fn matches(&self, url: &str) -> bool {
        self.matcher.as_ref().is_some_and(|re| re.is_match(url))
    }

    /// First domain (in registration order) whose matcher accepts `url`.
    pub fn find(&self, url: &str) -> Option<(&str, &CompiledDomain)> {
        if !self.matches(url) {
            return None;
        }
        self.domains
            .iter()
            .find(|(_, domain)| domain.matcher.is_match(url))
            .map(|(id, domain)| (id.as_str(), domain))
    }

    pub fn domain(&self, id: &str) -> Option<&CompiledDomain> {
        self.domains.get(id)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

/// Build the compiled table.
pub fn compile(registry: &Registry, rules: &DomainTable) -> Result<CompiledTable> {
    debug!("compile: {} rules", rules.len());

    let mut domains = IndexMap::new();
    for rule in rules.iter().filter(|r| r.enabled) {
        let Some(matcher) = union(rule.patterns.iter().map(Regex::as_str))? else {
            warn!("Domain rule {} has no match patterns, skipped", rule.id);
            continue;
        };
        let compiled = CompiledDomain {
            matcher,
            fetchers: expand_fetchers(rule, registry),
            mixins: expand_mixins(rule, &rule.mixins, "mixin", |id| registry.mixin(id), || {
                registry.mixins().collect()
            }),
            mixins_after: expand_mixins(
                rule,
                &rule.mixins_after,
                "mixin-after",
                |id| registry.mixin_after(id),
                || registry.mixins_after().collect(),
            ),
        };
        domains.insert(rule.id.clone(), compiled);
    }

    let matcher = union(
        domains
            .values()
            .flat_map(|d| d.matcher.patterns().iter().map(String::as_str)),
    )?;

    debug!("compile: done, {} enabled domains", domains.len());
    Ok(CompiledTable { domains, matcher })
}

/// Case-insensitive set of `sources`. `None` for no sources.
fn union<'s>(sources: impl Iterator<Item = &'s str>) -> Result<Option<RegexSet>> {
    let patterns: Vec<&str> = sources.collect();
    if patterns.is_empty() {
        return Ok(None);
    }
    let set = RegexSetBuilder::new(patterns)
        .case_insensitive(true)
        .build()?;
    Ok(Some(set))
}

fn expand_fetchers(rule: &DomainRule, registry: &Registry) -> Vec<Fetcher> {
    let mut expanded: Vec<Fetcher> = Vec::new();

    for step in &rule.fetchers {
        match step {
            StepRef::Wildcard => expanded.extend(registry.fetchers().cloned()),
            StepRef::Id(id) => match registry.fetcher(id) {
                Some(fetcher) => expanded.push(fetcher.clone()),
                None => warn!("Domain {} references unknown fetcher {}", rule.id, id),
            },
            StepRef::Inline(handler) => {
                expanded.push(Fetcher::new(format!("{}:inline", rule.id), handler.clone()));
            }
            StepRef::InlineWithPriority { priority, handler } => {
                expanded.push(
                    Fetcher::new(format!("{}:inline", rule.id), handler.clone())
                        .with_priority(*priority),
                );
            }
        }
    }

    let mut unique: Vec<Fetcher> = Vec::with_capacity(expanded.len());
    for fetcher in expanded {
        if !unique.iter().any(|f| same_handler(&f.handler, &fetcher.handler)) {
            unique.push(fetcher);
        }
    }

    // Stable: equal priorities keep expansion order.
    unique.sort_by_key(|f| f.priority);
    unique
}

fn expand_mixins<'r>(
    rule: &DomainRule,
    refs: &[StepRef],
    kind: &str,
    lookup: impl Fn(&str) -> Option<&'r Mixin>,
    all: impl Fn() -> Vec<&'r Mixin>,
) -> Vec<Handler> {
    let mut expanded: Vec<Handler> = Vec::new();

    for step in refs {
        match step {
            StepRef::Wildcard => expanded.extend(all().into_iter().map(|m| m.handler.clone())),
            StepRef::Id(id) => match lookup(id) {
                Some(mixin) => expanded.push(mixin.handler.clone()),
                None => warn!("Domain {} references unknown {} {}", rule.id, kind, id),
            },
            StepRef::Inline(handler) | StepRef::InlineWithPriority { handler, .. } => {
                expanded.push(handler.clone());
            }
        }
    }

    let mut unique: Vec<Handler> = Vec::with_capacity(expanded.len());
    for handler in expanded {
        if !unique.iter().any(|h| same_handler(h, &handler)) {
            unique.push(handler);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnabledProviders;
    use crate::registry::step_fn;
    use crate::rules::Domain;

    fn noop() -> Handler {
        step_fn(|_env| Ok(()))
    }

    fn table(domains: Vec<Domain>) -> DomainTable {
        let mut table = DomainTable::default();
        for domain in domains {
            table.insert(domain.into_rule(&EnabledProviders::All).unwrap());
        }
        table
    }

    fn fetcher_ids(domain: &CompiledDomain) -> Vec<&str> {
        domain.fetchers.iter().map(|f| f.id.as_str()).collect()
    }

    #[test]
    fn fetchers_sorted_by_priority_regardless_of_registration_order() {
        let mut registry = Registry::new();
        registry.add_fetcher(Fetcher::new("oembed", noop()));
        registry.add_fetcher(Fetcher::new("late", noop()).with_priority(10));
        registry.add_fetcher(Fetcher::new("meta", noop()).with_priority(-100));
        registry.add_fetcher(Fetcher::new("other", noop()));

        let compiled = compile(&registry, &table(vec![Domain::from("example.com")])).unwrap();
        let domain = compiled.domain("example.com").unwrap();
        assert_eq!(fetcher_ids(domain), vec!["meta", "oembed", "other", "late"]);
    }

    #[test]
    fn wildcard_plus_explicit_id_runs_once() {
        let mut registry = Registry::new();
        registry.add_fetcher(Fetcher::new("meta", noop()).with_priority(-100));
        registry.add_mixin(Mixin::new("a", noop()));
        registry.add_mixin(Mixin::new("b", noop()));
        registry.add_mixin_after(Mixin::new("z", noop()));

        let domain = Domain::new("example.com")
            .fetchers(vec!["meta".into(), "*".into(), "meta".into()])
            .mixins(vec!["b".into(), "*".into()])
            .mixins_after(vec!["*".into(), "z".into()]);
        let compiled = compile(&registry, &table(vec![domain])).unwrap();
        let domain = compiled.domain("example.com").unwrap();

        assert_eq!(fetcher_ids(domain), vec!["meta"]);
        assert_eq!(domain.mixins.len(), 2);
        assert!(same_handler(&domain.mixins[0], &registry.mixin("b").unwrap().handler));
        assert!(same_handler(&domain.mixins[1], &registry.mixin("a").unwrap().handler));
        assert_eq!(domain.mixins_after.len(), 1);
    }

    #[test]
    fn inline_steps_keep_their_place() {
        let mut registry = Registry::new();
        registry.add_fetcher(Fetcher::new("meta", noop()).with_priority(-100));
        let inline = noop();
        let early = noop();

        let domain = Domain::new("example.com").fetchers(vec![
            StepRef::Inline(inline.clone()),
            "meta".into(),
            StepRef::InlineWithPriority {
                priority: -200,
                handler: early.clone(),
            },
        ]);
        let compiled = compile(&registry, &table(vec![domain])).unwrap();
        let fetchers = &compiled.domain("example.com").unwrap().fetchers;

        assert_eq!(fetchers.len(), 3);
        assert!(same_handler(&fetchers[0].handler, &early));
        assert_eq!(fetchers[1].id, "meta");
        assert!(same_handler(&fetchers[2].handler, &inline));
    }

    #[test]
    fn unknown_ids_are_skipped() {
        let registry = Registry::new();
        let domain = Domain::new("example.com").mixins(vec!["missing".into()]);
        let compiled = compile(&registry, &table(vec![domain])).unwrap();
        assert!(compiled.domain("example.com").unwrap().mixins.is_empty());
    }

    #[test]
    fn disabled_domains_are_not_compiled() {
        let registry = Registry::new();
        let compiled = compile(
            &registry,
            &table(vec![Domain::from("a.com").enabled(false), Domain::from("b.com")]),
        )
        .unwrap();

        assert_eq!(compiled.len(), 1);
        assert!(compiled.domain("a.com").is_none());
        assert!(!compiled.matches("https://a.com/x"));
        assert!(compiled.matches("https://b.com/x"));
    }

    #[test]
    fn empty_table_matches_nothing() {
        let compiled = compile(&Registry::new(), &DomainTable::default()).unwrap();
        assert!(compiled.is_empty());
        assert!(!compiled.matches("https://example.com/"));
        assert!(compiled.find("https://example.com/").is_none());
    }

    #[test]
    fn matching_is_case_insensitive_and_first_domain_wins() {
        let first = Domain::new("first")
            .pattern(r"^https?://example\.com/a")
            .unwrap();
        let second = Domain::new("second")
            .pattern(r"^https?://example\.com/")
            .unwrap();
        let compiled = compile(&Registry::new(), &table(vec![first, second])).unwrap();

        assert_eq!(compiled.find("HTTPS://EXAMPLE.COM/a/1").map(|(id, _)| id), Some("first"));
        assert_eq!(compiled.find("https://example.com/b").map(|(id, _)| id), Some("second"));
    }

    #[test]
    fn repeated_capture_names_compile() {
        let a = Domain::new("a.com")
            .pattern(r"^https?://a\.com/(?P<id>\d+)")
            .unwrap()
            .pattern(r"^https?://a\.com/v/(?P<id>\d+)")
            .unwrap();
        let b = Domain::new("b.com")
            .pattern(r"^https?://b\.com/(?P<id>\d+)")
            .unwrap();
        let compiled = compile(&Registry::new(), &table(vec![a, b])).unwrap();

        assert_eq!(compiled.find("https://a.com/v/7").map(|(id, _)| id), Some("a.com"));
        assert_eq!(compiled.find("https://B.com/42").map(|(id, _)| id), Some("b.com"));
        assert!(compiled.find("https://c.com/1").is_none());
    }

    #[test]
    fn debug_lists_domains() {
        let compiled = compile(&Registry::new(), &table(vec![Domain::from("example.com")])).unwrap();
        let printed = format!("{compiled:?}");
        assert!(printed.contains("CompiledTable"));
        assert!(printed.contains("example.com"));
    }
}
