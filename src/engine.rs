//! The resolution engine.
//!
//! # Architecture
//!
//! - [`EngineBuilder`]: injects the request, cache and image probe
//!   capabilities and registers the built-in steps and domains
//! - [`Engine::resolve`]: URL -> [`ResultRecord`] through the three
//!   pipeline phases of the matching domain
//! - [`Engine::render`]: record (or URL) -> HTML via the first template
//!   that renders
//!
//! Mutators take `&mut self` and drop the compiled table; `resolve`
//! compiles it again on first use. Concurrent resolutions share the
//! compiled table through an `Arc`, so a rebuild never disturbs a
//! resolution that is already running.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::cache::{now_millis, Cache, NoopCache};
use crate::compile::{compile, CompiledTable};
use crate::config::{EnabledProviders, EngineOptions};
use crate::env::Env;
use crate::error::Result;
use crate::http_client::{HttpClient, HttpResponse, RequestOptions, Requester};
use crate::image_size::{Dimensions, HttpImageProbe, ImageProbe, ImageSizes};
use crate::record::ResultRecord;
use crate::registry::{Fetcher, Handler, Mixin, Registry};
use crate::rules::{Domain, DomainRule, DomainTable};
use crate::templates::{Template, TemplateData, Templates};
use crate::whitelist::Whitelist;
use crate::{domains, fetchers, mixins, mixins_after};

/// Whole-record cache entry.
#[derive(Serialize, Deserialize)]
struct CachedRecord {
    info: Option<ResultRecord>,
    #[serde(default)]
    ts: i64,
}

/// Output of [`Engine::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// Trimmed HTML.
    pub html: String,
    /// The requested format (or alias) that produced the HTML.
    pub kind: String,
}

/// What to render: a URL to resolve first, or a resolved record.
#[derive(Debug, Clone, Copy)]
pub enum RenderTarget<'a> {
    Url(&'a str),
    Record(&'a ResultRecord),
}

impl<'a> From<&'a str> for RenderTarget<'a> {
    fn from(url: &'a str) -> Self {
        Self::Url(url)
    }
}

impl<'a> From<&'a String> for RenderTarget<'a> {
    fn from(url: &'a String) -> Self {
        Self::Url(url)
    }
}

impl<'a> From<&'a ResultRecord> for RenderTarget<'a> {
    fn from(record: &'a ResultRecord) -> Self {
        Self::Record(record)
    }
}

/// Builder for [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    options: EngineOptions,
    requester: Option<Arc<dyn Requester>>,
    cache: Option<Arc<dyn Cache>>,
    image_probe: Option<Arc<dyn ImageProbe>>,
}

impl EngineBuilder {
    #[must_use]
    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn enabled_providers(mut self, providers: EnabledProviders) -> Self {
        self.options.enabled_providers = providers;
        self
    }

    /// Replace the default [`HttpClient`].
    #[must_use]
    pub fn requester(mut self, requester: Arc<dyn Requester>) -> Self {
        self.requester = Some(requester);
        self
    }

    /// Replace the default [`NoopCache`].
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace the default [`HttpImageProbe`].
    #[must_use]
    pub fn image_probe(mut self, probe: Arc<dyn ImageProbe>) -> Self {
        self.image_probe = Some(probe);
        self
    }

    pub fn build(self) -> Result<Engine> {
        debug!("init");

        let requester: Arc<dyn Requester> = match self.requester {
            Some(requester) => requester,
            None => Arc::new(HttpClient::with_config(&self.options.request)?),
        };
        let cache: Arc<dyn Cache> = self.cache.unwrap_or_else(|| Arc::new(NoopCache));
        let probe: Arc<dyn ImageProbe> = self
            .image_probe
            .unwrap_or_else(|| Arc::new(HttpImageProbe::new(Arc::clone(&requester))));

        let mut whitelist = Whitelist::builtin()?;
        whitelist.extend(self.options.whitelist.clone());

        let mut engine = Engine {
            image_sizes: ImageSizes::new(Arc::clone(&cache), probe),
            options: self.options,
            requester,
            cache,
            whitelist,
            registry: Registry::new(),
            domains: DomainTable::default(),
            compiled: RwLock::new(None),
            templates: Templates::builtin(),
            aliases: HashMap::from([("block".to_string(), vec!["player".to_string(), "rich".to_string()])]),
        };

        for fetcher in fetchers::builtin() {
            engine.add_fetcher(fetcher);
        }
        for mixin in mixins::builtin() {
            engine.add_mixin(mixin);
        }
        for mixin in mixins_after::builtin() {
            engine.add_mixin_after(mixin);
        }
        for domain in domains::builtin()? {
            engine.add_domain(domain)?;
        }

        if let EnabledProviders::Only(ids) = engine.options.enabled_providers.clone() {
            engine.for_each_domain(|rule| rule.enabled = false);
            for id in ids {
                match engine.domains.get_mut(&id) {
                    Some(rule) => rule.enabled = true,
                    None => engine.add_domain(id.as_str())?,
                }
            }
        }

        debug!("init: done");
        Ok(engine)
    }
}

/// URL embed resolver.
///
/// # Example
///
/// ```rust,no_run
/// use embedkit::Engine;
///
/// # async fn example() -> embedkit::Result<()> {
/// let engine = Engine::new()?;
///
/// if let Some(record) = engine.resolve("https://vimeo.com/135373919").await? {
///     println!("{} ({} snippets)", record.meta.title, record.snippets.len());
/// }
///
/// if let Some(rendered) = engine.render("https://vimeo.com/135373919", &["block", "inline"]).await? {
///     println!("{}: {}", rendered.kind, rendered.html);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    options: EngineOptions,
    requester: Arc<dyn Requester>,
    cache: Arc<dyn Cache>,
    image_sizes: ImageSizes,
    whitelist: Whitelist,
    registry: Registry,
    domains: DomainTable,
    /// `None` after any mutation; rebuilt on next resolve.
    compiled: RwLock<Option<Arc<CompiledTable>>>,
    templates: Templates,
    aliases: HashMap<String, Vec<String>>,
}

impl Engine {
    /// Engine with default capabilities and options.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Engine with options loaded from the default config file.
    pub fn from_default_config() -> Result<Self> {
        Self::builder().options(EngineOptions::load_default()?).build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    // ═══════════════════════════════════════════════════════════════════════
    // REGISTRATION
    // ═══════════════════════════════════════════════════════════════════════

    /// Register a fetcher, replacing one with the same id.
    pub fn add_fetcher(&mut self, fetcher: Fetcher) {
        self.registry.add_fetcher(fetcher);
        self.invalidate();
    }

    /// Register a mixin, replacing one with the same id.
    pub fn add_mixin(&mut self, mixin: Mixin) {
        self.registry.add_mixin(mixin);
        self.invalidate();
    }

    /// Register a mixin-after, replacing one with the same id.
    pub fn add_mixin_after(&mut self, mixin: Mixin) {
        self.registry.add_mixin_after(mixin);
        self.invalidate();
    }

    /// Add a domain rule (or a bare domain name), replacing one with the
    /// same id.
    pub fn add_domain(&mut self, domain: impl Into<Domain>) -> Result<()> {
        let rule = domain.into().into_rule(&self.options.enabled_providers)?;
        debug!("add domain {} (enabled: {})", rule.id, rule.enabled);
        self.domains.insert(rule);
        self.invalidate();
        Ok(())
    }

    /// Visit every rule in registration order, allowing mutation.
    pub fn for_each_domain(&mut self, mut f: impl FnMut(&mut DomainRule)) {
        for rule in self.domains.iter_mut() {
            f(rule);
        }
        self.invalidate();
    }

    pub fn rule(&self, id: &str) -> Option<&DomainRule> {
        self.domains.get(id)
    }

    /// Register a template under `<domain>_<format>` or `default_<format>`.
    pub fn add_template(&mut self, key: impl Into<String>, template: Arc<dyn Template>) {
        self.templates.insert(key, template);
    }

    /// Map a format name to an ordered list of formats.
    pub fn add_alias(&mut self, name: impl Into<String>, formats: Vec<String>) {
        self.aliases.insert(name.into(), formats);
    }

    /// Add or replace a whitelist entry.
    pub fn add_whitelist(&mut self, domain: impl Into<String>, entry: serde_json::Value) {
        self.whitelist.insert(domain, entry);
    }

    fn invalidate(&mut self) {
        *self
            .compiled
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CAPABILITIES (for steps)
    // ═══════════════════════════════════════════════════════════════════════

    /// Perform a request through the injected requester.
    pub async fn request(&self, url: &str, options: &RequestOptions) -> Result<HttpResponse> {
        self.requester.request(url, options).await
    }

    pub fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    /// Dimensions of a remote image, deduplicated and cached.
    pub async fn image_size(&self, url: &str) -> Result<Dimensions> {
        self.image_sizes.get(url).await
    }

    /// The compiled table, building it if a mutation dropped it.
    pub fn compiled(&self) -> Result<Arc<CompiledTable>> {
        if let Some(table) = self
            .compiled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(Arc::clone(table));
        }

        let mut slot = self.compiled.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(table) = slot.as_ref() {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(compile(&self.registry, &self.domains)?);
        *slot = Some(Arc::clone(&table));
        Ok(table)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // RESOLVE
    // ═══════════════════════════════════════════════════════════════════════

    /// Resolve a URL into a record.
    ///
    /// Returns `Ok(None)` when the URL has no host or no enabled domain
    /// claims it. Any step, request or cache failure aborts the resolution
    /// and nothing is cached.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn resolve(&self, url: &str) -> Result<Option<ResultRecord>> {
        debug!("info");

        let Some(src) = sanitize_url(url) else {
            debug!("info: skip - bad url");
            return Ok(None);
        };

        let table = self.compiled()?;
        let Some((domain_id, plan)) = table.find(&src) else {
            debug!("info: skip - rule not found");
            return Ok(None);
        };

        let whitelist = self.whitelist.lookup(domain_id).cloned();

        if let Some(cached) = self.cache.get(&src).await.inspect_err(|e| {
            warn!("Resolution of {} aborted in cache read: {}", src, e);
        })? {
            match serde_json::from_value::<CachedRecord>(cached) {
                Ok(CachedRecord { info: Some(record), .. }) => {
                    debug!("info: done - from cache");
                    return Ok(Some(record));
                }
                Ok(_) => {}
                Err(e) => warn!("Ignoring malformed cache entry {}: {}", src, e),
            }
        }

        let mut env = Env::new(self, src.clone(), domain_id);
        env.whitelist = whitelist;
        env.config = self
            .domains
            .get(domain_id)
            .map(|rule| rule.config.clone())
            .unwrap_or_default();

        run_phase(&mut env, "fetchers", plan.fetchers.iter().map(|f| &f.handler)).await?;
        run_phase(&mut env, "mixins", plan.mixins.iter()).await?;
        run_phase(&mut env, "mixins-after", plan.mixins_after.iter()).await?;

        let entry = serde_json::to_value(CachedRecord {
            info: Some(env.result.clone()),
            ts: now_millis(),
        })?;
        self.cache.set(&src, entry).await.inspect_err(|e| {
            warn!("Resolution of {} aborted in cache write: {}", src, e);
        })?;

        debug!("info: done");
        Ok(Some(env.result))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // RENDER
    // ═══════════════════════════════════════════════════════════════════════

    /// Render a URL or a resolved record in the first format that works.
    ///
    /// `formats` is in priority order; aliases (`block`) expand in place.
    /// A template failure moves on to the next format. Returns `Ok(None)`
    /// when the URL resolves to nothing or no format renders.
    #[instrument(skip(self, target))]
    pub async fn render<'a>(
        &self,
        target: impl Into<RenderTarget<'a>>,
        formats: &[&str],
    ) -> Result<Option<Rendered>> {
        debug!("render");

        let candidates = self.expand_aliases(formats);

        let resolved;
        let record = match target.into() {
            RenderTarget::Record(record) => record,
            RenderTarget::Url(url) => {
                resolved = self.resolve(url).await?;
                match resolved.as_ref() {
                    Some(record) => record,
                    None => return Ok(None),
                }
            }
        };

        Ok(self.render_record(record, &candidates))
    }

    /// `(format, alias it came from)` in priority order.
    fn expand_aliases(&self, formats: &[&str]) -> Vec<(String, Option<String>)> {
        formats
            .iter()
            .flat_map(|format| match self.aliases.get(*format) {
                Some(expanded) => expanded
                    .iter()
                    .map(|f| (f.clone(), Some((*format).to_string())))
                    .collect::<Vec<_>>(),
                None => vec![((*format).to_string(), None)],
            })
            .collect()
    }

    fn render_record(&self, record: &ResultRecord, candidates: &[(String, Option<String>)]) -> Option<Rendered> {
        let data = TemplateData::new(record);

        for (format, alias) in candidates {
            let Some(template) = self.templates.find(&record.domain, format) else {
                continue;
            };
            match template.render(&data) {
                Ok(html) => {
                    debug!("render: done");
                    return Some(Rendered {
                        html: html.trim().to_string(),
                        kind: alias.clone().unwrap_or_else(|| format.clone()),
                    });
                }
                Err(e) => debug!("render: {} skipped: {}", format, e),
            }
        }
        None
    }
}

async fn run_phase<'h>(
    env: &mut Env<'_>,
    phase: &str,
    steps: impl Iterator<Item = &'h Handler>,
) -> Result<()> {
    for step in steps {
        if let Err(e) = step.run(env).await {
            warn!("Resolution of {} aborted in {}: {}", env.src, phase, e);
            return Err(e);
        }
    }
    Ok(())
}

/// Parse `url` and drop userinfo. `None` when there is no host.
fn sanitize_url(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    if parsed.host_str().is_none_or(str::is_empty) {
        return None;
    }
    // Only fails for cannot-be-a-base URLs, which have no host.
    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);
    Some(parsed.into())
}
