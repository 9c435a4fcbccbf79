//! Plugin registry: the three step catalogs.
//!
//! # Architecture
//!
//! - [`Step`]: async trait every pipeline step implements
//! - [`Fetcher`]: data acquisition step with a run priority
//! - [`Mixin`]: result-shaping step; also used for mixins-after
//! - [`Registry`]: id -> step maps, kept in registration order
//!
//! Registering an id that already exists replaces the step in place
//! (its position in wildcard expansion does not change).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::env::Env;
use crate::error::Result;

/// One pipeline step.
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, env: &mut Env<'_>) -> Result<()>;
}

/// Shared handle to a step. Identity (pointer equality) is what
/// deduplication in compiled plans is based on.
pub type Handler = Arc<dyn Step>;

/// Wraps a synchronous closure as a [`Step`].
pub struct FnStep<F>(F);

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&mut Env<'_>) -> Result<()> + Send + Sync,
{
    async fn run(&self, env: &mut Env<'_>) -> Result<()> {
        (self.0)(env)
    }
}

/// Build a [`Handler`] from a synchronous closure.
pub fn step_fn<F>(f: F) -> Handler
where
    F: Fn(&mut Env<'_>) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(FnStep(f))
}

/// `true` when both handles point at the same step.
pub fn same_handler(a: &Handler, b: &Handler) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Data acquisition step.
#[derive(Clone)]
pub struct Fetcher {
    pub id: String,
    /// Lower runs first. Defaults to `0`.
    pub priority: i32,
    pub handler: Handler,
}

impl Fetcher {
    pub fn new(id: impl Into<String>, handler: Handler) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            handler,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Result-shaping step (mixin or mixin-after).
#[derive(Clone)]
pub struct Mixin {
    pub id: String,
    pub handler: Handler,
}

impl Mixin {
    pub fn new(id: impl Into<String>, handler: Handler) -> Self {
        Self {
            id: id.into(),
            handler,
        }
    }
}

impl fmt::Debug for Mixin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mixin")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// The three step catalogs.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    fetchers: IndexMap<String, Fetcher>,
    mixins: IndexMap<String, Mixin>,
    mixins_after: IndexMap<String, Mixin>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fetcher(&mut self, fetcher: Fetcher) {
        self.fetchers.insert(fetcher.id.clone(), fetcher);
    }

    pub fn add_mixin(&mut self, mixin: Mixin) {
        self.mixins.insert(mixin.id.clone(), mixin);
    }

    pub fn add_mixin_after(&mut self, mixin: Mixin) {
        self.mixins_after.insert(mixin.id.clone(), mixin);
    }

    pub fn fetcher(&self, id: &str) -> Option<&Fetcher> {
        self.fetchers.get(id)
    }

    pub fn mixin(&self, id: &str) -> Option<&Mixin> {
        self.mixins.get(id)
    }

    pub fn mixin_after(&self, id: &str) -> Option<&Mixin> {
        self.mixins_after.get(id)
    }

    /// Fetchers in registration order.
    pub fn fetchers(&self) -> impl Iterator<Item = &Fetcher> {
        self.fetchers.values()
    }

    /// Mixins in registration order.
    pub fn mixins(&self) -> impl Iterator<Item = &Mixin> {
        self.mixins.values()
    }

    /// Mixins-after in registration order.
    pub fn mixins_after(&self) -> impl Iterator<Item = &Mixin> {
        self.mixins_after.values()
    }
}
