//! `embedkit` - URL embed resolver
//!
//! Turns a content URL (video page, article, photo) into normalized embed
//! metadata and renders it as inline, player or rich HTML.
//!
//! # Features
//!
//! - **Domain rules**: regex-matched providers with their own step lists
//! - **Plugin pipeline**: fetchers, mixins and mixins-after, all replaceable
//! - **oEmbed / Open Graph / Twitter cards**: built-in extraction
//! - **Image probing**: deduplicated, cached dimension lookups
//! - **Templates**: inline, player and rich renderers with aliases
//!
//! # Example
//!
//! ```rust,no_run
//! use embedkit::Engine;
//!
//! #[tokio::main]
//! async fn main() -> embedkit::Result<()> {
//!     let mut engine = Engine::new()?;
//!     engine.add_domain("example.com")?;
//!
//!     if let Some(record) = engine.resolve("https://vimeo.com/135373919").await? {
//!         println!("{}: {} snippets", record.meta.title, record.snippets.len());
//!     }
//!
//!     if let Some(embed) = engine.render("https://example.com/article", &["inline"]).await? {
//!         println!("{}", embed.html);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod compile;
pub mod config;
pub mod domains;
pub mod engine;
pub mod env;
pub mod error;
pub mod fetchers;
pub mod http_client;
pub mod image_size;
pub mod mixins;
pub mod mixins_after;
pub mod record;
pub mod registry;
pub mod rules;
pub mod templates;
pub mod unique;
pub mod whitelist;

pub use cache::{Cache, MemoryCache, NoopCache};
pub use config::{EnabledProviders, EngineOptions, RequestConfig};
pub use engine::{Engine, EngineBuilder, RenderTarget, Rendered};
pub use env::{Env, MetaTag};
pub use error::{EmbedError, Result};
pub use http_client::{HttpClient, HttpResponse, RequestOptions, Requester};
pub use image_size::{Dimensions, HttpImageProbe, ImageProbe};
pub use record::{MediaValue, Meta, ResultRecord, Snippet};
pub use registry::{step_fn, Fetcher, Handler, Mixin, Step};
pub use rules::{Domain, DomainRule, StepRef};
pub use templates::{template_fn, Template, TemplateData};

/// Version of embedkit
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
