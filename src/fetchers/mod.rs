//! Built-in fetchers.
//!
//! - `meta` (priority -100): page `<head>` meta, title and link records
//! - `oembed`: the oEmbed document the page advertises
//!
//! `meta` runs first so that `oembed` can find the discovery links.

pub mod meta;
pub mod oembed;

use std::sync::Arc;

use crate::registry::Fetcher;

/// Built-in fetchers in registration order.
pub fn builtin() -> Vec<Fetcher> {
    vec![
        Fetcher::new("meta", Arc::new(meta::MetaFetcher)).with_priority(-100),
        Fetcher::new("oembed", Arc::new(oembed::OembedFetcher)),
    ]
}
