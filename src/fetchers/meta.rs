//! Page metadata fetcher.
//!
//! Downloads the page and collects:
//! - every `<head><meta>` with a name (`property` or `name`) and a value
//!   (`content`, `value` or `src`)
//! - the `<title>` text, as meta `html-title`
//! - every `<head><link>`, grouped by `rel` (or `name`)

use async_trait::async_trait;
use indexmap::IndexMap;
use scraper::{Html, Selector};
use tracing::debug;

use crate::env::{Env, LinkAttrs, MetaTag};
use crate::error::{EmbedError, Result};
use crate::http_client::RequestOptions;
use crate::registry::Step;

pub struct MetaFetcher;

#[async_trait]
impl Step for MetaFetcher {
    async fn run(&self, env: &mut Env<'_>) -> Result<()> {
        debug!("meta: request {}", env.src);

        let response = env
            .engine
            .request(&env.src, &RequestOptions::default())
            .await?;
        if response.status != 200 {
            return Err(EmbedError::http("Meta fetcher", response.status));
        }

        let (meta, links) = parse_head(&response.text())?;
        env.data.meta = meta;
        env.data.links = links;

        debug!("meta: done");
        Ok(())
    }
}

/// Head records of an HTML document.
pub fn parse_head(html: &str) -> Result<(Vec<MetaTag>, IndexMap<String, Vec<LinkAttrs>>)> {
    let document = Html::parse_document(html);
    let meta_selector = selector("head meta")?;
    let title_selector = selector("head title")?;
    let link_selector = selector("head link")?;

    let mut meta = Vec::new();
    for element in document.select(&meta_selector) {
        let attr = |name| element.value().attr(name).filter(|v: &&str| !v.is_empty());
        let Some(name) = attr("property").or_else(|| attr("name")) else {
            continue;
        };
        let Some(value) = attr("content")
            .or_else(|| attr("value"))
            .or_else(|| attr("src"))
        else {
            continue;
        };
        meta.push(MetaTag::new(name, value));
    }

    for element in document.select(&title_selector) {
        meta.push(MetaTag::new("html-title", element.text().collect::<String>()));
    }

    let mut links: IndexMap<String, Vec<LinkAttrs>> = IndexMap::new();
    for element in document.select(&link_selector) {
        let rel = element
            .value()
            .attr("rel")
            .or_else(|| element.value().attr("name"))
            .unwrap_or_default();
        let attrs = element
            .value()
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        links.entry(rel.to_string()).or_default().push(attrs);
    }

    Ok((meta, links))
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| EmbedError::Content(format!("invalid selector {css}: {e:?}")))
}
