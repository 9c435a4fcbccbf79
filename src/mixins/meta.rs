//! Page title, site name and description.

use tracing::debug;

use crate::env::{find_meta, Env, MetaTag};
use crate::error::Result;

pub fn meta(env: &mut Env<'_>) -> Result<()> {
    debug!("meta");

    let records = &env.data.meta;

    // WordPress.com misuses the `title` meta.
    let meta_title = present(records, &["title"]).filter(|t| !t.to_lowercase().contains("wordpress.com"));

    let title = env
        .oembed_str("title")
        .or_else(|| present(records, &["twitter:title", "og:title", "dc.title", "html-title"]))
        .or(meta_title)
        .unwrap_or_default();

    let site = env
        .oembed_str("site_name")
        .or_else(|| env.oembed_str("provider_name"))
        .or_else(|| {
            present(
                records,
                &["og:site_name", "twitter:site:value", "twitter:site", "application-name"],
            )
        })
        .unwrap_or_default();

    let description = env
        .oembed_str("description")
        .or_else(|| present(records, &["twitter:description", "og:description", "description"]))
        .unwrap_or_default();

    env.result.meta.title = title;
    env.result.meta.site = site;
    env.result.meta.description = description;

    debug!("meta: done");
    Ok(())
}

fn present(records: &[MetaTag], names: &[&str]) -> Option<String> {
    find_meta(records, names)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
