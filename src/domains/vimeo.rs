//! Vimeo.
//!
//! Fetching the html page for every video quickly gets the client
//! rate limited (HTTP 429 for a day), so only the oEmbed endpoint is
//! queried. Favicons and flash players are lost; the templates don't
//! need them.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::env::Env;
use crate::error::{EmbedError, Result};
use crate::fetchers::oembed::parse_json;
use crate::http_client::RequestOptions;
use crate::record::MediaValue;
use crate::registry::{step_fn, Step};
use crate::rules::{Domain, StepRef};

const PATTERNS: [&str; 3] = [
    r"(?i)^https?://(?:www\.)?vimeo\.com/.",
    r"(?i)^https?://player\.vimeo\.com/\d+",
    r"(?i)^https?://player\.vimeo\.com/video/\d+",
];

const OEMBED_ENDPOINT: &str = "https://vimeo.com/api/oembed.json?url=";

/// Width of the extra thumbnail variant.
const THUMBNAIL_WIDTH: f64 = 480.0;

static THUMBNAIL_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?/video/\d+_)\d+(\.jpg|\.webp)$").expect("valid regex"));

pub fn domain() -> Result<Domain> {
    Ok(Domain::new("vimeo.com")
        .patterns(&PATTERNS)?
        .fetchers(vec![StepRef::Inline(Arc::new(VimeoFetcher))])
        .mixins_after(vec![StepRef::Wildcard, StepRef::Inline(step_fn(resized_thumbnail))]))
}

pub struct VimeoFetcher;

#[async_trait]
impl Step for VimeoFetcher {
    async fn run(&self, env: &mut Env<'_>) -> Result<()> {
        debug!("vimeo");

        let endpoint = format!("{OEMBED_ENDPOINT}{}", urlencoding::encode(&env.src));
        let response = env
            .engine
            .request(&endpoint, &RequestOptions::default())
            .await?;
        if response.status != 200 {
            return Err(EmbedError::http("Vimeo fetcher", response.status));
        }

        env.data.oembed = Some(parse_json(&response.text(), "Vimeo fetcher")?);
        debug!("vimeo: done");
        Ok(())
    }
}

/// Add a 480px wide copy of the first sized thumbnail
/// (`.../video/123_640.jpg` -> `.../video/123_480.jpg`).
fn resized_thumbnail(env: &mut Env<'_>) -> Result<()> {
    let Some(thumbnail) = env.result.snippets.iter().find(|s| {
        s.is_kind("image") && s.has_tag("thumbnail") && s.href.as_deref().is_some_and(|h| THUMBNAIL_HREF.is_match(h))
    }) else {
        return Ok(());
    };

    let mut resized = thumbnail.clone();
    resized.href = resized.href.as_deref().map(|href| {
        THUMBNAIL_HREF
            .replace(href, format!("${{1}}{THUMBNAIL_WIDTH}${{2}}").as_str())
            .into_owned()
    });
    if let (Some(width), Some(height)) = (resized.media_f64("width"), resized.media_f64("height")) {
        resized.set_media("height", Some(MediaValue::Number(height / width * THUMBNAIL_WIDTH)));
    }
    resized.set_media("width", Some(MediaValue::Number(THUMBNAIL_WIDTH)));

    env.result.snippets.push(resized);
    Ok(())
}
