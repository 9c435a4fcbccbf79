//! Dimension lookup for image snippets without a size.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexSet;
use tracing::debug;
use url::Url;

use crate::env::Env;
use crate::error::Result;
use crate::image_size::Dimensions;
use crate::record::{MediaValue, Snippet};
use crate::registry::Step;

const SUPPORTED_EXTENSIONS: [&str; 10] = ["bmp", "gif", "jpg", "jpeg", "png", "psd", "tif", "tiff", "webp", "svg"];

fn has_size(snippet: &Snippet) -> bool {
    ["width", "height"]
        .iter()
        .all(|key| snippet.media.get(*key).is_some_and(MediaValue::is_truthy))
}

fn supported(href: &str) -> bool {
    Url::parse(href)
        .ok()
        .and_then(|url| {
            Path::new(url.path())
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
        })
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Href of a snippet that needs its dimensions probed.
fn needs_probe(snippet: &Snippet) -> Option<&str> {
    if !snippet.is_kind("image") || has_size(snippet) {
        return None;
    }
    snippet.href.as_deref().filter(|href| supported(href))
}

/// Probes every distinct image href lacking a size, in parallel.
///
/// Sizes are only applied when both axes are in `px`.
pub struct ImageSize;

#[async_trait]
impl Step for ImageSize {
    async fn run(&self, env: &mut Env<'_>) -> Result<()> {
        debug!("image-size");

        let hrefs: IndexSet<String> = env
            .result
            .snippets
            .iter()
            .filter_map(needs_probe)
            .map(str::to_string)
            .collect();
        if hrefs.is_empty() {
            debug!("image-size: skip");
            return Ok(());
        }

        let engine = env.engine;
        let lookups = hrefs.iter().map(|href| async move {
            debug!("image-size: load {}", href);
            engine.image_size(href).await.map(|dims| (href.as_str(), dims))
        });

        let mut sizes: HashMap<&str, Dimensions> = HashMap::with_capacity(hrefs.len());
        for result in join_all(lookups).await {
            let (href, dims) = result?;
            sizes.insert(href, dims);
        }

        for snippet in &mut env.result.snippets {
            let Some(dims) = needs_probe(snippet).and_then(|href| sizes.get(href)) else {
                continue;
            };
            if dims.is_px() {
                let (width, height) = (dims.width, dims.height);
                snippet.set_media("width", Some(MediaValue::Number(width)));
                snippet.set_media("height", Some(MediaValue::Number(height)));
            }
        }

        debug!("image-size: done");
        Ok(())
    }
}
