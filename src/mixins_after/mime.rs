//! Content type detection for untyped snippets.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::env::Env;
use crate::error::{EmbedError, Result};
use crate::http_client::RequestOptions;
use crate::record::Snippet;
use crate::registry::Step;

/// Types known from the file extension alone.
fn type_from_extension(href: &str) -> Option<&'static str> {
    let url = Url::parse(href).ok()?;
    match Path::new(url.path()).extension()?.to_str()? {
        "mp4" => Some("video/mp4"),
        "ogg" => Some("video/ogg"),
        "webm" => Some("video/webm"),
        _ => None,
    }
}

/// Fills `type` from the href extension, else from a HEAD request.
///
/// Snippets whose type stays unknown are dropped.
pub struct MimeDetect;

#[async_trait]
impl Step for MimeDetect {
    async fn run(&self, env: &mut Env<'_>) -> Result<()> {
        debug!("mime-detect");

        let engine = env.engine;
        let snippets = std::mem::take(&mut env.result.snippets);
        let mut kept: Vec<Snippet> = Vec::with_capacity(snippets.len());

        for mut snippet in snippets {
            if snippet.kind.is_some() {
                kept.push(snippet);
                continue;
            }
            let Some(href) = snippet.href.clone() else {
                continue;
            };

            if let Some(kind) = type_from_extension(&href) {
                snippet.kind = Some(kind.to_string());
                kept.push(snippet);
                continue;
            }

            debug!("mime-detect: request {}", href);
            let response = engine.request(&href, &RequestOptions::head()).await?;
            if response.status != 200 {
                return Err(EmbedError::http("Mime-detect mixin after handler", response.status));
            }

            let kind = response
                .content_type()
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            if kind.is_empty() {
                debug!("mime-detect: drop {}", href);
                continue;
            }
            if kind == "text/html" {
                snippet.add_tag("html5");
            }
            snippet.kind = Some(kind);
            kept.push(snippet);
        }

        env.result.snippets = kept;
        debug!("mime-detect: done");
        Ok(())
    }
}
