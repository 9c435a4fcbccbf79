//! Snippet merging and media cleanup.

use indexmap::IndexMap;
use tracing::debug;

use crate::env::Env;
use crate::error::Result;
use crate::record::{MediaValue, Snippet};

const DEFAULT_AUTOPLAY: &str = "autoplay=1";

/// Fold snippets sharing an href into the first one seen: tags are
/// united, later media values override.
pub fn merge(env: &mut Env<'_>) -> Result<()> {
    debug!("merge");

    let mut merged: IndexMap<Option<String>, Snippet> = IndexMap::new();
    for snippet in std::mem::take(&mut env.result.snippets) {
        match merged.get_mut(&snippet.href) {
            Some(first) => {
                for tag in &snippet.tags {
                    first.add_tag(tag);
                }
                first.media.extend(snippet.media);
            }
            None => {
                merged.insert(snippet.href.clone(), snippet);
            }
        }
    }
    env.result.snippets = merged.into_values().collect();

    debug!("merge: done");
    Ok(())
}

/// `media.autoplay` for html players tagged `autoplay`. The parameter
/// comes from the domain config `autoplay` key.
pub fn set_autoplay(env: &mut Env<'_>) -> Result<()> {
    debug!("set-autoplay");

    let param = env
        .config
        .get("autoplay")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_AUTOPLAY)
        .to_string();

    for snippet in &mut env.result.snippets {
        if snippet.is_kind("text/html") && snippet.has_tag("player") && snippet.has_tag("autoplay") {
            snippet.set_media("autoplay", Some(MediaValue::from(param.as_str())));
        }
    }

    debug!("set-autoplay: done");
    Ok(())
}

/// `width`, `height` and `duration` -> numbers. Values that do not parse,
/// are infinite or negative are removed; so are `width` and `height`
/// unless both remain.
pub fn convert_str_int(env: &mut Env<'_>) -> Result<()> {
    debug!("convert-str-int");

    for snippet in &mut env.result.snippets {
        let media = &mut snippet.media;

        for field in ["width", "height", "duration"] {
            let Some(value) = media.get(field).filter(|v| v.is_truthy()) else {
                continue;
            };
            match value.as_f64() {
                Some(n) if n.is_finite() && n >= 0.0 => {
                    media.insert(field.to_string(), MediaValue::Number(n));
                }
                _ => {
                    media.remove(field);
                }
            }
        }

        let truthy = |key: &str| media.get(key).is_some_and(MediaValue::is_truthy);
        if !truthy("width") || !truthy("height") {
            media.remove("width");
            media.remove("height");
        }
    }

    debug!("convert-str-int: done");
    Ok(())
}
