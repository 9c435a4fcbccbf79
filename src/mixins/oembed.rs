//! Snippets derived from the oEmbed document.

use scraper::{Html, Selector};
use tracing::debug;

use crate::env::Env;
use crate::error::{EmbedError, Result};
use crate::record::{MediaValue, Snippet};
use crate::whitelist::{allows, check};

/// Attributes of the first `<iframe>` in an oEmbed html fragment.
struct Iframe {
    src: Option<String>,
    width: Option<String>,
    height: Option<String>,
}

fn find_iframe(html: &str) -> Result<Option<Iframe>> {
    let selector =
        Selector::parse("iframe").map_err(|e| EmbedError::Content(format!("Invalid selector: {e:?}")))?;
    let fragment = Html::parse_fragment(html);

    Ok(fragment.select(&selector).next().map(|el| {
        let attr = |name: &str| el.value().attr(name).map(str::to_string);
        Iframe {
            src: attr("src"),
            width: attr("width"),
            height: attr("height"),
        }
    }))
}

/// `html5` if present, else `html`.
fn embed_html(env: &Env<'_>) -> Option<String> {
    env.oembed_str("html5").or_else(|| env.oembed_str("html"))
}

fn is_type(env: &Env<'_>, kind: &str) -> bool {
    env.oembed_str("type").as_deref() == Some(kind)
}

/// `type: video` -> html5 player from the iframe in `html`.
pub fn player(env: &mut Env<'_>) -> Result<()> {
    debug!("oembed-player");

    let wl = env.whitelist.as_ref();
    if env.data.oembed.is_none() || !allows(wl, "oembed.video") || !is_type(env, "video") {
        debug!("oembed-player: skip");
        return Ok(());
    }

    let iframe = match embed_html(env) {
        Some(html) => find_iframe(&html)?,
        None => None,
    };
    if let Some(href) = iframe.and_then(|i| i.src).filter(|s| !s.is_empty()) {
        let mut snippet = Snippet::new(Some("text/html"), href, &["player", "oembed", "responsive", "html5"]);
        for key in ["width", "height", "duration"] {
            snippet.set_media(key, env.oembed_media(key));
        }
        if check(wl, "oembed.video", "autoplay") {
            snippet.add_tag("autoplay");
        }
        env.result.snippets.push(snippet);
    }

    debug!("oembed-player: done");
    Ok(())
}

/// `type: photo` -> image.
pub fn photo(env: &mut Env<'_>) -> Result<()> {
    debug!("oembed-photo");

    if !allows(env.whitelist.as_ref(), "oembed.photo") || !is_type(env, "photo") {
        debug!("oembed-photo: skip");
        return Ok(());
    }
    let Some(href) = env.oembed_str("url") else {
        debug!("oembed-photo: skip");
        return Ok(());
    };

    let mut snippet = Snippet::new(Some("image"), href, &["image", "oembed"]);
    snippet.set_media("width", env.oembed_media("width"));
    snippet.set_media("height", env.oembed_media("height"));
    env.result.snippets.push(snippet);

    debug!("oembed-photo: done");
    Ok(())
}

pub fn icon(env: &mut Env<'_>) -> Result<()> {
    image_field(env, "oembed-icon", "icon", &["image", "oembed"])
}

pub fn thumbnail(env: &mut Env<'_>) -> Result<()> {
    image_field(env, "oembed-thumbnail", "thumbnail", &["thumbnail", "oembed"])
}

/// `{prefix}_url` with `{prefix}_width` / `{prefix}_height` -> image.
fn image_field(env: &mut Env<'_>, id: &str, prefix: &str, tags: &[&str]) -> Result<()> {
    debug!("{}", id);

    let Some(href) = env.oembed_str(&format!("{prefix}_url")) else {
        debug!("{}: skip", id);
        return Ok(());
    };

    let mut snippet = Snippet::new(Some("image"), href, tags);
    snippet.set_media("width", env.oembed_media(&format!("{prefix}_width")));
    snippet.set_media("height", env.oembed_media(&format!("{prefix}_height")));
    env.result.snippets.push(snippet);

    debug!("{}: done", id);
    Ok(())
}

/// `type: rich` -> iframe player, or inline html when the whitelist says
/// `inline` (or the html carries no iframe).
pub fn rich(env: &mut Env<'_>) -> Result<()> {
    debug!("oembed-rich");

    let wl = env.whitelist.as_ref();
    if !is_type(env, "rich") || !allows(wl, "oembed.rich") {
        debug!("oembed-rich: skip");
        return Ok(());
    }

    let mut snippet = Snippet {
        kind: Some("text/html".to_string()),
        tags: vec!["oembed".to_string(), "rich".to_string()],
        ..Snippet::default()
    };
    snippet.set_media("width", env.oembed_media("width"));
    snippet.set_media("height", env.oembed_media("height"));

    for tag in ["autoplay", "reader", "player", "html5"] {
        if check(wl, "oembed.rich", tag) {
            snippet.add_tag(tag);
        }
    }

    let html = embed_html(env);
    let iframe = match html.as_deref() {
        Some(html) if !check(wl, "oembed.rich", "inline") => find_iframe(html)?,
        _ => None,
    };

    match iframe {
        Some(iframe) => {
            snippet.href = iframe.src;
            for (key, value) in [("width", iframe.width), ("height", iframe.height)] {
                let present = snippet.media.get(key).is_some_and(MediaValue::is_truthy);
                if !present {
                    snippet.set_media(key, value.filter(|v| !v.is_empty()).map(MediaValue::from));
                }
            }
        }
        None => snippet.html = Some(html.unwrap_or_default()),
    }

    env.result.snippets.push(snippet);
    debug!("oembed-rich: done");
    Ok(())
}
