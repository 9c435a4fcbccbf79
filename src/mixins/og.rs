//! Open Graph players and images.
//!
//! A page may describe several videos or images; the records of each one
//! are split apart with [`group_meta`].

use tracing::debug;

use crate::env::{find_meta, group_meta, Env};
use crate::error::Result;
use crate::record::{MediaValue, Snippet};
use crate::whitelist::{allows, check};

const VIDEO_KEYS: [&str; 3] = ["og:video:url", "og:video:src", "og:video"];
const IMAGE_KEYS: [&str; 3] = ["og:image:url", "og:image:src", "og:image"];

/// `og:video*` -> players, when the whitelist allows `og.video`.
pub fn player(env: &mut Env<'_>) -> Result<()> {
    debug!("og-player");

    let wl = env.whitelist.as_ref();
    if !allows(wl, "og.video") {
        debug!("og-player: skip");
        return Ok(());
    }
    let autoplay = check(wl, "oembed.video", "autoplay");

    let mut snippets = Vec::new();
    for group in group_meta(&env.data.meta, "og:video", &VIDEO_KEYS) {
        let Some(href) = find_meta(&group, &VIDEO_KEYS) else {
            continue;
        };
        let mut snippet = Snippet::new(
            find_meta(&group, &["og:video:type"]),
            href,
            &["player", "og", "responsive"],
        );
        for (key, name) in [
            ("width", "og:video:width"),
            ("height", "og:video:height"),
            ("duration", "og:video:duration"),
        ] {
            snippet.set_media(key, find_meta(&group, &[name]).map(MediaValue::from));
        }
        if autoplay {
            snippet.add_tag("autoplay");
        }
        snippets.push(snippet);
    }

    env.result.snippets.extend(snippets);
    debug!("og-player: done");
    Ok(())
}

/// `og:image*` -> image thumbnails.
pub fn thumbnail(env: &mut Env<'_>) -> Result<()> {
    debug!("og-thumbnail");

    let mut snippets = Vec::new();
    for group in group_meta(&env.data.meta, "og:image", &IMAGE_KEYS) {
        let Some(href) = find_meta(&group, &IMAGE_KEYS) else {
            continue;
        };
        let mut snippet = Snippet::new(Some("image"), href, &["thumbnail", "og"]);
        snippet.set_media("width", find_meta(&group, &["og:image:width"]).map(MediaValue::from));
        snippet.set_media("height", find_meta(&group, &["og:image:height"]).map(MediaValue::from));
        snippets.push(snippet);
    }

    env.result.snippets.extend(snippets);
    debug!("og-thumbnail: done");
    Ok(())
}
