//! Twitter card thumbnails and players.

use tracing::debug;

use crate::env::{find_meta, Env};
use crate::error::Result;
use crate::record::{MediaValue, Snippet};
use crate::whitelist::{allows, check};

/// `twitter:image*` -> image thumbnails.
pub fn thumbnail(env: &mut Env<'_>) -> Result<()> {
    debug!("twitter-thumbnail");

    let meta = &env.data.meta;
    let card = find_meta(meta, &["twitter:card"]);

    if card == Some("photo") && !allows(env.whitelist.as_ref(), "twitter.photo") {
        debug!("twitter-thumbnail: skip");
        return Ok(());
    }

    let mut snippets = Vec::new();

    if card == Some("gallery") {
        for i in 0..4 {
            let names = [format!("twitter:image{i}:src"), format!("twitter:image{i}")];
            if let Some(href) = find_meta(meta, &[names[0].as_str(), names[1].as_str()]) {
                snippets.push(Snippet::new(Some("image"), href, &["thumbnail", "twitter"]));
            }
        }
    }

    if let Some(href) = find_meta(meta, &["twitter:image:src", "twitter:image"]) {
        let mut snippet = Snippet::new(Some("image"), href, &["thumbnail", "twitter"]);
        snippet.set_media("width", find_meta(meta, &["twitter:image:width"]).map(MediaValue::from));
        snippet.set_media("height", find_meta(meta, &["twitter:image:height"]).map(MediaValue::from));
        snippets.push(snippet);
    }

    env.result.snippets.extend(snippets);
    debug!("twitter-thumbnail: done");
    Ok(())
}

/// `twitter:player` -> player, when the whitelist allows it.
pub fn player(env: &mut Env<'_>) -> Result<()> {
    debug!("twitter-player");

    let wl = env.whitelist.as_ref();
    if !allows(wl, "twitter.player") {
        debug!("twitter-player: skip");
        return Ok(());
    }

    let meta = &env.data.meta;
    let Some(href) = find_meta(meta, &["twitter:player:url", "twitter:player:src", "twitter:player"]) else {
        debug!("twitter-player: skip");
        return Ok(());
    };

    let mut snippet = Snippet::new(None, href, &["player", "twitter", "responsive"]);
    snippet.set_media("width", find_meta(meta, &["twitter:player:width"]).map(MediaValue::from));
    snippet.set_media("height", find_meta(meta, &["twitter:player:height"]).map(MediaValue::from));

    if check(wl, "twitter.player", "html5") {
        snippet.add_tag("html5");
        snippet.kind = Some("text/html".to_string());
    }
    if check(wl, "twitter.player", "autoplay") {
        snippet.add_tag("autoplay");
    }

    env.result.snippets.push(snippet);
    debug!("twitter-player: done");
    Ok(())
}
