//! Site icons from `<link rel="*icon*">` and the `logo` meta.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::env::{find_meta, Env};
use crate::error::Result;
use crate::record::{MediaValue, Snippet};

static ICON_SIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(\d+)x(\d+)$").expect("valid regex"));

pub fn favicon(env: &mut Env<'_>) -> Result<()> {
    debug!("favicon");

    let mut snippets = Vec::new();
    for (rel, links) in &env.data.links {
        if !rel.contains("icon") {
            continue;
        }
        for link in links {
            let Some(href) = link.get("href").filter(|h| !h.is_empty()) else {
                continue;
            };
            let mut snippet = Snippet {
                kind: Some(link.get("type").cloned().unwrap_or_else(|| "image".to_string())),
                href: Some(href.clone()),
                tags: vec!["icon".to_string()],
                ..Snippet::default()
            };

            if let Some(caps) = link.get("sizes").and_then(|s| ICON_SIZE.captures(s)) {
                for (key, group) in [("width", 1), ("height", 2)] {
                    let size = caps[group].parse::<f64>().ok().map(MediaValue::Number);
                    snippet.set_media(key, size);
                }
            }
            snippets.push(snippet);
        }
    }

    env.result.snippets.extend(snippets);
    debug!("favicon: done");
    Ok(())
}

pub fn logo(env: &mut Env<'_>) -> Result<()> {
    debug!("logo");

    let Some(href) = find_meta(&env.data.meta, &["logo"]).filter(|l| !l.is_empty()) else {
        debug!("logo: skip");
        return Ok(());
    };

    let snippet = Snippet::new(Some("image"), href, &["icon"]);
    env.result.snippets.push(snippet);

    debug!("logo: done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::LinkAttrs;
    use crate::mixins::testing;

    fn link(pairs: &[(&str, &str)]) -> LinkAttrs {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn icon_links_with_sizes() {
        let engine = testing::engine();
        let mut env = testing::env(&engine, &[]);
        env.data.links.insert(
            "apple-touch-icon".into(),
            vec![link(&[("href", "/touch.png"), ("sizes", "152X152")])],
        );
        env.data.links.insert(
            "icon".into(),
            vec![link(&[("href", "/favicon.ico"), ("type", "image/x-icon"), ("sizes", "any")])],
        );
        env.data.links.insert("stylesheet".into(), vec![link(&[("href", "/a.css")])]);

        favicon(&mut env).unwrap();

        let snippets = &env.result.snippets;
        assert_eq!(snippets.len(), 2);
        assert!(snippets[0].is_kind("image"));
        assert_eq!(snippets[0].media_f64("width"), Some(152.0));
        assert_eq!(snippets[0].media_f64("height"), Some(152.0));
        assert!(snippets[1].is_kind("image/x-icon"));
        assert!(snippets[1].media.is_empty());
    }

    #[test]
    fn icon_links_without_href_are_skipped() {
        let engine = testing::engine();
        let mut env = testing::env(&engine, &[]);
        env.data.links.insert(
            "icon".into(),
            vec![
                link(&[("sizes", "16x16")]),
                link(&[("href", "")]),
                link(&[("href", "/favicon.png")]),
            ],
        );

        favicon(&mut env).unwrap();

        assert_eq!(env.result.snippets.len(), 1);
        assert_eq!(env.result.snippets[0].href.as_deref(), Some("/favicon.png"));
    }

    #[test]
    fn logo_meta() {
        let engine = testing::engine();
        let mut env = testing::env(&engine, &[("logo", "https://example.com/logo.png")]);
        logo(&mut env).unwrap();
        assert_eq!(env.result.snippets[0].tags, vec!["icon"]);

        let mut env = testing::env(&engine, &[]);
        logo(&mut env).unwrap();
        assert!(env.result.snippets.is_empty());
    }
}
