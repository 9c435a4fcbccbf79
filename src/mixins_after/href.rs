//! Snippet href fixes.

use tracing::debug;
use url::Url;

use crate::env::Env;
use crate::error::Result;

/// Make hrefs absolute against the source URL.
///
/// - `/img/icon.png` -> `https://example.com/img/icon.png`
/// - `//cdn.example.com/a.png` -> `https://cdn.example.com/a.png`
pub fn resolve_href(env: &mut Env<'_>) -> Result<()> {
    debug!("resolve-href");

    let Ok(base) = Url::parse(&env.src) else {
        debug!("resolve-href: skip");
        return Ok(());
    };

    for snippet in &mut env.result.snippets {
        let Some(href) = snippet.href.as_deref() else {
            continue;
        };
        if Url::parse(href).is_ok() {
            continue;
        }
        if let Ok(absolute) = base.join(href) {
            snippet.href = Some(absolute.to_string());
        }
    }

    debug!("resolve-href: done");
    Ok(())
}

/// Tag https snippets with `ssl`.
pub fn ssl_force(env: &mut Env<'_>) -> Result<()> {
    debug!("ssl-force");

    for snippet in &mut env.result.snippets {
        let secure = snippet
            .href
            .as_deref()
            .and_then(|href| Url::parse(href).ok())
            .is_some_and(|url| url.scheme() == "https");
        if secure {
            snippet.add_tag("ssl");
        }
    }

    debug!("ssl-force: done");
    Ok(())
}
