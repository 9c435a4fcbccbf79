//! YouTube: oEmbed endpoint only, no page scraping.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;
use url::Url;

use crate::env::Env;
use crate::error::{EmbedError, Result};
use crate::fetchers::oembed::parse_json;
use crate::http_client::RequestOptions;
use crate::registry::Step;
use crate::rules::{Domain, StepRef};

const PATTERNS: [&str; 8] = [
    r"(?i)^https?://(?:www\.)?youtube\.com/?watch\?(?:[^&]*&)*v=([a-zA-Z0-9_-]+)",
    r"(?i)^https?://www\.youtube\.com/embed/([a-zA-Z0-9_-]+)",
    r"(?i)^https?://www\.youtube\.com/v/([a-zA-Z0-9_-]+)",
    r"(?i)^https?://www\.youtube\.com/user/[a-zA-Z0-9_-]+\?v=([a-zA-Z0-9_-]+)",
    r"(?i)^https?://youtu\.be/([a-zA-Z0-9_-]+)",
    r"(?i)^https?://m\.youtube\.com/?watch\?(?:[^&]*&)*v=([a-zA-Z0-9_-]+)",
    r"(?i)^https?://m\.youtube\.com/#/watch\?(?:[^&]*&)*v=([a-zA-Z0-9_-]+)",
    r"(?i)^https?://www\.youtube-nocookie\.com/v/([a-zA-Z0-9_-]+)",
];

const OEMBED_ENDPOINT: &str = "http://www.youtube.com/oembed?format=json&url=";

static ASTRAL_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\\+)(U[0-9a-fA-F]{8})").expect("valid regex"));

pub fn domain() -> Result<Domain> {
    Ok(Domain::new("youtube.com")
        .patterns(&PATTERNS)?
        .fetchers(vec![StepRef::Inline(Arc::new(YoutubeFetcher))])
        .mixins(vec!["meta".into(), "oembed-player".into(), "oembed-thumbnail".into()]))
}

pub struct YoutubeFetcher;

#[async_trait]
impl Step for YoutubeFetcher {
    async fn run(&self, env: &mut Env<'_>) -> Result<()> {
        debug!("youtube");

        let endpoint = format!("{OEMBED_ENDPOINT}{}", urlencoding::encode(&video_url(&env.src)));

        debug!("youtube: request {}", endpoint);
        let response = env
            .engine
            .request(&endpoint, &RequestOptions::default())
            .await?;
        if response.status != 200 {
            return Err(EmbedError::http("YouTube fetcher", response.status));
        }

        let body = response.text();
        env.data.oembed = Some(parse_json(&repair_escapes(&body), "YouTube fetcher")?);

        debug!("youtube: done");
        Ok(())
    }
}

/// The URL to ask the oEmbed endpoint about.
///
/// `http://m.youtube.com/#/watch?v=ID` loses its hash prefix, and the
/// `list` parameter is dropped (the endpoint answers with a playlist
/// player missing the video index).
fn video_url(src: &str) -> String {
    let Ok(mut url) = Url::parse(src) else {
        return src.to_string();
    };
    if url.path() == "/" && url.fragment().is_some() {
        match Url::parse(&src.replacen("/#/", "/", 1)) {
            Ok(fixed) => url = fixed,
            Err(_) => return src.to_string(),
        }
    }

    if url.query_pairs().any(|(k, _)| k == "list") {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "list")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }
    }
    url.to_string()
}

/// YouTube writes astral characters as `\UXXXXXXXX`, which is not valid
/// JSON. Unescaped occurrences are replaced with the character itself.
fn repair_escapes(body: &str) -> Cow<'_, str> {
    ASTRAL_ESCAPE.replace_all(body, |caps: &Captures<'_>| {
        let slashes = &caps[1];
        if slashes.len() % 2 == 0 {
            return caps[0].to_string();
        }
        match u32::from_str_radix(&caps[2][1..], 16).ok().and_then(char::from_u32) {
            Some(c) => format!("{}{}", &slashes[1..], c),
            None => caps[0].to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::RegexSet;

    #[test]
    fn patterns_match_known_forms() {
        let set = RegexSet::new(PATTERNS).unwrap();
        for url in [
            "https://www.youtube.com/watch?v=jNQXAC9IVRw",
            "http://youtube.com/watch?feature=share&v=jNQXAC9IVRw",
            "https://youtu.be/jNQXAC9IVRw",
            "http://m.youtube.com/#/watch?v=jNQXAC9IVRw",
            "https://www.youtube-nocookie.com/v/jNQXAC9IVRw",
            "HTTPS://WWW.YOUTUBE.COM/embed/jNQXAC9IVRw",
        ] {
            assert!(set.is_match(url), "{url}");
        }
        assert!(!set.is_match("https://youtubexbe/jNQXAC9IVRw"));
        assert!(!set.is_match("https://www.youtube.com/feed/trending"));
    }

    #[test]
    fn hash_path_and_playlist_are_removed() {
        assert_eq!(
            video_url("http://m.youtube.com/#/watch?v=ID"),
            "http://m.youtube.com/watch?v=ID"
        );
        assert_eq!(
            video_url("https://www.youtube.com/watch?v=ID&list=PL1&t=10"),
            "https://www.youtube.com/watch?v=ID&t=10"
        );
        assert_eq!(
            video_url("https://www.youtube.com/watch?v=ID"),
            "https://www.youtube.com/watch?v=ID"
        );
    }

    #[test]
    fn astral_escapes_are_repaired() {
        assert_eq!(repair_escapes(r#"{"title":"\U0001f44d"}"#), "{\"title\":\"\u{1f44d}\"}");
        // Escaped backslash: left alone.
        assert_eq!(repair_escapes(r#"\\U0001f44d"#), r#"\\U0001f44d"#);
        assert_eq!(repair_escapes(r#"\\\U0001f44d"#), "\\\\\u{1f44d}");
        assert_eq!(repair_escapes("plain"), "plain");
    }
}
