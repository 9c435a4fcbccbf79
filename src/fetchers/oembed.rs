//! oEmbed discovery fetcher.
//!
//! Follows the first `alternate` (or `alternative`, as flickr spells it)
//! link whose type is `(application|text)/(json|xml)+oembed` and stores
//! the document in `env.data.oembed`.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::env::Env;
use crate::error::{EmbedError, Result};
use crate::http_client::RequestOptions;
use crate::registry::Step;

static OEMBED_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(application|text)/(xml|json)\+oembed$").expect("valid regex"));

pub struct OembedFetcher;

#[async_trait]
impl Step for OembedFetcher {
    async fn run(&self, env: &mut Env<'_>) -> Result<()> {
        debug!("oembed");

        let Some(href) = discovery_link(env) else {
            debug!("oembed: skip");
            return Ok(());
        };

        debug!("oembed: request {}", href);
        let response = env
            .engine
            .request(&href, &RequestOptions::default())
            .await?;
        if response.status != 200 {
            return Err(EmbedError::http("Oembed fetcher", response.status));
        }

        let content_type = response.content_type().to_ascii_lowercase();
        let document = if content_type.starts_with("application/json") {
            parse_json(&response.text(), "Oembed fetcher")?
        } else if content_type.starts_with("text/xml") || content_type.starts_with("application/xml") {
            parse_xml(&response.text())?
        } else {
            return Err(EmbedError::Mime(format!(
                "Oembed fetcher: Unknown oembed response content-type: {}",
                response.content_type()
            )));
        };

        env.data.oembed = Some(document);
        debug!("oembed: done");
        Ok(())
    }
}

fn discovery_link(env: &Env<'_>) -> Option<String> {
    ["alternate", "alternative"]
        .iter()
        .filter_map(|rel| env.data.links.get(*rel))
        .flatten()
        .filter(|link| link.get("type").is_some_and(|t| OEMBED_TYPE.is_match(t)))
        .find_map(|link| link.get("href").cloned())
}

/// Parse a JSON oEmbed document. `context` prefixes the error message.
pub fn parse_json(body: &str, context: &str) -> Result<Map<String, Value>> {
    serde_json::from_str(body)
        .map_err(|_| EmbedError::Content(format!("{context}: Can't parse oembed JSON response")))
}

/// Parse an XML oEmbed document: each child of the `<oembed>` root becomes
/// a string field.
pub fn parse_xml(body: &str) -> Result<Map<String, Value>> {
    let xml_error =
        |e: quick_xml::Error| EmbedError::Content(format!("Oembed fetcher: Can't parse oembed XML response: {e}"));

    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut fields = Map::new();
    let mut in_root = false;
    // Field being read and its text; `depth` counts elements nested in it.
    let mut field: Option<(String, String)> = None;
    let mut depth = 0usize;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if !in_root {
                    in_root = name == "oembed";
                } else if field.is_none() {
                    field = Some((name, String::new()));
                } else {
                    depth += 1;
                }
            }
            Event::Empty(e) if in_root && field.is_none() => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                fields.insert(name, Value::String(String::new()));
            }
            Event::Text(t) => {
                if let Some((_, text)) = field.as_mut() {
                    text.push_str(&t.unescape().map_err(xml_error)?);
                }
            }
            Event::CData(c) => {
                if let Some((_, text)) = field.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                if depth > 0 {
                    depth -= 1;
                } else if let Some((name, text)) = field.take() {
                    fields.insert(name, Value::String(text));
                } else if in_root {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_children_become_fields() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<oembed>
  <type>video</type>
  <title>Tom &amp; Jerry</title>
  <width>480</width>
  <html><![CDATA[<iframe src="https://example.com/embed/1"></iframe>]]></html>
  <empty/>
</oembed>"#;

        let fields = parse_xml(body).unwrap();
        assert_eq!(fields["type"], "video");
        assert_eq!(fields["title"], "Tom & Jerry");
        assert_eq!(fields["width"], "480");
        assert_eq!(fields["html"], r#"<iframe src="https://example.com/embed/1"></iframe>"#);
        assert_eq!(fields["empty"], "");
    }

    #[test]
    fn json_parse_error_is_content_error() {
        let err = parse_json("{not json", "Oembed fetcher").unwrap_err();
        assert_eq!(err.code(), "ECONTENT");
        assert_eq!(err.to_string(), "Oembed fetcher: Can't parse oembed JSON response");
    }

    #[test]
    fn discovery_type_pattern() {
        assert!(OEMBED_TYPE.is_match("application/json+oembed"));
        assert!(OEMBED_TYPE.is_match("text/XML+oembed"));
        assert!(!OEMBED_TYPE.is_match("application/rss+xml"));
    }
}
