//! HTML templates for rendered records.
//!
//! Templates are looked up by `<domain>_<format>` first, then by
//! `default_<format>`. A template returns [`EmbedError::Template`] when the
//! record lacks what it needs; the renderer then moves on to the next
//! candidate format.
//!
//! Built-in templates:
//! - `default_inline`: link with the page title
//! - `default_player`: click-to-play placeholder for an html5 player
//! - `default_rich`: inline html or iframe of a rich snippet

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use url::Url;

use crate::error::{EmbedError, Result};
use crate::record::{ResultRecord, Snippet};

/// Thumbnail width the player template aims for.
const DESIRED_THUMBNAIL_WIDTH: f64 = 480.0;

/// Data handed to a template.
pub struct TemplateData<'a> {
    pub record: &'a ResultRecord,
    pub utils: UrlUtils,
}

impl<'a> TemplateData<'a> {
    pub fn new(record: &'a ResultRecord) -> Self {
        Self {
            record,
            utils: UrlUtils,
        }
    }

    /// `example.com` -> `ez-domain-example_com`
    pub fn domain_class(&self) -> String {
        format!("ez-domain-{}", self.record.domain.replace('.', "_"))
    }
}

/// URL helpers available to templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlUtils;

impl UrlUtils {
    pub fn parse(&self, href: &str) -> Option<Url> {
        Url::parse(href).ok()
    }

    /// Set (or replace) one query parameter. Unparseable hrefs are
    /// returned unchanged.
    pub fn with_query_param(&self, href: &str, key: &str, value: &str) -> String {
        let Some(mut url) = self.parse(href) else {
            return href.to_string();
        };
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != key)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(pairs)
            .append_pair(key, value);
        url.into()
    }
}

/// A renderer for one output format.
pub trait Template: Send + Sync {
    fn render(&self, data: &TemplateData<'_>) -> Result<String>;
}

/// Wraps a closure as a [`Template`].
pub struct FnTemplate<F>(F);

impl<F> Template for FnTemplate<F>
where
    F: Fn(&TemplateData<'_>) -> Result<String> + Send + Sync,
{
    fn render(&self, data: &TemplateData<'_>) -> Result<String> {
        (self.0)(data)
    }
}

/// Build a template from a closure.
pub fn template_fn<F>(f: F) -> Arc<dyn Template>
where
    F: Fn(&TemplateData<'_>) -> Result<String> + Send + Sync + 'static,
{
    Arc::new(FnTemplate(f))
}

/// Keyed template store.
#[derive(Clone, Default)]
pub struct Templates {
    templates: HashMap<String, Arc<dyn Template>>,
}

impl Templates {
    /// Store with the built-in `default_*` templates.
    pub fn builtin() -> Self {
        let mut templates = Self::default();
        templates.insert("default_inline", Arc::new(InlineTemplate));
        templates.insert("default_player", Arc::new(PlayerTemplate));
        templates.insert("default_rich", Arc::new(RichTemplate));
        templates
    }

    pub fn insert(&mut self, key: impl Into<String>, template: Arc<dyn Template>) {
        self.templates.insert(key.into(), template);
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn Template>> {
        self.templates.get(key)
    }

    /// Template for `format` of `domain`, falling back to the default.
    pub fn find(&self, domain: &str, format: &str) -> Option<&Arc<dyn Template>> {
        self.get(&format!("{domain}_{format}"))
            .or_else(|| self.get(&format!("default_{format}")))
    }
}

/// Escape text for use in HTML content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════
// BUILT-IN TEMPLATES
// ═══════════════════════════════════════════════════════════════════════════

/// `<a class="ez-domain-<d> ez-inline" ...>title</a>`
pub struct InlineTemplate;

impl Template for InlineTemplate {
    fn render(&self, data: &TemplateData<'_>) -> Result<String> {
        let record = data.record;
        let text = if record.meta.title.is_empty() {
            &record.src
        } else {
            &record.meta.title
        };
        Ok(format!(
            r#"<a class="{} ez-inline" target="_blank" href="{}" rel="nofollow">{}</a>"#,
            data.domain_class(),
            escape_html(&record.src),
            escape_html(text)
        ))
    }
}

/// Click-to-play placeholder. The real player iframe is carried in
/// `data-placeholder` and swapped in by client code.
pub struct PlayerTemplate;

impl Template for PlayerTemplate {
    fn render(&self, data: &TemplateData<'_>) -> Result<String> {
        let record = data.record;
        let player = record
            .snippets
            .iter()
            .find(|s| s.has_tag("player") && s.has_tag("html5"))
            .ok_or_else(|| EmbedError::Template("no html5 player snippet".into()))?;
        let player_href = player
            .href
            .as_deref()
            .ok_or_else(|| EmbedError::Template("player snippet without href".into()))?;
        let thumbnail = closest_thumbnail(&record.snippets)
            .and_then(|s| s.href.as_deref())
            .ok_or_else(|| EmbedError::Template("no thumbnail snippet".into()))?;

        let href = match player.media.get("autoplay").and_then(|v| v.as_str()) {
            Some(param) => {
                let (key, value) = param.split_once('=').unwrap_or((param, ""));
                data.utils.with_query_param(player_href, key, value)
            }
            None => player_href.to_string(),
        };
        let placeholder = format!(
            r#"<iframe class="ez-player-frame" src="{}" allowfullscreen></iframe>"#,
            escape_html(&href)
        );

        let mut html = String::new();
        let _ = write!(
            html,
            r#"<div class="ez-player {} ez-block" data-placeholder="{}">
  <div class="ez-player-container" style="padding-bottom: {}%;">
    <a class="ez-player-placeholder" target="_blank" href="{}" rel="nofollow">
      <div class="ez-player-picture" style="background-image: url('{}');"></div>
"#,
            data.domain_class(),
            escape_html(&placeholder),
            aspect_ratio(player),
            escape_html(&record.src),
            escape_html(thumbnail)
        );
        if !record.meta.title.is_empty() {
            let _ = write!(
                html,
                r#"      <div class="ez-player-header">
        <div class="ez-player-title">{}</div>
      </div>
"#,
                escape_html(&record.meta.title)
            );
        }
        html.push_str(
            r#"      <div class="ez-player-button"></div>
      <div class="ez-player-logo"></div>
"#,
        );
        if let Some(duration) = player.media_f64("duration").and_then(format_duration) {
            let _ = writeln!(html, r#"      <div class="ez-player-duration">{duration}</div>"#);
        }
        html.push_str("    </a>\n  </div>\n</div>");
        Ok(html)
    }
}

/// Inline html of a `rich` snippet, or an iframe of its href.
pub struct RichTemplate;

impl Template for RichTemplate {
    fn render(&self, data: &TemplateData<'_>) -> Result<String> {
        let record = data.record;
        let rich = record
            .snippets
            .iter()
            .find(|s| s.has_tag("rich"))
            .ok_or_else(|| EmbedError::Template("no rich snippet".into()))?;
        let class = data.domain_class();

        match (rich.html.as_deref(), rich.href.as_deref()) {
            (Some(html), _) if !html.trim().is_empty() => {
                Ok(format!(r#"<div class="ez-rich {class} ez-block">{html}</div>"#))
            }
            (_, Some(href)) => Ok(format!(
                r#"<div class="ez-rich {class} ez-block"><iframe class="ez-rich-frame" src="{}" allowfullscreen></iframe></div>"#,
                escape_html(href)
            )),
            _ => Err(EmbedError::Template("rich snippet without html or href".into())),
        }
    }
}

fn closest_thumbnail(snippets: &[Snippet]) -> Option<&Snippet> {
    snippets
        .iter()
        .filter(|s| s.has_tag("thumbnail"))
        .min_by(|a, b| {
            let distance = |s: &Snippet| (s.media_f64("width").unwrap_or(0.0) - DESIRED_THUMBNAIL_WIDTH).abs();
            distance(a).total_cmp(&distance(b))
        })
}

/// Height as a percentage of width, 4 decimals. 16:9 when the player has
/// no usable size.
fn aspect_ratio(player: &Snippet) -> f64 {
    match (player.media_f64("width"), player.media_f64("height")) {
        (Some(w), Some(h)) if w > 0.0 => (100.0 / w * h * 10_000.0).round() / 10_000.0,
        _ => 56.25,
    }
}

/// `75` -> `1:15`, `3725` -> `1:02:05`
fn format_duration(seconds: f64) -> Option<String> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total = seconds.floor() as u64;
    let (hours, minutes, secs) = (total / 3600, total / 60 % 60, total % 60);
    Some(if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{MediaValue, Meta};

    fn record(snippets: Vec<Snippet>) -> ResultRecord {
        ResultRecord {
            src: "https://example.com/v/1".into(),
            domain: "example.com".into(),
            meta: Meta {
                title: "A <b>title</b>".into(),
                ..Meta::default()
            },
            snippets,
            ..ResultRecord::default()
        }
    }

    fn player(autoplay: Option<&str>) -> Snippet {
        let mut s = Snippet::new(
            Some("text/html"),
            "https://example.com/embed/1?x=1",
            &["player", "html5"],
        );
        s.set_media("width", Some(MediaValue::Number(640.0)));
        s.set_media("height", Some(MediaValue::Number(360.0)));
        s.set_media("duration", Some(MediaValue::Number(3725.0)));
        s.set_media("autoplay", autoplay.map(MediaValue::from));
        s
    }

    fn thumbnail(href: &str, width: f64) -> Snippet {
        let mut s = Snippet::new(Some("image"), href, &["thumbnail"]);
        s.set_media("width", Some(MediaValue::Number(width)));
        s
    }

    #[test]
    fn inline_escapes_title() {
        let record = record(vec![]);
        let html = InlineTemplate.render(&TemplateData::new(&record)).unwrap();
        assert_eq!(
            html,
            r#"<a class="ez-domain-example_com ez-inline" target="_blank" href="https://example.com/v/1" rel="nofollow">A &lt;b&gt;title&lt;/b&gt;</a>"#
        );
    }

    #[test]
    fn inline_falls_back_to_src() {
        let mut record = record(vec![]);
        record.meta.title.clear();
        let html = InlineTemplate.render(&TemplateData::new(&record)).unwrap();
        assert!(html.ends_with(r#"rel="nofollow">https://example.com/v/1</a>"#));
    }

    #[test]
    fn player_requires_html5_player() {
        let record = record(vec![thumbnail("https://example.com/t.jpg", 480.0)]);
        let err = PlayerTemplate.render(&TemplateData::new(&record)).unwrap_err();
        assert_eq!(err.code(), "ETEMPLATE");
    }

    #[test]
    fn player_picks_closest_thumbnail_and_applies_autoplay() {
        let record = record(vec![
            player(Some("autoplay=1")),
            thumbnail("https://example.com/small.jpg", 120.0),
            thumbnail("https://example.com/medium.jpg", 500.0),
            thumbnail("https://example.com/large.jpg", 1280.0),
        ]);
        let html = PlayerTemplate.render(&TemplateData::new(&record)).unwrap();

        assert!(html.contains("url('https://example.com/medium.jpg')"));
        assert!(html.contains("padding-bottom: 56.25%;"));
        assert!(html.contains("x=1&amp;amp;autoplay=1"));
        assert!(html.contains(r#"<div class="ez-player-duration">1:02:05</div>"#));
        assert!(html.contains("A &lt;b&gt;title&lt;/b&gt;"));
    }

    #[test]
    fn rich_prefers_inline_html() {
        let mut rich = Snippet::new(Some("text/html"), "https://example.com/w", &["rich"]);
        rich.html = Some("<blockquote>hi</blockquote>".into());
        let record = record(vec![rich]);
        let html = RichTemplate.render(&TemplateData::new(&record)).unwrap();
        assert_eq!(
            html,
            r#"<div class="ez-rich ez-domain-example_com ez-block"><blockquote>hi</blockquote></div>"#
        );
    }

    #[test]
    fn query_param_is_replaced() {
        let utils = UrlUtils;
        assert_eq!(
            utils.with_query_param("https://a.com/p?autoplay=0&b=2", "autoplay", "1"),
            "https://a.com/p?b=2&autoplay=1"
        );
        assert_eq!(utils.with_query_param("not a url", "a", "1"), "not a url");
    }

    #[test]
    fn durations_format_like_a_clock() {
        assert_eq!(format_duration(75.0).as_deref(), Some("1:15"));
        assert_eq!(format_duration(3725.0).as_deref(), Some("1:02:05"));
        assert_eq!(format_duration(0.0), None);
    }

    #[test]
    fn domain_template_overrides_default() {
        let mut templates = Templates::builtin();
        templates.insert("example.com_inline", template_fn(|_| Ok("custom".into())));
        let record = record(vec![]);
        let data = TemplateData::new(&record);

        let found = templates.find("example.com", "inline").unwrap();
        assert_eq!(found.render(&data).unwrap(), "custom");
        assert!(templates.find("other.com", "inline").is_some());
        assert!(templates.find("other.com", "missing").is_none());
    }
}
