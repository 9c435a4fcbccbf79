//! Image dimension lookup.
//!
//! The `image-size` mixin-after asks the engine for the size of every
//! distinct image href that lacks one. Lookups go through three layers:
//!
//! 1. [`ImageSizes`] deduplicates concurrent lookups of the same URL
//! 2. the cache, under `image#<url>`, with a 24 hour TTL checked here
//! 3. an [`ImageProbe`], by default [`HttpImageProbe`] which downloads the
//!    image and reads the dimensions from its header

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{now_millis, Cache};
use crate::error::{EmbedError, Result};
use crate::http_client::{RequestOptions, Requester};
use crate::unique::UniqueAsync;

/// Cached dimensions expire after one day.
pub const IMAGE_SIZE_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Image size with the units it was declared in. Raster formats are
/// always `px`; SVG may carry other CSS units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
    pub w_units: String,
    pub h_units: String,
}

impl Dimensions {
    pub fn px(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            w_units: "px".to_string(),
            h_units: "px".to_string(),
        }
    }

    pub fn is_px(&self) -> bool {
        self.w_units == "px" && self.h_units == "px"
    }
}

/// Reads the dimensions of a remote image.
#[async_trait]
pub trait ImageProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<Dimensions>;
}

/// Default probe: GET the image and sniff its header.
pub struct HttpImageProbe {
    requester: Arc<dyn Requester>,
}

impl HttpImageProbe {
    pub fn new(requester: Arc<dyn Requester>) -> Self {
        Self { requester }
    }
}

#[async_trait]
impl ImageProbe for HttpImageProbe {
    async fn probe(&self, url: &str) -> Result<Dimensions> {
        debug!("image-size: probe {}", url);
        let response = self
            .requester
            .request(url, &RequestOptions::default())
            .await?;
        if response.status != 200 {
            return Err(EmbedError::http("Image probe", response.status));
        }
        probe_bytes(&response.body)
            .ok_or_else(|| EmbedError::Content(format!("Image probe: unrecognized image format: {url}")))
    }
}

#[derive(Serialize, Deserialize)]
struct CachedDimensions {
    dimensions: Dimensions,
    ts: i64,
}

/// Deduplicated, cached dimension loader shared by all resolutions of one
/// engine.
pub struct ImageSizes {
    loader: UniqueAsync<Dimensions>,
}

impl ImageSizes {
    pub fn new(cache: Arc<dyn Cache>, probe: Arc<dyn ImageProbe>) -> Self {
        let loader = UniqueAsync::new(move |url: String| {
            let cache = Arc::clone(&cache);
            let probe = Arc::clone(&probe);
            async move { load_image_size(cache.as_ref(), probe.as_ref(), &url).await }
        });
        Self { loader }
    }

    pub async fn get(&self, url: &str) -> Result<Dimensions> {
        self.loader.call(url).await
    }

    /// Lookups currently in flight.
    pub fn in_flight(&self) -> usize {
        self.loader.in_flight()
    }
}

async fn load_image_size(cache: &dyn Cache, probe: &dyn ImageProbe, url: &str) -> Result<Dimensions> {
    let key = format!("image#{url}");

    if let Some(value) = cache.get(&key).await? {
        match serde_json::from_value::<CachedDimensions>(value) {
            Ok(entry) if entry.ts > now_millis() - IMAGE_SIZE_TTL_MS => {
                debug!("image-size: {} from cache", url);
                return Ok(entry.dimensions);
            }
            Ok(_) => debug!("image-size: cached entry for {} expired", url),
            Err(e) => warn!("Ignoring malformed cache entry {}: {}", key, e),
        }
    }

    let dimensions = probe.probe(url).await?;
    let entry = CachedDimensions {
        dimensions: dimensions.clone(),
        ts: now_millis(),
    };
    cache.set(&key, serde_json::to_value(&entry)?).await?;
    Ok(dimensions)
}

// ═══════════════════════════════════════════════════════════════════════════
// HEADER SNIFFING
// ═══════════════════════════════════════════════════════════════════════════

/// Read dimensions from the first bytes of an image.
///
/// Supports PNG, GIF, JPEG, BMP, PSD, TIFF, WebP and SVG.
pub fn probe_bytes(data: &[u8]) -> Option<Dimensions> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        return png(data);
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some(Dimensions::px(
            f64::from(le_u16(data, 6)?),
            f64::from(le_u16(data, 8)?),
        ));
    }
    if data.starts_with(&[0xFF, 0xD8]) {
        return jpeg(data);
    }
    if data.starts_with(b"BM") {
        let width = le_u32(data, 18)? as i32;
        let height = le_u32(data, 22)? as i32;
        return Some(Dimensions::px(
            f64::from(width.unsigned_abs()),
            f64::from(height.unsigned_abs()),
        ));
    }
    if data.starts_with(b"8BPS") {
        return Some(Dimensions::px(
            f64::from(be_u32(data, 18)?),
            f64::from(be_u32(data, 14)?),
        ));
    }
    if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
        return tiff(data);
    }
    if data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WEBP".as_slice()) {
        return webp(data);
    }
    svg(data)
}

fn png(data: &[u8]) -> Option<Dimensions> {
    if data.get(12..16) != Some(b"IHDR".as_slice()) {
        return None;
    }
    Some(Dimensions::px(
        f64::from(be_u32(data, 16)?),
        f64::from(be_u32(data, 20)?),
    ))
}

fn jpeg(data: &[u8]) -> Option<Dimensions> {
    let mut i = 2;
    while i + 3 < data.len() {
        if data[i] != 0xFF {
            return None;
        }
        let marker = data[i + 1];
        if marker == 0xFF {
            i += 1;
            continue;
        }
        // SOFn, excluding DHT (C4), JPG (C8) and DAC (CC).
        if (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            return Some(Dimensions::px(
                f64::from(be_u16(data, i + 7)?),
                f64::from(be_u16(data, i + 5)?),
            ));
        }
        i += 2 + usize::from(be_u16(data, i + 2)?);
    }
    None
}

fn tiff(data: &[u8]) -> Option<Dimensions> {
    let little = data[0] == b'I';
    let u16_at = |pos| if little { le_u16(data, pos) } else { be_u16(data, pos) };
    let u32_at = |pos| if little { le_u32(data, pos) } else { be_u32(data, pos) };

    let ifd = usize::try_from(u32_at(4)?).ok()?;
    let count = usize::from(u16_at(ifd)?);
    let (mut width, mut height) = (None, None);

    for n in 0..count {
        let entry = ifd + 2 + n * 12;
        let tag = u16_at(entry)?;
        let value = match u16_at(entry + 2)? {
            3 => u32::from(u16_at(entry + 8)?),
            4 => u32_at(entry + 8)?,
            _ => continue,
        };
        match tag {
            256 => width = Some(value),
            257 => height = Some(value),
            _ => {}
        }
    }
    Some(Dimensions::px(f64::from(width?), f64::from(height?)))
}

fn webp(data: &[u8]) -> Option<Dimensions> {
    match data.get(12..16)? {
        b"VP8 " => Some(Dimensions::px(
            f64::from(le_u16(data, 26)? & 0x3FFF),
            f64::from(le_u16(data, 28)? & 0x3FFF),
        )),
        b"VP8L" => {
            let bits = le_u32(data, 21)?;
            Some(Dimensions::px(
                f64::from((bits & 0x3FFF) + 1),
                f64::from(((bits >> 14) & 0x3FFF) + 1),
            ))
        }
        b"VP8X" => Some(Dimensions::px(
            f64::from(le_u24(data, 24)? + 1),
            f64::from(le_u24(data, 27)? + 1),
        )),
        _ => None,
    }
}

static SVG_ROOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<svg\b[^>]*>").expect("valid regex"));
static SVG_WIDTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\swidth\s*=\s*["']\s*([\d.]+)\s*([a-z%]*)\s*["']"#).expect("valid regex"));
static SVG_HEIGHT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\sheight\s*=\s*["']\s*([\d.]+)\s*([a-z%]*)\s*["']"#).expect("valid regex"));
static SVG_VIEWBOX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\sviewBox\s*=\s*["']\s*[-\d.]+[\s,]+[-\d.]+[\s,]+([\d.]+)[\s,]+([\d.]+)\s*["']"#)
        .expect("valid regex")
});

fn svg(data: &[u8]) -> Option<Dimensions> {
    let text = String::from_utf8_lossy(&data[..data.len().min(4096)]);
    let root = SVG_ROOT.find(&text)?.as_str();

    let attr = |re: &Regex| {
        re.captures(root).and_then(|c| {
            let value = c[1].parse::<f64>().ok()?;
            let units = if c[2].is_empty() { "px" } else { &c[2] };
            Some((value, units.to_string()))
        })
    };

    if let (Some((width, w_units)), Some((height, h_units))) = (attr(&SVG_WIDTH), attr(&SVG_HEIGHT)) {
        return Some(Dimensions {
            width,
            height,
            w_units,
            h_units,
        });
    }

    let view_box = SVG_VIEWBOX.captures(root)?;
    Some(Dimensions::px(
        view_box[1].parse().ok()?,
        view_box[2].parse().ok()?,
    ))
}

fn be_u16(data: &[u8], pos: usize) -> Option<u16> {
    Some(u16::from_be_bytes(data.get(pos..pos + 2)?.try_into().ok()?))
}

fn le_u16(data: &[u8], pos: usize) -> Option<u16> {
    Some(u16::from_le_bytes(data.get(pos..pos + 2)?.try_into().ok()?))
}

fn le_u24(data: &[u8], pos: usize) -> Option<u32> {
    let b = data.get(pos..pos + 3)?;
    Some(u32::from(b[0]) | (u32::from(b[1]) << 8) | (u32::from(b[2]) << 16))
}

fn be_u32(data: &[u8], pos: usize) -> Option<u32> {
    Some(u32::from_be_bytes(data.get(pos..pos + 4)?.try_into().ok()?))
}

fn le_u32(data: &[u8], pos: usize) -> Option<u32> {
    Some(u32::from_le_bytes(data.get(pos..pos + 4)?.try_into().ok()?))
}
