//! Shared doubles for the integration tests: no test touches the network.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use embedkit::{
    Cache, Dimensions, EmbedError, HttpResponse, ImageProbe, RequestOptions, Requester, Result,
};
use serde_json::Value;

/// Install a subscriber once so `RUST_LOG=embedkit=debug` shows step logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Canned responses per URL. Unknown URLs fail like an unresolvable host,
/// unless a fallback response is set.
#[derive(Default)]
pub struct StubRequester {
    routes: Mutex<HashMap<String, HttpResponse>>,
    fallback: Option<HttpResponse>,
    log: Mutex<Vec<String>>,
}

impl StubRequester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every unknown URL with `response`.
    pub fn always(response: HttpResponse) -> Self {
        Self {
            fallback: Some(response),
            ..Self::default()
        }
    }

    pub fn route(self, url: &str, response: HttpResponse) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
        self
    }

    pub fn html(self, url: &str, body: &str) -> Self {
        self.route(url, HttpResponse::new(200, Some("text/html; charset=utf-8"), body.to_string()))
    }

    /// `"METHOD url"` of every request, in order.
    pub fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Requester for StubRequester {
    async fn request(&self, url: &str, options: &RequestOptions) -> Result<HttpResponse> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{} {}", options.method, url));

        if let Some(response) = self.routes.lock().unwrap().get(url) {
            return Ok(response.clone());
        }
        match &self.fallback {
            Some(response) => Ok(response.clone()),
            None => {
                let host = url::Url::parse(url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_default();
                Err(EmbedError::Plugin(anyhow::anyhow!("getaddrinfo ENOTFOUND {host}")))
            }
        }
    }
}

/// Returns a fixed value for every key, records keys and writes.
pub struct FixedCache {
    pub value: Option<Value>,
    pub writes: AtomicUsize,
    keys: Mutex<Vec<String>>,
}

impl FixedCache {
    pub fn new(value: Option<Value>) -> Self {
        Self {
            value,
            writes: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
        }
    }

    /// `"get key"` / `"set key"` of every call, in order.
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl Cache for FixedCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.keys.lock().unwrap().push(format!("get {key}"));
        Ok(self.value.clone())
    }

    async fn set(&self, key: &str, _value: Value) -> Result<()> {
        self.keys.lock().unwrap().push(format!("set {key}"));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reads miss, every write fails.
pub struct ReadOnlyCache;

#[async_trait]
impl Cache for ReadOnlyCache {
    async fn get(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Value) -> Result<()> {
        Err(EmbedError::Plugin(anyhow::anyhow!("write failed")))
    }
}

/// Every read fails.
pub struct BrokenCache;

#[async_trait]
impl Cache for BrokenCache {
    async fn get(&self, _key: &str) -> Result<Option<Value>> {
        Err(EmbedError::Plugin(anyhow::anyhow!("cache unavailable")))
    }

    async fn set(&self, _key: &str, _value: Value) -> Result<()> {
        Err(EmbedError::Plugin(anyhow::anyhow!("cache unavailable")))
    }
}

/// Fixed-size probe that counts calls. The small delay keeps concurrent
/// lookups of one URL overlapping.
pub struct CountingProbe {
    pub calls: AtomicUsize,
    pub dimensions: Dimensions,
}

impl CountingProbe {
    pub fn new(width: f64, height: f64) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            dimensions: Dimensions::px(width, height),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageProbe for CountingProbe {
    async fn probe(&self, _url: &str) -> Result<Dimensions> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(self.dimensions.clone())
    }
}
