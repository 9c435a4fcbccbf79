//! Engine configuration loaded from `~/.config/embedkit/config.toml`.
//!
//! ```toml
//! enabled_providers = ["youtube.com", "example.org"]
//!
//! [request]
//! timeout_secs = 10
//! retries = 0
//! user_agent = "my-app/1.0"
//!
//! [whitelist."example.org"]
//! oembed = { rich = ["allow", "inline"] }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{EmbedError, Result};

/// Default `User-Agent` sent by [`HttpClient`](crate::HttpClient).
pub const DEFAULT_USER_AGENT: &str = concat!(
    "embedkit/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/MikkoParkkola/embedkit)"
);

/// Which domain rules start enabled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnabledProviders {
    /// Every registered domain.
    #[default]
    All,
    /// Only the listed domain ids.
    Only(Vec<String>),
}

impl EnabledProviders {
    pub fn allows(&self, id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.iter().any(|i| i == id),
        }
    }
}

impl<'de> Deserialize<'de> for EnabledProviders {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            List(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Self::All,
            Raw::Flag(false) => Self::Only(Vec::new()),
            Raw::List(ids) => Self::Only(ids),
        })
    }
}

/// Defaults for the bundled request capability.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub timeout_secs: u64,
    /// Retries after a transport failure. HTTP statuses are never retried.
    pub retries: u32,
    pub user_agent: String,
    pub headers: HashMap<String, String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            retries: 1,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: HashMap::new(),
        }
    }
}

/// Top-level engine options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub enabled_providers: EnabledProviders,
    pub request: RequestConfig,
    /// Whitelist entries merged over the built-in ones.
    pub whitelist: HashMap<String, Value>,
}

impl EngineOptions {
    /// Parse options from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load options from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EmbedError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&content)
            .map_err(|e| EmbedError::Config(format!("invalid TOML in {}: {e}", path.display())))
    }

    /// Load options from `~/.config/embedkit/config.toml`.
    ///
    /// Returns defaults if the file doesn't exist (configuration is optional).
    pub fn load_default() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }
}

/// Return the path to the config file.
fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("embedkit")
        .join("config.toml")
}
