//! Error type shared by the engine, the built-in steps and the bundled
//! capabilities.

use std::sync::Arc;

use thiserror::Error;

/// Resolution and rendering errors.
#[derive(Error, Debug)]
pub enum EmbedError {
    /// A response arrived with a status the step cannot use.
    #[error("{context}: Bad response code: {status}")]
    Http { context: String, status: u16 },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Content(String),

    #[error("{0}")]
    Mime(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Invalid match pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Raised by a custom step.
    #[error(transparent)]
    Plugin(#[from] anyhow::Error),

    /// One failure observed by every waiter of a deduplicated call.
    #[error(transparent)]
    Shared(Arc<EmbedError>),
}

impl EmbedError {
    pub(crate) fn http(context: impl Into<String>, status: u16) -> Self {
        Self::Http {
            context: context.into(),
            status,
        }
    }

    /// Short machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Http { .. } => "EHTTP",
            Self::Transport(_) => "ETRANSPORT",
            Self::Content(_) => "ECONTENT",
            Self::Mime(_) => "EMIME",
            Self::Template(_) => "ETEMPLATE",
            Self::Pattern(_) | Self::Config(_) | Self::Io(_) | Self::Json(_) | Self::Toml(_) => {
                "ECONFIG"
            }
            Self::Plugin(_) => "EPLUGIN",
            Self::Shared(inner) => inner.code(),
        }
    }

    /// HTTP status carried by the error, when there is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Shared(inner) => inner.status_code(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EmbedError>;
