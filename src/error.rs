use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GET {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("JSON (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

impl ExtractorError {
    pub fn config(message: impl Into<String>) -> Self {
        ExtractorError::Config(message.into())
    }

    /// Failures worth another attempt against the same model call.
    pub fn is_transient(&self) -> bool {
        match self {
            ExtractorError::Model(e) => e.is_transient(),
            ExtractorError::Validation(_) => true,
            ExtractorError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Failures that cost one URL its events but never abort a run.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ExtractorError::Config(_) | ExtractorError::Template(_))
    }
}

pub type Result<T> = std::result::Result<T, ExtractorError>;

/// Failures reported by a structured-generation provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited: {body}")]
    RateLimited { body: String },

    #[error("bad request ({status}): {body}")]
    BadRequest { status: u16, body: String },

    #[error("server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("unparseable response: {0}")]
    Parse(String),
}

impl ModelError {
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Network(_) | ModelError::RateLimited { .. } | ModelError::Server { .. } => {
                true
            }
            ModelError::Parse(_) => true,
            ModelError::BadRequest { .. } => false,
        }
    }

    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => ModelError::RateLimited { body },
            400..=499 => ModelError::BadRequest { status, body },
            _ => ModelError::Server { status, body },
        }
    }
}

/// One offending field of a structured response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub path: String,
    pub message: String,
    pub input: String,
}

/// Structured output that does not have the shape we asked for.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn single(path: impl Into<String>, message: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            issues: vec![FieldIssue {
                path: path.into(),
                message: message.into(),
                input: input.into(),
            }],
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "structured output failed validation:")?;
        for issue in &self.issues {
            writeln!(f, "- message: {}", issue.message)?;
            writeln!(f, "  loc:     {}", issue.path)?;
            writeln!(f, "  input:   {}", issue.input)?;
        }
        Ok(())
    }
}
