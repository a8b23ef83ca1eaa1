//! Error types shared across reelcap crates.
//!
//! Drag and resize violations are not represented here: the timeline model
//! clamps them before anything is committed.

use std::path::PathBuf;

/// Top-level error type for reelcap operations.
#[derive(Debug, thiserror::Error)]
pub enum ReelcapError {
    /// Source media could not be read or decoded.
    #[error("Input error: {message}")]
    Input { message: String },

    /// The speech-recognition collaborator failed.
    #[error("Transcription error: {message}")]
    Inference { message: String },

    /// The preferred container could not be produced.
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    /// An isolated worker terminated unexpectedly.
    #[error("{message}")]
    ResourceExhaustion { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Project error: {message}")]
    Project { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReelcapError.
pub type ReelcapResult<T> = Result<T, ReelcapError>;

/// Message shown when a worker dies without reporting a result.
pub const WORKER_CRASH_HINT: &str =
    "The worker stopped unexpectedly (it may have run out of memory). Please try a shorter clip.";

impl ReelcapError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input {
            message: msg.into(),
        }
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference {
            message: msg.into(),
        }
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding {
            message: msg.into(),
        }
    }

    pub fn resource_exhaustion(msg: impl Into<String>) -> Self {
        Self::ResourceExhaustion {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn project(msg: impl Into<String>) -> Self {
        Self::Project {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Worker crash surfaced as a retry suggestion.
    pub fn worker_crashed(detail: impl AsRef<str>) -> Self {
        let detail = detail.as_ref();
        if detail.is_empty() {
            Self::resource_exhaustion(WORKER_CRASH_HINT)
        } else {
            Self::resource_exhaustion(format!("{WORKER_CRASH_HINT} ({detail})"))
        }
    }

    /// Whether a retry with smaller input is the suggested remedy.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::ResourceExhaustion { .. })
    }
}
