//! Error taxonomy (spec.md §7). Failures *of* user code become [`crate::tree::Failure`]
//! values attached to a [`crate::tree::SpecResult`]; failures *around* user code land here.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can escape a DraftSpec API call. Per-spec failures (hook/assertion/timeout)
/// are not part of this enum — see [`crate::tree::Failure`].
#[derive(Debug, Error)]
pub enum DraftSpecError {
    #[error("failed to compile script `{path}`{line}: {message}", line = line_suffix(*line))]
    ScriptCompilation {
        path: PathBuf,
        message: String,
        line: Option<u32>,
    },

    #[error("cache entry `{key}` invalid: {reason}")]
    CacheIntegrity { key: String, reason: String },

    #[error("reporter `{name}` failed: {message}")]
    ReporterFailure { name: String, message: String },

    #[error("run cancelled")]
    UserCancelled,

    #[error("include cycle or missing file while preprocessing `{path}`: {message}")]
    Preprocess { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn line_suffix(line: Option<u32>) -> String {
    match line {
        Some(l) => format!(" (line {l})"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, DraftSpecError>;
