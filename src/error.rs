// src/error.rs
//
// Fatal outcomes of a run. Carried inside `anyhow::Error` and recovered
// with `downcast_ref` by callers that need to classify them.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdasError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot open source {path}: {reason}")]
    SourceOpen { path: PathBuf, reason: String },

    #[error("source {0} has zero-dimension frames")]
    EmptySource(PathBuf),

    #[error("cannot open video writer {path}: {reason}")]
    SinkOpen { path: PathBuf, reason: String },

    #[error("stream I/O failed at frame {frame}: {reason}")]
    StreamIo { frame: u64, reason: String },

    #[error("finalization failed: {0}")]
    Finalize(String),
}
