//! Error types module
//!
//! All pipeline errors are unified under the `PipelineError` enum. Most
//! variants are recovered per asset: the worker logs them with asset identity
//! and path context and moves on, leaving the affected fields null. Only
//! enumeration and database failures abort a scan.

use std::io;

use sqlx::Error as SqlxError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Malformed or unsupported tag data in a media or sidecar file.
    /// Recovered: the caller treats the read as an empty tag set.
    #[error("tag read failed: {0}")]
    TagRead(String),

    /// External media inspection (ffprobe, image header decode) failed.
    /// Recovered: derived fields stay null.
    #[error("media probe failed: {0}")]
    Probe(String),

    /// Reverse-geocoding index not ready or lookup failed.
    /// Recovered: location fields stay null.
    #[error("reverse geocode lookup failed: {0}")]
    Lookup(String),

    /// Missing or unreadable file. Recovered for sidecar discovery; fatal to
    /// the asset's job when the primary media file itself is unreadable.
    #[error("filesystem error: {0}")]
    Filesystem(#[from] io::Error),

    /// Pagination or enumeration failure. Fatal to the scan.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("database error: {0}")]
    Database(#[from] SqlxError),
}

impl PipelineError {
    /// Whether processing of other assets may continue after this error.
    ///
    /// Dispatch and database failures abort the surrounding scan; everything
    /// else is scoped to a single asset and logged.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            PipelineError::Dispatch(_) | PipelineError::Database(_)
        )
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Probe(format!("JSON parsing error: {}", err))
    }
}
