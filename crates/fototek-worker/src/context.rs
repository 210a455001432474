//! Job handler context trait
//!
//! The server implements this trait for its application state. The queue calls
//! `dispatch_job` when a consumer picks up a job; the implementation matches on
//! job name and invokes the appropriate handler.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use fototek_core::models::Job;

/// Context for job dispatch.
///
/// Implemented by the pipeline's application state. The queue holds a weak
/// reference and calls `dispatch_job` for every job a consumer picks up.
#[async_trait]
pub trait JobHandlerContext: Send + Sync {
    /// Dispatch a job to the appropriate handler and return the result.
    async fn dispatch_job(self: Arc<Self>, job: &Job) -> Result<()>;
}
