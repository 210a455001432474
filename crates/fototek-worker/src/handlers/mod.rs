//! Job handlers and the application state they run against.
//!
//! [`PipelineContext`] owns the repositories and processing services. The
//! queue holds only a weak reference to it; the context in turn holds the
//! queue behind a `OnceLock` wired in after both exist.

pub mod live_photo;
pub mod metadata;
pub mod scan;
pub mod sidecar;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, OnceLock};

use fototek_core::models::{Job, JobName, JobPayload};
use fototek_db::{AssetRepository, MetadataRepository};
use fototek_processing::{ReverseGeocoder, VideoProbe};

use crate::context::JobHandlerContext;
use crate::queue::JobQueue;

pub struct PipelineContext {
    assets: Arc<dyn AssetRepository>,
    metadata: Arc<dyn MetadataRepository>,
    geocoder: Arc<ReverseGeocoder>,
    probe: VideoProbe,
    scan_page_size: i64,
    queue: OnceLock<JobQueue>,
}

impl PipelineContext {
    pub fn new(
        assets: Arc<dyn AssetRepository>,
        metadata: Arc<dyn MetadataRepository>,
        geocoder: Arc<ReverseGeocoder>,
        probe: VideoProbe,
        scan_page_size: i64,
    ) -> Self {
        Self {
            assets,
            metadata,
            geocoder,
            probe,
            scan_page_size,
            queue: OnceLock::new(),
        }
    }

    /// Wire the queue in after construction. The queue only holds a weak
    /// reference back to this context, so there is no ownership cycle.
    pub fn attach_queue(&self, queue: JobQueue) {
        if self.queue.set(queue).is_err() {
            tracing::error!("Job queue attached twice, keeping the first");
        }
    }

    pub(crate) fn enqueue(&self, job: Job) -> Result<()> {
        match self.queue.get() {
            Some(queue) => queue.enqueue(job),
            None => Err(anyhow!(
                "Job queue not attached, cannot enqueue {}",
                job.name
            )),
        }
    }
}

#[async_trait]
impl JobHandlerContext for PipelineContext {
    async fn dispatch_job(self: Arc<Self>, job: &Job) -> Result<()> {
        match (job.name, &job.payload) {
            (JobName::QueueMetadataScan, JobPayload::Scan { force }) => {
                scan::queue_metadata_scan(&self, *force).await?;
            }
            (JobName::QueueSidecarScan, JobPayload::Scan { force }) => {
                scan::queue_sidecar_scan(&self, *force).await?;
            }
            (
                JobName::ExtractImageMetadata | JobName::ExtractVideoMetadata,
                JobPayload::Asset(asset),
            ) => {
                if let Err(e) = metadata::extract(&self, asset).await {
                    tracing::error!(
                        error = %e,
                        asset_id = %asset.id,
                        path = %asset.original_path,
                        recoverable = e.is_recoverable(),
                        "Metadata extraction abandoned"
                    );
                    return Err(e.into());
                }
            }
            (JobName::SidecarDiscover, JobPayload::Asset(asset)) => {
                sidecar::discover(&self, asset).await?;
            }
            (JobName::SidecarResync, JobPayload::Asset(asset)) => {
                sidecar::resync(&self, asset).await?;
            }
            (JobName::MigrateStorageTemplate | JobName::SearchIndexAlbum, _) => {
                // Produced here, consumed elsewhere.
                tracing::debug!(job = %job.name, "Job belongs to a downstream consumer, skipping");
            }
            _ => return Err(anyhow!("Mismatched payload for job {}", job.name)),
        }
        Ok(())
    }
}
