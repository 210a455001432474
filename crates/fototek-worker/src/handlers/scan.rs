//! Scan handlers: cursor-paginated fan-out of per-asset jobs.
//!
//! A scan never materializes the whole asset population; it pulls bounded
//! pages and queues one job per row. A failed enqueue skips that asset and
//! the scan continues; a failed page fetch aborts the scan.

use fototek_core::models::{Asset, AssetType, Job, JobName};
use fototek_core::PipelineError;

use super::PipelineContext;

pub(crate) async fn queue_metadata_scan(
    ctx: &PipelineContext,
    force: bool,
) -> Result<(), PipelineError> {
    let mut cursor = None;
    let mut queued = 0usize;
    loop {
        let page = if force {
            ctx.assets.list_all(cursor, ctx.scan_page_size).await?
        } else {
            ctx.assets
                .list_missing_metadata(cursor, ctx.scan_page_size)
                .await?
        };
        queued += fan_out(ctx, page.items, extraction_job_name);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    tracing::info!(force, queued, "Metadata scan complete");
    Ok(())
}

pub(crate) async fn queue_sidecar_scan(
    ctx: &PipelineContext,
    force: bool,
) -> Result<(), PipelineError> {
    let mut cursor = None;
    let mut queued = 0usize;
    loop {
        // Forced scans resync assets that already have a sidecar; unforced
        // scans look for sidecars not yet discovered.
        let page = if force {
            ctx.assets.list_with_sidecar(cursor, ctx.scan_page_size).await?
        } else {
            ctx.assets
                .list_missing_sidecar(cursor, ctx.scan_page_size)
                .await?
        };
        let name = if force {
            JobName::SidecarResync
        } else {
            JobName::SidecarDiscover
        };
        queued += fan_out(ctx, page.items, |_| name);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    tracing::info!(force, queued, "Sidecar scan complete");
    Ok(())
}

pub(crate) fn extraction_job_name(asset: &Asset) -> JobName {
    match asset.asset_type {
        AssetType::Image => JobName::ExtractImageMetadata,
        AssetType::Video => JobName::ExtractVideoMetadata,
    }
}

fn fan_out(
    ctx: &PipelineContext,
    assets: Vec<Asset>,
    name_of: impl Fn(&Asset) -> JobName,
) -> usize {
    let mut queued = 0;
    for asset in assets {
        let name = name_of(&asset);
        let id = asset.id;
        match ctx.enqueue(Job::for_asset(name, asset)) {
            Ok(()) => queued += 1,
            Err(e) => {
                tracing::warn!(error = %e, asset_id = %id, job = %name, "Failed to enqueue job, continuing scan");
            }
        }
    }
    queued
}
