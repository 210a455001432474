//! Sidecar discovery and resync.

use std::io::ErrorKind;

use fototek_core::models::{Asset, AssetUpdate, Job};
use fototek_core::PipelineError;

use super::{scan, PipelineContext};

/// Probe for `<original>.xmp` next to an asset without a recorded sidecar.
///
/// A readable, writable file gets its path recorded and extraction is
/// re-triggered so the new source takes effect. Absence is silent; a
/// permission problem is logged and the asset left untouched.
pub(crate) async fn discover(ctx: &PipelineContext, asset: &Asset) -> Result<(), PipelineError> {
    if !asset.is_visible {
        return Ok(());
    }
    if asset.sidecar_path.is_some() {
        tracing::debug!(asset_id = %asset.id, "Sidecar already recorded, nothing to discover");
        return Ok(());
    }

    let candidate = format!("{}.xmp", asset.original_path);
    match tokio::fs::metadata(&candidate).await {
        Ok(stat) if stat.permissions().readonly() => {
            tracing::warn!(
                asset_id = %asset.id,
                sidecar = %candidate,
                "Sidecar exists but is not writable, skipping asset"
            );
            Ok(())
        }
        Ok(_) => {
            let updated = ctx
                .assets
                .update(
                    asset.id,
                    AssetUpdate {
                        sidecar_path: Some(candidate.clone()),
                        ..Default::default()
                    },
                )
                .await?;
            tracing::info!(asset_id = %asset.id, sidecar = %candidate, "Sidecar discovered");
            retrigger_extraction(ctx, updated);
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            tracing::warn!(
                asset_id = %asset.id,
                sidecar = %candidate,
                "Cannot access sidecar candidate, permission denied, skipping asset"
            );
            Ok(())
        }
        Err(e) => Err(PipelineError::Filesystem(e)),
    }
}

/// Re-run extraction for an asset whose sidecar is already recorded, picking
/// up whatever the file now says.
pub(crate) async fn resync(ctx: &PipelineContext, asset: &Asset) -> Result<(), PipelineError> {
    retrigger_extraction(ctx, asset.clone());
    Ok(())
}

fn retrigger_extraction(ctx: &PipelineContext, asset: Asset) {
    let name = scan::extraction_job_name(&asset);
    let id = asset.id;
    if let Err(e) = ctx.enqueue(Job::for_asset(name, asset)) {
        tracing::warn!(error = %e, asset_id = %id, "Failed to enqueue extraction after sidecar change");
    }
}
