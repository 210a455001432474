//! Per-asset metadata extraction.
//!
//! The handler is a straight-line state machine: stat the original file, read
//! the tag sources, merge, derive, enrich, pair, persist, chain. Tag-read and
//! geocoding failures are recovered (the asset still gets a record); a missing
//! original file or a store failure abandons the asset with no partial write.

use std::path::Path;

use fototek_core::models::{Asset, AssetType, AssetUpdate, Job, JobName};
use fototek_core::PipelineError;
use fototek_processing::merge;
use fototek_processing::tags::{read_embedded_tags, read_sidecar_tags};
use fototek_processing::{TagMap, TagSources};

use super::{live_photo, PipelineContext};

pub(crate) async fn extract(ctx: &PipelineContext, asset: &Asset) -> Result<(), PipelineError> {
    if !asset.is_visible {
        tracing::debug!(asset_id = %asset.id, "Asset is not visible, skipping extraction");
        return Ok(());
    }

    let path = Path::new(&asset.original_path);
    let stat = tokio::fs::metadata(path).await?;

    let embedded = read_primary_tags(ctx, asset, path).await;
    let sidecar = read_sidecar(asset).await;
    let sources = TagSources::new(embedded, sidecar);

    let mut record = merge::build_metadata(asset, &sources, stat.len() as i64);
    if asset.asset_type == AssetType::Image {
        merge::fill_dimensions_from_file(&mut record, path);
    }

    if let (Some(latitude), Some(longitude)) = (record.latitude, record.longitude) {
        match ctx.geocoder.reverse_geocode(latitude, longitude).await {
            Ok(Some(place)) => {
                record.city = Some(place.city);
                record.state = place.state;
                record.country = Some(place.country);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    asset_id = %asset.id,
                    "Reverse geocoding failed, location names stay null"
                );
            }
        }
    }

    let mut current = asset.clone();
    if let Some(content_id) = record.live_photo_cid.clone() {
        current = live_photo::link(ctx, &current, &content_id).await?;
    }

    if current.asset_type == AssetType::Video {
        if let Some(duration) = merge::derive_duration(&sources) {
            if current.duration_secs != Some(duration) {
                current = ctx
                    .assets
                    .update(
                        current.id,
                        AssetUpdate {
                            duration_secs: Some(duration),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
        }
    }

    ctx.metadata.upsert(&record).await?;
    tracing::info!(asset_id = %asset.id, "Metadata extracted");

    if let Err(e) = ctx.enqueue(Job::for_asset(JobName::MigrateStorageTemplate, current.clone())) {
        tracing::warn!(error = %e, asset_id = %asset.id, "Failed to chain storage-template job");
    }
    chain_album_reindex(ctx, &current).await;
    Ok(())
}

/// Chain one `search-index-album` job per album the asset belongs to, each
/// carrying the album's oldest asset as the representative snapshot. The
/// record is already persisted, so failures here are logged, never fatal.
async fn chain_album_reindex(ctx: &PipelineContext, asset: &Asset) {
    let album_ids = match ctx.assets.list_album_ids_for_asset(asset.id).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::warn!(
                error = %e,
                asset_id = %asset.id,
                "Album membership lookup failed, skipping album reindex"
            );
            return;
        }
    };

    for album_id in album_ids {
        match ctx.assets.find_first_for_album(album_id).await {
            Ok(Some(first)) => {
                if let Err(e) = ctx.enqueue(Job::for_asset(JobName::SearchIndexAlbum, first)) {
                    tracing::warn!(error = %e, album_id = %album_id, "Failed to chain album reindex job");
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, album_id = %album_id, "Album lookup failed, skipping reindex");
            }
        }
    }
}

/// Tags embedded in the media file itself. A failed read is an empty source,
/// never a failed job.
async fn read_primary_tags(
    ctx: &PipelineContext,
    asset: &Asset,
    path: &Path,
) -> Option<TagMap> {
    let result = match asset.asset_type {
        AssetType::Image => read_embedded_tags(path).await,
        AssetType::Video => ctx.probe.probe(path).await,
    };
    match result {
        Ok(tags) => Some(tags),
        Err(e) => {
            tracing::warn!(
                error = %e,
                asset_id = %asset.id,
                path = %path.display(),
                "Tag read failed, treating as empty tag set"
            );
            None
        }
    }
}

async fn read_sidecar(asset: &Asset) -> Option<TagMap> {
    let path = asset.sidecar_path.as_deref()?;
    match read_sidecar_tags(Path::new(path)).await {
        Ok(tags) => Some(tags),
        Err(e) => {
            tracing::warn!(
                error = %e,
                asset_id = %asset.id,
                sidecar = path,
                "Sidecar read failed, falling back to embedded tags"
            );
            None
        }
    }
}
