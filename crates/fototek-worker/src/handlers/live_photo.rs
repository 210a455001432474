//! Live-photo pairing.
//!
//! Linking runs from whichever half finishes extraction last, so the same
//! logic serves both sides. Only the still holds the forward pointer; the
//! motion half is hidden instead of pointing back.

use fototek_core::models::{Asset, AssetType, AssetUpdate};
use fototek_core::PipelineError;

use super::PipelineContext;

/// Link `asset` with its complementary half, if one is already indexed under
/// the same content identifier. Returns the asset as it stands afterwards.
pub(crate) async fn link(
    ctx: &PipelineContext,
    asset: &Asset,
    content_id: &str,
) -> Result<Asset, PipelineError> {
    let complement = asset.asset_type.live_photo_complement();
    let candidate = ctx
        .assets
        .find_live_photo_candidate(asset.owner_id, content_id, complement, asset.id)
        .await?;
    let Some(candidate) = candidate else {
        return Ok(asset.clone());
    };

    let updated = match asset.asset_type {
        AssetType::Image => {
            let updated = ctx
                .assets
                .update(
                    asset.id,
                    AssetUpdate {
                        live_photo_video_id: Some(candidate.id),
                        ..Default::default()
                    },
                )
                .await?;
            ctx.assets
                .update(
                    candidate.id,
                    AssetUpdate {
                        is_visible: Some(false),
                        ..Default::default()
                    },
                )
                .await?;
            updated
        }
        AssetType::Video => {
            ctx.assets
                .update(
                    candidate.id,
                    AssetUpdate {
                        live_photo_video_id: Some(asset.id),
                        ..Default::default()
                    },
                )
                .await?;
            ctx.assets
                .update(
                    asset.id,
                    AssetUpdate {
                        is_visible: Some(false),
                        ..Default::default()
                    },
                )
                .await?
        }
    };

    tracing::info!(
        asset_id = %asset.id,
        paired_with = %candidate.id,
        "Live photo pair linked"
    );
    Ok(updated)
}
