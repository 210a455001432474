use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Derived metadata record, 1:1 with an asset.
///
/// Created or replaced wholesale on each (re-)extraction: persistence is an
/// upsert keyed by `asset_id`, never a partial patch merge, so a duplicate
/// job delivery re-writes an identical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AssetMetadata {
    pub asset_id: Uuid,
    pub file_size_bytes: i64,
    pub make: Option<String>,
    pub model: Option<String>,
    pub lens_model: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub orientation: Option<i32>,
    pub exposure_time: Option<String>,
    pub f_number: Option<f64>,
    pub focal_length: Option<f64>,
    pub iso: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub fps: Option<i32>,
    pub live_photo_cid: Option<String>,
    /// Canonical capture instant; falls back to the filesystem timestamp when
    /// no tag source yields a value.
    pub taken_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl AssetMetadata {
    /// An empty record carrying only the fields every asset has.
    pub fn bare(
        asset_id: Uuid,
        file_size_bytes: i64,
        taken_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            asset_id,
            file_size_bytes,
            make: None,
            model: None,
            lens_model: None,
            width: None,
            height: None,
            orientation: None,
            exposure_time: None,
            f_number: None,
            focal_length: None,
            iso: None,
            latitude: None,
            longitude: None,
            timezone: None,
            country: None,
            state: None,
            city: None,
            fps: None,
            live_photo_cid: None,
            taken_at,
            modified_at,
        }
    }
}
