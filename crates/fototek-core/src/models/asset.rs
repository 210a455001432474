use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Asset type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "asset_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Image,
    Video,
}

impl AssetType {
    /// The type of the complementary half of a live-photo pair.
    pub fn live_photo_complement(self) -> Self {
        match self {
            AssetType::Image => AssetType::Video,
            AssetType::Video => AssetType::Image,
        }
    }
}

/// One media item tracked by the system. Owned by the system of record and
/// mutated in place by workers, never recreated.
///
/// `live_photo_video_id` is asymmetric: only the still side stores the forward
/// pointer; the motion side is marked invisible instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Asset {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub asset_type: AssetType,
    pub original_path: String,
    pub sidecar_path: Option<String>,
    pub is_visible: bool,
    pub live_photo_video_id: Option<Uuid>,
    pub file_created_at: DateTime<Utc>,
    pub file_modified_at: DateTime<Utc>,
    pub duration_secs: Option<f64>,
}

/// Partial asset update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetUpdate {
    pub sidecar_path: Option<String>,
    pub is_visible: Option<bool>,
    pub live_photo_video_id: Option<Uuid>,
    pub duration_secs: Option<f64>,
}
