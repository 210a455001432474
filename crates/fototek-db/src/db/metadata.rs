use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use fototek_core::models::AssetMetadata;
use fototek_core::PipelineError;

/// Capability set over the per-asset metadata record store.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Insert or wholesale-replace the record for `record.asset_id`.
    ///
    /// Conflict key is the asset id; every column is rewritten, so duplicate
    /// at-least-once deliveries converge on the same row.
    async fn upsert(&self, record: &AssetMetadata) -> Result<(), PipelineError>;

    async fn get(&self, asset_id: Uuid) -> Result<Option<AssetMetadata>, PipelineError>;
}

#[derive(Clone)]
pub struct PostgresMetadataRepository {
    pool: PgPool,
}

impl PostgresMetadataRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataRepository for PostgresMetadataRepository {
    #[tracing::instrument(skip(self, record), fields(asset_id = %record.asset_id))]
    async fn upsert(&self, record: &AssetMetadata) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO asset_metadata (
                asset_id, file_size_bytes, make, model, lens_model,
                width, height, orientation, exposure_time, f_number,
                focal_length, iso, latitude, longitude, timezone,
                country, state, city, fps, live_photo_cid,
                taken_at, modified_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22
            )
            ON CONFLICT (asset_id) DO UPDATE SET
                file_size_bytes = EXCLUDED.file_size_bytes,
                make = EXCLUDED.make,
                model = EXCLUDED.model,
                lens_model = EXCLUDED.lens_model,
                width = EXCLUDED.width,
                height = EXCLUDED.height,
                orientation = EXCLUDED.orientation,
                exposure_time = EXCLUDED.exposure_time,
                f_number = EXCLUDED.f_number,
                focal_length = EXCLUDED.focal_length,
                iso = EXCLUDED.iso,
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                timezone = EXCLUDED.timezone,
                country = EXCLUDED.country,
                state = EXCLUDED.state,
                city = EXCLUDED.city,
                fps = EXCLUDED.fps,
                live_photo_cid = EXCLUDED.live_photo_cid,
                taken_at = EXCLUDED.taken_at,
                modified_at = EXCLUDED.modified_at
            "#,
        )
        .bind(record.asset_id)
        .bind(record.file_size_bytes)
        .bind(&record.make)
        .bind(&record.model)
        .bind(&record.lens_model)
        .bind(record.width)
        .bind(record.height)
        .bind(record.orientation)
        .bind(&record.exposure_time)
        .bind(record.f_number)
        .bind(record.focal_length)
        .bind(record.iso)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(&record.timezone)
        .bind(&record.country)
        .bind(&record.state)
        .bind(&record.city)
        .bind(record.fps)
        .bind(&record.live_photo_cid)
        .bind(record.taken_at)
        .bind(record.modified_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, asset_id = %record.asset_id, "Failed to upsert metadata record");
            PipelineError::Database(e)
        })?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, asset_id: Uuid) -> Result<Option<AssetMetadata>, PipelineError> {
        let record: Option<AssetMetadata> =
            sqlx::query_as("SELECT * FROM asset_metadata WHERE asset_id = $1")
                .bind(asset_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record)
    }
}
