use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use fototek_core::models::{Asset, AssetType, AssetUpdate};
use fototek_core::PipelineError;

use super::Page;

const ASSET_COLUMNS: &str = r#"
    a.id,
    a.owner_id,
    a.asset_type,
    a.original_path,
    a.sidecar_path,
    a.is_visible,
    a.live_photo_video_id,
    a.file_created_at,
    a.file_modified_at,
    a.duration_secs
"#;

/// Read/write capability set over the asset store.
///
/// Scans are keyset-paginated: pass the cursor of the previous page (or `None`
/// to start) and a bounded page size.
#[async_trait]
pub trait AssetRepository: Send + Sync {
    /// Assets with no metadata record yet (`force=false` metadata scans).
    async fn list_missing_metadata(
        &self,
        cursor: Option<Uuid>,
        page_size: i64,
    ) -> Result<Page<Asset>, PipelineError>;

    /// Visible assets without a recorded sidecar path (`force=false` sidecar
    /// scans).
    async fn list_missing_sidecar(
        &self,
        cursor: Option<Uuid>,
        page_size: i64,
    ) -> Result<Page<Asset>, PipelineError>;

    /// Assets that already have a recorded sidecar (forced sidecar resync).
    async fn list_with_sidecar(
        &self,
        cursor: Option<Uuid>,
        page_size: i64,
    ) -> Result<Page<Asset>, PipelineError>;

    /// Every asset (`force=true` metadata scans).
    async fn list_all(
        &self,
        cursor: Option<Uuid>,
        page_size: i64,
    ) -> Result<Page<Asset>, PipelineError>;

    /// Apply a partial update and return the updated asset.
    async fn update(&self, id: Uuid, update: AssetUpdate) -> Result<Asset, PipelineError>;

    /// The complementary half of a live-photo pair: same owner, matching
    /// content identifier, the given type, excluding the asset itself. Ties
    /// between duplicate candidates break deterministically on lowest id.
    async fn find_live_photo_candidate(
        &self,
        owner_id: Uuid,
        content_id: &str,
        asset_type: AssetType,
        exclude_id: Uuid,
    ) -> Result<Option<Asset>, PipelineError>;

    /// Albums the asset belongs to. Drives the album reindex jobs chained
    /// after extraction.
    async fn list_album_ids_for_asset(&self, asset_id: Uuid) -> Result<Vec<Uuid>, PipelineError>;

    /// Oldest asset in an album; the album's representative snapshot, carried
    /// by the album search-index job for the downstream indexer.
    async fn find_first_for_album(&self, album_id: Uuid) -> Result<Option<Asset>, PipelineError>;
}

#[derive(Clone)]
pub struct PostgresAssetRepository {
    pool: PgPool,
}

impl PostgresAssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn page_query(
        &self,
        sql: String,
        cursor: Option<Uuid>,
        page_size: i64,
    ) -> Result<Page<Asset>, PipelineError> {
        let rows: Vec<Asset> = sqlx::query_as(&sql)
            .bind(cursor)
            .bind(page_size)
            .fetch_all(&self.pool)
            .await?;
        Ok(Page::from_rows(rows, page_size, |a| a.id))
    }
}

#[async_trait]
impl AssetRepository for PostgresAssetRepository {
    #[tracing::instrument(skip(self))]
    async fn list_missing_metadata(
        &self,
        cursor: Option<Uuid>,
        page_size: i64,
    ) -> Result<Page<Asset>, PipelineError> {
        let sql = format!(
            r#"
            SELECT {ASSET_COLUMNS}
            FROM assets a
            LEFT JOIN asset_metadata m ON m.asset_id = a.id
            WHERE m.asset_id IS NULL
              AND ($1::uuid IS NULL OR a.id > $1)
            ORDER BY a.id
            LIMIT $2
            "#
        );
        self.page_query(sql, cursor, page_size).await
    }

    #[tracing::instrument(skip(self))]
    async fn list_missing_sidecar(
        &self,
        cursor: Option<Uuid>,
        page_size: i64,
    ) -> Result<Page<Asset>, PipelineError> {
        let sql = format!(
            r#"
            SELECT {ASSET_COLUMNS}
            FROM assets a
            WHERE a.sidecar_path IS NULL
              AND a.is_visible
              AND ($1::uuid IS NULL OR a.id > $1)
            ORDER BY a.id
            LIMIT $2
            "#
        );
        self.page_query(sql, cursor, page_size).await
    }

    #[tracing::instrument(skip(self))]
    async fn list_with_sidecar(
        &self,
        cursor: Option<Uuid>,
        page_size: i64,
    ) -> Result<Page<Asset>, PipelineError> {
        let sql = format!(
            r#"
            SELECT {ASSET_COLUMNS}
            FROM assets a
            WHERE a.sidecar_path IS NOT NULL
              AND ($1::uuid IS NULL OR a.id > $1)
            ORDER BY a.id
            LIMIT $2
            "#
        );
        self.page_query(sql, cursor, page_size).await
    }

    #[tracing::instrument(skip(self))]
    async fn list_all(
        &self,
        cursor: Option<Uuid>,
        page_size: i64,
    ) -> Result<Page<Asset>, PipelineError> {
        let sql = format!(
            r#"
            SELECT {ASSET_COLUMNS}
            FROM assets a
            WHERE ($1::uuid IS NULL OR a.id > $1)
            ORDER BY a.id
            LIMIT $2
            "#
        );
        self.page_query(sql, cursor, page_size).await
    }

    #[tracing::instrument(skip(self, update))]
    async fn update(&self, id: Uuid, update: AssetUpdate) -> Result<Asset, PipelineError> {
        let sql = format!(
            r#"
            UPDATE assets a SET
                sidecar_path = COALESCE($2, a.sidecar_path),
                is_visible = COALESCE($3, a.is_visible),
                live_photo_video_id = COALESCE($4, a.live_photo_video_id),
                duration_secs = COALESCE($5, a.duration_secs)
            WHERE a.id = $1
            RETURNING {ASSET_COLUMNS}
            "#
        );
        let asset: Asset = sqlx::query_as(&sql)
            .bind(id)
            .bind(update.sidecar_path)
            .bind(update.is_visible)
            .bind(update.live_photo_video_id)
            .bind(update.duration_secs)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, asset_id = %id, "Failed to update asset");
                PipelineError::Database(e)
            })?;
        Ok(asset)
    }

    #[tracing::instrument(skip(self))]
    async fn find_live_photo_candidate(
        &self,
        owner_id: Uuid,
        content_id: &str,
        asset_type: AssetType,
        exclude_id: Uuid,
    ) -> Result<Option<Asset>, PipelineError> {
        let sql = format!(
            r#"
            SELECT {ASSET_COLUMNS}
            FROM assets a
            JOIN asset_metadata m ON m.asset_id = a.id
            WHERE a.owner_id = $1
              AND m.live_photo_cid = $2
              AND a.asset_type = $3
              AND a.id <> $4
            ORDER BY a.id
            LIMIT 1
            "#
        );
        let asset: Option<Asset> = sqlx::query_as(&sql)
            .bind(owner_id)
            .bind(content_id)
            .bind(asset_type)
            .bind(exclude_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(asset)
    }

    #[tracing::instrument(skip(self))]
    async fn list_album_ids_for_asset(&self, asset_id: Uuid) -> Result<Vec<Uuid>, PipelineError> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT album_id FROM album_assets WHERE asset_id = $1 ORDER BY album_id")
                .bind(asset_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    #[tracing::instrument(skip(self))]
    async fn find_first_for_album(&self, album_id: Uuid) -> Result<Option<Asset>, PipelineError> {
        let sql = format!(
            r#"
            SELECT {ASSET_COLUMNS}
            FROM assets a
            JOIN album_assets aa ON aa.asset_id = a.id
            WHERE aa.album_id = $1
            ORDER BY a.file_created_at, a.id
            LIMIT 1
            "#
        );
        let asset: Option<Asset> = sqlx::query_as(&sql)
            .bind(album_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(asset)
    }
}
