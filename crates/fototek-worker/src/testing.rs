//! Test support: in-memory repositories and a recording dispatch context.
//!
//! Only for unit and integration tests; nothing here touches a real database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use fototek_core::models::{Asset, AssetMetadata, AssetType, AssetUpdate, Job};
use fototek_core::PipelineError;
use fototek_db::{AssetRepository, MetadataRepository, Page};

use crate::context::JobHandlerContext;

/// In-memory asset and metadata store implementing both repository traits.
/// Assets are kept in id order so keyset pagination behaves like the real
/// queries.
#[derive(Default)]
pub struct FakeStore {
    assets: Mutex<BTreeMap<Uuid, Asset>>,
    records: Mutex<BTreeMap<Uuid, AssetMetadata>>,
    albums: Mutex<BTreeMap<Uuid, Vec<Uuid>>>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_asset(&self, asset: Asset) {
        self.assets.lock().unwrap().insert(asset.id, asset);
    }

    pub fn insert_record(&self, record: AssetMetadata) {
        self.records.lock().unwrap().insert(record.asset_id, record);
    }

    pub fn add_album_member(&self, album_id: Uuid, asset_id: Uuid) {
        self.albums
            .lock()
            .unwrap()
            .entry(album_id)
            .or_default()
            .push(asset_id);
    }

    pub fn asset(&self, id: Uuid) -> Option<Asset> {
        self.assets.lock().unwrap().get(&id).cloned()
    }

    pub fn record(&self, asset_id: Uuid) -> Option<AssetMetadata> {
        self.records.lock().unwrap().get(&asset_id).cloned()
    }

    fn page(
        &self,
        cursor: Option<Uuid>,
        page_size: i64,
        filter: impl Fn(&Asset) -> bool,
    ) -> Page<Asset> {
        let assets = self.assets.lock().unwrap();
        let items: Vec<Asset> = assets
            .values()
            .filter(|a| cursor.map_or(true, |c| a.id > c))
            .filter(|a| filter(a))
            .take(page_size as usize)
            .cloned()
            .collect();
        Page::from_rows(items, page_size, |a| a.id)
    }

    fn has_record(&self, asset_id: Uuid) -> bool {
        self.records.lock().unwrap().contains_key(&asset_id)
    }
}

#[async_trait]
impl AssetRepository for FakeStore {
    async fn list_missing_metadata(
        &self,
        cursor: Option<Uuid>,
        page_size: i64,
    ) -> Result<Page<Asset>, PipelineError> {
        Ok(self.page(cursor, page_size, |a| !self.has_record(a.id)))
    }

    async fn list_missing_sidecar(
        &self,
        cursor: Option<Uuid>,
        page_size: i64,
    ) -> Result<Page<Asset>, PipelineError> {
        Ok(self.page(cursor, page_size, |a| a.is_visible && a.sidecar_path.is_none()))
    }

    async fn list_with_sidecar(
        &self,
        cursor: Option<Uuid>,
        page_size: i64,
    ) -> Result<Page<Asset>, PipelineError> {
        Ok(self.page(cursor, page_size, |a| a.sidecar_path.is_some()))
    }

    async fn list_all(
        &self,
        cursor: Option<Uuid>,
        page_size: i64,
    ) -> Result<Page<Asset>, PipelineError> {
        Ok(self.page(cursor, page_size, |_| true))
    }

    async fn update(&self, id: Uuid, update: AssetUpdate) -> Result<Asset, PipelineError> {
        let mut assets = self.assets.lock().unwrap();
        let asset = assets
            .get_mut(&id)
            .ok_or_else(|| PipelineError::Lookup(format!("asset {id} not found")))?;
        if let Some(sidecar_path) = update.sidecar_path {
            asset.sidecar_path = Some(sidecar_path);
        }
        if let Some(is_visible) = update.is_visible {
            asset.is_visible = is_visible;
        }
        if let Some(live_photo_video_id) = update.live_photo_video_id {
            asset.live_photo_video_id = Some(live_photo_video_id);
        }
        if let Some(duration_secs) = update.duration_secs {
            asset.duration_secs = Some(duration_secs);
        }
        Ok(asset.clone())
    }

    async fn find_live_photo_candidate(
        &self,
        owner_id: Uuid,
        content_id: &str,
        asset_type: AssetType,
        exclude_id: Uuid,
    ) -> Result<Option<Asset>, PipelineError> {
        let records = self.records.lock().unwrap();
        let assets = self.assets.lock().unwrap();
        Ok(assets
            .values()
            .find(|a| {
                a.owner_id == owner_id
                    && a.asset_type == asset_type
                    && a.id != exclude_id
                    && records
                        .get(&a.id)
                        .is_some_and(|r| r.live_photo_cid.as_deref() == Some(content_id))
            })
            .cloned())
    }

    async fn list_album_ids_for_asset(&self, asset_id: Uuid) -> Result<Vec<Uuid>, PipelineError> {
        Ok(self
            .albums
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, members)| members.contains(&asset_id))
            .map(|(album_id, _)| *album_id)
            .collect())
    }

    async fn find_first_for_album(&self, album_id: Uuid) -> Result<Option<Asset>, PipelineError> {
        let members = self
            .albums
            .lock()
            .unwrap()
            .get(&album_id)
            .cloned()
            .unwrap_or_default();
        let assets = self.assets.lock().unwrap();
        Ok(members
            .iter()
            .filter_map(|id| assets.get(id))
            .min_by_key(|a| (a.file_created_at, a.id))
            .cloned())
    }
}

#[async_trait]
impl MetadataRepository for FakeStore {
    async fn upsert(&self, record: &AssetMetadata) -> Result<(), PipelineError> {
        self.records
            .lock()
            .unwrap()
            .insert(record.asset_id, record.clone());
        Ok(())
    }

    async fn get(&self, asset_id: Uuid) -> Result<Option<AssetMetadata>, PipelineError> {
        Ok(self.records.lock().unwrap().get(&asset_id).cloned())
    }
}

/// Dispatch context that forwards every job it receives to a channel.
pub struct RecordingContext {
    tx: mpsc::UnboundedSender<Job>,
}

impl RecordingContext {
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<Job>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl JobHandlerContext for RecordingContext {
    async fn dispatch_job(self: Arc<Self>, job: &Job) -> Result<()> {
        let _ = self.tx.send(job.clone());
        Ok(())
    }
}

/// A visible asset with no sidecar and no pairing state.
pub fn asset_fixture(asset_type: AssetType, original_path: &str) -> Asset {
    Asset {
        id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        asset_type,
        original_path: original_path.to_string(),
        sidecar_path: None,
        is_visible: true,
        live_photo_video_id: None,
        file_created_at: Utc::now(),
        file_modified_at: Utc::now(),
        duration_secs: None,
    }
}
