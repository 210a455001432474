//! Process wiring: database, repositories, services, queue, context.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use fototek_core::Config;
use fototek_db::{PostgresAssetRepository, PostgresMetadataRepository};
use fototek_processing::{ReverseGeocoder, ReverseGeocoderConfig, VideoProbe};
use fototek_worker::{
    JobHandlerContext, JobQueue, JobQueueConfig, MetadataExtractionBarrier, PipelineContext,
};

/// Setup database connection pool and run migrations.
pub async fn setup_database(config: &Config) -> Result<PgPool> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(&config.database_url)
        .await?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Database connected successfully"
    );

    // Pending migrations run on startup (path: workspace migrations/ from crate root)
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

pub struct Pipeline {
    pub context: Arc<PipelineContext>,
    pub queue: JobQueue,
    pub geocoder: Arc<ReverseGeocoder>,
}

/// Build the queue, the handler context, and the geocoder, and wire them
/// together.
///
/// The pieces form a cycle: the queue dispatches into the context, the context
/// enqueues into the queue, and the geocoder pauses the queue through the
/// consumer barrier. `Arc::new_cyclic` hands the queue a weak reference to the
/// context before the context exists, which keeps the cycle from leaking.
pub fn build_pipeline(config: &Config, pool: PgPool) -> Result<Pipeline> {
    let queue_config = JobQueueConfig {
        image_concurrency: config.image_concurrency,
        video_concurrency: config.video_concurrency,
        sidecar_concurrency: config.sidecar_concurrency,
        background_concurrency: config.background_concurrency,
    };
    let geocoder_config = ReverseGeocoderConfig {
        enabled: config.reverse_geocoding_enabled,
        data_path: config.geodata_path.clone(),
        cache_path: config.geocode_cache_path.clone(),
    };

    let assets = Arc::new(PostgresAssetRepository::new(pool.clone()));
    let metadata = Arc::new(PostgresMetadataRepository::new(pool));

    let mut queue_slot = None;
    let mut geocoder_slot = None;
    let context = Arc::new_cyclic(|weak: &Weak<PipelineContext>| {
        let weak_context: Weak<dyn JobHandlerContext> = weak.clone();
        let queue = JobQueue::new(queue_config, weak_context);
        let barrier = Arc::new(MetadataExtractionBarrier::new(queue.clone()));
        let geocoder = Arc::new(ReverseGeocoder::new(geocoder_config, Some(barrier)));

        let context = PipelineContext::new(
            assets,
            metadata,
            geocoder.clone(),
            VideoProbe::new(config.ffprobe_path.clone()),
            config.scan_page_size,
        );
        context.attach_queue(queue.clone());

        queue_slot = Some(queue);
        geocoder_slot = Some(geocoder);
        context
    });

    Ok(Pipeline {
        context,
        queue: queue_slot.context("queue is built during context construction")?,
        geocoder: geocoder_slot.context("geocoder is built during context construction")?,
    })
}
