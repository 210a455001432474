//! In-process job queue: per-class consumers, bounded concurrency, pause/resume.
//!
//! Jobs are fire-and-forget. Each job class has its own channel, its own
//! concurrency limit, and its own pause flag; pausing one class never stalls
//! the others. [`JobQueue::shutdown`] signals every consumer to stop; it does
//! not wait for in-flight jobs.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch, Semaphore};

use fototek_core::models::{Job, JobName};
use fototek_core::ConsumerBarrier;

use crate::context::JobHandlerContext;

/// Job class. Every [`JobName`] routes to exactly one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    ImageMetadata,
    VideoMetadata,
    Sidecar,
    Background,
}

impl QueueName {
    pub fn for_job(name: JobName) -> Self {
        match name {
            JobName::ExtractImageMetadata => QueueName::ImageMetadata,
            JobName::ExtractVideoMetadata => QueueName::VideoMetadata,
            JobName::SidecarDiscover | JobName::SidecarResync => QueueName::Sidecar,
            JobName::QueueMetadataScan
            | JobName::QueueSidecarScan
            | JobName::MigrateStorageTemplate
            | JobName::SearchIndexAlbum => QueueName::Background,
        }
    }

    const ALL: [QueueName; 4] = [
        QueueName::ImageMetadata,
        QueueName::VideoMetadata,
        QueueName::Sidecar,
        QueueName::Background,
    ];
}

#[derive(Clone)]
pub struct JobQueueConfig {
    pub image_concurrency: usize,
    pub video_concurrency: usize,
    pub sidecar_concurrency: usize,
    pub background_concurrency: usize,
}

impl JobQueueConfig {
    fn concurrency(&self, name: QueueName) -> usize {
        let n = match name {
            QueueName::ImageMetadata => self.image_concurrency,
            QueueName::VideoMetadata => self.video_concurrency,
            QueueName::Sidecar => self.sidecar_concurrency,
            QueueName::Background => self.background_concurrency,
        };
        n.max(1)
    }
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            image_concurrency: 5,
            video_concurrency: 1,
            sidecar_concurrency: 5,
            background_concurrency: 2,
        }
    }
}

struct QueueState {
    tx: mpsc::UnboundedSender<Job>,
    paused_tx: watch::Sender<bool>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
}

#[derive(Clone)]
pub struct JobQueue {
    queues: Arc<HashMap<QueueName, QueueState>>,
    shutdown_tx: watch::Sender<bool>,
}

impl JobQueue {
    /// Create a new JobQueue with a weak reference to the dispatch context and
    /// spawn one consumer loop per job class.
    pub fn new(config: JobQueueConfig, context: Weak<dyn JobHandlerContext>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        let mut queues = HashMap::new();
        for name in QueueName::ALL {
            let concurrency = config.concurrency(name);
            let (tx, rx) = mpsc::unbounded_channel();
            let (paused_tx, paused_rx) = watch::channel(false);
            let semaphore = Arc::new(Semaphore::new(concurrency));

            tokio::spawn(Self::consumer_loop(
                name,
                rx,
                paused_rx,
                semaphore.clone(),
                context.clone(),
                shutdown_tx.subscribe(),
            ));

            queues.insert(
                name,
                QueueState {
                    tx,
                    paused_tx,
                    semaphore,
                    concurrency,
                },
            );
        }

        tracing::info!(
            image = config.concurrency(QueueName::ImageMetadata),
            video = config.concurrency(QueueName::VideoMetadata),
            sidecar = config.concurrency(QueueName::Sidecar),
            background = config.concurrency(QueueName::Background),
            "Job queue consumers started"
        );

        Self {
            queues: Arc::new(queues),
            shutdown_tx,
        }
    }

    /// Submit a job to its class's queue.
    pub fn enqueue(&self, job: Job) -> Result<()> {
        let queue = QueueName::for_job(job.name);
        let state = self
            .queues
            .get(&queue)
            .ok_or_else(|| anyhow!("No queue registered for class {:?}", queue))?;
        let name = job.name;
        state
            .tx
            .send(job)
            .map_err(|_| anyhow!("Queue {:?} is closed, cannot enqueue {}", queue, name))?;
        tracing::debug!(job = %name, queue = ?queue, "Job enqueued");
        Ok(())
    }

    /// Pause a job class and wait for its in-flight jobs to finish.
    ///
    /// Sets the pause flag, then acquires the class's full permit count; the
    /// acquire completes only once every running job has returned its permit.
    /// Queued jobs stay in the channel until [`JobQueue::resume`].
    pub async fn pause(&self, name: QueueName) {
        let Some(state) = self.queues.get(&name) else {
            return;
        };
        let _ = state.paused_tx.send(true);
        match state
            .semaphore
            .clone()
            .acquire_many_owned(state.concurrency as u32)
            .await
        {
            Ok(permits) => drop(permits),
            Err(_) => return,
        }
        tracing::info!(queue = ?name, "Queue paused, in-flight jobs drained");
    }

    /// Resume a paused job class.
    pub fn resume(&self, name: QueueName) {
        if let Some(state) = self.queues.get(&name) {
            let _ = state.paused_tx.send(false);
            tracing::info!(queue = ?name, "Queue resumed");
        }
    }

    /// Signals every consumer loop to stop. Returns immediately; in-flight
    /// jobs run to completion on the runtime.
    pub fn shutdown(&self) {
        tracing::info!("Initiating job queue shutdown");
        let _ = self.shutdown_tx.send(true);
    }

    async fn consumer_loop(
        name: QueueName,
        mut rx: mpsc::UnboundedReceiver<Job>,
        mut paused_rx: watch::Receiver<bool>,
        semaphore: Arc<Semaphore>,
        context: Weak<dyn JobHandlerContext>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            let job = tokio::select! {
                _ = shutdown_rx.changed() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            // Wait until the class is unpaused, then take a permit. Re-check
            // the flag after acquiring: a pause that lands between the check
            // and the acquire must win, or its drain would miss this job.
            let permit = loop {
                while *paused_rx.borrow() {
                    if paused_rx.changed().await.is_err() {
                        return;
                    }
                }
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                if *paused_rx.borrow() {
                    drop(permit);
                    continue;
                }
                break permit;
            };

            let ctx = context.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let Some(ctx) = ctx.upgrade() else {
                    tracing::warn!(job = %job.name, "Handler context dropped, discarding job");
                    return;
                };
                if let Err(e) = ctx.dispatch_job(&job).await {
                    tracing::error!(error = %e, job = %job.name, "Job failed");
                }
            });
        }
        tracing::debug!(queue = ?name, "Consumer loop stopped");
    }
}

/// Barrier over the two metadata-extraction classes. Held by components that
/// must not run concurrently with tag extraction, such as the reverse-geocoding
/// index build.
pub struct MetadataExtractionBarrier {
    queue: JobQueue,
}

impl MetadataExtractionBarrier {
    pub fn new(queue: JobQueue) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl ConsumerBarrier for MetadataExtractionBarrier {
    async fn pause(&self) {
        self.queue.pause(QueueName::ImageMetadata).await;
        self.queue.pause(QueueName::VideoMetadata).await;
    }

    async fn resume(&self) {
        self.queue.resume(QueueName::ImageMetadata);
        self.queue.resume(QueueName::VideoMetadata);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fototek_core::models::{Asset, AssetType};
    use fototek_processing::{ReverseGeocoder, ReverseGeocoderConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    struct CountingContext {
        started: AtomicUsize,
        running: AtomicUsize,
        max_running: AtomicUsize,
        finished: AtomicUsize,
        delay: Duration,
    }

    impl CountingContext {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                started: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
                delay,
            })
        }
    }

    #[async_trait]
    impl JobHandlerContext for CountingContext {
        async fn dispatch_job(self: Arc<Self>, _job: &Job) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_asset(asset_type: AssetType) -> Asset {
        Asset {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            asset_type,
            original_path: "/photos/a.jpg".into(),
            sidecar_path: None,
            is_visible: true,
            live_photo_video_id: None,
            file_created_at: Utc::now(),
            file_modified_at: Utc::now(),
            duration_secs: None,
        }
    }

    async fn wait_until(deadline: Duration, f: impl Fn() -> bool) -> bool {
        let start = tokio::time::Instant::now();
        while start.elapsed() < deadline {
            if f() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        f()
    }

    #[test]
    fn every_job_name_routes_to_a_class() {
        assert_eq!(
            QueueName::for_job(JobName::ExtractImageMetadata),
            QueueName::ImageMetadata
        );
        assert_eq!(
            QueueName::for_job(JobName::ExtractVideoMetadata),
            QueueName::VideoMetadata
        );
        assert_eq!(
            QueueName::for_job(JobName::SidecarDiscover),
            QueueName::Sidecar
        );
        assert_eq!(
            QueueName::for_job(JobName::SidecarResync),
            QueueName::Sidecar
        );
        assert_eq!(
            QueueName::for_job(JobName::QueueMetadataScan),
            QueueName::Background
        );
        assert_eq!(
            QueueName::for_job(JobName::MigrateStorageTemplate),
            QueueName::Background
        );
    }

    #[tokio::test]
    async fn class_concurrency_is_bounded() {
        let ctx = CountingContext::new(Duration::from_millis(20));
        let weak: Weak<dyn JobHandlerContext> =
            Arc::downgrade(&(ctx.clone() as Arc<dyn JobHandlerContext>));
        let config = JobQueueConfig {
            image_concurrency: 2,
            ..Default::default()
        };
        let queue = JobQueue::new(config, weak);

        for _ in 0..8 {
            queue
                .enqueue(Job::for_asset(
                    JobName::ExtractImageMetadata,
                    test_asset(AssetType::Image),
                ))
                .unwrap();
        }

        let done = {
            let ctx = ctx.clone();
            wait_until(Duration::from_secs(5), move || {
                ctx.finished.load(Ordering::SeqCst) == 8
            })
            .await
        };
        assert!(done, "jobs did not finish in time");
        assert!(ctx.max_running.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn pause_drains_in_flight_and_blocks_new_jobs() {
        let ctx = CountingContext::new(Duration::from_millis(40));
        let weak: Weak<dyn JobHandlerContext> =
            Arc::downgrade(&(ctx.clone() as Arc<dyn JobHandlerContext>));
        let config = JobQueueConfig {
            image_concurrency: 2,
            ..Default::default()
        };
        let queue = JobQueue::new(config, weak);

        for _ in 0..4 {
            queue
                .enqueue(Job::for_asset(
                    JobName::ExtractImageMetadata,
                    test_asset(AssetType::Image),
                ))
                .unwrap();
        }
        let started = {
            let ctx = ctx.clone();
            wait_until(Duration::from_secs(5), move || {
                ctx.started.load(Ordering::SeqCst) > 0
            })
            .await
        };
        assert!(started);

        queue.pause(QueueName::ImageMetadata).await;
        assert_eq!(ctx.running.load(Ordering::SeqCst), 0);

        // No new starts while paused, even with jobs still queued.
        let started_at_pause = ctx.started.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ctx.started.load(Ordering::SeqCst), started_at_pause);

        queue.resume(QueueName::ImageMetadata);
        let done = {
            let ctx = ctx.clone();
            wait_until(Duration::from_secs(5), move || {
                ctx.finished.load(Ordering::SeqCst) == 4
            })
            .await
        };
        assert!(done, "queued jobs did not run after resume");
    }

    #[tokio::test]
    async fn pausing_one_class_leaves_others_running() {
        let ctx = CountingContext::new(Duration::from_millis(10));
        let weak: Weak<dyn JobHandlerContext> =
            Arc::downgrade(&(ctx.clone() as Arc<dyn JobHandlerContext>));
        let queue = JobQueue::new(JobQueueConfig::default(), weak);

        queue.pause(QueueName::ImageMetadata).await;
        queue
            .enqueue(Job::for_asset(
                JobName::ExtractVideoMetadata,
                test_asset(AssetType::Video),
            ))
            .unwrap();

        let done = {
            let ctx = ctx.clone();
            wait_until(Duration::from_secs(5), move || {
                ctx.finished.load(Ordering::SeqCst) == 1
            })
            .await
        };
        assert!(done, "video job should run while image class is paused");
    }

    #[tokio::test]
    async fn barrier_pauses_both_metadata_classes() {
        let ctx = CountingContext::new(Duration::from_millis(10));
        let weak: Weak<dyn JobHandlerContext> =
            Arc::downgrade(&(ctx.clone() as Arc<dyn JobHandlerContext>));
        let queue = JobQueue::new(JobQueueConfig::default(), weak);
        let barrier = MetadataExtractionBarrier::new(queue.clone());

        barrier.pause().await;
        queue
            .enqueue(Job::for_asset(
                JobName::ExtractImageMetadata,
                test_asset(AssetType::Image),
            ))
            .unwrap();
        queue
            .enqueue(Job::for_asset(
                JobName::ExtractVideoMetadata,
                test_asset(AssetType::Video),
            ))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ctx.started.load(Ordering::SeqCst), 0);

        barrier.resume().await;
        let done = {
            let ctx = ctx.clone();
            wait_until(Duration::from_secs(5), move || {
                ctx.finished.load(Ordering::SeqCst) == 2
            })
            .await
        };
        assert!(done, "metadata jobs did not run after barrier release");
    }

    struct GeocodingContext {
        geocoder: Arc<ReverseGeocoder>,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl JobHandlerContext for GeocodingContext {
        async fn dispatch_job(self: Arc<Self>, _job: &Job) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(150)).await;
            let _ = self.geocoder.reverse_geocode(40.7, -74.0).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    // A rebuild drains the metadata consumers while one of them is mid-job and
    // about to call the geocoder. The drain must complete even though that
    // lookup races the rebuild.
    #[tokio::test]
    async fn index_rebuild_completes_with_a_lookup_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("places.tsv");
        std::fs::write(
            &data_path,
            "New York\tNew York\tUnited States\t40.7128\t-74.0060\n",
        )
        .unwrap();
        let geo_config = ReverseGeocoderConfig {
            enabled: true,
            data_path,
            cache_path: dir.path().join("places.cache.json"),
        };

        let mut slots = None;
        let ctx = Arc::new_cyclic(|weak: &Weak<GeocodingContext>| {
            let weak_ctx: Weak<dyn JobHandlerContext> = weak.clone();
            let queue = JobQueue::new(JobQueueConfig::default(), weak_ctx);
            let barrier = Arc::new(MetadataExtractionBarrier::new(queue.clone()));
            let geocoder = Arc::new(ReverseGeocoder::new(geo_config, Some(barrier)));
            slots = Some((queue, geocoder.clone()));
            GeocodingContext {
                geocoder,
                finished: AtomicUsize::new(0),
            }
        });
        let (queue, geocoder) = slots.unwrap();

        geocoder.init().await.unwrap();
        geocoder.delete_cache().await.unwrap();

        queue
            .enqueue(Job::for_asset(
                JobName::ExtractImageMetadata,
                test_asset(AssetType::Image),
            ))
            .unwrap();
        // Let the consumer claim its permit before the rebuild starts draining.
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(5), geocoder.init())
            .await
            .expect("rebuild must not block behind an in-flight lookup")
            .unwrap();

        let done = {
            let ctx = ctx.clone();
            wait_until(Duration::from_secs(5), move || {
                ctx.finished.load(Ordering::SeqCst) == 1
            })
            .await
        };
        assert!(done, "in-flight job did not finish after the rebuild");
        assert!(geocoder
            .reverse_geocode(40.7, -74.0)
            .await
            .unwrap()
            .is_some());
    }
}
