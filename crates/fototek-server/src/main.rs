mod setup;
mod telemetry;

use fototek_core::models::{Job, JobName};
use fototek_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;
    telemetry::init_tracing();

    let pool = setup::setup_database(&config).await?;
    let pipeline = setup::build_pipeline(&config, pool)?;

    // Metadata consumers are paused while the index builds, so a startup scan
    // queued below cannot race a half-built index.
    pipeline.geocoder.init().await?;

    if config.scan_on_startup {
        pipeline
            .queue
            .enqueue(Job::scan(JobName::QueueMetadataScan, false))?;
        pipeline
            .queue
            .enqueue(Job::scan(JobName::QueueSidecarScan, false))?;
        tracing::info!("Startup scans queued");
    }

    tracing::info!("Pipeline running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    pipeline.queue.shutdown();
    Ok(())
}
