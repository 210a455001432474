//! Configuration module
//!
//! Env-var driven configuration for the metadata pipeline. Concurrency limits
//! are per job class and set once at process start; video extraction defaults
//! to a lower limit than image extraction because probing is heavier.

use std::env;
use std::path::PathBuf;

// Defaults
const MAX_CONNECTIONS: u32 = 10;
const IMAGE_CONCURRENCY: usize = 5;
const VIDEO_CONCURRENCY: usize = 1;
const SIDECAR_CONCURRENCY: usize = 5;
const BACKGROUND_CONCURRENCY: usize = 2;
const SCAN_PAGE_SIZE: i64 = 500;

/// Pipeline configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    // Per-job-class concurrency limits
    pub image_concurrency: usize,
    pub video_concurrency: usize,
    pub sidecar_concurrency: usize,
    pub background_concurrency: usize,
    // Cursor-paginated scans
    pub scan_page_size: i64,
    // Reverse geocoding (static, process-start switch)
    pub reverse_geocoding_enabled: bool,
    pub geodata_path: PathBuf,
    pub geocode_cache_path: PathBuf,
    // External tools
    pub ffprobe_path: String,
    // Enqueue queue-metadata-scan / queue-sidecar-scan at startup
    pub scan_on_startup: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: env_parsed("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            image_concurrency: env_parsed("IMAGE_EXTRACTION_CONCURRENCY", IMAGE_CONCURRENCY)
                .max(1),
            video_concurrency: env_parsed("VIDEO_EXTRACTION_CONCURRENCY", VIDEO_CONCURRENCY)
                .max(1),
            sidecar_concurrency: env_parsed("SIDECAR_CONCURRENCY", SIDECAR_CONCURRENCY).max(1),
            background_concurrency: env_parsed("BACKGROUND_CONCURRENCY", BACKGROUND_CONCURRENCY)
                .max(1),
            scan_page_size: env_parsed("SCAN_PAGE_SIZE", SCAN_PAGE_SIZE).max(1),
            reverse_geocoding_enabled: env_parsed("REVERSE_GEOCODING_ENABLED", true),
            geodata_path: PathBuf::from(
                env::var("GEODATA_PATH").unwrap_or_else(|_| "geodata/places.tsv".to_string()),
            ),
            geocode_cache_path: PathBuf::from(
                env::var("GEOCODE_CACHE_PATH")
                    .unwrap_or_else(|_| "geodata/places.cache.json".to_string()),
            ),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            scan_on_startup: env_parsed("SCAN_ON_STARTUP", true),
        })
    }
}

fn env_parsed<T: std::str::FromStr + ToString>(name: &str, default: T) -> T {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or(default)
}
