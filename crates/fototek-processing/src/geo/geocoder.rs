//! Process-wide reverse geocoder.
//!
//! The index lifecycle is absent → building → ready. `init` is idempotent and
//! safe to call once at startup; `delete_cache` tears the index down and must
//! be followed by `init` before any lookup succeeds. Index (re)builds assert
//! the consumer barrier first, so no extraction job observes a half-built
//! index, and release it when the build finishes or fails. Lookups racing a
//! rebuild see the absent state and fail with `Lookup`; they never block.
//!
//! When reverse geocoding is disabled at process start the component performs
//! no work and lookups are skipped silently.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use fototek_core::{ConsumerBarrier, PipelineError};

/// A resolved place name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub city: String,
    pub state: Option<String>,
    pub country: String,
}

/// One indexed place. The on-disk cache is a JSON array of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeoEntry {
    name: String,
    state: Option<String>,
    country: String,
    latitude: f64,
    longitude: f64,
}

#[derive(Clone, Debug)]
pub struct ReverseGeocoderConfig {
    pub enabled: bool,
    /// Tab-separated source data: name, state, country, latitude, longitude.
    pub data_path: PathBuf,
    /// Persisted index; deleted by `delete_cache`, rebuilt from `data_path`.
    pub cache_path: PathBuf,
}

enum IndexState {
    Absent,
    Ready(Arc<Vec<GeoEntry>>),
}

pub struct ReverseGeocoder {
    config: ReverseGeocoderConfig,
    state: RwLock<IndexState>,
    barrier: Option<Arc<dyn ConsumerBarrier>>,
}

impl ReverseGeocoder {
    /// The barrier covers the metadata-extraction consumers; pass `None` only
    /// when no consumers exist yet (tests, one-shot tools).
    pub fn new(config: ReverseGeocoderConfig, barrier: Option<Arc<dyn ConsumerBarrier>>) -> Self {
        Self {
            config,
            state: RwLock::new(IndexState::Absent),
            barrier,
        }
    }

    /// Build or load the index. Idempotent: a ready index is left untouched.
    ///
    /// The barrier is asserted before any lock is taken: an in-flight
    /// extraction job may be sitting in a lookup, and the drain cannot finish
    /// while that lookup is blocked on the state lock. The build runs outside
    /// the lock; the write lock is held only for the swap.
    #[tracing::instrument(skip(self))]
    pub async fn init(&self) -> Result<(), PipelineError> {
        if !self.config.enabled {
            tracing::info!("Reverse geocoding disabled, skipping index init");
            return Ok(());
        }
        if matches!(*self.state.read().await, IndexState::Ready(_)) {
            tracing::debug!("Reverse geocoding index already ready");
            return Ok(());
        }

        if let Some(barrier) = &self.barrier {
            barrier.pause().await;
        }
        let result = self.load_or_build().await;
        if let Some(barrier) = &self.barrier {
            barrier.resume().await;
        }

        let entries = result?;
        tracing::info!(places = entries.len(), "Reverse geocoding index ready");
        *self.state.write().await = IndexState::Ready(Arc::new(entries));
        Ok(())
    }

    /// Purge the persisted index. Lookups fail until the next `init`.
    #[tracing::instrument(skip(self))]
    pub async fn delete_cache(&self) -> Result<(), PipelineError> {
        let mut state = self.state.write().await;
        *state = IndexState::Absent;
        match tokio::fs::remove_file(&self.config.cache_path).await {
            Ok(()) => {
                tracing::info!(path = %self.config.cache_path.display(), "Geocoding cache deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::Filesystem(e)),
        }
    }

    /// Resolve a coordinate to the nearest indexed place.
    ///
    /// Returns `Ok(None)` when geocoding is disabled; fails with `Lookup`
    /// when the index is not ready. Callers treat either as "location fields
    /// stay null" — a lookup failure is never fatal to the asset.
    pub async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<GeoLocation>, PipelineError> {
        if !self.config.enabled {
            return Ok(None);
        }
        let index = {
            let state = self.state.read().await;
            match &*state {
                IndexState::Ready(entries) => Arc::clone(entries),
                IndexState::Absent => {
                    return Err(PipelineError::Lookup(
                        "geocoding index not ready".to_string(),
                    ))
                }
            }
        };

        let nearest = index
            .iter()
            .min_by(|a, b| {
                squared_distance(latitude, longitude, a)
                    .total_cmp(&squared_distance(latitude, longitude, b))
            })
            .map(|entry| GeoLocation {
                city: entry.name.clone(),
                state: entry.state.clone(),
                country: entry.country.clone(),
            });
        Ok(nearest)
    }

    async fn load_or_build(&self) -> Result<Vec<GeoEntry>, PipelineError> {
        match tokio::fs::read(&self.config.cache_path).await {
            Ok(bytes) => {
                let entries: Vec<GeoEntry> = serde_json::from_slice(&bytes).map_err(|e| {
                    PipelineError::Lookup(format!("corrupt geocoding cache: {}", e))
                })?;
                tracing::debug!(
                    path = %self.config.cache_path.display(),
                    places = entries.len(),
                    "Loaded geocoding index from cache"
                );
                Ok(entries)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.build_from_source().await,
            Err(e) => Err(PipelineError::Filesystem(e)),
        }
    }

    async fn build_from_source(&self) -> Result<Vec<GeoEntry>, PipelineError> {
        tracing::info!(path = %self.config.data_path.display(), "Building geocoding index");
        let raw = tokio::fs::read_to_string(&self.config.data_path).await?;
        let mut entries = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_place_line(line) {
                Some(entry) => entries.push(entry),
                None => {
                    tracing::warn!(line = line_no + 1, "Skipping malformed geodata line");
                }
            }
        }
        if entries.is_empty() {
            return Err(PipelineError::Lookup(format!(
                "no usable places in {}",
                self.config.data_path.display()
            )));
        }

        let encoded = serde_json::to_vec(&entries)
            .map_err(|e| PipelineError::Lookup(format!("cache encode failed: {}", e)))?;
        tokio::fs::write(&self.config.cache_path, encoded).await?;
        Ok(entries)
    }
}

/// name<TAB>state<TAB>country<TAB>lat<TAB>lon; state may be empty.
fn parse_place_line(line: &str) -> Option<GeoEntry> {
    let mut fields = line.split('\t');
    let name = fields.next()?.trim();
    let state = fields.next()?.trim();
    let country = fields.next()?.trim();
    let latitude: f64 = fields.next()?.trim().parse().ok()?;
    let longitude: f64 = fields.next()?.trim().parse().ok()?;
    if name.is_empty() || country.is_empty() {
        return None;
    }
    Some(GeoEntry {
        name: name.to_string(),
        state: (!state.is_empty()).then(|| state.to_string()),
        country: country.to_string(),
        latitude,
        longitude,
    })
}

/// Squared equirectangular distance; longitude scaled by cos(lat) so nearest
/// neighbors stay correct away from the equator. Good enough for city-level
/// resolution without pulling in a geodesic library.
fn squared_distance(latitude: f64, longitude: f64, entry: &GeoEntry) -> f64 {
    let dlat = latitude - entry.latitude;
    let dlon = (longitude - entry.longitude) * latitude.to_radians().cos();
    dlat * dlat + dlon * dlon
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const PLACES: &str = "New York\tNew York\tUnited States\t40.7128\t-74.0060\n\
        Newark\tNew Jersey\tUnited States\t40.7357\t-74.1724\n\
        # comment line\n\
        Reykjavik\t\tIceland\t64.1466\t-21.9426\n";

    fn config(dir: &tempfile::TempDir, enabled: bool) -> ReverseGeocoderConfig {
        let data_path = dir.path().join("places.tsv");
        std::fs::write(&data_path, PLACES).unwrap();
        ReverseGeocoderConfig {
            enabled,
            data_path,
            cache_path: dir.path().join("places.cache.json"),
        }
    }

    #[derive(Default)]
    struct RecordingBarrier {
        events: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl ConsumerBarrier for RecordingBarrier {
        async fn pause(&self) {
            self.events.lock().unwrap().push("pause");
        }
        async fn resume(&self) {
            self.events.lock().unwrap().push("resume");
        }
    }

    #[tokio::test]
    async fn init_builds_index_and_writes_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, true);
        let cache_path = config.cache_path.clone();
        let geocoder = ReverseGeocoder::new(config, None);

        geocoder.init().await.unwrap();
        assert!(cache_path.exists());

        let place = geocoder
            .reverse_geocode(40.71, -74.00)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(place.city, "New York");
        assert_eq!(place.state.as_deref(), Some("New York"));
        assert_eq!(place.country, "United States");

        let place = geocoder
            .reverse_geocode(64.0, -22.0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(place.city, "Reykjavik");
        assert_eq!(place.state, None);
    }

    #[tokio::test]
    async fn lookup_before_init_is_a_lookup_error() {
        let dir = tempfile::tempdir().unwrap();
        let geocoder = ReverseGeocoder::new(config(&dir, true), None);
        let err = geocoder.reverse_geocode(0.0, 0.0).await.unwrap_err();
        assert!(matches!(err, PipelineError::Lookup(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn disabled_geocoder_skips_silently() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, false);
        let cache_path = config.cache_path.clone();
        let geocoder = ReverseGeocoder::new(config, None);
        geocoder.init().await.unwrap();
        assert!(!cache_path.exists());
        assert_eq!(geocoder.reverse_geocode(40.71, -74.0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_cache_requires_reinit() {
        let dir = tempfile::tempdir().unwrap();
        let geocoder = ReverseGeocoder::new(config(&dir, true), None);
        geocoder.init().await.unwrap();
        geocoder.delete_cache().await.unwrap();

        let err = geocoder.reverse_geocode(40.71, -74.0).await.unwrap_err();
        assert!(matches!(err, PipelineError::Lookup(_)));

        geocoder.init().await.unwrap();
        assert!(geocoder
            .reverse_geocode(40.71, -74.0)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn rebuild_asserts_barrier_around_build() {
        let dir = tempfile::tempdir().unwrap();
        let barrier = Arc::new(RecordingBarrier::default());
        let geocoder = ReverseGeocoder::new(config(&dir, true), Some(barrier.clone()));

        geocoder.init().await.unwrap();
        assert_eq!(*barrier.events.lock().unwrap(), vec!["pause", "resume"]);

        // Idempotent re-init must not touch the barrier again.
        geocoder.init().await.unwrap();
        assert_eq!(*barrier.events.lock().unwrap(), vec!["pause", "resume"]);

        // Teardown + rebuild asserts it again.
        geocoder.delete_cache().await.unwrap();
        geocoder.init().await.unwrap();
        assert_eq!(
            *barrier.events.lock().unwrap(),
            vec!["pause", "resume", "pause", "resume"]
        );
    }

    #[tokio::test]
    async fn barrier_released_when_build_fails() {
        let dir = tempfile::tempdir().unwrap();
        let barrier = Arc::new(RecordingBarrier::default());
        let config = ReverseGeocoderConfig {
            enabled: true,
            data_path: dir.path().join("missing.tsv"),
            cache_path: dir.path().join("cache.json"),
        };
        let geocoder = ReverseGeocoder::new(config, Some(barrier.clone()));
        assert!(geocoder.init().await.is_err());
        assert_eq!(*barrier.events.lock().unwrap(), vec!["pause", "resume"]);
    }
}
