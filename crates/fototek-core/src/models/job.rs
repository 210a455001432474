use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use super::Asset;

/// Job name enum. `MigrateStorageTemplate` and `SearchIndexAlbum` are produced
/// for downstream consumers only; this pipeline never handles them itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum JobName {
    QueueMetadataScan,
    ExtractImageMetadata,
    ExtractVideoMetadata,
    QueueSidecarScan,
    SidecarDiscover,
    SidecarResync,
    MigrateStorageTemplate,
    SearchIndexAlbum,
}

impl Display for JobName {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobName::QueueMetadataScan => write!(f, "queue-metadata-scan"),
            JobName::ExtractImageMetadata => write!(f, "extract-image-metadata"),
            JobName::ExtractVideoMetadata => write!(f, "extract-video-metadata"),
            JobName::QueueSidecarScan => write!(f, "queue-sidecar-scan"),
            JobName::SidecarDiscover => write!(f, "sidecar-discover"),
            JobName::SidecarResync => write!(f, "sidecar-resync"),
            JobName::MigrateStorageTemplate => write!(f, "migrate-storage-template"),
            JobName::SearchIndexAlbum => write!(f, "search-index-album"),
        }
    }
}

impl FromStr for JobName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queue-metadata-scan" => Ok(JobName::QueueMetadataScan),
            "extract-image-metadata" => Ok(JobName::ExtractImageMetadata),
            "extract-video-metadata" => Ok(JobName::ExtractVideoMetadata),
            "queue-sidecar-scan" => Ok(JobName::QueueSidecarScan),
            "sidecar-discover" => Ok(JobName::SidecarDiscover),
            "sidecar-resync" => Ok(JobName::SidecarResync),
            "migrate-storage-template" => Ok(JobName::MigrateStorageTemplate),
            "search-index-album" => Ok(JobName::SearchIndexAlbum),
            _ => Err(anyhow::anyhow!("Invalid job name: {}", s)),
        }
    }
}

/// Job payload: either a pagination directive or a single asset snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobPayload {
    Scan { force: bool },
    Asset(Box<Asset>),
}

/// A unit of work. Fire-and-forget, delivered at least once; no job carries a
/// global transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub name: JobName,
    pub payload: JobPayload,
}

impl Job {
    pub fn scan(name: JobName, force: bool) -> Self {
        Self {
            name,
            payload: JobPayload::Scan { force },
        }
    }

    pub fn for_asset(name: JobName, asset: Asset) -> Self {
        Self {
            name,
            payload: JobPayload::Asset(Box::new(asset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_name_round_trips_through_display() {
        for name in [
            JobName::QueueMetadataScan,
            JobName::ExtractImageMetadata,
            JobName::ExtractVideoMetadata,
            JobName::QueueSidecarScan,
            JobName::SidecarDiscover,
            JobName::SidecarResync,
            JobName::MigrateStorageTemplate,
            JobName::SearchIndexAlbum,
        ] {
            assert_eq!(name.to_string().parse::<JobName>().unwrap(), name);
        }
    }
}
