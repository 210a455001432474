pub mod asset;
pub mod job;
pub mod metadata;

pub use asset::{Asset, AssetType, AssetUpdate};
pub use job::{Job, JobName, JobPayload};
pub use metadata::AssetMetadata;
