//! Fototek database layer.
//!
//! Repository traits are the capability sets the pipeline consumes; the
//! Postgres implementations live alongside them. Components receive
//! `Arc<dyn AssetRepository>` / `Arc<dyn MetadataRepository>` at construction,
//! never an ambient pool.

pub mod db;

pub use db::asset::{AssetRepository, PostgresAssetRepository};
pub use db::metadata::{MetadataRepository, PostgresMetadataRepository};
pub use db::Page;
