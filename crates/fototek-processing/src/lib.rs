//! Fototek processing: tag extraction, metadata merging, reverse geocoding.
//!
//! Everything in this crate is side-effect free with respect to the asset
//! store; persistence is the worker's concern.

pub mod geo;
pub mod merge;
pub mod tags;

pub use geo::{GeoLocation, ReverseGeocoder, ReverseGeocoderConfig};
pub use merge::TagSources;
pub use tags::{TagMap, TagValue, VideoProbe};
