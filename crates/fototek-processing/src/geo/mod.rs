pub mod geocoder;

pub use geocoder::{GeoLocation, ReverseGeocoder, ReverseGeocoderConfig};
