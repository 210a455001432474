//! Metadata merging and derivation.
//!
//! Combines the sidecar and embedded tag sets under one precedence rule: for
//! any requested field the sidecar value wins over the embedded value, and
//! embedded wins over the filesystem fallback. Fields are requested as an
//! ordered list of alias names; the first populated alias, by source
//! precedence, is used and the lookup short-circuits there.

use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use regex::Regex;

use fototek_core::models::{Asset, AssetMetadata, AssetType};

use crate::tags::{TagMap, TagValue};

/// Capture-instant aliases, most specific first.
const DATE_TAGS: [&str; 4] = [
    "DateTimeOriginal",
    "CreationDate",
    "CreateDate",
    "ModifyDate",
];

/// The two tag sets feeding one asset's record.
#[derive(Debug, Default)]
pub struct TagSources {
    embedded: TagMap,
    sidecar: TagMap,
}

impl TagSources {
    /// A missing source is an empty tag set (failed reads are recovered
    /// upstream).
    pub fn new(embedded: Option<TagMap>, sidecar: Option<TagMap>) -> Self {
        Self {
            embedded: embedded.unwrap_or_default(),
            sidecar: sidecar.unwrap_or_default(),
        }
    }

    /// First populated alias, sidecar before embedded per alias.
    pub fn lookup(&self, aliases: &[&str]) -> Option<&TagValue> {
        for alias in aliases {
            if let Some(value) = self.sidecar.get(*alias) {
                return Some(value);
            }
            if let Some(value) = self.embedded.get(*alias) {
                return Some(value);
            }
        }
        None
    }

    fn text(&self, aliases: &[&str]) -> Option<String> {
        self.lookup(aliases)
            .and_then(|v| v.as_text())
            .map(str::to_string)
    }

    fn f64_value(&self, aliases: &[&str]) -> Option<f64> {
        self.lookup(aliases).and_then(TagValue::as_f64)
    }

    fn i32_value(&self, aliases: &[&str]) -> Option<i32> {
        self.lookup(aliases).and_then(TagValue::as_i32)
    }
}

/// Build the full metadata record for an asset from its merged tag sources.
///
/// Location names (country/state/city) are left null; the caller fills them
/// from reverse geocoding when coordinates are present.
pub fn build_metadata(asset: &Asset, sources: &TagSources, file_size_bytes: i64) -> AssetMetadata {
    let (taken_at, timezone) = derive_taken_at(sources, asset.file_created_at);
    let mut record =
        AssetMetadata::bare(asset.id, file_size_bytes, taken_at, asset.file_modified_at);
    record.timezone = timezone;

    record.make = sources.text(&["Make"]);
    record.model = sources.text(&["Model"]);
    record.lens_model = sources.text(&["LensModel"]);
    record.orientation = sources.i32_value(&["Orientation"]);
    record.exposure_time = sources.text(&["ExposureTime"]);
    record.f_number = sources.f64_value(&["FNumber"]);
    record.focal_length = sources.f64_value(&["FocalLength"]);
    record.iso = sources.i32_value(&["ISO", "ISOSpeedRatings", "PhotographicSensitivity"]);
    record.width = sources.i32_value(&["ImageWidth", "ExifImageWidth"]);
    record.height = sources.i32_value(&["ImageHeight", "ExifImageHeight"]);
    record.live_photo_cid = sources.text(&["ContentIdentifier", "MediaGroupUUID"]);

    record.latitude = sources.f64_value(&["GPSLatitude"]);
    record.longitude = sources.f64_value(&["GPSLongitude"]);
    if record.latitude.is_none() || record.longitude.is_none() {
        if let Some(raw) = sources.text(&["LocationISO6709", "GPSCoordinates"]) {
            if let Some((lat, lon)) = parse_location_string(&raw) {
                record.latitude = Some(lat);
                record.longitude = Some(lon);
            }
        }
    }

    if asset.asset_type == AssetType::Video {
        record.fps = sources
            .text(&["VideoFrameRate"])
            .and_then(|raw| parse_frame_rate(&raw));
    }

    record
}

/// Video duration in seconds; missing or zero yields `None`.
pub fn derive_duration(sources: &TagSources) -> Option<f64> {
    sources.f64_value(&["Duration"]).filter(|d| *d > 0.0)
}

/// Last-resort dimension derivation by decoding the image header. Runs only
/// for the unset subset; orientation has no inspection source and stays null
/// when the tags lack it.
pub fn fill_dimensions_from_file(record: &mut AssetMetadata, path: &Path) {
    if record.width.is_some() && record.height.is_some() {
        return;
    }
    match image::image_dimensions(path) {
        Ok((width, height)) => {
            record.width.get_or_insert(width as i32);
            record.height.get_or_insert(height as i32);
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %path.display(),
                "Image inspection fallback failed, dimensions stay null"
            );
        }
    }
}

fn derive_taken_at(
    sources: &TagSources,
    fallback: DateTime<Utc>,
) -> (DateTime<Utc>, Option<String>) {
    match sources.lookup(&DATE_TAGS) {
        Some(TagValue::DateTime(dt)) => match dt.offset {
            Some(offset) => {
                let instant = match offset.from_local_datetime(&dt.value).single() {
                    Some(local) => local.with_timezone(&Utc),
                    None => Utc.from_utc_datetime(&dt.value),
                };
                (instant, Some(format_offset(offset)))
            }
            None => (Utc.from_utc_datetime(&dt.value), None),
        },
        Some(TagValue::Text(raw)) => (
            parse_bare_datetime(raw).unwrap_or(fallback),
            // A bare string yields only the instant, never a zone.
            None,
        ),
        _ => (fallback, None),
    }
}

/// Parse a textual timestamp into an instant. A trailing offset positions the
/// instant correctly but is not surfaced as a zone; offset-less values are
/// taken as UTC.
fn parse_bare_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y:%m:%d %H:%M:%S%.f"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

fn format_offset(offset: FixedOffset) -> String {
    format!("UTC{}", offset)
}

/// Rounded integer frame rate from a rational string ("30000/1001" → 30).
/// Invalid or zero-denominator input yields `None`.
pub fn parse_frame_rate(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    let quotient = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.parse().ok()?,
    };
    if !quotient.is_finite() || quotient <= 0.0 {
        return None;
    }
    Some(quotient.round() as i32)
}

/// GPS location string for video containers. Two encodings are accepted, both
/// requiring an exact match: a trailing-slash signed-decimal pair
/// ("+40.7128-074.0060/") and an ISO-6709-style triple with altitude
/// ("+40.7128-074.0060+011.000/"). Anything else yields no coordinates; there
/// is no partial parse.
pub fn parse_location_string(raw: &str) -> Option<(f64, f64)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^([+-]\d+(?:\.\d+)?)([+-]\d+(?:\.\d+)?)([+-]\d+(?:\.\d+)?)?/$")
            .expect("static pattern")
    });
    let captures = pattern.captures(raw.trim())?;
    let lat: f64 = captures.get(1)?.as_str().parse().ok()?;
    let lon: f64 = captures.get(2)?.as_str().parse().ok()?;
    Some((lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagDateTime;
    use chrono::NaiveDateTime;
    use uuid::Uuid;

    fn image_asset() -> Asset {
        Asset {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            asset_type: AssetType::Image,
            original_path: "/library/2023/img_0001.jpg".to_string(),
            sidecar_path: None,
            is_visible: true,
            live_photo_video_id: None,
            file_created_at: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            file_modified_at: Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap(),
            duration_secs: None,
        }
    }

    fn text(value: &str) -> TagValue {
        TagValue::Text(value.to_string())
    }

    #[test]
    fn sidecar_wins_over_embedded() {
        let mut embedded = TagMap::new();
        embedded.insert("Make".into(), text("Canon"));
        let mut sidecar = TagMap::new();
        sidecar.insert("Make".into(), text("Apple"));
        let sources = TagSources::new(Some(embedded), Some(sidecar));
        let record = build_metadata(&image_asset(), &sources, 1024);
        assert_eq!(record.make.as_deref(), Some("Apple"));
    }

    #[test]
    fn embedded_used_when_sidecar_silent() {
        let mut embedded = TagMap::new();
        embedded.insert("Make".into(), text("Canon"));
        let sources = TagSources::new(Some(embedded), Some(TagMap::new()));
        let record = build_metadata(&image_asset(), &sources, 1024);
        assert_eq!(record.make.as_deref(), Some("Canon"));
        assert_eq!(record.model, None);
    }

    #[test]
    fn alias_order_is_outer_precedence() {
        // DateTimeOriginal beats CreateDate even when only the embedded
        // source has the former and the sidecar has the latter.
        let mut embedded = TagMap::new();
        embedded.insert(
            "DateTimeOriginal".into(),
            TagValue::DateTime(TagDateTime {
                value: NaiveDateTime::parse_from_str("2023-01-05 10:00:00", "%Y-%m-%d %H:%M:%S")
                    .unwrap(),
                offset: None,
            }),
        );
        let mut sidecar = TagMap::new();
        sidecar.insert("CreateDate".into(), text("2020-01-01T00:00:00"));
        let sources = TagSources::new(Some(embedded), Some(sidecar));
        let record = build_metadata(&image_asset(), &sources, 0);
        assert_eq!(
            record.taken_at,
            Utc.with_ymd_and_hms(2023, 1, 5, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn structured_datetime_yields_instant_and_zone() {
        let mut embedded = TagMap::new();
        embedded.insert(
            "DateTimeOriginal".into(),
            TagValue::DateTime(TagDateTime {
                value: NaiveDateTime::parse_from_str("2023-01-05 12:00:00", "%Y-%m-%d %H:%M:%S")
                    .unwrap(),
                offset: Some(FixedOffset::east_opt(3600).unwrap()),
            }),
        );
        let sources = TagSources::new(Some(embedded), None);
        let record = build_metadata(&image_asset(), &sources, 0);
        assert_eq!(
            record.taken_at,
            Utc.with_ymd_and_hms(2023, 1, 5, 11, 0, 0).unwrap()
        );
        assert_eq!(record.timezone.as_deref(), Some("UTC+01:00"));
    }

    #[test]
    fn bare_string_yields_instant_without_zone() {
        let mut sidecar = TagMap::new();
        sidecar.insert("DateTimeOriginal".into(), text("2023-01-05T12:00:00+01:00"));
        let sources = TagSources::new(None, Some(sidecar));
        let record = build_metadata(&image_asset(), &sources, 0);
        assert_eq!(
            record.taken_at,
            Utc.with_ymd_and_hms(2023, 1, 5, 11, 0, 0).unwrap()
        );
        assert_eq!(record.timezone, None);
    }

    #[test]
    fn filesystem_timestamp_is_the_last_resort() {
        let asset = image_asset();
        let sources = TagSources::new(None, None);
        let record = build_metadata(&asset, &sources, 0);
        assert_eq!(record.taken_at, asset.file_created_at);
        assert_eq!(record.timezone, None);
    }

    #[test]
    fn iso_array_takes_first_element() {
        let mut embedded = TagMap::new();
        embedded.insert("ISO".into(), TagValue::NumList(vec![800.0, 1600.0]));
        let sources = TagSources::new(Some(embedded), None);
        assert_eq!(build_metadata(&image_asset(), &sources, 0).iso, Some(800));

        let mut embedded = TagMap::new();
        embedded.insert("ISO".into(), TagValue::Num(800.0));
        let sources = TagSources::new(Some(embedded), None);
        assert_eq!(build_metadata(&image_asset(), &sources, 0).iso, Some(800));

        let sources = TagSources::new(Some(TagMap::new()), None);
        assert_eq!(build_metadata(&image_asset(), &sources, 0).iso, None);
    }

    #[test]
    fn focal_length_tolerates_absence() {
        let mut embedded = TagMap::new();
        embedded.insert("FocalLength".into(), text("26.0"));
        let sources = TagSources::new(Some(embedded), None);
        assert_eq!(
            build_metadata(&image_asset(), &sources, 0).focal_length,
            Some(26.0)
        );
        let sources = TagSources::new(None, None);
        assert_eq!(build_metadata(&image_asset(), &sources, 0).focal_length, None);
    }

    #[test]
    fn frame_rate_rounds_and_guards_zero_denominator() {
        assert_eq!(parse_frame_rate("30000/1001"), Some(30));
        assert_eq!(parse_frame_rate("24/1"), Some(24));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("0/1"), None);
        assert_eq!(parse_frame_rate("not a rate"), None);
    }

    #[test]
    fn location_string_requires_exact_match() {
        assert_eq!(
            parse_location_string("+40.7128-074.0060/"),
            Some((40.7128, -74.006))
        );
        assert_eq!(
            parse_location_string("+40.7128-074.0060+011.000/"),
            Some((40.7128, -74.006))
        );
        // Missing trailing slash
        assert_eq!(parse_location_string("+40.7128-074.0060"), None);
        // Extra fields
        assert_eq!(
            parse_location_string("+40.7128-074.0060+011.000+1.0/"),
            None
        );
        assert_eq!(parse_location_string("+40.7128/"), None);
    }

    #[test]
    fn video_frame_rate_only_set_for_videos() {
        let mut embedded = TagMap::new();
        embedded.insert("VideoFrameRate".into(), text("30000/1001"));

        let record = build_metadata(
            &image_asset(),
            &TagSources::new(Some(embedded.clone()), None),
            0,
        );
        assert_eq!(record.fps, None);

        let mut video = image_asset();
        video.asset_type = AssetType::Video;
        let record = build_metadata(&video, &TagSources::new(Some(embedded), None), 0);
        assert_eq!(record.fps, Some(30));
    }

    #[test]
    fn zero_duration_is_null() {
        let mut embedded = TagMap::new();
        embedded.insert("Duration".into(), TagValue::Num(0.0));
        assert_eq!(derive_duration(&TagSources::new(Some(embedded), None)), None);

        let mut embedded = TagMap::new();
        embedded.insert("Duration".into(), TagValue::Num(2.7));
        assert_eq!(
            derive_duration(&TagSources::new(Some(embedded), None)),
            Some(2.7)
        );

        assert_eq!(derive_duration(&TagSources::new(None, None)), None);
    }

    #[test]
    fn dimension_fallback_skips_populated_records() {
        let asset = image_asset();
        let mut record = AssetMetadata::bare(asset.id, 0, asset.file_created_at, asset.file_modified_at);
        record.width = Some(4032);
        record.height = Some(3024);
        // Path does not exist; would warn and null out if it were consulted.
        fill_dimensions_from_file(&mut record, Path::new("/nonexistent.jpg"));
        assert_eq!(record.width, Some(4032));
        assert_eq!(record.height, Some(3024));
    }

    #[test]
    fn dimension_fallback_tolerates_probe_failure() {
        let asset = image_asset();
        let mut record = AssetMetadata::bare(asset.id, 0, asset.file_created_at, asset.file_modified_at);
        fill_dimensions_from_file(&mut record, Path::new("/nonexistent.jpg"));
        assert_eq!(record.width, None);
        assert_eq!(record.height, None);
    }

    #[test]
    fn idempotent_merge_produces_identical_records() {
        let mut embedded = TagMap::new();
        embedded.insert("Make".into(), text("Apple"));
        embedded.insert("ISO".into(), TagValue::Num(125.0));
        let asset = image_asset();
        let sources = TagSources::new(Some(embedded), None);
        let first = build_metadata(&asset, &sources, 2048);
        let second = build_metadata(&asset, &sources, 2048);
        assert_eq!(first, second);
    }
}
