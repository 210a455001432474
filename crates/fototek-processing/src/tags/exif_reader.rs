//! Embedded EXIF tag reader built on `kamadak-exif`.
//!
//! Runs on the blocking pool; EXIF parsing is synchronous and the files can
//! live on slow storage. Date/time tags are zipped with their offset tags so
//! the merger sees a structured timestamp-with-zone, and GPS DMS rationals
//! are folded into signed decimal degrees.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{FixedOffset, NaiveDateTime};
use exif::{Exif, In, Tag, Value};

use fototek_core::PipelineError;

use super::{TagDateTime, TagMap, TagValue};

/// Divisors folding a degrees/minutes/seconds triple into decimal degrees.
const DMS_DIVISION: [f64; 3] = [1.0, 60.0, 3600.0];

/// Date/time tags zipped with their offset tags and the map key they land
/// under, in merger alias order.
const TIME_TAGS: [(Tag, Tag, &str); 3] = [
    (Tag::DateTimeOriginal, Tag::OffsetTimeOriginal, "DateTimeOriginal"),
    (Tag::DateTimeDigitized, Tag::OffsetTimeDigitized, "CreateDate"),
    (Tag::DateTime, Tag::OffsetTime, "ModifyDate"),
];

/// Read the embedded tag set of a media file.
///
/// A missing or unreadable file surfaces as `Filesystem` (fatal for the
/// primary media file); malformed or absent EXIF surfaces as `TagRead`
/// (recovered by the caller as an empty tag set).
pub async fn read_embedded_tags(path: &Path) -> Result<TagMap, PipelineError> {
    let path = path.to_owned();
    tokio::task::spawn_blocking(move || read_blocking(&path))
        .await
        .map_err(|e| PipelineError::TagRead(format!("tag reader task failed: {}", e)))?
}

fn read_blocking(path: &Path) -> Result<TagMap, PipelineError> {
    let file = File::open(path)?;
    let exif = exif::Reader::new()
        .read_from_container(&mut BufReader::new(file))
        .map_err(|e| match e {
            exif::Error::Io(io) => PipelineError::Filesystem(io),
            other => PipelineError::TagRead(other.to_string()),
        })?;

    let mut tags = TagMap::new();

    for (tag, key) in [
        (Tag::Make, "Make"),
        (Tag::Model, "Model"),
        (Tag::LensModel, "LensModel"),
    ] {
        if let Some(text) = ascii_value(&exif, tag) {
            tags.insert(key.to_string(), TagValue::Text(text));
        }
    }

    for (tag, key) in [
        (Tag::Orientation, "Orientation"),
        (Tag::FNumber, "FNumber"),
        (Tag::FocalLength, "FocalLength"),
        (Tag::PixelXDimension, "ImageWidth"),
        (Tag::PixelYDimension, "ImageHeight"),
    ] {
        if let Some(n) = numeric_value(&exif, tag) {
            tags.insert(key.to_string(), TagValue::Num(n));
        }
    }

    if let Some(iso) = numeric_values(&exif, Tag::PhotographicSensitivity) {
        let value = match iso.as_slice() {
            [single] => TagValue::Num(*single),
            _ => TagValue::NumList(iso),
        };
        tags.insert("ISO".to_string(), value);
    }

    if let Some(s) = rational_string(&exif, Tag::ExposureTime) {
        tags.insert("ExposureTime".to_string(), TagValue::Text(s));
    }

    for (time_tag, offset_tag, key) in TIME_TAGS {
        if let Some(dt) = datetime_value(&exif, time_tag, offset_tag) {
            tags.insert(key.to_string(), TagValue::DateTime(dt));
        }
    }

    if let Some(lat) = gps_coordinate(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, "S") {
        tags.insert("GPSLatitude".to_string(), TagValue::Num(lat));
    }
    if let Some(lon) = gps_coordinate(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, "W") {
        tags.insert("GPSLongitude".to_string(), TagValue::Num(lon));
    }

    Ok(tags)
}

fn ascii_value(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(chunks) => {
            let raw = chunks.first()?;
            let text = String::from_utf8_lossy(raw)
                .trim_matches(char::from(0))
                .trim()
                .to_string();
            (!text.is_empty()).then_some(text)
        }
        _ => None,
    }
}

fn numeric_value(exif: &Exif, tag: Tag) -> Option<f64> {
    numeric_values(exif, tag).and_then(|v| v.first().copied())
}

fn numeric_values(exif: &Exif, tag: Tag) -> Option<Vec<f64>> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let values: Vec<f64> = match &field.value {
        Value::Short(v) => v.iter().map(|n| f64::from(*n)).collect(),
        Value::Long(v) => v.iter().map(|n| f64::from(*n)).collect(),
        Value::Rational(v) => v
            .iter()
            .filter(|r| r.denom != 0)
            .map(|r| r.to_f64())
            .collect(),
        Value::SRational(v) => v
            .iter()
            .filter(|r| r.denom != 0)
            .map(|r| r.to_f64())
            .collect(),
        _ => return None,
    };
    (!values.is_empty()).then_some(values)
}

/// Keeps exposure time in its photographic `num/den` form ("1/200").
fn rational_string(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Rational(v) => {
            let r = v.first()?;
            if r.denom == 0 {
                None
            } else if r.denom == 1 {
                Some(format!("{}", r.num))
            } else {
                Some(format!("{}/{}", r.num, r.denom))
            }
        }
        _ => None,
    }
}

fn datetime_value(exif: &Exif, time_tag: Tag, offset_tag: Tag) -> Option<TagDateTime> {
    let raw = ascii_value(exif, time_tag)?;
    let value = NaiveDateTime::parse_from_str(&raw, "%Y:%m:%d %H:%M:%S").ok()?;
    let offset = ascii_value(exif, offset_tag).and_then(|o| o.parse::<FixedOffset>().ok());
    Some(TagDateTime { value, offset })
}

fn gps_coordinate(exif: &Exif, tag: Tag, ref_tag: Tag, negative_ref: &str) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let dms = match &field.value {
        Value::Rational(v) if v.len() == 3 => v,
        _ => return None,
    };
    if dms.iter().any(|r| r.denom == 0) {
        return None;
    }
    let degrees: f64 = dms
        .iter()
        .zip(DMS_DIVISION.iter())
        .map(|(r, div)| r.to_f64() / div)
        .sum();
    let sign = match ascii_value(exif, ref_tag) {
        Some(r) if r.eq_ignore_ascii_case(negative_ref) => -1.0,
        _ => 1.0,
    };
    Some(sign * degrees)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn missing_file_is_a_filesystem_error() {
        let err = read_embedded_tags(Path::new("/nonexistent/photo.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Filesystem(_)));
    }

    #[tokio::test]
    async fn garbage_file_is_a_tag_read_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"definitely not a jpeg").unwrap();
        let err = read_embedded_tags(file.path()).await.unwrap_err();
        assert!(matches!(err, PipelineError::TagRead(_)));
        assert!(err.is_recoverable());
    }
}
