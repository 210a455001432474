//! XMP sidecar tag reader.
//!
//! Extracts a fixed property set from the sidecar XML. XMP serializers write
//! properties both as attributes of `rdf:Description` and as child elements;
//! both forms are matched. Values stay textual (a sidecar string carries an
//! instant but no structured zone); numeric coercion happens in the merger.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use fototek_core::PipelineError;

use super::{TagMap, TagValue};

/// XMP property → tag map key. Later entries never overwrite earlier ones,
/// so e.g. `exifEX:LensModel` beats `aux:Lens`.
const XMP_PROPERTIES: [(&str, &str); 13] = [
    ("apple-fi:ContentIdentifier", "ContentIdentifier"),
    ("exif:DateTimeOriginal", "DateTimeOriginal"),
    ("photoshop:DateCreated", "DateTimeOriginal"),
    ("xmp:CreateDate", "CreateDate"),
    ("xmp:ModifyDate", "ModifyDate"),
    ("tiff:Make", "Make"),
    ("tiff:Model", "Model"),
    ("exifEX:LensModel", "LensModel"),
    ("aux:Lens", "LensModel"),
    ("tiff:Orientation", "Orientation"),
    ("exif:ExposureTime", "ExposureTime"),
    ("exif:FNumber", "FNumber"),
    ("exif:FocalLength", "FocalLength"),
];

struct PropertyPattern {
    key: &'static str,
    attribute: Regex,
    element: Regex,
}

fn property_patterns() -> &'static Vec<PropertyPattern> {
    static PATTERNS: OnceLock<Vec<PropertyPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        XMP_PROPERTIES
            .iter()
            .map(|(property, key)| {
                let escaped = regex::escape(property);
                PropertyPattern {
                    key,
                    attribute: Regex::new(&format!(r#"{escaped}\s*=\s*"([^"]*)""#))
                        .expect("static pattern"),
                    element: Regex::new(&format!(r"<{escaped}[^>]*>([^<]+)</{escaped}>"))
                        .expect("static pattern"),
                }
            })
            .collect()
    })
}

fn iso_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<exif:ISOSpeedRatings>.*?<rdf:li[^>]*>([^<]+)</rdf:li>")
            .expect("static pattern")
    })
}

fn gps_pattern(property: &'static str) -> Regex {
    let escaped = regex::escape(property);
    Regex::new(&format!(
        r#"{escaped}\s*=\s*"([^"]*)"|<{escaped}[^>]*>([^<]+)</{escaped}>"#
    ))
    .expect("static pattern")
}

/// Read the tag set of an XMP sidecar file.
pub async fn read_sidecar_tags(path: &Path) -> Result<TagMap, PipelineError> {
    let xml = tokio::fs::read_to_string(path).await?;
    Ok(extract_tags(&xml))
}

fn extract_tags(xml: &str) -> TagMap {
    let mut tags = TagMap::new();

    for pattern in property_patterns() {
        if tags.contains_key(pattern.key) {
            continue;
        }
        let value = pattern
            .attribute
            .captures(xml)
            .or_else(|| pattern.element.captures(xml))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string());
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            tags.insert(pattern.key.to_string(), TagValue::Text(value));
        }
    }

    if let Some(iso) = iso_pattern()
        .captures(xml)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().trim().parse::<f64>().ok())
    {
        tags.insert("ISO".to_string(), TagValue::Num(iso));
    }

    static LAT: OnceLock<Regex> = OnceLock::new();
    static LON: OnceLock<Regex> = OnceLock::new();
    let lat = LAT.get_or_init(|| gps_pattern("exif:GPSLatitude"));
    let lon = LON.get_or_init(|| gps_pattern("exif:GPSLongitude"));
    if let Some(value) = capture_either(lat, xml).and_then(|v| parse_xmp_gps(&v)) {
        tags.insert("GPSLatitude".to_string(), TagValue::Num(value));
    }
    if let Some(value) = capture_either(lon, xml).and_then(|v| parse_xmp_gps(&v)) {
        tags.insert("GPSLongitude".to_string(), TagValue::Num(value));
    }

    tags
}

fn capture_either(pattern: &Regex, xml: &str) -> Option<String> {
    pattern.captures(xml).and_then(|c| {
        c.get(1)
            .or_else(|| c.get(2))
            .map(|m| m.as_str().trim().to_string())
    })
}

/// XMP GPS is either plain signed decimal or "DD,MM.mmH" (degrees, decimal
/// minutes, hemisphere letter).
fn parse_xmp_gps(raw: &str) -> Option<f64> {
    if let Ok(decimal) = raw.parse::<f64>() {
        return Some(decimal);
    }
    let (body, hemisphere) = raw.split_at(raw.len().checked_sub(1)?);
    let sign = match hemisphere {
        "N" | "E" => 1.0,
        "S" | "W" => -1.0,
        _ => return None,
    };
    let (degrees, minutes) = body.split_once(',')?;
    let degrees: f64 = degrees.trim().parse().ok()?;
    let minutes: f64 = minutes.trim().parse().ok()?;
    Some(sign * (degrees + minutes / 60.0))
}
