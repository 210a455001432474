//! Video container probing via ffprobe.
//!
//! The probe surfaces container and stream tags as a raw tag map; derivation
//! (frame-rate rounding, location parsing, duration nulling) happens in the
//! merger so video and image assets share one code path.

use std::collections::HashMap;
use std::path::Path;

use chrono::DateTime;
use serde::Deserialize;
use tokio::process::Command;

use fototek_core::PipelineError;

use super::{TagDateTime, TagMap, TagValue};

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    format: Option<FFprobeFormat>,
    streams: Option<Vec<FFprobeStream>>,
}

#[derive(Debug, Deserialize)]
struct FFprobeFormat {
    duration: Option<String>,
    tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    codec_type: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
    r_frame_rate: Option<String>,
    tags: Option<HashMap<String, String>>,
}

/// Container tag keys carrying the capture instant, most specific first.
/// The QuickTime key includes the local UTC offset; `creation_time` is UTC.
const CREATION_KEYS: [&str; 2] = ["com.apple.quicktime.creationdate", "creation_time"];

/// Container tag keys carrying an ISO-6709-style location string.
const LOCATION_KEYS: [&str; 3] = [
    "com.apple.quicktime.location.iso6709",
    "location",
    "location-eng",
];

#[derive(Clone)]
pub struct VideoProbe {
    ffprobe_path: String,
}

impl VideoProbe {
    pub fn new(ffprobe_path: String) -> Self {
        Self { ffprobe_path }
    }

    /// Probe a video file and return its raw tag map.
    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    pub async fn probe(&self, path: &Path) -> Result<TagMap, PipelineError> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error", "-show_format", "-show_streams", "-of", "json"])
            .arg(path)
            .output()
            .await
            .map_err(|e| PipelineError::Probe(format!("failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Probe(format!(
                "ffprobe failed: {}",
                stderr.trim()
            )));
        }

        let parsed: FFprobeOutput = serde_json::from_slice(&output.stdout)?;
        Ok(to_tag_map(parsed))
    }
}

fn to_tag_map(output: FFprobeOutput) -> TagMap {
    let mut tags = TagMap::new();

    let video_stream = output.streams.as_ref().and_then(|streams| {
        streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
    });

    if let Some(stream) = video_stream {
        if let Some(width) = stream.width {
            tags.insert("ImageWidth".to_string(), TagValue::Num(width as f64));
        }
        if let Some(height) = stream.height {
            tags.insert("ImageHeight".to_string(), TagValue::Num(height as f64));
        }
        if let Some(rate) = &stream.r_frame_rate {
            tags.insert(
                "VideoFrameRate".to_string(),
                TagValue::Text(rate.clone()),
            );
        }
    }

    if let Some(format) = &output.format {
        if let Some(duration) = format.duration.as_ref().and_then(|d| d.parse::<f64>().ok()) {
            tags.insert("Duration".to_string(), TagValue::Num(duration));
        }
    }

    // Container tags live on the format or, for some muxers, on the stream.
    let mut container: HashMap<String, String> = HashMap::new();
    for source in [
        video_stream.and_then(|s| s.tags.as_ref()),
        output.format.as_ref().and_then(|f| f.tags.as_ref()),
    ]
    .into_iter()
    .flatten()
    {
        for (key, value) in source {
            container.insert(key.to_ascii_lowercase(), value.clone());
        }
    }

    for key in CREATION_KEYS {
        if let Some(dt) = container.get(key).and_then(|raw| parse_creation_date(raw)) {
            tags.insert("CreationDate".to_string(), TagValue::DateTime(dt));
            break;
        }
    }
    for key in LOCATION_KEYS {
        if let Some(location) = container.get(key) {
            tags.insert(
                "LocationISO6709".to_string(),
                TagValue::Text(location.clone()),
            );
            break;
        }
    }
    if let Some(cid) = container.get("com.apple.quicktime.content.identifier") {
        tags.insert("ContentIdentifier".to_string(), TagValue::Text(cid.clone()));
    }
    if let Some(make) = container.get("com.apple.quicktime.make") {
        tags.insert("Make".to_string(), TagValue::Text(make.clone()));
    }
    if let Some(model) = container.get("com.apple.quicktime.model") {
        tags.insert("Model".to_string(), TagValue::Text(model.clone()));
    }

    tags
}

fn parse_creation_date(raw: &str) -> Option<TagDateTime> {
    // "2023-01-05T10:29:59+0100" (QuickTime) or RFC 3339 "creation_time".
    let parsed = DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%z"))
        .ok()?;
    Some(TagDateTime {
        value: parsed.naive_local(),
        offset: Some(*parsed.offset()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_output(json: &str) -> TagMap {
        to_tag_map(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn quicktime_tags_are_surfaced() {
        let tags = probe_output(
            r#"{
                "streams": [
                    {"codec_type": "audio", "tags": {}},
                    {
                        "codec_type": "video",
                        "width": 1920,
                        "height": 1080,
                        "r_frame_rate": "30000/1001"
                    }
                ],
                "format": {
                    "duration": "2.734",
                    "tags": {
                        "com.apple.quicktime.creationdate": "2023-01-05T10:29:59+0100",
                        "com.apple.quicktime.location.ISO6709": "+40.7128-074.0060+011.000/",
                        "com.apple.quicktime.content.identifier": "8A2F...42"
                    }
                }
            }"#,
        );

        assert_eq!(tags["ImageWidth"], TagValue::Num(1920.0));
        assert_eq!(tags["ImageHeight"], TagValue::Num(1080.0));
        assert_eq!(tags["VideoFrameRate"], TagValue::Text("30000/1001".into()));
        assert_eq!(tags["Duration"], TagValue::Num(2.734));
        assert_eq!(
            tags["LocationISO6709"],
            TagValue::Text("+40.7128-074.0060+011.000/".into())
        );
        assert_eq!(tags["ContentIdentifier"], TagValue::Text("8A2F...42".into()));

        match &tags["CreationDate"] {
            TagValue::DateTime(dt) => {
                assert_eq!(dt.offset.unwrap().local_minus_utc(), 3600);
                assert_eq!(dt.value.to_string(), "2023-01-05 10:29:59");
            }
            other => panic!("expected DateTime, got {:?}", other),
        }
    }

    #[test]
    fn utc_creation_time_is_fallback() {
        let tags = probe_output(
            r#"{
                "streams": [{"codec_type": "video", "width": 640, "height": 480}],
                "format": {"tags": {"creation_time": "2023-01-05T09:29:59.000000Z"}}
            }"#,
        );
        match &tags["CreationDate"] {
            TagValue::DateTime(dt) => assert_eq!(dt.offset.unwrap().local_minus_utc(), 0),
            other => panic!("expected DateTime, got {:?}", other),
        }
    }

    #[test]
    fn missing_pieces_yield_no_tags() {
        let tags = probe_output(r#"{"streams": [], "format": {}}"#);
        assert!(tags.is_empty());
    }
}
