//! Raw tag extraction.
//!
//! Each reader is a pure function from a file path to a key→value tag
//! mapping. Readers never decide precedence; that is the merger's job.
//! A failed read is non-fatal to the pipeline: callers treat it as an empty
//! tag set and log a warning.

use std::collections::HashMap;

use chrono::{FixedOffset, NaiveDateTime};

pub mod exif_reader;
pub mod ffprobe;
pub mod xmp;

pub use exif_reader::read_embedded_tags;
pub use ffprobe::VideoProbe;
pub use xmp::read_sidecar_tags;

/// A capture instant as the source recorded it. The offset is present only
/// when the source carried an explicit zone; a bare string value yields an
/// instant with no zone.
#[derive(Debug, Clone, PartialEq)]
pub struct TagDateTime {
    pub value: NaiveDateTime,
    pub offset: Option<FixedOffset>,
}

/// A single raw tag value.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Text(String),
    Num(f64),
    /// Some tooling writes scalar tags as arrays (e.g. ISO `[800, 1600]`);
    /// consumers take the first element.
    NumList(Vec<f64>),
    DateTime(TagDateTime),
}

impl TagValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TagValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the value. Text is coerced, tolerating plain decimals
    /// and `num/den` rational strings; lists yield their first element.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Num(n) => Some(*n),
            TagValue::NumList(ns) => ns.first().copied(),
            TagValue::Text(s) => parse_numeric(s),
            TagValue::DateTime(_) => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        self.as_f64().map(|n| n.round() as i32)
    }
}

pub type TagMap = HashMap<String, TagValue>;

fn parse_numeric(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    s.parse().ok()
}
