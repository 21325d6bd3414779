use crate::record::GpsCoordinates;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use exif::{Exif, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Embedded metadata pulled from an image container. Every field degrades
/// to `None`; empty files, videos without EXIF, and corrupted images all
/// produce an empty bundle rather than an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageMetadata {
    pub capture: Option<DateTime<Local>>,
    pub gps: Option<GpsCoordinates>,
    pub camera: Option<String>,
}

/// Reads capture date, GPS position, and camera tag from a file.
/// Total over arbitrary input: parse failures yield `ImageMetadata::default()`.
pub fn read_image_metadata(path: &Path) -> ImageMetadata {
    let Ok(file) = File::open(path) else {
        return ImageMetadata::default();
    };
    let mut buf = BufReader::new(file);
    let Ok(exif) = Reader::new().read_from_container(&mut buf) else {
        return ImageMetadata::default();
    };

    ImageMetadata {
        capture: read_capture(&exif),
        gps: read_gps(&exif),
        camera: read_camera(&exif),
    }
}

fn read_capture(exif: &Exif) -> Option<DateTime<Local>> {
    [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime]
        .iter()
        .find_map(|tag| ascii_field(exif, *tag))
        .and_then(|raw| parse_date(&raw))
}

fn read_gps(exif: &Exif) -> Option<GpsCoordinates> {
    let latitude = coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, 'S')?;
    let longitude = coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, 'W')?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return None;
    }
    Some(GpsCoordinates {
        latitude,
        longitude,
    })
}

fn read_camera(exif: &Exif) -> Option<String> {
    let make = normalize(ascii_field(exif, Tag::Make));
    let model = normalize(ascii_field(exif, Tag::Model));

    match (make, model) {
        (Some(make), Some(model)) => {
            // Many vendors repeat the make inside the model string.
            if model.to_ascii_lowercase().contains(&make.to_ascii_lowercase()) {
                Some(model)
            } else {
                Some(format!("{} {}", make, model))
            }
        }
        (Some(make), None) => Some(make),
        (None, Some(model)) => Some(model),
        (None, None) => None,
    }
}

/// Degrees/minutes/seconds rationals plus a hemisphere reference letter,
/// converted to signed decimal degrees.
fn coordinate(exif: &Exif, value_tag: Tag, ref_tag: Tag, negative_ref: char) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let Value::Rational(ref parts) = field.value else {
        return None;
    };
    if parts.is_empty() {
        return None;
    }

    let degrees = parts.first().map(|r| r.to_f64()).unwrap_or(0.0);
    let minutes = parts.get(1).map(|r| r.to_f64()).unwrap_or(0.0);
    let seconds = parts.get(2).map(|r| r.to_f64()).unwrap_or(0.0);
    let mut decimal = degrees + minutes / 60.0 + seconds / 3600.0;
    if !decimal.is_finite() {
        return None;
    }

    let reference = ascii_field(exif, ref_tag).unwrap_or_default();
    if reference
        .trim()
        .chars()
        .next()
        .map(|c| c.eq_ignore_ascii_case(&negative_ref))
        .unwrap_or(false)
    {
        decimal = -decimal;
    }
    Some(decimal)
}

fn ascii_field(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match field.value {
        Value::Ascii(ref lines) => lines
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).to_string()),
        _ => Some(field.display_value().to_string()),
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().trim_matches('\0').trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_date(input: &str) -> Option<DateTime<Local>> {
    let normalized = input.trim();

    let candidates = [
        "%Y:%m:%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%dT%H:%M:%S%.f%:z",
    ];

    for fmt in candidates {
        if let Ok(dt) = DateTime::parse_from_str(normalized, fmt) {
            return Some(dt.with_timezone(&Local));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(normalized, fmt) {
            if let Some(local) = Local.from_local_datetime(&naive).single() {
                return Some(local);
            }
        }
    }

    None
}
