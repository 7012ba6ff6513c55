//! Image metadata from embedded EXIF tags, with a header-only fallback for
//! pixel dimensions.

use std::io::Cursor;

use exif::{Exif, In, Reader, Tag, Value};
use serde_json::{json, Value as Json};

use super::{Extracted, FileFacts, MetadataExtractor};
use crate::domain::evidence::MetadataMap;
use crate::error::ExtractionError;

/// EXIF/GPS strategy for `image/*`
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageExtractor;

impl MetadataExtractor for ImageExtractor {
    fn name(&self) -> &'static str {
        "image"
    }

    fn extract(&self, _file: &FileFacts<'_>, bytes: &[u8]) -> Result<Extracted, ExtractionError> {
        let dimensions = header_dimensions(bytes);

        let exif = match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
            Ok(exif) => exif,
            Err(exif::Error::NotFound(_)) | Err(exif::Error::InvalidFormat(_)) => {
                // A decodable image without tags still has dimensions
                let Some((width, height)) = dimensions else {
                    return Err(ExtractionError::NotFound("EXIF"));
                };
                let mut metadata = curated(None);
                metadata.insert("width".to_string(), json!(width));
                metadata.insert("height".to_string(), json!(height));
                return Ok(Extracted { metadata, raw: None });
            }
            Err(e) => {
                return Err(ExtractionError::Unreadable {
                    kind: "EXIF",
                    reason: e.to_string(),
                })
            }
        };

        let mut metadata = curated(Some(&exif));
        if let Some((width, height)) = dimensions {
            for (key, value) in [("width", width), ("height", height)] {
                let slot = metadata.entry(key.to_string()).or_insert(Json::Null);
                if slot.is_null() {
                    *slot = json!(value);
                }
            }
        }

        Ok(Extracted {
            metadata,
            raw: Some(raw_tags(&exif)),
        })
    }
}

/// Curated field set. Every key is present; missing tags are `null`.
fn curated(exif: Option<&Exif>) -> MetadataMap {
    let text = |tag: Tag| exif.and_then(|e| ascii(e, tag));
    let int = |tag: Tag| exif.and_then(|e| uint(e, tag));
    let ratio = |tag: Tag| exif.and_then(|e| rational(e, tag));

    let date_time = text(Tag::DateTimeOriginal)
        .or_else(|| text(Tag::DateTime))
        .or_else(|| text(Tag::DateTimeDigitized));

    let fields = [
        ("make", json!(text(Tag::Make))),
        ("model", json!(text(Tag::Model))),
        ("software", json!(text(Tag::Software))),
        ("dateTime", json!(date_time)),
        ("dateTimeDigitized", json!(text(Tag::DateTimeDigitized))),
        ("modifyDate", json!(text(Tag::DateTime))),
        ("gps", exif.map(gps).unwrap_or(Json::Null)),
        ("iso", json!(int(Tag::PhotographicSensitivity))),
        ("fNumber", json!(ratio(Tag::FNumber))),
        ("exposureTime", json!(ratio(Tag::ExposureTime))),
        ("focalLength", json!(ratio(Tag::FocalLength))),
        (
            "width",
            json!(int(Tag::ImageWidth).or_else(|| int(Tag::PixelXDimension))),
        ),
        (
            "height",
            json!(int(Tag::ImageLength).or_else(|| int(Tag::PixelYDimension))),
        ),
        ("orientation", json!(int(Tag::Orientation))),
        ("lensModel", json!(text(Tag::LensModel))),
        ("flash", json!(int(Tag::Flash))),
        ("whiteBalance", json!(int(Tag::WhiteBalance))),
    ];

    fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// GPS block, present only when both coordinates are
fn gps(exif: &Exif) -> Json {
    let coordinate = |tag: Tag, ref_tag: Tag| -> Option<f64> {
        let field = exif.get_field(tag, In::PRIMARY)?;
        let Value::Rational(ref parts) = field.value else {
            return None;
        };
        let parts: Vec<f64> = parts.iter().map(|r| r.to_f64()).collect();
        let hemisphere = ascii(exif, ref_tag).unwrap_or_default();
        dms_to_decimal(&parts, &hemisphere)
    };

    let (Some(latitude), Some(longitude)) = (
        coordinate(Tag::GPSLatitude, Tag::GPSLatitudeRef),
        coordinate(Tag::GPSLongitude, Tag::GPSLongitudeRef),
    ) else {
        return Json::Null;
    };

    let altitude = rational(exif, Tag::GPSAltitude).map(|alt| {
        // Ref 1 means below sea level
        if uint(exif, Tag::GPSAltitudeRef) == Some(1) {
            -alt
        } else {
            alt
        }
    });

    json!({
        "latitude": latitude,
        "longitude": longitude,
        "altitude": altitude,
        "timestamp": ascii(exif, Tag::GPSDateStamp),
    })
}

/// Convert degrees/minutes/seconds to signed decimal degrees.
///
/// `hemisphere` is the EXIF reference letter; `S` and `W` are negative.
pub fn dms_to_decimal(parts: &[f64], hemisphere: &str) -> Option<f64> {
    let degrees = *parts.first()?;
    let minutes = parts.get(1).copied().unwrap_or(0.0);
    let seconds = parts.get(2).copied().unwrap_or(0.0);

    let value = degrees + minutes / 60.0 + seconds / 3600.0;
    if !value.is_finite() {
        return None;
    }

    match hemisphere.trim().to_ascii_uppercase().as_str() {
        "S" | "W" => Some(-value),
        _ => Some(value),
    }
}

fn raw_tags(exif: &Exif) -> MetadataMap {
    let mut raw = MetadataMap::new();
    for field in exif.fields() {
        let key = if field.ifd_num == In::PRIMARY {
            field.tag.to_string()
        } else {
            format!("thumbnail.{}", field.tag)
        };
        raw.entry(key)
            .or_insert_with(|| json!(field.display_value().with_unit(exif).to_string()));
    }
    raw
}

fn ascii(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let Value::Ascii(ref values) = field.value else {
        return None;
    };
    let text = String::from_utf8_lossy(values.first()?);
    let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    (!text.is_empty()).then(|| text.to_string())
}

fn uint(exif: &Exif, tag: Tag) -> Option<u32> {
    exif.get_field(tag, In::PRIMARY)?.value.get_uint(0)
}

fn rational(exif: &Exif, tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let value = match field.value {
        Value::Rational(ref v) => v.first()?.to_f64(),
        Value::SRational(ref v) => v.first()?.to_f64(),
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Pixel dimensions from the image header, without decoding pixels
fn header_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ::image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
