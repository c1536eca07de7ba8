//! Glucose Sensor Protocol
//!
//! UUIDs and payload decoding for the glucose sensor peripheral.

use crate::domain::models::{GlucoseUnit, NewReading, ReadingType};
use crate::domain::settings::PayloadFormat;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::trace;
use uuid::Uuid;

/// Bluetooth SIG base UUID; 16/32-bit assigned numbers live in the top 32 bits
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Glucose Service (0x1808)
pub const GLUCOSE_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001808_0000_1000_8000_00805f9b34fb);

/// Glucose Measurement characteristic (0x2A18)
pub const GLUCOSE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x00002a18_0000_1000_8000_00805f9b34fb);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid UUID: {0}")]
    InvalidUuid(String),

    #[error("Empty payload")]
    Empty,

    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("Malformed tag payload: {0}")]
    Malformed(String),

    #[error("Missing tag: {0}")]
    MissingTag(&'static str),

    #[error("Unknown sample kind: {0}")]
    UnknownSampleKind(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Empty unit")]
    EmptyUnit,

    #[error("Payload too short: {0} bytes")]
    TooShort(usize),
}

/// Expand a 16/32-bit assigned number onto the Bluetooth base UUID
pub fn uuid_from_short(short: u32) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Parse a UUID given as `1808`, `0x2A18`, an 8-digit short form or a full 128-bit string
pub fn parse_uuid(uuid_str: &str) -> Result<Uuid, ProtocolError> {
    let trimmed = uuid_str.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if matches!(hex.len(), 4 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        let short = u32::from_str_radix(hex, 16)
            .map_err(|_| ProtocolError::InvalidUuid(uuid_str.to_string()))?;
        return Ok(uuid_from_short(short));
    }

    Uuid::parse_str(trimmed).map_err(|_| ProtocolError::InvalidUuid(uuid_str.to_string()))
}

/// Decoded `[ech:..][valeur:..][unit:..]` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPayload {
    pub reading_type: ReadingType,
    pub value: i64,
    pub unit: String,
}

fn parse_sample_kind(raw: &str) -> Result<ReadingType, ProtocolError> {
    match raw.to_ascii_lowercase().as_str() {
        "sang" | "blood" => Ok(ReadingType::Blood),
        "urine" => Ok(ReadingType::Urine),
        _ => Err(ProtocolError::UnknownSampleKind(raw.to_string())),
    }
}

/// Parse the sensor's bracketed text format
///
/// ```text
/// [ech:<sang|urine>][valeur:<int>][unit:<unit>]
/// ```
///
/// Tags may come in any order and unknown tags are skipped. Whitespace around
/// the payload and between tags, and trailing NUL padding, are ignored.
pub fn parse_tag_payload(bytes: &[u8]) -> Result<TagPayload, ProtocolError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
    let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if text.is_empty() {
        return Err(ProtocolError::Empty);
    }

    let malformed = || ProtocolError::Malformed(text.to_string());

    let mut reading_type = None;
    let mut value = None;
    let mut unit = None;

    let mut rest = text;
    while !rest.is_empty() {
        let body = rest.strip_prefix('[').ok_or_else(malformed)?;
        let close = body.find(']').ok_or_else(malformed)?;
        let tag = &body[..close];
        rest = body[close + 1..].trim_start();

        let (key, raw) = tag.split_once(':').ok_or_else(malformed)?;
        let raw = raw.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "ech" => reading_type = Some(parse_sample_kind(raw)?),
            "valeur" => {
                let parsed = raw
                    .parse::<i64>()
                    .map_err(|_| ProtocolError::InvalidValue(raw.to_string()))?;
                value = Some(parsed);
            }
            "unit" => {
                if raw.is_empty() {
                    return Err(ProtocolError::EmptyUnit);
                }
                unit = Some(raw.to_string());
            }
            other => trace!("Skipping unknown tag {:?}", other),
        }
    }

    Ok(TagPayload {
        reading_type: reading_type.ok_or(ProtocolError::MissingTag("ech"))?,
        value: value.ok_or(ProtocolError::MissingTag("valeur"))?,
        unit: unit.ok_or(ProtocolError::MissingTag("unit"))?,
    })
}

/// Decode a notification payload into a reading stamped with `received_at`
pub fn parse_payload(
    bytes: &[u8],
    format: PayloadFormat,
    received_at: DateTime<Utc>,
) -> Result<NewReading, ProtocolError> {
    trace!("Raw payload: {:02X?}", bytes);

    match format {
        PayloadFormat::TagText => {
            let tag = parse_tag_payload(bytes)?;
            Ok(NewReading {
                reading_type: tag.reading_type,
                value: tag.value as f64,
                unit: tag.unit,
                timestamp: received_at,
            })
        }
        PayloadFormat::U16Le => {
            if bytes.len() < 2 {
                return Err(ProtocolError::TooShort(bytes.len()));
            }
            Ok(NewReading {
                reading_type: ReadingType::Blood,
                value: u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
                unit: GlucoseUnit::MgDl.label().to_string(),
                timestamp: received_at,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_uuids() {
        assert_eq!(
            GLUCOSE_SERVICE_UUID.to_string(),
            "00001808-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(parse_uuid("2A18").unwrap(), GLUCOSE_MEASUREMENT_UUID);
        assert_eq!(parse_uuid("0x1808").unwrap(), GLUCOSE_SERVICE_UUID);
        assert_eq!(parse_uuid("00001808").unwrap(), GLUCOSE_SERVICE_UUID);
        assert_eq!(
            parse_uuid("00002A18-0000-1000-8000-00805F9B34FB").unwrap(),
            GLUCOSE_MEASUREMENT_UUID
        );
    }

    #[test]
    fn test_parse_uuid_rejects_garbage() {
        assert!(matches!(
            parse_uuid("YOUR_SERVICE_UUID"),
            Err(ProtocolError::InvalidUuid(_))
        ));
        assert!(parse_uuid("18x8").is_err());
    }

    #[test]
    fn test_parse_blood_payload() {
        let tag = parse_tag_payload(b"[ech:sang][valeur:123][unit:mg/dL]").unwrap();
        assert_eq!(
            tag,
            TagPayload {
                reading_type: ReadingType::Blood,
                value: 123,
                unit: "mg/dL".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_urine_payload_any_order_with_padding() {
        let tag = parse_tag_payload(b"  [unit:mg/dL] [valeur:8][ech:URINE]\0\0").unwrap();
        assert_eq!(tag.reading_type, ReadingType::Urine);
        assert_eq!(tag.value, 8);
    }

    #[test]
    fn test_unknown_tags_are_skipped() {
        let tag = parse_tag_payload(b"[bat:87][ech:sang][valeur:99][unit:mg/dL]").unwrap();
        assert_eq!(tag.value, 99);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_tag_payload(b""), Err(ProtocolError::Empty));
        assert_eq!(parse_tag_payload(&[0xff, 0xfe]), Err(ProtocolError::InvalidUtf8));
        assert_eq!(
            parse_tag_payload(b"[valeur:99][unit:mg/dL]"),
            Err(ProtocolError::MissingTag("ech"))
        );
        assert_eq!(
            parse_tag_payload(b"[ech:salive][valeur:99][unit:mg/dL]"),
            Err(ProtocolError::UnknownSampleKind("salive".to_string()))
        );
        assert_eq!(
            parse_tag_payload(b"[ech:sang][valeur:9.5][unit:mg/dL]"),
            Err(ProtocolError::InvalidValue("9.5".to_string()))
        );
        assert_eq!(
            parse_tag_payload(b"[ech:sang][valeur:95][unit:]"),
            Err(ProtocolError::EmptyUnit)
        );
        assert!(matches!(
            parse_tag_payload(b"[ech:sang][valeur:95"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            parse_tag_payload(b"ech:sang"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_payload_formats() {
        let now = Utc::now();
        let reading =
            parse_payload(b"[ech:sang][valeur:140][unit:mg/dL]", PayloadFormat::TagText, now)
                .unwrap();
        assert_eq!(reading.value, 140.0);
        assert_eq!(reading.timestamp, now);

        let legacy = parse_payload(&[0x6E, 0x00, 0xFF], PayloadFormat::U16Le, now).unwrap();
        assert_eq!(legacy.reading_type, ReadingType::Blood);
        assert_eq!(legacy.value, 110.0);
        assert_eq!(legacy.unit, "mg/dL");

        assert_eq!(
            parse_payload(&[0x01], PayloadFormat::U16Le, now),
            Err(ProtocolError::TooShort(1))
        );
    }
}
