use std::fmt::Write as _;

use crate::cluster::RawHeader;
use crate::message::PayloadFormat;

/// Recoverable per-field failure: the scan substitutes the message as the
/// displayed value instead of aborting.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid utf-8 payload: {0}")]
    InvalidUtf8(String),
    #[error("invalid json payload: {0}")]
    InvalidJson(String),
}

/// Converts raw payload bytes into a display string for one record field.
/// Implementations may consult the topic name and record headers to pick a
/// schema; the built-in one only honors the format hint.
pub trait RecordDeserializer: Send + Sync {
    fn deserialize(
        &self,
        topic: &str,
        headers: &[RawHeader],
        payload: &[u8],
        format: Option<PayloadFormat>,
    ) -> Result<String, DeserializeError>;
}

/// Default deserializer: UTF-8 text, validated JSON, or hex; with no hint it
/// renders text when the payload is printable and falls back to hex.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayDeserializer;

impl RecordDeserializer for DisplayDeserializer {
    fn deserialize(
        &self,
        _topic: &str,
        _headers: &[RawHeader],
        payload: &[u8],
        format: Option<PayloadFormat>,
    ) -> Result<String, DeserializeError> {
        match format {
            Some(PayloadFormat::Text) => String::from_utf8(payload.to_vec())
                .map_err(|e| DeserializeError::InvalidUtf8(e.to_string())),
            Some(PayloadFormat::Json) => serde_json::from_slice::<serde_json::Value>(payload)
                .map(|value| value.to_string())
                .map_err(|e| DeserializeError::InvalidJson(e.to_string())),
            Some(PayloadFormat::Hex) => Ok(to_hex(payload)),
            None => match std::str::from_utf8(payload) {
                Ok(text) if is_displayable(text) => Ok(text.to_string()),
                _ => Ok(to_hex(payload)),
            },
        }
    }
}

fn is_displayable(text: &str) -> bool {
    !text.chars().any(|c| c.is_control() && !c.is_whitespace())
}

fn to_hex(payload: &[u8]) -> String {
    let mut out = String::with_capacity(payload.len() * 2);
    for byte in payload {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deserialize(payload: &[u8], format: Option<PayloadFormat>) -> Result<String, DeserializeError> {
        DisplayDeserializer.deserialize("orders", &[], payload, format)
    }

    #[test]
    fn test_text_format() {
        assert_eq!(
            deserialize(b"hello", Some(PayloadFormat::Text)).unwrap(),
            "hello"
        );
        assert!(matches!(
            deserialize(&[0xff, 0xfe], Some(PayloadFormat::Text)),
            Err(DeserializeError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_json_format_validates() {
        assert_eq!(
            deserialize(br#"{"a":1}"#, Some(PayloadFormat::Json)).unwrap(),
            r#"{"a":1}"#
        );
        assert!(matches!(
            deserialize(b"not json", Some(PayloadFormat::Json)),
            Err(DeserializeError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_hex_format() {
        assert_eq!(
            deserialize(&[0xde, 0xad, 0xbe, 0xef], Some(PayloadFormat::Hex)).unwrap(),
            "deadbeef"
        );
    }

    #[test]
    fn test_unspecified_falls_back_to_hex_for_binary() {
        assert_eq!(deserialize(b"plain text", None).unwrap(), "plain text");
        assert_eq!(deserialize(&[0x00, 0x01], None).unwrap(), "0001");
    }
}
