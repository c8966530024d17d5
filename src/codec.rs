//! Payload codecs for hex, base64, and UTF-8 text
//!
//! Pure byte/text conversions used for outbound payload decoding and for
//! formatting binary payloads in the message log. Decoding is tolerant by
//! design: hex accepts an optional `0x` prefix, mixed case, and embedded
//! whitespace; base64 accepts the standard and URL-safe alphabets with or
//! without padding.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

/// Standard-alphabet engine, padding optional on decode
const BASE64_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// URL-safe-alphabet engine, padding optional on decode
const BASE64_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors from payload decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Invalid hex payload: {0}")]
    Hex(String),

    #[error("Invalid base64 payload: {0}")]
    Base64(String),

    #[error("Payload is not valid UTF-8: {0}")]
    Utf8(String),
}

/// Encode bytes as lowercase hex without a prefix
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex string into bytes
///
/// Tolerates a leading `0x`/`0X`, mixed case, and whitespace anywhere in
/// the input. An odd number of digits is an error.
pub fn hex_to_bytes(input: &str) -> Result<Vec<u8>, CodecError> {
    let trimmed = input.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let compact: String = stripped.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact).map_err(|e| CodecError::Hex(e.to_string()))
}

/// Encode bytes as standard base64 with padding
pub fn bytes_to_base64(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

/// Decode a base64 string into bytes
///
/// Accepts the standard and URL-safe alphabets; padding and whitespace
/// are optional.
pub fn base64_to_bytes(input: &str) -> Result<Vec<u8>, CodecError> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64_STANDARD
        .decode(compact.as_bytes())
        .or_else(|_| BASE64_URL_SAFE.decode(compact.as_bytes()))
        .map_err(|e| CodecError::Base64(e.to_string()))
}

/// Interpret bytes as UTF-8 text
pub fn bytes_to_utf8(bytes: &[u8]) -> Result<String, CodecError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| CodecError::Utf8(e.to_string()))
}

/// Interpret bytes as UTF-8 text, replacing invalid sequences
pub fn bytes_to_utf8_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Short hex dump of a binary payload for display: `"68656c (3 bytes)"`,
/// truncated past `max_bytes`
pub fn binary_preview(bytes: &[u8], max_bytes: usize) -> String {
    if bytes.len() <= max_bytes {
        format!("{} ({} bytes)", hex::encode(bytes), bytes.len())
    } else {
        format!("{}.. ({} bytes)", hex::encode(&bytes[..max_bytes]), bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let bytes = vec![0x00, 0x01, 0xde, 0xad, 0xbe, 0xef, 0xff];
        let encoded = bytes_to_hex(&bytes);
        assert_eq!(encoded, "0001deadbeefff");
        assert_eq!(hex_to_bytes(&encoded).unwrap(), bytes);
    }

    #[test]
    fn test_hex_round_trip_empty() {
        assert_eq!(bytes_to_hex(&[]), "");
        assert_eq!(hex_to_bytes("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_hex_decode_tolerant() {
        let expected = vec![0xde, 0xad, 0xbe, 0xef];
        assert_eq!(hex_to_bytes("0xdeadbeef").unwrap(), expected);
        assert_eq!(hex_to_bytes("0XDEADBEEF").unwrap(), expected);
        assert_eq!(hex_to_bytes("de ad be ef").unwrap(), expected);
        assert_eq!(hex_to_bytes("  0xDE AD\tbe ef  ").unwrap(), expected);
    }

    #[test]
    fn test_hex_decode_invalid() {
        assert!(matches!(hex_to_bytes("zz"), Err(CodecError::Hex(_))));
        // Odd digit count
        assert!(hex_to_bytes("abc").is_err());
    }

    #[test]
    fn test_base64_round_trip() {
        let bytes = b"hello websocket".to_vec();
        let encoded = bytes_to_base64(&bytes);
        assert_eq!(encoded, "aGVsbG8gd2Vic29ja2V0");
        assert_eq!(base64_to_bytes(&encoded).unwrap(), bytes);
    }

    #[test]
    fn test_base64_round_trip_empty() {
        assert_eq!(bytes_to_base64(&[]), "");
        assert_eq!(base64_to_bytes("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_base64_decode_without_padding() {
        // "hi" encodes to "aGk=" with padding
        assert_eq!(base64_to_bytes("aGk=").unwrap(), b"hi");
        assert_eq!(base64_to_bytes("aGk").unwrap(), b"hi");
    }

    #[test]
    fn test_base64_decode_url_safe() {
        // 0xfb 0xef encodes to "++8=" standard, "--8=" URL-safe
        let bytes = vec![0xfb, 0xef];
        assert_eq!(base64_to_bytes("++8=").unwrap(), bytes);
        assert_eq!(base64_to_bytes("--8").unwrap(), bytes);
    }

    #[test]
    fn test_base64_decode_invalid() {
        assert!(matches!(
            base64_to_bytes("not base64!!"),
            Err(CodecError::Base64(_))
        ));
    }

    #[test]
    fn test_utf8_conversion() {
        assert_eq!(bytes_to_utf8(b"plain text").unwrap(), "plain text");
        assert!(bytes_to_utf8(&[0xff, 0xfe]).is_err());
        assert_eq!(bytes_to_utf8_lossy(&[0x68, 0x69, 0xff]), "hi\u{fffd}");
    }

    #[test]
    fn test_binary_preview() {
        assert_eq!(binary_preview(b"hi", 8), "6869 (2 bytes)");
        assert_eq!(binary_preview(b"hello world!", 4), "68656c6c.. (12 bytes)");
    }
}
