//! Captured artifacts produced by the capture steps.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypeError;

/// What a capture step photographed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactKind {
    DocumentScan,
    FaceCapture,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DocumentScan => f.write_str("DOCUMENT_SCAN"),
            Self::FaceCapture => f.write_str("FACE_CAPTURE"),
        }
    }
}

/// One captured frame.
///
/// Owned by the capture flow until it is moved into a verification
/// submission; never persisted.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureArtifact {
    pub kind: ArtifactKind,
    #[serde(with = "base64_payload")]
    pub payload: Vec<u8>,
    /// Capture-side quality estimate. Not authoritative.
    pub quality_hint: Option<f64>,
}

impl CaptureArtifact {
    pub fn new(kind: ArtifactKind, payload: Vec<u8>) -> Self {
        Self {
            kind,
            payload,
            quality_hint: None,
        }
    }

    pub fn with_quality_hint(mut self, hint: f64) -> Self {
        self.quality_hint = Some(hint);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

// Image bytes are large; keep them out of debug output and logs.
impl fmt::Debug for CaptureArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureArtifact")
            .field("kind", &self.kind)
            .field("payload_len", &self.payload.len())
            .field("quality_hint", &self.quality_hint)
            .finish()
    }
}

/// Decode an image payload sent as plain base64 or as a `data:` URL
/// (`data:image/jpeg;base64,...`), which is what browser canvases produce.
pub fn decode_image_payload(raw: &str) -> Result<Vec<u8>, TypeError> {
    let encoded = match raw.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest
                .split_once(',')
                .ok_or_else(|| TypeError::InvalidPayload("data URL without ','".into()))?;
            if !meta.ends_with(";base64") {
                return Err(TypeError::InvalidPayload(format!(
                    "data URL is not base64 encoded: {meta}"
                )));
            }
            data
        }
        None => raw,
    };
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| TypeError::InvalidPayload(e.to_string()))
}

/// Encode an image payload as plain base64.
pub fn encode_image_payload(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

mod base64_payload {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_image_payload(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::decode_image_payload(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_base64_and_data_urls() {
        let bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        let plain = encode_image_payload(&bytes);
        assert_eq!(decode_image_payload(&plain).unwrap(), bytes);

        let data_url = format!("data:image/jpeg;base64,{plain}");
        assert_eq!(decode_image_payload(&data_url).unwrap(), bytes);
    }

    #[test]
    fn rejects_non_base64_data_urls() {
        assert!(decode_image_payload("data:image/svg+xml,<svg/>").is_err());
        assert!(decode_image_payload("not base64!!").is_err());
    }

    #[test]
    fn debug_output_hides_payload() {
        let artifact = CaptureArtifact::new(ArtifactKind::FaceCapture, vec![7; 4096]);
        let debug = format!("{artifact:?}");
        assert!(debug.contains("payload_len: 4096"));
        assert!(!debug.contains("7, 7"));
    }

    #[test]
    fn json_payload_is_base64() {
        let artifact = CaptureArtifact::new(ArtifactKind::DocumentScan, b"scan".to_vec());
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["payload"], "c2Nhbg==");
        assert_eq!(json["kind"], "DOCUMENT_SCAN");
        let back: CaptureArtifact = serde_json::from_value(json).unwrap();
        assert_eq!(back, artifact);
    }
}
