//! Verification scorer output.

use serde::{Deserialize, Serialize};

/// Upper bound of [`VerificationResult::confidence`].
pub const MAX_CONFIDENCE: f64 = 100.0;

/// Per-check sub-scores kept for audit and display.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDetail {
    #[serde(default)]
    pub document_quality: Option<f64>,
    #[serde(default)]
    pub face_quality: Option<f64>,
    #[serde(default)]
    pub face_match: Option<f64>,
    #[serde(default)]
    pub liveness_detected: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// The scorer's verdict. Immutable once attached to a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub verified: bool,
    /// Confidence in `[0, 100]`.
    pub confidence: f64,
    #[serde(default)]
    pub detail: ScoreDetail,
}

impl VerificationResult {
    pub fn new(verified: bool, confidence: f64) -> Self {
        Self {
            verified,
            confidence,
            detail: ScoreDetail::default(),
        }
    }

    pub fn with_detail(mut self, detail: ScoreDetail) -> Self {
        self.detail = detail;
        self
    }

    /// Whether the confidence is a finite number inside `[0, 100]`.
    pub fn has_valid_confidence(&self) -> bool {
        self.confidence.is_finite() && (0.0..=MAX_CONFIDENCE).contains(&self.confidence)
    }
}
