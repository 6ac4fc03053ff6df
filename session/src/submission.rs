//! The completing device's verification submission.

use serde::{Deserialize, Serialize};

use kyc_types::{ArtifactKind, CaptureArtifact, SessionId};

use crate::scorer::ScoringRequest;
use crate::SessionError;

/// Artifacts gathered by the capture flow, handed to the scorer once.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSubmission {
    #[serde(default)]
    pub document_scan: Option<CaptureArtifact>,
    #[serde(default)]
    pub face_capture: Option<CaptureArtifact>,
    #[serde(default)]
    pub liveness_detected: bool,
}

impl VerificationSubmission {
    pub fn new(document_scan: CaptureArtifact, face_capture: CaptureArtifact, liveness_detected: bool) -> Self {
        Self {
            document_scan: Some(document_scan),
            face_capture: Some(face_capture),
            liveness_detected,
        }
    }

    /// Check the submission and turn it into a scorer request.
    ///
    /// Missing, empty or mis-typed artifacts are `IncompleteCapture`; a face
    /// capture without confirmed liveness is `LivenessNotConfirmed`.
    pub fn into_scoring_request(self, session_id: SessionId) -> Result<ScoringRequest, SessionError> {
        let document = require(self.document_scan, ArtifactKind::DocumentScan)?;
        let face = require(self.face_capture, ArtifactKind::FaceCapture)?;
        if !self.liveness_detected {
            return Err(SessionError::LivenessNotConfirmed);
        }
        Ok(ScoringRequest {
            session_id,
            document,
            face,
            liveness_detected: true,
        })
    }
}

fn require(artifact: Option<CaptureArtifact>, kind: ArtifactKind) -> Result<CaptureArtifact, SessionError> {
    let artifact = artifact.ok_or_else(|| SessionError::IncompleteCapture(kind.to_string()))?;
    if artifact.kind != kind {
        return Err(SessionError::IncompleteCapture(format!(
            "{kind} slot holds a {} artifact",
            artifact.kind
        )));
    }
    if artifact.is_empty() {
        return Err(SessionError::IncompleteCapture(format!("{kind} is empty")));
    }
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> SessionId {
        SessionId::parse("KYC_AAAAAAAAAAAA").unwrap()
    }

    fn doc() -> CaptureArtifact {
        CaptureArtifact::new(ArtifactKind::DocumentScan, vec![1, 2, 3])
    }

    fn face() -> CaptureArtifact {
        CaptureArtifact::new(ArtifactKind::FaceCapture, vec![4, 5, 6])
    }

    #[test]
    fn complete_submission_is_accepted() {
        let request = VerificationSubmission::new(doc(), face(), true)
            .into_scoring_request(id())
            .unwrap();
        assert_eq!(request.document.payload, vec![1, 2, 3]);
        assert!(request.liveness_detected);
    }

    #[test]
    fn missing_document_is_incomplete() {
        let submission = VerificationSubmission {
            document_scan: None,
            face_capture: Some(face()),
            liveness_detected: true,
        };
        let err = submission.into_scoring_request(id()).unwrap_err();
        assert!(matches!(err, SessionError::IncompleteCapture(ref what) if what == "DOCUMENT_SCAN"));
    }

    #[test]
    fn swapped_artifacts_are_incomplete() {
        let err = VerificationSubmission::new(face(), doc(), true)
            .into_scoring_request(id())
            .unwrap_err();
        assert!(matches!(err, SessionError::IncompleteCapture(_)));
    }

    #[test]
    fn empty_payload_is_incomplete() {
        let empty = CaptureArtifact::new(ArtifactKind::FaceCapture, Vec::new());
        let err = VerificationSubmission::new(doc(), empty, true)
            .into_scoring_request(id())
            .unwrap_err();
        assert!(matches!(err, SessionError::IncompleteCapture(_)));
    }

    #[test]
    fn unconfirmed_liveness_is_rejected() {
        let err = VerificationSubmission::new(doc(), face(), false)
            .into_scoring_request(id())
            .unwrap_err();
        assert!(matches!(err, SessionError::LivenessNotConfirmed));
    }

    #[test]
    fn parses_browser_json() {
        let json = r#"{
            "documentScan": {"kind": "DOCUMENT_SCAN", "payload": "data:image/jpeg;base64,AQID", "quality_hint": null},
            "faceCapture": {"kind": "FACE_CAPTURE", "payload": "BAUG", "quality_hint": 0.8},
            "livenessDetected": true
        }"#;
        let submission: VerificationSubmission = serde_json::from_str(json).unwrap();
        assert_eq!(submission, VerificationSubmission::new(doc(), face().with_quality_hint(0.8), true));
    }
}
