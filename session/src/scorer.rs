//! The external verification scorer.
//!
//! Biometric scoring is not done in this workspace. A scorer receives the two
//! artifacts and returns a [`VerificationResult`]; the manager only checks
//! that the result is well formed before attaching it to the session.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use kyc_types::{encode_image_payload, CaptureArtifact, SessionId, VerificationResult};

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("no verification scorer is configured")]
    NotConfigured,

    #[error("scorer transport error: {0}")]
    Transport(String),

    #[error("scorer responded with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("scorer returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("scorer timed out")]
    Timeout,
}

/// Everything a scorer sees. Consumed by value so the artifacts are scored
/// exactly once.
#[derive(Clone, Debug)]
pub struct ScoringRequest {
    pub session_id: SessionId,
    pub document: CaptureArtifact,
    pub face: CaptureArtifact,
    pub liveness_detected: bool,
}

#[async_trait]
pub trait VerificationScorer: Send + Sync {
    async fn score(&self, request: ScoringRequest) -> Result<VerificationResult, ScorerError>;

    /// Short name used in logs and metrics labels.
    fn name(&self) -> &str;
}

/// Used when no scorer endpoint is configured. Every verification attempt
/// reports the scorer as unavailable and leaves the session in progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableScorer;

#[async_trait]
impl VerificationScorer for UnavailableScorer {
    async fn score(&self, _request: ScoringRequest) -> Result<VerificationResult, ScorerError> {
        Err(ScorerError::NotConfigured)
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScorerRequestBody<'a> {
    session_id: &'a str,
    document_scan: String,
    face_capture: String,
    liveness_detected: bool,
}

/// Forwards submissions to an external scoring service over HTTP.
///
/// `POST <url>` with `{sessionId, documentScan, faceCapture, livenessDetected}`
/// (images base64 encoded), expecting a `VerificationResult` JSON body.
pub struct HttpScorer {
    client: reqwest::Client,
    url: String,
}

impl HttpScorer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ScorerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScorerError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn transport_error(e: reqwest::Error) -> ScorerError {
    if e.is_timeout() {
        ScorerError::Timeout
    } else {
        ScorerError::Transport(e.to_string())
    }
}

#[async_trait]
impl VerificationScorer for HttpScorer {
    async fn score(&self, request: ScoringRequest) -> Result<VerificationResult, ScorerError> {
        let body = ScorerRequestBody {
            session_id: request.session_id.as_str(),
            document_scan: encode_image_payload(&request.document.payload),
            face_capture: encode_image_payload(&request.face.payload),
            liveness_detected: request.liveness_detected,
        };
        debug!(session = %request.session_id, url = %self.url, "sending artifacts to scorer");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(session = %request.session_id, %status, "scorer rejected request");
            return Err(ScorerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<VerificationResult>()
            .await
            .map_err(|e| ScorerError::InvalidResponse(e.to_string()))
    }

    fn name(&self) -> &str {
        "http"
    }
}
