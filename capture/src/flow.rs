//! The capture state machine.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use kyc_session::VerificationSubmission;
use kyc_types::{ArtifactKind, CaptureArtifact, ErrorCode, SessionId, SessionStatus};

use crate::backend::{HandoffBackend, VerificationOutcome};
use crate::camera::{CameraProbe, CameraSlot};
use crate::liveness::detect_liveness;
use crate::CaptureError;

/// Preview frames inspected for liveness before giving up.
pub const DEFAULT_LIVENESS_FRAMES: u32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureStep {
    DeviceCheck,
    DocumentScan,
    FaceCapture,
    Verify,
    Done,
    Rejected,
    Aborted,
}

impl CaptureStep {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Done | Self::Rejected | Self::Aborted)
    }
}

impl fmt::Display for CaptureStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DeviceCheck => "DEVICE_CHECK",
            Self::DocumentScan => "DOCUMENT_SCAN",
            Self::FaceCapture => "FACE_CAPTURE",
            Self::Verify => "VERIFY",
            Self::Done => "DONE",
            Self::Rejected => "REJECTED",
            Self::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowConfig {
    pub liveness_frames: u32,
    /// Deadline for each camera or verify step. `None` waits indefinitely.
    pub step_timeout: Option<Duration>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            liveness_frames: DEFAULT_LIVENESS_FRAMES,
            step_timeout: None,
        }
    }
}

/// One verification attempt on the completing device.
///
/// Steps must be called in order; calling any other step returns
/// `OutOfOrder` and changes nothing. Camera leases live only inside a step,
/// so no step can leave the camera running.
pub struct CaptureFlow {
    session_id: SessionId,
    backend: Arc<dyn HandoffBackend>,
    camera: CameraSlot,
    config: FlowConfig,
    step: CaptureStep,
    started: bool,
    document: Option<CaptureArtifact>,
    face: Option<CaptureArtifact>,
    liveness_detected: bool,
    outcome: Option<VerificationOutcome>,
}

impl CaptureFlow {
    pub fn new(
        session_id: SessionId,
        backend: Arc<dyn HandoffBackend>,
        camera: CameraSlot,
        config: FlowConfig,
    ) -> Self {
        Self {
            session_id,
            backend,
            camera,
            config,
            step: CaptureStep::DeviceCheck,
            started: false,
            document: None,
            face: None,
            liveness_detected: false,
            outcome: None,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn step(&self) -> CaptureStep {
        self.step
    }

    pub fn outcome(&self) -> Option<&VerificationOutcome> {
        self.outcome.as_ref()
    }

    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    pub fn has_face(&self) -> bool {
        self.face.is_some()
    }

    /// DEVICE_CHECK: probe the camera and start the session.
    ///
    /// Only the device whose `start` succeeds owns the attempt. A session
    /// already started elsewhere fails here with `invalid_transition` and
    /// this flow never reports an abort against it.
    pub async fn check_device(&mut self) -> Result<(), CaptureError> {
        self.expect(CaptureStep::DeviceCheck)?;
        self.backend.authorize(&self.session_id).await?;

        match self.camera.probe().await {
            CameraProbe::Available => {}
            CameraProbe::NoCamera => {
                return Err(CaptureError::DeviceUnsupported("no camera found".into()))
            }
            CameraProbe::PermissionDenied => return Err(CaptureError::CameraDenied),
        }

        self.backend.start(&self.session_id).await?;
        self.started = true;
        self.advance(CaptureStep::DocumentScan);
        Ok(())
    }

    /// DOCUMENT_SCAN: align and photograph the identity document.
    pub async fn scan_document(&mut self) -> Result<(), CaptureError> {
        self.expect(CaptureStep::DocumentScan)?;
        self.backend.authorize(&self.session_id).await?;

        let camera = self.camera.clone();
        let artifact = within(self.config.step_timeout, CaptureStep::DocumentScan, async move {
            let lease = camera.acquire()?;
            let quality = lease.camera().align_document().await?;
            let bytes = lease.camera().capture_frame(ArtifactKind::DocumentScan).await?;
            let mut artifact = CaptureArtifact::new(ArtifactKind::DocumentScan, bytes);
            if let Some(q) = quality {
                artifact = artifact.with_quality_hint(q);
            }
            Ok(artifact)
        })
        .await?;

        self.document = Some(artifact);
        self.advance(CaptureStep::FaceCapture);
        Ok(())
    }

    /// FACE_CAPTURE: confirm liveness, then photograph the face.
    ///
    /// Without a live signal the step fails and may be retried.
    pub async fn capture_face(&mut self) -> Result<(), CaptureError> {
        self.expect(CaptureStep::FaceCapture)?;
        self.backend.authorize(&self.session_id).await?;

        let camera = self.camera.clone();
        let frames = self.config.liveness_frames;
        let artifact = within(self.config.step_timeout, CaptureStep::FaceCapture, async move {
            let lease = camera.acquire()?;
            if !detect_liveness(lease.camera(), frames).await? {
                return Err(CaptureError::LivenessNotConfirmed);
            }
            let bytes = lease.camera().capture_frame(ArtifactKind::FaceCapture).await?;
            Ok(CaptureArtifact::new(ArtifactKind::FaceCapture, bytes))
        })
        .await?;

        self.face = Some(artifact);
        self.liveness_detected = true;
        self.advance(CaptureStep::Verify);
        Ok(())
    }

    /// VERIFY: submit both artifacts and record the verdict.
    ///
    /// Artifacts are kept until a verdict arrives so a scorer outage can be
    /// retried without recapturing.
    pub async fn verify(&mut self) -> Result<VerificationOutcome, CaptureError> {
        self.expect(CaptureStep::Verify)?;
        let (document, face) = match (&self.document, &self.face) {
            (Some(document), Some(face)) if self.liveness_detected => (document.clone(), face.clone()),
            (None, _) => return Err(CaptureError::IncompleteCapture("DOCUMENT_SCAN".into())),
            (_, None) => return Err(CaptureError::IncompleteCapture("FACE_CAPTURE".into())),
            _ => return Err(CaptureError::IncompleteCapture("liveness not confirmed".into())),
        };
        self.backend.authorize(&self.session_id).await?;

        let submission = VerificationSubmission::new(document, face, self.liveness_detected);
        let backend = self.backend.clone();
        let session_id = self.session_id.clone();
        let outcome = within(self.config.step_timeout, CaptureStep::Verify, async move {
            backend.submit(&session_id, submission).await
        })
        .await?;

        match outcome.status {
            SessionStatus::Completed => self.advance(CaptureStep::Done),
            SessionStatus::Failed => self.advance(CaptureStep::Rejected),
            other => {
                return Err(CaptureError::backend(
                    ErrorCode::Internal,
                    format!("verification left the session {other}"),
                ))
            }
        }
        self.document = None;
        self.face = None;
        self.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    /// Abandon the attempt. A started session is reported as failed.
    pub async fn abort(&mut self, reason: &str) -> Result<(), CaptureError> {
        if self.step.is_final() {
            return Ok(());
        }
        warn!(session = %self.session_id, step = %self.step, reason, "capture aborted");
        self.advance(CaptureStep::Aborted);
        self.document = None;
        self.face = None;
        if self.started {
            self.backend.abort(&self.session_id, reason).await?;
        }
        Ok(())
    }

    /// Run every remaining step in order.
    ///
    /// A recoverable error is returned with the flow left at the failed step,
    /// so calling `run` again resumes there. Anything else aborts the flow.
    pub async fn run(&mut self) -> Result<VerificationOutcome, CaptureError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// [`run`](Self::run), abandoning the attempt if `cancel` resolves first.
    pub async fn run_until<F>(&mut self, cancel: F) -> Result<VerificationOutcome, CaptureError>
    where
        F: Future<Output = ()>,
    {
        let driven = tokio::select! {
            result = self.drive() => Some(result),
            _ = cancel => None,
        };
        match driven {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(e)) => {
                self.settle(&e).await;
                Err(e)
            }
            None => {
                self.settle(&CaptureError::Cancelled).await;
                Err(CaptureError::Cancelled)
            }
        }
    }

    async fn drive(&mut self) -> Result<VerificationOutcome, CaptureError> {
        loop {
            match self.step {
                CaptureStep::DeviceCheck => self.check_device().await?,
                CaptureStep::DocumentScan => self.scan_document().await?,
                CaptureStep::FaceCapture => self.capture_face().await?,
                CaptureStep::Verify => return self.verify().await,
                CaptureStep::Done | CaptureStep::Rejected => {
                    return self.outcome.clone().ok_or_else(|| {
                        CaptureError::backend(ErrorCode::Internal, "finished without an outcome")
                    })
                }
                CaptureStep::Aborted => return Err(CaptureError::Cancelled),
            }
        }
    }

    async fn settle(&mut self, error: &CaptureError) {
        if error.is_recoverable() || self.step.is_final() {
            return;
        }
        if error.session_already_closed() {
            self.advance(CaptureStep::Aborted);
            return;
        }
        if let Err(e) = self.abort(&error.to_string()).await {
            warn!(session = %self.session_id, error = %e, "could not report abort");
        }
    }

    fn expect(&self, requested: CaptureStep) -> Result<(), CaptureError> {
        if self.step != requested {
            return Err(CaptureError::OutOfOrder {
                current: self.step,
                requested,
            });
        }
        Ok(())
    }

    fn advance(&mut self, next: CaptureStep) {
        info!(session = %self.session_id, from = %self.step, to = %next, "capture step");
        self.step = next;
    }
}

async fn within<T>(
    limit: Option<Duration>,
    step: CaptureStep,
    fut: impl Future<Output = Result<T, CaptureError>>,
) -> Result<T, CaptureError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| CaptureError::StepTimedOut(step))?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_steps() {
        assert!(CaptureStep::Done.is_final());
        assert!(CaptureStep::Rejected.is_final());
        assert!(CaptureStep::Aborted.is_final());
        assert!(!CaptureStep::Verify.is_final());
        assert_eq!(CaptureStep::FaceCapture.to_string(), "FACE_CAPTURE");
    }

    #[tokio::test]
    async fn deadline_turns_into_step_timeout() {
        let err = within(
            Some(Duration::from_millis(5)),
            CaptureStep::DocumentScan,
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<(), CaptureError>(())
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CaptureError::StepTimedOut(CaptureStep::DocumentScan)));
    }
}
