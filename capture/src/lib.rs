//! The capture sequence run on the completing device.
//!
//! [`CaptureFlow`] walks `DEVICE_CHECK → DOCUMENT_SCAN → FACE_CAPTURE →
//! VERIFY` against a [`HandoffBackend`] (the lifecycle manager in-process,
//! or the HTTP API through `kyc-client`). The camera is only ever reachable
//! through a [`CameraLease`], which stops the stream when dropped.

pub mod backend;
pub mod camera;
pub mod error;
pub mod flow;
pub mod liveness;

pub use backend::{HandoffBackend, LocalBackend, VerificationOutcome};
pub use camera::{CameraDevice, CameraLease, CameraProbe, CameraSlot, LivenessSignal};
pub use error::CaptureError;
pub use flow::{CaptureFlow, CaptureStep, FlowConfig, DEFAULT_LIVENESS_FRAMES};
pub use liveness::detect_liveness;
