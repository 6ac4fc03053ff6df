//! Exclusive, scoped access to the device camera.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use kyc_types::ArtifactKind;

use crate::CaptureError;

/// What a capability probe found.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraProbe {
    Available,
    NoCamera,
    PermissionDenied,
}

/// Evidence of a live subject seen in one preview frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessSignal {
    pub blink: bool,
    pub motion: bool,
}

impl LivenessSignal {
    pub const NONE: Self = Self {
        blink: false,
        motion: false,
    };
    pub const BLINK: Self = Self {
        blink: true,
        motion: false,
    };
    pub const MOTION: Self = Self {
        blink: false,
        motion: true,
    };

    pub fn is_live(&self) -> bool {
        self.blink || self.motion
    }
}

/// A camera on the completing device.
///
/// `start_stream`/`stop_stream` are synchronous so a lease can release the
/// camera from `Drop`.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn probe(&self) -> CameraProbe;

    fn start_stream(&self) -> Result<(), CaptureError>;

    fn stop_stream(&self);

    /// Wait until a document is framed well enough to capture. Returns a
    /// quality estimate if the device has one.
    async fn align_document(&self) -> Result<Option<f64>, CaptureError>;

    /// Inspect preview frame `frame` for signs of life.
    async fn observe_liveness(&self, frame: u32) -> Result<LivenessSignal, CaptureError>;

    async fn capture_frame(&self, kind: ArtifactKind) -> Result<Vec<u8>, CaptureError>;
}

/// The one camera of a device, shared between capture steps.
#[derive(Clone)]
pub struct CameraSlot {
    camera: Arc<dyn CameraDevice>,
    lock: Arc<Mutex<()>>,
}

impl CameraSlot {
    pub fn new(camera: Arc<dyn CameraDevice>) -> Self {
        Self {
            camera,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn probe(&self) -> CameraProbe {
        self.camera.probe().await
    }

    /// Take the camera and start streaming. Fails with `CameraBusy` while
    /// another lease is alive.
    pub fn acquire(&self) -> Result<CameraLease, CaptureError> {
        let guard = self
            .lock
            .clone()
            .try_lock_owned()
            .map_err(|_| CaptureError::CameraBusy)?;
        self.camera.start_stream()?;
        debug!("camera acquired");
        Ok(CameraLease {
            camera: self.camera.clone(),
            _guard: guard,
        })
    }

    pub fn is_held(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

/// Held camera access. Dropping it stops the stream and frees the slot.
pub struct CameraLease {
    camera: Arc<dyn CameraDevice>,
    _guard: OwnedMutexGuard<()>,
}

impl CameraLease {
    pub fn camera(&self) -> &dyn CameraDevice {
        self.camera.as_ref()
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.camera.stop_stream();
        debug!("camera released");
    }
}

impl fmt::Debug for CameraLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraLease").finish_non_exhaustive()
    }
}
