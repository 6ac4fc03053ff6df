use tracing::debug;

use crate::{CameraDevice, CaptureError};

/// Watch up to `frames` preview frames for a blink or motion.
///
/// Returns as soon as one frame shows a live subject.
pub async fn detect_liveness(camera: &dyn CameraDevice, frames: u32) -> Result<bool, CaptureError> {
    for frame in 0..frames {
        let signal = camera.observe_liveness(frame).await?;
        debug!(frame, blink = signal.blink, motion = signal.motion, "liveness frame");
        if signal.is_live() {
            return Ok(true);
        }
    }
    Ok(false)
}
