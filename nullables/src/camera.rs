//! Nullable camera: scripted capture hardware.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use kyc_capture::{CameraDevice, CameraProbe, CaptureError, LivenessSignal};
use kyc_types::ArtifactKind;

/// A camera whose probe result, liveness signals and timing are scripted.
///
/// Counts stream starts and stops so tests can assert that every lease was
/// released.
pub struct NullCamera {
    probe: CameraProbe,
    liveness: Mutex<VecDeque<LivenessSignal>>,
    fallback: LivenessSignal,
    delay: Option<Duration>,
    fail_start: bool,
    streaming: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
    captures: AtomicUsize,
}

impl NullCamera {
    /// A working camera that sees a blink on every frame.
    pub fn new() -> Self {
        Self {
            probe: CameraProbe::Available,
            liveness: Mutex::new(VecDeque::new()),
            fallback: LivenessSignal::BLINK,
            delay: None,
            fail_start: false,
            streaming: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            captures: AtomicUsize::new(0),
        }
    }

    pub fn without_camera(mut self) -> Self {
        self.probe = CameraProbe::NoCamera;
        self
    }

    pub fn permission_denied(mut self) -> Self {
        self.probe = CameraProbe::PermissionDenied;
        self
    }

    /// Frames that never show a live subject once the script runs out.
    pub fn never_live(mut self) -> Self {
        self.fallback = LivenessSignal::NONE;
        self
    }

    /// Signals returned for the next observed frames, in order, before the
    /// fallback applies.
    pub fn with_liveness(self, signals: Vec<LivenessSignal>) -> Self {
        self.liveness.lock().unwrap().extend(signals);
        self
    }

    /// Sleep this long in document alignment and in every frame capture.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for NullCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraDevice for NullCamera {
    async fn probe(&self) -> CameraProbe {
        self.probe
    }

    fn start_stream(&self) -> Result<(), CaptureError> {
        if self.fail_start {
            return Err(CaptureError::Camera("null camera refused to start".into()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_stream(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.streaming.store(false, Ordering::SeqCst);
    }

    async fn align_document(&self) -> Result<Option<f64>, CaptureError> {
        self.pause().await;
        Ok(Some(0.9))
    }

    async fn observe_liveness(&self, _frame: u32) -> Result<LivenessSignal, CaptureError> {
        let scripted = self.liveness.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or(self.fallback))
    }

    async fn capture_frame(&self, kind: ArtifactKind) -> Result<Vec<u8>, CaptureError> {
        self.pause().await;
        self.captures.fetch_add(1, Ordering::SeqCst);
        let mut frame = vec![0xFF, 0xD8, 0xFF, 0xE0];
        frame.extend_from_slice(kind.to_string().as_bytes());
        Ok(frame)
    }
}
