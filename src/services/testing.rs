//! Test doubles for the engine and video seams.

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CaptureError, EngineError};
use crate::models::ocr_result::{EncodedImage, Recognition};
use crate::models::roi::Roi;
use crate::services::ocr::engine::{EngineFactory, OcrEngine, ProgressReporter};
use crate::services::video_source::VideoSource;

pub fn sample_image() -> EncodedImage {
    EncodedImage {
        bytes: vec![0u8; 16],
        width: 4,
        height: 4,
        source_roi: Roi::new(0, 0, 4, 4),
    }
}

/// Light label with a dark band; `shift` moves the band to simulate motion
pub fn label_frame(shift: u32) -> RgbaImage {
    RgbaImage::from_fn(320, 240, |x, y| {
        let band = (100 + shift)..(140 + shift);
        if band.contains(&y) && x > 40 && x < 280 {
            Rgba([15, 15, 15, 255])
        } else {
            Rgba([235, 232, 228, 255])
        }
    })
}

#[derive(Default)]
struct FakeEngineState {
    text: Mutex<String>,
    init_count: AtomicUsize,
    recognize_count: AtomicUsize,
    dispose_count: AtomicUsize,
    failures_left: AtomicUsize,
    recognize_error: Mutex<Option<String>>,
}

pub struct FakeEngineFactory {
    state: Arc<FakeEngineState>,
    init_delay: Duration,
    recognize_delay: Duration,
}

impl FakeEngineFactory {
    pub fn new(text: &str) -> Self {
        let state = FakeEngineState::default();
        *state.text.lock() = text.to_string();

        Self {
            state: Arc::new(state),
            init_delay: Duration::ZERO,
            recognize_delay: Duration::ZERO,
        }
    }

    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    pub fn with_recognize_delay(mut self, delay: Duration) -> Self {
        self.recognize_delay = delay;
        self
    }

    /// Fail the first `n` initializations
    pub fn failing_first(self, n: usize) -> Self {
        self.state.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_recognize_error(self, message: &str) -> Self {
        *self.state.recognize_error.lock() = Some(message.to_string());
        self
    }

    pub fn set_recognize_error(&self, message: Option<&str>) {
        *self.state.recognize_error.lock() = message.map(str::to_string);
    }

    pub fn init_count(&self) -> usize {
        self.state.init_count.load(Ordering::SeqCst)
    }

    pub fn recognize_count(&self) -> usize {
        self.state.recognize_count.load(Ordering::SeqCst)
    }

    pub fn dispose_count(&self) -> usize {
        self.state.dispose_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineFactory for FakeEngineFactory {
    async fn initialize(&self, _languages: &[String]) -> Result<Arc<dyn OcrEngine>, EngineError> {
        self.state.init_count.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.init_delay).await;

        let failing = self
            .state
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EngineError::InitFailed("fake init failure".to_string()));
        }

        Ok(Arc::new(FakeEngine {
            state: Arc::clone(&self.state),
            recognize_delay: self.recognize_delay,
        }))
    }
}

struct FakeEngine {
    state: Arc<FakeEngineState>,
    recognize_delay: Duration,
}

#[async_trait]
impl OcrEngine for FakeEngine {
    async fn recognize(&self, _image: &EncodedImage, progress: &ProgressReporter) -> Result<Recognition, EngineError> {
        self.state.recognize_count.fetch_add(1, Ordering::SeqCst);
        progress.report(0.5);
        tokio::time::sleep(self.recognize_delay).await;

        if let Some(message) = self.state.recognize_error.lock().clone() {
            return Err(EngineError::RecognitionFailed(message));
        }

        progress.report(1.0);
        Ok(Recognition::new(self.state.text.lock().clone()))
    }

    async fn dispose(&self) {
        self.state.dispose_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Video source whose frame the test swaps at will
pub struct FakeVideoSource {
    frame: Mutex<RgbaImage>,
    ready: AtomicBool,
    released: AtomicUsize,
}

impl FakeVideoSource {
    pub fn new(frame: RgbaImage) -> Self {
        Self {
            frame: Mutex::new(frame),
            ready: AtomicBool::new(true),
            released: AtomicUsize::new(0),
        }
    }

    pub fn not_ready(self) -> Self {
        self.ready.store(false, Ordering::SeqCst);
        self
    }

    pub fn set_frame(&self, frame: RgbaImage) {
        *self.frame.lock() = frame;
    }

    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoSource for FakeVideoSource {
    async fn wait_ready(&self) -> Result<(), CaptureError> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CaptureError::PermissionDenied)
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        self.frame.lock().dimensions()
    }

    fn current_frame(&self) -> Option<RgbaImage> {
        Some(self.frame.lock().clone())
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
