use async_trait::async_trait;
use image::RgbaImage;
use std::path::Path;
use tracing::debug;

use crate::error::CaptureError;

/// A live frame stream the scanner samples from (camera, file, test double).
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Resolve once frames with real dimensions are available
    async fn wait_ready(&self) -> Result<(), CaptureError>;

    /// Current frame size; (0, 0) before the stream delivers frames
    fn dimensions(&self) -> (u32, u32);

    /// Snapshot of the newest frame
    fn current_frame(&self) -> Option<RgbaImage>;

    /// Stop the stream and free its resources
    fn release(&self) {}
}

/// Serves one decoded image as a perfectly still frame stream
pub struct StillImageSource {
    frame: RgbaImage,
}

impl StillImageSource {
    pub fn new(frame: RgbaImage) -> Self {
        Self { frame }
    }

    /// Decode an image file from disk
    pub fn open(path: &Path) -> Result<Self, String> {
        let frame = image::open(path)
            .map_err(|e| format!("Failed to open image {}: {}", path.display(), e))?
            .to_rgba8();

        debug!(path = %path.display(), width = frame.width(), height = frame.height(), "still image loaded");
        Ok(Self::new(frame))
    }
}

#[async_trait]
impl VideoSource for StillImageSource {
    // A still image never gains pixels, so an empty one is a permanent failure
    async fn wait_ready(&self) -> Result<(), CaptureError> {
        if self.frame.width() == 0 || self.frame.height() == 0 {
            return Err(CaptureError::NoVideoSource);
        }
        Ok(())
    }

    fn dimensions(&self) -> (u32, u32) {
        self.frame.dimensions()
    }

    fn current_frame(&self) -> Option<RgbaImage> {
        Some(self.frame.clone())
    }
}
