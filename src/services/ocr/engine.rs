use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::EngineError;
use crate::models::ocr_result::{EncodedImage, Recognition};

/// OCR Engine trait - one initialized recognizer.
///
/// Implementations may assume at most one `recognize` call at a time.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize text, reporting fractional progress in [0, 1]
    async fn recognize(&self, image: &EncodedImage, progress: &ProgressReporter) -> Result<Recognition, EngineError>;

    /// Tear down engine resources
    async fn dispose(&self);
}

/// Creates engines; initialization is slow and may fail
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn initialize(&self, languages: &[String]) -> Result<Arc<dyn OcrEngine>, EngineError>;
}

/// Forwards engine progress to whoever subscribed to the session.
///
/// Backed by a `watch` channel, so late subscribers see the latest value and
/// each recognition restarts the sequence at 0.
#[derive(Clone)]
pub struct ProgressReporter {
    tx: watch::Sender<f32>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0.0);
        Self { tx }
    }

    pub fn report(&self, fraction: f32) {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        self.tx.send_replace(fraction);
    }

    pub fn restart(&self) {
        self.tx.send_replace(0.0);
    }

    pub fn subscribe(&self) -> watch::Receiver<f32> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> f32 {
        *self.tx.borrow()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
