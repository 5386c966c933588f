//! Owns the one OCR engine a session uses.
//!
//! Initialization is single-flight: concurrent callers await the same spawned
//! initialization. Failures are not cached. `release` bumps a generation so an
//! initialization finishing afterwards is never installed.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::engine::{EngineFactory, OcrEngine, ProgressReporter};
use crate::error::EngineError;
use crate::models::ocr_result::{EncodedImage, Recognition};

type InitFuture = Shared<BoxFuture<'static, Result<Arc<dyn OcrEngine>, EngineError>>>;

/// Engine lifecycle as seen from outside the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Uninitialized,
    Initializing,
    Ready,
    Terminated,
}

struct PendingInit {
    id: u64,
    future: InitFuture,
}

#[derive(Default)]
struct EngineSlot {
    ready: Option<Arc<dyn OcrEngine>>,
    pending: Option<PendingInit>,
    generation: u64,
    next_init_id: u64,
    terminated: bool,
}

pub struct EngineManager {
    factory: Arc<dyn EngineFactory>,
    languages: Vec<String>,
    slot: Mutex<EngineSlot>,
    // The engine contract allows one recognition at a time per handle
    recognize_gate: tokio::sync::Mutex<()>,
}

impl EngineManager {
    pub fn new(factory: Arc<dyn EngineFactory>, languages: Vec<String>) -> Self {
        Self {
            factory,
            languages,
            slot: Mutex::new(EngineSlot::default()),
            recognize_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn status(&self) -> EngineStatus {
        let slot = self.slot.lock();
        if slot.ready.is_some() {
            EngineStatus::Ready
        } else if slot.pending.is_some() {
            EngineStatus::Initializing
        } else if slot.terminated {
            EngineStatus::Terminated
        } else {
            EngineStatus::Uninitialized
        }
    }

    pub fn is_ready(&self) -> bool {
        self.slot.lock().ready.is_some()
    }

    /// Get the ready engine, joining or starting initialization as needed
    pub async fn get_engine(&self) -> Result<Arc<dyn OcrEngine>, EngineError> {
        let (generation, init_id, init) = {
            let mut slot = self.slot.lock();
            if let Some(engine) = &slot.ready {
                return Ok(Arc::clone(engine));
            }

            match &slot.pending {
                Some(pending) => (slot.generation, pending.id, pending.future.clone()),
                None => {
                    let id = slot.next_init_id;
                    slot.next_init_id += 1;
                    slot.terminated = false;

                    let future = self.spawn_init();
                    slot.pending = Some(PendingInit {
                        id,
                        future: future.clone(),
                    });
                    (slot.generation, id, future)
                }
            }
        };

        let result = init.await;

        let mut slot = self.slot.lock();
        if slot.generation != generation {
            debug!("engine initialization finished after release, discarding");
            return Err(EngineError::Released);
        }
        if slot.pending.as_ref().is_some_and(|p| p.id == init_id) {
            slot.pending = None;
        }

        match result {
            Ok(engine) => {
                if slot.ready.is_none() {
                    info!(languages = ?self.languages, "ocr engine ready");
                    slot.ready = Some(Arc::clone(&engine));
                }
                Ok(slot.ready.clone().unwrap_or(engine))
            }
            Err(e) => {
                warn!(error = %e, "ocr engine initialization failed");
                Err(e)
            }
        }
    }

    // Spawned so the initialization keeps running even if every waiter goes away
    fn spawn_init(&self) -> InitFuture {
        let factory = Arc::clone(&self.factory);
        let languages = self.languages.clone();

        info!(languages = ?languages, "ocr engine initializing");
        let handle = tokio::spawn(async move { factory.initialize(&languages).await });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(EngineError::InitFailed(format!("initialization task failed: {}", e))),
            }
        }
        .boxed()
        .shared()
    }

    /// Run one recognition on the shared engine
    pub async fn recognize(&self, image: &EncodedImage, progress: &ProgressReporter) -> Result<Recognition, EngineError> {
        let engine = self.get_engine().await?;
        let _gate = self.recognize_gate.lock().await;

        // Released while queued behind another recognition
        let current = self.slot.lock().ready.as_ref().is_some_and(|ready| Arc::ptr_eq(ready, &engine));
        if !current {
            return Err(EngineError::Released);
        }

        progress.restart();
        let started = Instant::now();
        let result = engine.recognize(image, progress).await;

        match &result {
            Ok(recognition) => debug!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                chars = recognition.text.chars().count(),
                "recognition finished"
            ),
            Err(e) => warn!(error = %e, "recognition failed"),
        }

        result
    }

    /// Dispose the engine and forget any in-flight initialization
    ///
    /// A recognition already running on the engine finishes before it is disposed.
    pub async fn release(&self) {
        let engine = {
            let mut slot = self.slot.lock();
            slot.generation += 1;
            slot.pending = None;
            slot.terminated = true;
            slot.ready.take()
        };

        if let Some(engine) = engine {
            let _gate = self.recognize_gate.lock().await;
            engine.dispose().await;
            info!("ocr engine released");
        }
    }
}
