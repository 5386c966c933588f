//! Scan session: drives the camera → capture → confirm cycle.
//!
//! One sampling loop per started session feeds the stability detector. Auto
//! and manual captures share `capture_lock`, so at most one capture is in
//! flight. Each `start` mints a fresh cancellation token; a capture whose token
//! was cancelled by `stop` finishes but never commits its result.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{CaptureError, EngineError, SessionError, ValidationError};
use crate::models::config::ScannerConfig;
use crate::models::product::{Catalog, Product};
use crate::models::scan::{ConfirmedScan, PendingScanRecord, ScanSource, ScanStatus, SessionEvent, SessionMode};
use crate::services::ocr::engine::{EngineFactory, ProgressReporter};
use crate::services::ocr::engine_manager::{EngineManager, EngineStatus};
use crate::services::ocr::matcher::match_product;
use crate::services::ocr::parser::{extract_kg, parse_kg_input};
use crate::services::ocr::preprocessing::PreprocessingService;
use crate::services::stability::{Observation, StabilityDetector};
use crate::services::video_source::VideoSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Auto,
    Manual,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Trigger::Auto => "auto",
            Trigger::Manual => "manual",
        }
    }
}

#[derive(Default)]
struct SessionState {
    pending: Option<PendingScanRecord>,
    last_status: Option<ScanStatus>,
    last_error: Option<String>,
    // Earliest time the sampling loop may start another engine initialization
    engine_retry_at: Option<Instant>,
}

struct SessionInner {
    config: ScannerConfig,
    catalog: Arc<Catalog>,
    source: Arc<dyn VideoSource>,
    engine: Arc<EngineManager>,
    preprocessor: PreprocessingService,
    capture_lock: tokio::sync::Mutex<()>,
    state: Mutex<SessionState>,
    detector: Mutex<StabilityDetector>,
    mode_tx: watch::Sender<SessionMode>,
    progress: ProgressReporter,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

/// Label scanning session bound to one video source and one engine
pub struct ScanSession {
    inner: Arc<SessionInner>,
    // Cancellation token of the running sampling loop
    sampling: Mutex<Option<CancellationToken>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
}

impl ScanSession {
    pub fn new(
        config: ScannerConfig,
        catalog: Catalog,
        source: Arc<dyn VideoSource>,
        factory: Arc<dyn EngineFactory>,
    ) -> Self {
        let (mode_tx, _) = watch::channel(SessionMode::Camera);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let inner = SessionInner {
            engine: Arc::new(EngineManager::new(factory, config.engine.languages.clone())),
            preprocessor: PreprocessingService::new(config.preprocessing.clone()),
            detector: Mutex::new(StabilityDetector::new(config.stability.clone())),
            catalog: Arc::new(catalog),
            source,
            capture_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(SessionState::default()),
            mode_tx,
            progress: ProgressReporter::new(),
            events_tx,
            config,
        };

        Self {
            inner: Arc::new(inner),
            sampling: Mutex::new(None),
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Take the event stream; only the first caller gets it
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events_rx.lock().take()
    }

    pub fn subscribe_mode(&self) -> watch::Receiver<SessionMode> {
        self.inner.mode_tx.subscribe()
    }

    /// Recognition progress, restarted at 0 for every capture
    pub fn subscribe_progress(&self) -> watch::Receiver<f32> {
        self.inner.progress.subscribe()
    }

    pub fn mode(&self) -> SessionMode {
        *self.inner.mode_tx.borrow()
    }

    pub fn pending(&self) -> Option<PendingScanRecord> {
        self.inner.state.lock().pending.clone()
    }

    pub fn status(&self) -> Option<ScanStatus> {
        self.inner.state.lock().last_status
    }

    /// Most recent user-facing error, cleared by `start`
    pub fn last_error(&self) -> Option<String> {
        self.inner.state.lock().last_error.clone()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub fn is_running(&self) -> bool {
        self.sampling.lock().is_some()
    }

    /// Wait for the video source, warm the engine up and start sampling
    pub async fn start(&self) -> Result<(), SessionError> {
        if self.is_running() {
            debug!("session already running, ignoring start");
            return Ok(());
        }

        self.inner.set_status(ScanStatus::Preparing);
        if let Err(e) = self.inner.source.wait_ready().await {
            let e = SessionError::from(e);
            self.inner.report_error(&e);
            return Err(e);
        }

        let mut sampling = self.sampling.lock();
        if sampling.is_some() {
            return Ok(());
        }

        {
            let mut state = self.inner.state.lock();
            state.pending = None;
            state.last_error = None;
            state.engine_retry_at = None;
        }
        self.inner.detector.lock().reset();
        self.inner.set_mode(SessionMode::Camera);

        self.inner.spawn_engine_warm_up();

        let cancel = CancellationToken::new();
        tokio::spawn(run_sampling_loop(Arc::clone(&self.inner), cancel.clone()));
        *sampling = Some(cancel);

        let (width, height) = self.inner.source.dimensions();
        info!(width, height, products = self.inner.catalog.len(), "scan session started");
        Ok(())
    }

    /// Stop sampling and release the engine and the video source.
    ///
    /// A recognition already running is not interrupted; its result is dropped.
    pub async fn stop(&self) {
        let Some(cancel) = self.sampling.lock().take() else {
            return;
        };
        cancel.cancel();

        self.inner.detector.lock().reset();
        self.inner.state.lock().pending = None;
        self.inner.set_mode(SessionMode::Camera);

        self.inner.engine.release().await;
        self.inner.source.release();
        info!("scan session stopped");
    }

    /// Capture now, without waiting for the label to settle
    pub async fn manual_capture(&self) -> Result<(), SessionError> {
        let token = self.current_token().ok_or(SessionError::NotStarted)?;
        if self.mode() != SessionMode::Camera {
            return Err(SessionError::NotInCameraMode);
        }

        let _guard = self
            .inner
            .capture_lock
            .try_lock()
            .map_err(|_| SessionError::CaptureInFlight)?;

        // An auto capture may have committed between the check above and the lock
        if self.mode() != SessionMode::Camera {
            return Err(SessionError::NotInCameraMode);
        }

        info!(trigger = Trigger::Manual.as_str(), "capture requested");
        self.inner.capture(Trigger::Manual, &token).await
    }

    /// Validate the operator's choice, emit the confirmed scan and go back to the camera
    pub fn confirm(&self, product_id: &str, kg_text: &str) -> Result<ConfirmedScan, SessionError> {
        let confirmed = {
            let mut state = self.inner.state.lock();
            let pending = state.pending.as_ref().ok_or(SessionError::NothingToConfirm)?;

            let (product, kg) = match self.inner.validate(product_id, kg_text) {
                Ok(valid) => valid,
                Err(e) => {
                    drop(state);
                    warn!(product_id, kg_text, error = %e, "confirm rejected");
                    let e = SessionError::from(e);
                    self.inner.report_error(&e);
                    return Err(e);
                }
            };

            let confirmed = ConfirmedScan {
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                kg,
                source: ScanSource::Ocr,
                raw_text: pending.raw_text.clone(),
                confirmed_at: Utc::now(),
            };
            state.pending = None;
            confirmed
        };

        info!(product_id = %confirmed.product_id, kg = confirmed.kg, "scan confirmed");
        self.inner.detector.lock().start_cooldown(Instant::now());
        self.inner.set_status(ScanStatus::CoolingDown);
        self.inner.emit(SessionEvent::Confirmed(confirmed.clone()));
        self.inner.set_mode(SessionMode::Camera);

        Ok(confirmed)
    }

    /// Drop the pending record and return to the camera
    pub fn rescan(&self) {
        let discarded = self.inner.state.lock().pending.take();
        if let Some(record) = discarded {
            debug!(raw_text = %record.raw_text, "pending scan discarded");
        }

        self.inner.detector.lock().reset();
        self.inner.set_mode(SessionMode::Camera);
        self.inner.set_status(ScanStatus::HoldSteady);
    }

    fn current_token(&self) -> Option<CancellationToken> {
        self.sampling.lock().clone()
    }
}

impl SessionInner {
    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine
        let _ = self.events_tx.send(event);
    }

    fn set_status(&self, status: ScanStatus) {
        let changed = {
            let mut state = self.state.lock();
            let changed = state.last_status != Some(status);
            state.last_status = Some(status);
            changed
        };

        if changed {
            debug!(%status, "status");
            self.emit(SessionEvent::Status(status));
        }
    }

    fn set_mode(&self, mode: SessionMode) {
        let previous = self.mode_tx.send_replace(mode);
        if previous != mode {
            info!(from = %previous, to = %mode, "session mode changed");
        }
    }

    fn report_error(&self, error: &SessionError) {
        let message = error.to_string();
        self.state.lock().last_error = Some(message.clone());
        self.emit(SessionEvent::Error(message));
    }

    fn spawn_engine_warm_up(self: &Arc<Self>) {
        let retry_delay = self.config.engine.retry_delay();
        self.state.lock().engine_retry_at = Some(Instant::now() + retry_delay);

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            match inner.engine.get_engine().await {
                Ok(_) => {}
                Err(EngineError::Released) => {}
                Err(e) => {
                    inner.state.lock().engine_retry_at = Some(Instant::now() + retry_delay);
                    inner.report_error(&SessionError::from(e));
                }
            }
        });
    }

    /// Start another initialization once the last failed one has aged past the retry delay
    fn retry_engine_warm_up(self: &Arc<Self>, now: Instant) {
        if self.engine.status() != EngineStatus::Uninitialized {
            return;
        }
        let due = self.state.lock().engine_retry_at.map_or(true, |at| now >= at);
        if due {
            info!("retrying ocr engine initialization");
            self.spawn_engine_warm_up();
        }
    }

    fn validate(&self, product_id: &str, kg_text: &str) -> Result<(&Product, f64), ValidationError> {
        let product_id = product_id.trim();
        if product_id.is_empty() {
            return Err(ValidationError::NoProductSelected);
        }

        let kg = parse_kg_input(kg_text, &self.config.weight)?;

        let product = self
            .catalog
            .find(product_id)
            .ok_or_else(|| ValidationError::UnknownProduct(product_id.to_string()))?;

        Ok((product, kg))
    }

    /// Preprocess the current frame, recognize it and match the text
    async fn recognize_frame(&self) -> Result<PendingScanRecord, SessionError> {
        let frame = self.source.current_frame().ok_or(CaptureError::CameraNotReady)?;
        let image = self.preprocessor.preprocess(&frame)?;

        let recognition = self.engine.recognize(&image, &self.progress).await?;

        let matched = match_product(&recognition.text, &self.catalog, self.config.matching.fuzzy_threshold);
        let parsed_kg = extract_kg(&recognition.text);

        Ok(PendingScanRecord {
            matched_product_id: matched.product_id().unwrap_or_default().to_string(),
            match_method: matched.method,
            parsed_kg,
            raw_text: recognition.text,
        })
    }

    /// Run one capture. The caller holds `capture_lock`.
    async fn capture(&self, trigger: Trigger, token: &CancellationToken) -> Result<(), SessionError> {
        self.detector.lock().begin_capture();
        self.set_status(ScanStatus::Scanning);

        let result = self.recognize_frame().await;

        if token.is_cancelled() {
            debug!(trigger = trigger.as_str(), "session stopped during capture, result dropped");
            return Ok(());
        }

        match result {
            Ok(record) => {
                info!(
                    trigger = trigger.as_str(),
                    product_id = %record.matched_product_id,
                    method = ?record.match_method,
                    kg = ?record.parsed_kg,
                    "capture recognized"
                );
                self.detector.lock().reset();
                self.state.lock().pending = Some(record);
                self.set_mode(SessionMode::Confirm);
                Ok(())
            }
            Err(e) => {
                warn!(trigger = trigger.as_str(), error = %e, "capture failed");
                self.detector.lock().start_cooldown(Instant::now());
                self.set_status(ScanStatus::CoolingDown);
                self.report_error(&e);
                Err(e)
            }
        }
    }

    async fn tick(self: &Arc<Self>, now: Instant, token: &CancellationToken) {
        let Ok(_guard) = self.capture_lock.try_lock() else {
            return;
        };

        if !self.detector.lock().ready_to_sample(now) {
            return;
        }
        self.retry_engine_warm_up(now);

        let Some(frame) = self.source.current_frame() else {
            trace!("no frame yet");
            return;
        };
        let sample = match self.preprocessor.sample(&frame, self.config.stability.sample_width) {
            Ok(sample) => sample,
            Err(e) => {
                trace!(error = %e, "sample skipped");
                return;
            }
        };

        let engine_ready = self.engine.is_ready();
        let observation = self.detector.lock().observe(now, sample, engine_ready);

        match observation {
            Observation::Trigger { diff, held } => {
                info!(
                    trigger = Trigger::Auto.as_str(),
                    diff,
                    held_ms = held.as_millis() as u64,
                    "label stable, capturing"
                );
                // Failures are already surfaced as events
                let _ = self.capture(Trigger::Auto, token).await;
            }
            _ if !engine_ready => self.set_status(ScanStatus::Preparing),
            _ => {
                let status = self.detector.lock().status();
                self.set_status(status);
            }
        }
    }
}

async fn run_sampling_loop(inner: Arc<SessionInner>, cancel: CancellationToken) {
    let mut mode_rx = inner.mode_tx.subscribe();
    let mut interval = tokio::time::interval(inner.config.stability.sample_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!("sampling loop started");

    loop {
        let mode = *mode_rx.borrow_and_update();
        if mode != SessionMode::Camera {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = mode_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
        }

        let now = tokio::select! {
            _ = cancel.cancelled() => break,
            now = interval.tick() => now,
        };
        inner.tick(now, &cancel).await;
    }

    debug!("sampling loop stopped");
}
