//! Stability detector: decides when the label in the ROI has stopped moving.
//!
//! The detector is a plain state machine fed one sample per tick. It owns the
//! previous sample and never sleeps or spawns; the scan session drives it.

use image::RgbImage;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use crate::models::config::StabilityConfig;
use crate::models::scan::ScanStatus;

/// Where the detector is in its sampling cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Scene moving or no stability timer running yet
    Idle,
    /// Consecutive samples below threshold since `since`
    Stabilizing { since: Instant },
    /// Capture in flight, sampling suppressed
    Triggering,
    /// Post-capture grace period
    Cooldown { until: Instant },
}

/// What one sampling tick concluded
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// First sample after a reset, nothing to compare against
    Primed,
    /// Diff at or above threshold, stability timer reset
    Moving { diff: f64 },
    /// Still, but not long enough (or not allowed) to trigger
    Settling { diff: f64, held: Duration },
    /// Still long enough, caller must run the capture
    Trigger { diff: f64, held: Duration },
}

/// Mean per-pixel sum of absolute R, G and B differences.
///
/// Samples with different dimensions are treated as maximal motion.
pub fn frame_diff(a: &RgbImage, b: &RgbImage) -> f64 {
    if a.dimensions() != b.dimensions() {
        return f64::INFINITY;
    }

    let pixel_count = a.width() as u64 * a.height() as u64;
    if pixel_count == 0 {
        return 0.0;
    }

    let total: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw().iter())
        .map(|(&x, &y)| x.abs_diff(y) as u64)
        .sum();

    total as f64 / pixel_count as f64
}

pub struct StabilityDetector {
    config: StabilityConfig,
    state: DetectorState,
    previous: Option<RgbImage>,
    last_sample_at: Option<Instant>,
}

impl StabilityDetector {
    pub fn new(config: StabilityConfig) -> Self {
        Self {
            config,
            state: DetectorState::Idle,
            previous: None,
            last_sample_at: None,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn has_sample(&self) -> bool {
        self.previous.is_some()
    }

    /// Whether a new sample should be taken at `now`.
    ///
    /// False while a capture is in flight, during cooldown, or within the
    /// sampling interval of the previous sample. An elapsed cooldown returns
    /// the detector to `Idle`.
    pub fn ready_to_sample(&mut self, now: Instant) -> bool {
        match self.state {
            DetectorState::Triggering => return false,
            DetectorState::Cooldown { until } if now < until => return false,
            DetectorState::Cooldown { .. } => self.state = DetectorState::Idle,
            _ => {}
        }

        match self.last_sample_at {
            Some(last) => now.saturating_duration_since(last) >= self.config.sample_interval(),
            None => true,
        }
    }

    /// Feed the sample taken at `now`.
    ///
    /// `can_trigger` is false while the engine is not ready or another capture
    /// holds the lock; the timer keeps running but no trigger is issued.
    pub fn observe(&mut self, now: Instant, sample: RgbImage, can_trigger: bool) -> Observation {
        self.last_sample_at = Some(now);

        let diff = self.previous.as_ref().map(|prev| frame_diff(prev, &sample));
        self.previous = Some(sample);

        let Some(diff) = diff else {
            return Observation::Primed;
        };

        if diff >= self.config.diff_threshold {
            trace!(diff, "motion");
            self.state = DetectorState::Idle;
            return Observation::Moving { diff };
        }

        let since = match self.state {
            DetectorState::Stabilizing { since } => since,
            _ => {
                self.state = DetectorState::Stabilizing { since: now };
                now
            }
        };
        let held = now.saturating_duration_since(since);

        if can_trigger && held > self.config.stable_for() {
            self.state = DetectorState::Triggering;
            return Observation::Trigger { diff, held };
        }

        trace!(diff, held_ms = held.as_millis() as u64, "settling");
        Observation::Settling { diff, held }
    }

    /// Claim the detector for a capture started outside the sampling loop
    pub fn begin_capture(&mut self) {
        self.state = DetectorState::Triggering;
    }

    /// Reset the stability timer and hold off sampling for the cooldown window
    pub fn start_cooldown(&mut self, now: Instant) {
        self.state = DetectorState::Cooldown {
            until: now + self.config.cooldown(),
        };
    }

    /// Forget everything, including the stored sample
    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.previous = None;
        self.last_sample_at = None;
    }

    /// Status line for the current state
    pub fn status(&self) -> ScanStatus {
        match self.state {
            DetectorState::Idle | DetectorState::Stabilizing { .. } => ScanStatus::HoldSteady,
            DetectorState::Triggering => ScanStatus::Scanning,
            DetectorState::Cooldown { .. } => ScanStatus::CoolingDown,
        }
    }
}
