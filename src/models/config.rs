use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stability detector tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StabilityConfig {
    /// Mean per-pixel RGB delta below which two samples count as "still"
    pub diff_threshold: f64,
    /// How long the scene must stay still before a capture fires
    pub stable_for_ms: u64,
    /// Grace period after a capture or confirmation
    pub cooldown_ms: u64,
    /// Minimum spacing between two samples
    pub sample_interval_ms: u64,
    /// Width of the downscaled ROI sample used for diffing
    pub sample_width: u32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            diff_threshold: 12.0,
            stable_for_ms: 500,
            cooldown_ms: 800,
            sample_interval_ms: 120,
            sample_width: 200,
        }
    }
}

impl StabilityConfig {
    pub fn stable_for(&self) -> Duration {
        Duration::from_millis(self.stable_for_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Product matcher tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatchingConfig {
    pub fuzzy_threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.75,
        }
    }
}

/// Image preprocessing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub roi_width_ratio: f64,
    pub roi_height_ratio: f64,
    /// Upload width cap, also the upper bound for upscaling
    pub max_width: u32,
    pub scale_up: f64,
    pub jpeg_quality: u8,
    pub contrast: f64,
    pub binarize_threshold: u8,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            roi_width_ratio: 0.9,
            roi_height_ratio: 0.45,
            max_width: 1280,
            scale_up: 1.5,
            jpeg_quality: 80,
            contrast: 1.35,
            binarize_threshold: 160,
        }
    }
}

/// Accepted weight range at confirm time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WeightLimits {
    pub min_kg: f64,
    pub max_kg: f64,
}

impl Default for WeightLimits {
    fn default() -> Self {
        Self {
            min_kg: 0.05,
            max_kg: 50.0,
        }
    }
}

/// OCR engine connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub languages: Vec<String>,
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub ready_attempts: u32,
    pub ready_delay_ms: u64,
    /// Pause before the sampling loop retries a failed initialization
    pub retry_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            languages: vec!["fin".to_string(), "eng".to_string()],
            base_url: "http://127.0.0.1:39835".to_string(),
            request_timeout_ms: 15_000,
            ready_attempts: 20,
            ready_delay_ms: 500,
            retry_delay_ms: 2_000,
        }
    }
}

impl EngineConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Complete scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ScannerConfig {
    pub stability: StabilityConfig,
    pub matching: MatchingConfig,
    pub preprocessing: PreprocessingConfig,
    pub weight: WeightLimits,
    pub engine: EngineConfig,
}

impl ScannerConfig {
    /// Reject values that would make the pipeline misbehave
    pub fn validate(&self) -> Result<(), String> {
        let p = &self.preprocessing;
        for (name, ratio) in [("roi_width_ratio", p.roi_width_ratio), ("roi_height_ratio", p.roi_height_ratio)] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(format!("{} must be in (0, 1], got {}", name, ratio));
            }
        }
        if p.max_width == 0 {
            return Err("max_width must be greater than zero".to_string());
        }
        if !(p.scale_up > 0.0 && p.scale_up.is_finite()) {
            return Err(format!("scale_up must be positive, got {}", p.scale_up));
        }
        if !(p.contrast > 0.0 && p.contrast.is_finite()) {
            return Err(format!("contrast must be positive, got {}", p.contrast));
        }
        if p.jpeg_quality == 0 || p.jpeg_quality > 100 {
            return Err(format!("jpeg_quality must be in 1-100, got {}", p.jpeg_quality));
        }

        if self.stability.sample_width == 0 {
            return Err("sample_width must be greater than zero".to_string());
        }
        if self.stability.sample_interval_ms == 0 {
            return Err("sample_interval_ms must be greater than zero".to_string());
        }

        if !(0.0..=1.0).contains(&self.matching.fuzzy_threshold) {
            return Err(format!(
                "fuzzy_threshold must be in [0, 1], got {}",
                self.matching.fuzzy_threshold
            ));
        }

        let w = &self.weight;
        if !(w.min_kg > 0.0 && w.min_kg < w.max_kg && w.max_kg.is_finite()) {
            return Err(format!("invalid weight range {}-{} kg", w.min_kg, w.max_kg));
        }

        if self.engine.languages.is_empty() {
            return Err("at least one OCR language is required".to_string());
        }

        Ok(())
    }
}
