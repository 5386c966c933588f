use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::product::MatchMethod;

/// Which screen the session is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Camera,
    Confirm,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Camera => write!(f, "camera"),
            SessionMode::Confirm => write!(f, "confirm"),
        }
    }
}

/// Result of a successful recognition awaiting operator confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingScanRecord {
    pub raw_text: String,
    /// Empty when no product matched
    pub matched_product_id: String,
    pub match_method: MatchMethod,
    pub parsed_kg: Option<f64>,
}

/// How a confirmed record was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSource {
    Ocr,
}

/// Record emitted to the consumer after a successful confirm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedScan {
    pub product_id: String,
    pub product_name: String,
    pub kg: f64,
    pub source: ScanSource,
    pub raw_text: String,
    pub confirmed_at: DateTime<Utc>,
}

/// Status line shown while the camera is live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanStatus {
    Preparing,
    Scanning,
    HoldSteady,
    CoolingDown,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStatus::Preparing => write!(f, "Preparing"),
            ScanStatus::Scanning => write!(f, "Stable — scanning…"),
            ScanStatus::HoldSteady => write!(f, "Hold the label steady…"),
            ScanStatus::CoolingDown => write!(f, "Cooling down…"),
        }
    }
}

/// Messages pushed from the session to its consumer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Status(ScanStatus),
    Error(String),
    Confirmed(ConfirmedScan),
}
