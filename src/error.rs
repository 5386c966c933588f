use thiserror::Error;

/// Failures while grabbing or preparing a frame for recognition
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera is not ready yet")]
    CameraNotReady,

    #[error("Drawing surface unavailable")]
    SurfaceUnavailable,

    #[error("Failed to encode image: {0}")]
    EncodeFailed(String),

    #[error("No usable video source")]
    NoVideoSource,
}

/// OCR engine lifecycle and recognition failures.
///
/// Cloneable because a single initialization outcome is handed to every
/// caller that was waiting on it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("OCR engine failed to initialize: {0}")]
    InitFailed(String),

    #[error("Text recognition failed: {0}")]
    RecognitionFailed(String),

    #[error("OCR engine was released")]
    Released,
}

/// Confirm-time validation failures. The pending record survives all of them.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Select a product")]
    NoProductSelected,

    #[error("Enter a weight")]
    WeightMissing,

    #[error("Weight is not a number")]
    WeightNotANumber,

    #[error("Weight must be greater than zero")]
    WeightNotPositive,

    #[error("Weight {kg} kg is outside the allowed range {min}-{max} kg")]
    WeightOutOfRange { kg: f64, min: f64, max: f64 },

    #[error("Unknown product: {0}")]
    UnknownProduct(String),
}

/// Everything the scan session can report back to its consumer
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("A capture is already in progress")]
    CaptureInFlight,

    #[error("Camera mode is not active")]
    NotInCameraMode,

    #[error("Nothing to confirm")]
    NothingToConfirm,

    #[error("Scan session has not been started")]
    NotStarted,
}
