//! Hands-free product label scanning: watch a camera feed, capture the label
//! once it holds still, read it with OCR and match it against a product
//! catalog for operator confirmation.

pub mod error;
pub mod models;
pub mod services;

pub use error::{CaptureError, EngineError, SessionError, ValidationError};
pub use models::config::ScannerConfig;
pub use models::product::{Catalog, MatchMethod, Product};
pub use models::scan::{ConfirmedScan, PendingScanRecord, ScanStatus, SessionEvent, SessionMode};
pub use services::config::ConfigManager;
pub use services::session::ScanSession;
pub use services::video_source::{StillImageSource, VideoSource};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default `label_scanner=debug` filter.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("label_scanner=debug,label_scanner_lib=debug"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    // A subscriber may already be installed (tests, embedding apps)
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
