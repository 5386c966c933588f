pub mod engine;
pub mod engine_manager;
pub mod http_ocr;
pub mod matcher;
pub mod normalize;
pub mod parser;
pub mod preprocessing;

// Re-export main types
pub use engine::{EngineFactory, OcrEngine, ProgressReporter};
pub use engine_manager::{EngineManager, EngineStatus};
pub use http_ocr::{HttpEngineFactory, HttpOcrEngine};
pub use matcher::match_product;
pub use parser::{extract_kg, parse_kg_input};
