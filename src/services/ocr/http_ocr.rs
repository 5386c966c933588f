use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::engine::{EngineFactory, OcrEngine, ProgressReporter};
use crate::error::EngineError;
use crate::models::config::EngineConfig;
use crate::models::ocr_result::{EncodedImage, Recognition};

// Boxes overlapping more than this are duplicates of the same word
const IOU_THRESHOLD: f64 = 0.3;

/// Builds [`HttpOcrEngine`]s once the OCR server answers its health check
pub struct HttpEngineFactory {
    client: reqwest::Client,
    base_url: String,
    ready_attempts: u32,
    ready_delay: Duration,
}

/// HTTP OCR client that talks to a local recognition server
pub struct HttpOcrEngine {
    client: reqwest::Client,
    base_url: String,
    languages: Vec<String>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    image_base64: String,
    languages: &'a [String],
}

/// Single text box with bounding box coordinates
#[derive(Deserialize, Clone, Debug)]
struct TextBox {
    #[serde(rename = "box")]
    bbox: Vec<[f64; 2]>, // 4 corner points [[x1,y1], [x2,y2], [x3,y3], [x4,y4]]
    text: String,
}

#[derive(Deserialize)]
struct OcrResponse {
    boxes: Vec<TextBox>,
}

impl TextBox {
    /// Get bounding box as (x_min, y_min, x_max, y_max)
    fn rect(&self) -> (f64, f64, f64, f64) {
        self.bbox.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(x0, y0, x1, y1), [x, y]| (x0.min(*x), y0.min(*y), x1.max(*x), y1.max(*y)),
        )
    }

    fn area(&self) -> f64 {
        let (x_min, y_min, x_max, y_max) = self.rect();
        ((x_max - x_min) * (y_max - y_min)).max(0.0)
    }

    fn center_y(&self) -> f64 {
        let (_, y_min, _, y_max) = self.rect();
        (y_min + y_max) / 2.0
    }

    fn left_x(&self) -> f64 {
        self.rect().0
    }

    /// Intersection over union with another box
    fn iou(&self, other: &TextBox) -> f64 {
        let (ax0, ay0, ax1, ay1) = self.rect();
        let (bx0, by0, bx1, by1) = other.rect();

        let ix0 = ax0.max(bx0);
        let iy0 = ay0.max(by0);
        let ix1 = ax1.min(bx1);
        let iy1 = ay1.min(by1);

        if ix1 <= ix0 || iy1 <= iy0 {
            return 0.0;
        }

        let inter = (ix1 - ix0) * (iy1 - iy0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }

        inter / union
    }
}

/// Keep the larger box of every overlapping pair
fn filter_overlapping_boxes(mut boxes: Vec<TextBox>, iou_threshold: f64) -> Vec<TextBox> {
    boxes.sort_by(|a, b| b.area().partial_cmp(&a.area()).unwrap_or(Ordering::Equal));

    let mut kept: Vec<TextBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// Reading order: lines top to bottom, words left to right.
///
/// A box joins the current line when its vertical center falls inside the
/// vertical span of the line's first box.
fn assemble_text(boxes: Vec<TextBox>) -> String {
    let mut boxes: Vec<TextBox> = filter_overlapping_boxes(boxes, IOU_THRESHOLD)
        .into_iter()
        .filter(|b| !b.text.trim().is_empty() && !b.bbox.is_empty())
        .collect();
    boxes.sort_by(|a, b| a.center_y().partial_cmp(&b.center_y()).unwrap_or(Ordering::Equal));

    let mut lines: Vec<Vec<TextBox>> = Vec::new();
    for text_box in boxes {
        let joins_line = lines.last().and_then(|line| line.first()).is_some_and(|first| {
            let (_, top, _, bottom) = first.rect();
            (top..=bottom).contains(&text_box.center_y())
        });

        match lines.last_mut() {
            Some(line) if joins_line => line.push(text_box),
            _ => lines.push(vec![text_box]),
        }
    }

    lines
        .into_iter()
        .map(|mut line| {
            line.sort_by(|a, b| a.left_x().partial_cmp(&b.left_x()).unwrap_or(Ordering::Equal));
            line.iter().map(|b| b.text.trim()).collect::<Vec<_>>().join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl HttpEngineFactory {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| EngineError::InitFailed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ready_attempts: config.ready_attempts.max(1),
            ready_delay: Duration::from_millis(config.ready_delay_ms),
        })
    }

    async fn health_check(&self) -> Result<(), String> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await.map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl EngineFactory for HttpEngineFactory {
    async fn initialize(&self, languages: &[String]) -> Result<Arc<dyn OcrEngine>, EngineError> {
        let mut last_error = String::new();

        for attempt in 1..=self.ready_attempts {
            match self.health_check().await {
                Ok(()) => {
                    info!(base_url = %self.base_url, attempt, "ocr server healthy");
                    return Ok(Arc::new(HttpOcrEngine {
                        client: self.client.clone(),
                        base_url: self.base_url.clone(),
                        languages: languages.to_vec(),
                    }));
                }
                Err(e) => {
                    debug!(attempt, error = %e, "ocr server not ready yet");
                    last_error = e;
                }
            }

            if attempt < self.ready_attempts {
                tokio::time::sleep(self.ready_delay).await;
            }
        }

        Err(EngineError::InitFailed(format!(
            "OCR server at {} not ready after {} attempts: {}",
            self.base_url, self.ready_attempts, last_error
        )))
    }
}

#[async_trait]
impl OcrEngine for HttpOcrEngine {
    async fn recognize(&self, image: &EncodedImage, progress: &ProgressReporter) -> Result<Recognition, EngineError> {
        let request = ImageRequest {
            image_base64: general_purpose::STANDARD.encode(&image.bytes),
            languages: &self.languages,
        };
        progress.report(0.1);

        let url = format!("{}/ocr", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::RecognitionFailed(format!("Request failed: {}", e)))?;
        progress.report(0.6);

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EngineError::RecognitionFailed(format!("OCR server error: {}", error_text)));
        }

        let data: OcrResponse = response
            .json()
            .await
            .map_err(|e| EngineError::RecognitionFailed(format!("Failed to parse response: {}", e)))?;

        let text = assemble_text(data.boxes);
        progress.report(1.0);

        Ok(Recognition::new(text))
    }

    async fn dispose(&self) {
        debug!(base_url = %self.base_url, "http ocr engine disposed");
    }
}
