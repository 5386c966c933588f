use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma, RgbImage, RgbaImage};
use std::io::Cursor;
use tracing::trace;

use crate::error::CaptureError;
use crate::models::config::PreprocessingConfig;
use crate::models::ocr_result::EncodedImage;
use crate::models::roi::Roi;

/// Image preprocessing service for OCR optimization
pub struct PreprocessingService {
    config: PreprocessingConfig,
}

impl PreprocessingService {
    /// Create a new preprocessing service with custom configuration
    pub fn new(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    /// Full pipeline: crop ROI → cap width → JPEG round trip → upscale → binarize → PNG
    pub fn preprocess(&self, frame: &RgbaImage) -> Result<EncodedImage, CaptureError> {
        let roi = self.roi_for(frame)?;
        let cropped = Self::crop(frame, &roi);

        let limited = self.limit_width(&cropped);
        let jpeg = self.encode_jpeg(&limited)?;
        let decoded = Self::decode_jpeg(&jpeg)?;

        let upscaled = self.upscale(&decoded)?;
        let binary = self.binarize(&upscaled);

        let (width, height) = binary.dimensions();
        let bytes = Self::encode_png(binary)?;

        trace!(width, height, jpeg_bytes = jpeg.len(), png_bytes = bytes.len(), "frame preprocessed");

        Ok(EncodedImage {
            bytes,
            width,
            height,
            source_roi: roi,
        })
    }

    /// Small RGB copy of the ROI, `width` pixels wide, for frame diffing
    pub fn sample(&self, frame: &RgbaImage, width: u32) -> Result<RgbImage, CaptureError> {
        let roi = self.roi_for(frame)?;
        let cropped = Self::crop(frame, &roi);

        let (w, h) = Self::fit_width(cropped.width(), cropped.height(), width.min(cropped.width()));
        let small = imageops::resize(&cropped, w, h, FilterType::Triangle);

        Ok(DynamicImage::ImageRgba8(small).to_rgb8())
    }

    /// Centered ROI for the frame, or `CameraNotReady` while the frame has no pixels
    pub fn roi_for(&self, frame: &RgbaImage) -> Result<Roi, CaptureError> {
        Roi::centered(
            frame.width(),
            frame.height(),
            self.config.roi_width_ratio,
            self.config.roi_height_ratio,
        )
        .ok_or(CaptureError::CameraNotReady)
    }

    fn crop(frame: &RgbaImage, roi: &Roi) -> RgbaImage {
        imageops::crop_imm(frame, roi.x, roi.y, roi.width, roi.height).to_image()
    }

    /// Downscale proportionally when wider than `max_width`
    pub fn limit_width(&self, image: &RgbaImage) -> RgbaImage {
        if image.width() <= self.config.max_width {
            return image.clone();
        }

        let (w, h) = Self::fit_width(image.width(), image.height(), self.config.max_width);
        imageops::resize(image, w, h, FilterType::Triangle)
    }

    /// Lossy re-encode to bound the payload handed to the engine
    pub fn encode_jpeg(&self, image: &RgbaImage) -> Result<Vec<u8>, CaptureError> {
        let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();

        let mut buffer = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, self.config.jpeg_quality);
        encoder
            .encode_image(&rgb)
            .map_err(|e| CaptureError::EncodeFailed(e.to_string()))?;

        Ok(buffer)
    }

    fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage, CaptureError> {
        image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
            .map(|img| img.to_rgb8())
            .map_err(|e| CaptureError::EncodeFailed(format!("decode: {}", e)))
    }

    /// Scale by `min(max_width, width * scale_up) / width`
    pub fn upscale(&self, image: &RgbImage) -> Result<RgbImage, CaptureError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CaptureError::SurfaceUnavailable);
        }

        let target = (self.config.max_width as f64).min(width as f64 * self.config.scale_up);
        let factor = target / width as f64;

        let new_width = (width as f64 * factor).round() as u32;
        let new_height = (height as f64 * factor).round() as u32;
        if new_width == 0 || new_height == 0 {
            return Err(CaptureError::SurfaceUnavailable);
        }
        if (new_width, new_height) == (width, height) {
            return Ok(image.clone());
        }

        Ok(imageops::resize(image, new_width, new_height, FilterType::Lanczos3))
    }

    /// Luma (0.299R + 0.587G + 0.114B), contrast boost, hard threshold to black/white
    pub fn binarize(&self, image: &RgbImage) -> GrayImage {
        let contrast = self.config.contrast;
        let threshold = self.config.binarize_threshold as f64;

        ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
            let [r, g, b] = image.get_pixel(x, y).0;
            let luma = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
            let boosted = (luma * contrast).min(255.0);

            if boosted > threshold {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        })
    }

    fn encode_png(image: GrayImage) -> Result<Vec<u8>, CaptureError> {
        let mut buffer = Vec::new();
        DynamicImage::ImageLuma8(image)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| CaptureError::EncodeFailed(e.to_string()))?;
        Ok(buffer)
    }

    fn fit_width(width: u32, height: u32, target_width: u32) -> (u32, u32) {
        let target_width = target_width.max(1);
        let scaled_height = (height as f64 * target_width as f64 / width.max(1) as f64).round() as u32;
        (target_width, scaled_height.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// Helper: Create a test frame with a dark "text" bar in the middle of a light label
    fn create_label_frame(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |_x, y| {
            if y > height * 2 / 5 && y < height * 3 / 5 {
                Rgba([20, 20, 20, 255])
            } else {
                Rgba([230, 225, 220, 255])
            }
        })
    }

    fn service_with(max_width: u32, scale_up: f64) -> PreprocessingService {
        PreprocessingService::new(PreprocessingConfig {
            roi_width_ratio: 0.5,
            roi_height_ratio: 0.5,
            max_width,
            scale_up,
            ..PreprocessingConfig::default()
        })
    }

    #[test]
    fn test_zero_dimension_frame_is_not_ready() {
        let service = PreprocessingService::new(PreprocessingConfig::default());
        let empty = RgbaImage::new(0, 0);

        assert_eq!(service.preprocess(&empty), Err(CaptureError::CameraNotReady));
        assert_eq!(service.sample(&empty, 200), Err(CaptureError::CameraNotReady));
    }

    #[test]
    fn test_roi_is_centered_crop() {
        let service = service_with(1280, 1.0);
        let roi = service.roi_for(&create_label_frame(400, 200)).unwrap();

        assert_eq!(roi, Roi::new(100, 50, 200, 100));
    }

    #[test]
    fn test_limit_width_downscales_proportionally() {
        let service = service_with(100, 1.0);
        let wide = RgbaImage::new(400, 200);

        let limited = service.limit_width(&wide);
        assert_eq!(limited.dimensions(), (100, 50));
    }

    #[test]
    fn test_limit_width_keeps_narrow_images() {
        let service = service_with(1000, 1.0);
        let narrow = RgbaImage::new(400, 200);

        assert_eq!(service.limit_width(&narrow).dimensions(), (400, 200));
    }

    #[test]
    fn test_upscale_factor() {
        let service = service_with(1280, 1.5);
        let image = RgbImage::new(200, 100);

        let scaled = service.upscale(&image).unwrap();
        assert_eq!(scaled.dimensions(), (300, 150), "Should be scaled by 1.5");
    }

    #[test]
    fn test_upscale_capped_at_max_width() {
        let service = service_with(250, 2.0);
        let image = RgbImage::new(200, 100);

        let scaled = service.upscale(&image).unwrap();
        assert_eq!(scaled.dimensions(), (250, 125), "Should stop at max_width");
    }

    #[test]
    fn test_upscale_rejects_empty_surface() {
        let service = service_with(1280, 1.5);

        assert_eq!(service.upscale(&RgbImage::new(0, 10)), Err(CaptureError::SurfaceUnavailable));
        assert_eq!(service.upscale(&RgbImage::new(10, 0)), Err(CaptureError::SurfaceUnavailable));
    }

    #[test]
    fn test_upscale_rejects_surface_scaled_to_nothing() {
        // 10px * 0.01 rounds to zero
        let service = service_with(1280, 0.01);
        assert_eq!(service.upscale(&RgbImage::new(10, 10)), Err(CaptureError::SurfaceUnavailable));
    }

    #[test]
    fn test_corrupt_jpeg_fails_to_decode() {
        let result = PreprocessingService::decode_jpeg(b"definitely not a jpeg");
        assert!(matches!(result, Err(CaptureError::EncodeFailed(msg)) if msg.starts_with("decode:")));
    }

    #[test]
    fn test_binarize_luma_contrast_threshold() {
        let service = PreprocessingService::new(PreprocessingConfig::default());
        let image = RgbImage::from_fn(3, 1, |x, _| match x {
            // luma 120 * 1.35 = 162 -> white
            0 => image::Rgb([120, 120, 120]),
            // luma 118 * 1.35 = 159.3 -> black
            1 => image::Rgb([118, 118, 118]),
            // pure red: 76.245 * 1.35 = 102.9 -> black
            _ => image::Rgb([255, 0, 0]),
        });

        let binary = service.binarize(&image);
        assert_eq!(binary.get_pixel(0, 0)[0], 255);
        assert_eq!(binary.get_pixel(1, 0)[0], 0);
        assert_eq!(binary.get_pixel(2, 0)[0], 0);
    }

    #[test]
    fn test_full_preprocessing_pipeline() {
        let service = service_with(1280, 1.5);
        let frame = create_label_frame(400, 200);

        let encoded = service.preprocess(&frame).expect("Preprocessing should succeed");

        // ROI 200x100, upscaled 1.5x
        assert_eq!((encoded.width, encoded.height), (300, 150));
        assert_eq!(encoded.source_roi, Roi::new(100, 50, 200, 100));

        // Output is a lossless binary image
        let decoded = image::load_from_memory_with_format(&encoded.bytes, ImageFormat::Png)
            .expect("Output should be PNG")
            .to_luma8();
        assert_eq!(decoded.dimensions(), (300, 150));
        for pixel in decoded.pixels() {
            assert!(pixel[0] == 0 || pixel[0] == 255, "Pixel value should be 0 or 255, got {}", pixel[0]);
        }

        // Light label background ends up white, the dark bar black
        assert_eq!(decoded.get_pixel(5, 5)[0], 255);
        assert_eq!(decoded.get_pixel(150, 75)[0], 0);
    }

    #[test]
    fn test_sample_width() {
        let service = service_with(1280, 1.5);
        let frame = create_label_frame(1600, 800);

        let sample = service.sample(&frame, 200).unwrap();
        assert_eq!(sample.dimensions(), (200, 100));
    }
}
