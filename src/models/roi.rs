use serde::{Deserialize, Serialize};

/// Region of interest inside a video frame, in frame pixels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Centered ROI covering `width_ratio` x `height_ratio` of the frame.
    ///
    /// Ratios are clamped to (0, 1]. Returns `None` for a zero-sized frame.
    pub fn centered(frame_width: u32, frame_height: u32, width_ratio: f64, height_ratio: f64) -> Option<Self> {
        if frame_width == 0 || frame_height == 0 {
            return None;
        }

        let width = Self::scaled_side(frame_width, width_ratio);
        let height = Self::scaled_side(frame_height, height_ratio);

        Some(Self {
            x: (frame_width - width) / 2,
            y: (frame_height - height) / 2,
            width,
            height,
        })
    }

    fn scaled_side(full: u32, ratio: f64) -> u32 {
        let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 1.0 };
        ((full as f64 * ratio).round() as u32).clamp(1, full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_roi_is_centered() {
        let roi = Roi::centered(1000, 500, 0.8, 0.4).unwrap();
        assert_eq!(roi, Roi::new(100, 150, 800, 200));
    }

    #[test]
    fn test_centered_roi_full_frame() {
        let roi = Roi::centered(640, 480, 1.0, 1.0).unwrap();
        assert_eq!(roi, Roi::new(0, 0, 640, 480));
    }

    #[test]
    fn test_centered_roi_zero_frame() {
        assert!(Roi::centered(0, 480, 0.5, 0.5).is_none());
        assert!(Roi::centered(640, 0, 0.5, 0.5).is_none());
    }

    #[test]
    fn test_centered_roi_never_collapses() {
        // Tiny ratio still yields at least one pixel
        let roi = Roi::centered(10, 10, 0.01, 0.01).unwrap();
        assert_eq!((roi.width, roi.height), (1, 1));
    }
}
