//! Frame type and pixel conversion — YUYV/MJPG to RGB, fixed-size resize.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};

/// A captured camera frame, packed RGB8.
#[derive(Clone)]
pub struct Frame {
    /// RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Result<Self, FrameError> {
        let expected = rgb_len(width, height);
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }

    /// Resize to exactly `width` x `height`. No-op when already that size.
    pub fn resized(self, width: u32, height: u32) -> Result<Self, FrameError> {
        if self.width == width && self.height == height {
            return Ok(self);
        }
        let data = resize_rgb(&self.data, self.width, self.height, width, height)?;
        Ok(Self {
            data,
            width,
            height,
            ..self
        })
    }

    /// Borrow the pixels as an owned `RgbImage` for drawing or saving.
    pub fn to_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}

fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// Convert packed YUYV (4:2:2) to RGB8 using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    if yuyv.len() < expected || width % 2 != 0 {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity(rgb_len(width, height));
    for chunk in yuyv[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let y = y as f32;
            rgb.push((y + 1.402 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344_136 * u - 0.714_136 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).round().clamp(0.0, 255.0) as u8);
        }
    }
    Ok(rgb)
}

/// Decode an MJPG buffer into RGB8, returning `(data, width, height)`.
pub fn decode_mjpeg(buf: &[u8]) -> Result<(Vec<u8>, u32, u32), FrameError> {
    let img = image::load_from_memory_with_format(buf, ImageFormat::Jpeg)
        .map_err(|e| FrameError::Decode(e.to_string()))?
        .to_rgb8();
    let (w, h) = img.dimensions();
    Ok((img.into_raw(), w, h))
}

/// Resize a packed RGB8 buffer with bilinear filtering.
pub fn resize_rgb(rgb: &[u8], width: u32, height: u32, to_w: u32, to_h: u32) -> Result<Vec<u8>, FrameError> {
    let expected = rgb_len(width, height);
    let src = rgb
        .get(..expected)
        .and_then(|data| ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(width, height, data))
        .ok_or(FrameError::InvalidLength {
            expected,
            actual: rgb.len(),
        })?;
    Ok(imageops::resize(&src, to_w, to_h, FilterType::Triangle).into_raw())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("MJPG decode failed: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_grey_maps_to_grey() {
        // 2x1 image, neutral chroma: [Y0=100, U=128, Y1=200, V=128]
        let rgb = yuyv_to_rgb(&[100, 128, 200, 128], 2, 1).unwrap();
        assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn test_yuyv_red_chroma() {
        let rgb = yuyv_to_rgb(&[76, 85, 76, 255], 2, 1).unwrap();
        assert!(rgb[0] > 240, "red channel {}", rgb[0]);
        assert!(rgb[1] < 10, "green channel {}", rgb[1]);
        assert!(rgb[2] < 10, "blue channel {}", rgb[2]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_rgb(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn test_resize_rgb_dimensions() {
        let rgb = vec![50u8; 8 * 6 * 3];
        let out = resize_rgb(&rgb, 8, 6, 4, 3).unwrap();
        assert_eq!(out.len(), 4 * 3 * 3);
        assert!(out.iter().all(|&p| p == 50));
    }

    #[test]
    fn test_frame_resized_to_fixed_resolution() {
        let frame = Frame::new(vec![0u8; 1280 * 720 * 3], 1280, 720, 7).unwrap();
        let frame = frame.resized(640, 480).unwrap();
        assert_eq!((frame.width, frame.height), (640, 480));
        assert_eq!(frame.data.len(), 640 * 480 * 3);
        assert_eq!(frame.sequence, 7);
    }

    #[test]
    fn test_frame_new_rejects_wrong_length() {
        assert!(Frame::new(vec![0u8; 10], 2, 2, 0).is_err());
    }

    #[test]
    fn test_decode_mjpeg_rejects_garbage() {
        assert!(matches!(decode_mjpeg(&[0, 1, 2, 3]), Err(FrameError::Decode(_))));
    }
}
