//! Face embedding model via ONNX Runtime.
//!
//! Crops a detected face from the RGB frame, resizes it to the model's
//! square input and returns an L2-normalized embedding.

use crate::types::{Embedding, FaceBox};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const EMBEDDER_INPUT_SIZE: u32 = 112;
const EMBEDDER_MEAN: f32 = 127.5;
const EMBEDDER_STD: f32 = 127.5;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face box {0:?} is empty or outside the frame")]
    EmptyCrop(FaceBox),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    pub fn load(model_path: &Path) -> Result<Self, EmbedderError> {
        if !model_path.exists() {
            return Err(EmbedderError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded embedding model"
        );

        Ok(Self { session })
    }

    /// Embed the face inside `face_box` of a packed RGB frame.
    pub fn embed(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        face_box: FaceBox,
    ) -> Result<Embedding, EmbedderError> {
        let crop = crop_face(rgb, width, height, face_box).ok_or(EmbedderError::EmptyCrop(face_box))?;
        let input = to_tensor(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.is_empty() {
            return Err(EmbedderError::InferenceFailed("model returned an empty embedding".into()));
        }
        Ok(Embedding::normalized(raw.to_vec()))
    }
}

/// Cut the face out of the frame and resize it to the model input.
fn crop_face(rgb: &[u8], width: u32, height: u32, face_box: FaceBox) -> Option<RgbImage> {
    if face_box.width() == 0 || face_box.height() == 0 || face_box.right >= width || face_box.bottom >= height {
        return None;
    }
    let expected = width as usize * height as usize * 3;
    let frame = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(width, height, rgb.get(..expected)?.to_vec())?;
    let face = imageops::crop_imm(&frame, face_box.left, face_box.top, face_box.width(), face_box.height())
        .to_image();
    Some(imageops::resize(
        &face,
        EMBEDDER_INPUT_SIZE,
        EMBEDDER_INPUT_SIZE,
        FilterType::Triangle,
    ))
}

fn to_tensor(face: &RgbImage) -> Array4<f32> {
    let size = EMBEDDER_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in face.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - EMBEDDER_MEAN) / EMBEDDER_STD;
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_face_output_size() {
        let rgb = vec![10u8; 64 * 48 * 3];
        let face_box = FaceBox { top: 5, right: 40, bottom: 30, left: 10 };
        let crop = crop_face(&rgb, 64, 48, face_box).unwrap();
        assert_eq!(crop.dimensions(), (EMBEDDER_INPUT_SIZE, EMBEDDER_INPUT_SIZE));
    }

    #[test]
    fn test_crop_face_rejects_degenerate_box() {
        let rgb = vec![10u8; 64 * 48 * 3];
        let empty = FaceBox { top: 5, right: 10, bottom: 30, left: 10 };
        assert!(crop_face(&rgb, 64, 48, empty).is_none());
        let outside = FaceBox { top: 5, right: 64, bottom: 30, left: 10 };
        assert!(crop_face(&rgb, 64, 48, outside).is_none());
    }

    #[test]
    fn test_to_tensor_normalization() {
        let face = RgbImage::from_pixel(EMBEDDER_INPUT_SIZE, EMBEDDER_INPUT_SIZE, Rgb([255, 0, 128]));
        let tensor = to_tensor(&face);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
        assert!((tensor[[0, 0, 3, 3]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 3, 3]] + 1.0).abs() < 1e-6);
        let expected = (128.0 - EMBEDDER_MEAN) / EMBEDDER_STD;
        assert!((tensor[[0, 2, 3, 3]] - expected).abs() < 1e-6);
    }
}
