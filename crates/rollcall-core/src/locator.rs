//! The face-locating capability: frame in, (box, embedding) pairs out.

use crate::detector::{DetectorError, FaceDetector};
use crate::embedder::{EmbedderError, FaceEmbedder};
use crate::types::{DetectedFace, FaceBox};
use std::path::Path;
use thiserror::Error;

/// Boxes smaller than this on either side are dropped before embedding.
const MIN_FACE_PX: u32 = 16;

#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("embedder: {0}")]
    Embedder(#[from] EmbedderError),
}

/// Finds faces in a packed RGB frame and embeds each one.
///
/// Implementations must not carry state from one call to the next.
pub trait FaceLocator: Send {
    fn locate(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<DetectedFace>, LocatorError>;
}

/// Stub used when no models are configured. Never sees a face.
pub struct NullLocator;

impl FaceLocator for NullLocator {
    fn locate(&mut self, _rgb: &[u8], _width: u32, _height: u32) -> Result<Vec<DetectedFace>, LocatorError> {
        Ok(Vec::new())
    }
}

/// SCRFD detection followed by per-face embedding.
pub struct OnnxLocator {
    detector: FaceDetector,
    embedder: FaceEmbedder,
}

impl OnnxLocator {
    pub fn load(detector_path: &Path, embedder_path: &Path) -> Result<Self, LocatorError> {
        Ok(Self {
            detector: FaceDetector::load(detector_path)?,
            embedder: FaceEmbedder::load(embedder_path)?,
        })
    }
}

impl FaceLocator for OnnxLocator {
    fn locate(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<DetectedFace>, LocatorError> {
        let detections = self.detector.detect(rgb, width, height)?;
        let mut faces = Vec::with_capacity(detections.len());

        for det in detections {
            let face_box = FaceBox::from_rect(det.x, det.y, det.width, det.height, width, height);
            if face_box.width() < MIN_FACE_PX || face_box.height() < MIN_FACE_PX {
                tracing::debug!(?face_box, confidence = det.confidence, "dropping tiny face");
                continue;
            }
            let embedding = self.embedder.embed(rgb, width, height, face_box)?;
            faces.push(DetectedFace { face_box, embedding });
        }

        Ok(faces)
    }
}
