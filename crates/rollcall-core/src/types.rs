use serde::{Deserialize, Serialize};

/// Label reported for a face that matched no gallery entry.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Pixel-space face box in (top, right, bottom, left) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceBox {
    /// Build a box from a floating-point `x, y, width, height` rectangle,
    /// clamped to the frame bounds.
    pub fn from_rect(x: f32, y: f32, width: f32, height: f32, frame_w: u32, frame_h: u32) -> Self {
        let max_x = frame_w.saturating_sub(1) as f32;
        let max_y = frame_h.saturating_sub(1) as f32;
        Self {
            top: y.clamp(0.0, max_y).round() as u32,
            right: (x + width).clamp(0.0, max_x).round() as u32,
            bottom: (y + height).clamp(0.0, max_y).round() as u32,
            left: x.clamp(0.0, max_x).round() as u32,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Face embedding vector. Dimension is fixed by the model that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Scale to unit length. Zero vectors are returned unchanged.
    pub fn normalized(values: Vec<f32>) -> Self {
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            Self::new(values.iter().map(|x| x / norm).collect())
        } else {
            Self::new(values)
        }
    }
}

/// A face found in one frame. Never persisted.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub face_box: FaceBox,
    pub embedding: Embedding,
}

/// Result of matching a candidate embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub label: String,
    /// Distance to the chosen entry; `None` when nothing matched.
    pub distance: Option<f32>,
}

impl MatchResult {
    pub fn unknown() -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            distance: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.distance.is_none()
    }

    /// Confidence in [0, 1] derived from the match distance.
    pub fn confidence(&self) -> Option<f32> {
        self.distance.map(|d| (1.0 - d).clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.1, 0.2, 0.3]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_euclidean_distance_unit() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_unit_length() {
        let e = Embedding::normalized(vec![3.0, 4.0]);
        assert!((e.values[0] - 0.6).abs() < 1e-6);
        assert!((e.values[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_zero_vector() {
        let e = Embedding::normalized(vec![0.0, 0.0]);
        assert_eq!(e.values, vec![0.0, 0.0]);
    }

    #[test]
    fn test_face_box_clamped_to_frame() {
        let b = FaceBox::from_rect(-10.0, 20.0, 100.0, 500.0, 640, 480);
        assert_eq!(b.left, 0);
        assert_eq!(b.top, 20);
        assert_eq!(b.right, 90);
        assert_eq!(b.bottom, 479);
        assert_eq!(b.width(), 90);
    }

    #[test]
    fn test_confidence_from_distance() {
        let m = MatchResult { label: "a".into(), distance: Some(0.3) };
        assert!((m.confidence().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(MatchResult::unknown().confidence(), None);
    }
}
