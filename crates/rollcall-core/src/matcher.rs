//! Gallery matching by Euclidean distance under a tolerance.

use crate::gallery::GalleryEntry;
use crate::types::{Embedding, MatchResult};
use std::str::FromStr;
use thiserror::Error;

/// Default match tolerance in embedding space.
pub const DEFAULT_TOLERANCE: f32 = 0.5;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("candidate has dimension {candidate}, gallery has {gallery}")]
    DimensionMismatch { candidate: usize, gallery: usize },
    #[error("embedding has a non-finite value at index {0}")]
    NonFiniteEmbedding(usize),
    #[error("unknown match policy: {0} (expected `nearest` or `first`)")]
    UnknownPolicy(String),
}

/// Strategy for comparing a candidate embedding against the gallery.
pub trait Matcher: Send {
    fn compare(&self, candidate: &Embedding, gallery: &[GalleryEntry], tolerance: f32) -> MatchResult;
}

/// Picks the closest entry within tolerance. Equal distances keep the
/// earlier entry.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn compare(&self, candidate: &Embedding, gallery: &[GalleryEntry], tolerance: f32) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let distance = candidate.euclidean_distance(&entry.embedding);
            if distance.is_nan() || distance > tolerance {
                continue;
            }
            let closer = match best {
                None => true,
                Some((_, best_distance)) => distance < best_distance,
            };
            if closer {
                best = Some((i, distance));
            }
        }

        match best {
            Some((idx, distance)) => MatchResult {
                label: gallery[idx].label.clone(),
                distance: Some(distance),
            },
            None => MatchResult::unknown(),
        }
    }
}

/// Legacy policy: the first entry in load order whose distance is within
/// tolerance, regardless of whether a later entry is closer.
///
/// Kept for parity with galleries tuned against the old behaviour. It
/// diverges from [`NearestMatcher`] whenever two entries are in range;
/// prefer `NearestMatcher`.
pub struct FirstMatchMatcher;

impl Matcher for FirstMatchMatcher {
    fn compare(&self, candidate: &Embedding, gallery: &[GalleryEntry], tolerance: f32) -> MatchResult {
        gallery
            .iter()
            .map(|entry| (entry, candidate.euclidean_distance(&entry.embedding)))
            .find(|(_, distance)| *distance <= tolerance)
            .map(|(entry, distance)| MatchResult {
                label: entry.label.clone(),
                distance: Some(distance),
            })
            .unwrap_or_else(MatchResult::unknown)
    }
}

/// Selectable matching policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    #[default]
    Nearest,
    FirstMatch,
}

impl MatchPolicy {
    pub fn matcher(self) -> Box<dyn Matcher> {
        match self {
            MatchPolicy::Nearest => Box::new(NearestMatcher),
            MatchPolicy::FirstMatch => Box::new(FirstMatchMatcher),
        }
    }
}

impl FromStr for MatchPolicy {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(MatchPolicy::Nearest),
            "first" | "first-match" | "first_match" => Ok(MatchPolicy::FirstMatch),
            other => Err(MatchError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Reject embeddings whose dimension disagrees with the gallery's.
pub fn check_dimension(candidate: &Embedding, gallery_dim: Option<usize>) -> Result<(), MatchError> {
    match gallery_dim {
        Some(dim) if dim != candidate.dim() => Err(MatchError::DimensionMismatch {
            candidate: candidate.dim(),
            gallery: dim,
        }),
        _ => Ok(()),
    }
}

/// Dimension check plus a scan for NaN or infinite components.
pub fn validate_embedding(candidate: &Embedding, gallery_dim: Option<usize>) -> Result<(), MatchError> {
    check_dimension(candidate, gallery_dim)?;
    match candidate.values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(MatchError::NonFiniteEmbedding(index)),
        None => Ok(()),
    }
}
