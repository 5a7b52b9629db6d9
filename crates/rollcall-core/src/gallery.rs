//! Known-face gallery: (label, embedding) pairs loaded once at startup.
//!
//! On disk the gallery is JSON with two parallel arrays, one row per
//! labeled training image:
//!
//! ```json
//! { "names": ["ada", "ada", "grace"], "encodings": [[...], [...], [...]] }
//! ```

use crate::types::Embedding;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery file not found: {0} (run `rollcall train` first)")]
    Missing(String),
    #[error("failed to read gallery {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write gallery {path}: {source}")]
    Unwritable {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed gallery: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("gallery has {names} names but {encodings} encodings")]
    LengthMismatch { names: usize, encodings: usize },
    #[error("entry {index} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("entry {0} has an empty embedding")]
    EmptyEmbedding(usize),
}

/// One known identity sample.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub label: String,
    pub embedding: Embedding,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GalleryFile {
    names: Vec<String>,
    encodings: Vec<Vec<f32>>,
}

/// Immutable, ordered gallery. Load order is preserved for tie-breaking.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
    dim: Option<usize>,
}

impl Gallery {
    /// Build a gallery from entries, checking that every embedding has the same dimension.
    pub fn from_entries(entries: Vec<GalleryEntry>) -> Result<Self, GalleryError> {
        let mut dim = None;
        for (index, entry) in entries.iter().enumerate() {
            let actual = entry.embedding.dim();
            if actual == 0 {
                return Err(GalleryError::EmptyEmbedding(index));
            }
            match dim {
                None => dim = Some(actual),
                Some(expected) if expected != actual => {
                    return Err(GalleryError::DimensionMismatch {
                        index,
                        expected,
                        actual,
                    })
                }
                Some(_) => {}
            }
        }
        Ok(Self { entries, dim })
    }

    /// Load the gallery file. Any failure here is fatal for a recognition run.
    pub fn load(path: &Path) -> Result<Self, GalleryError> {
        if !path.exists() {
            return Err(GalleryError::Missing(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path).map_err(|source| GalleryError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        let gallery = Self::from_json(&raw)?;

        tracing::info!(
            path = %path.display(),
            entries = gallery.len(),
            identities = gallery.labels().len(),
            dim = ?gallery.dim(),
            "loaded gallery"
        );
        Ok(gallery)
    }

    pub fn from_json(raw: &str) -> Result<Self, GalleryError> {
        let file: GalleryFile = serde_json::from_str(raw)?;
        if file.names.len() != file.encodings.len() {
            return Err(GalleryError::LengthMismatch {
                names: file.names.len(),
                encodings: file.encodings.len(),
            });
        }
        let entries = file
            .names
            .into_iter()
            .zip(file.encodings)
            .map(|(label, values)| GalleryEntry {
                label,
                embedding: Embedding::new(values),
            })
            .collect();
        Self::from_entries(entries)
    }

    pub fn to_json(&self) -> Result<String, GalleryError> {
        let file = GalleryFile {
            names: self.entries.iter().map(|e| e.label.clone()).collect(),
            encodings: self.entries.iter().map(|e| e.embedding.values.clone()).collect(),
        };
        Ok(serde_json::to_string(&file)?)
    }

    /// Write the gallery to `path` as JSON.
    pub fn save(&self, path: &Path) -> Result<(), GalleryError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| GalleryError::Unwritable {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding dimension, or `None` for an empty gallery.
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    /// Distinct labels in load order.
    pub fn labels(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.label.as_str()) {
                seen.push(entry.label.as_str());
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_preserves_order_and_duplicates() {
        let raw = r#"{"names":["ada","grace","ada"],"encodings":[[0.0,1.0],[1.0,0.0],[0.1,0.9]]}"#;
        let g = Gallery::from_json(raw).unwrap();
        assert_eq!(g.len(), 3);
        assert_eq!(g.dim(), Some(2));
        assert_eq!(g.entries()[2].label, "ada");
        assert_eq!(g.labels(), vec!["ada", "grace"]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let raw = r#"{"names":["ada","grace"],"encodings":[[0.0,1.0]]}"#;
        assert!(matches!(
            Gallery::from_json(raw),
            Err(GalleryError::LengthMismatch { names: 2, encodings: 1 })
        ));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let raw = r#"{"names":["ada","grace"],"encodings":[[0.0,1.0],[1.0]]}"#;
        assert!(matches!(
            Gallery::from_json(raw),
            Err(GalleryError::DimensionMismatch { index: 1, expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_empty_gallery_is_valid() {
        let g = Gallery::from_json(r#"{"names":[],"encodings":[]}"#).unwrap();
        assert!(g.is_empty());
        assert_eq!(g.dim(), None);
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = Gallery::load(Path::new("/nonexistent/rollcall/gallery.json")).unwrap_err();
        assert!(matches!(err, GalleryError::Missing(_)));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            Gallery::from_json("not json"),
            Err(GalleryError::Malformed(_))
        ));
    }

    #[test]
    fn test_json_roundtrip_keeps_labels() {
        let raw = r#"{"names":["ada"],"encodings":[[0.5,0.5]]}"#;
        let g = Gallery::from_json(raw).unwrap();
        let again = Gallery::from_json(&g.to_json().unwrap()).unwrap();
        assert_eq!(again.entries()[0].label, "ada");
        assert_eq!(again.entries()[0].embedding.values, vec![0.5, 0.5]);
    }
}
