//! Build a gallery file from a directory of labeled photos.
//!
//! Layout: one sub-directory per person, named after them, holding any
//! number of images. Every image that yields a face contributes one entry.

use anyhow::{Context, Result};
use rollcall_core::{FaceLocator, Gallery, GalleryEntry};
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TrainReport {
    pub people: usize,
    pub encoded: usize,
    pub skipped: usize,
}

pub fn build_gallery(dataset: &Path, locator: &mut dyn FaceLocator) -> Result<(Gallery, TrainReport)> {
    let mut report = TrainReport::default();
    let mut entries = Vec::new();

    for person_dir in sorted_entries(dataset)?.into_iter().filter(|p| p.is_dir()) {
        let Some(label) = person_dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        report.people += 1;

        for image_path in sorted_entries(&person_dir)?.into_iter().filter(|p| is_image(p)) {
            let img = match image::open(&image_path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    tracing::warn!(path = %image_path.display(), error = %e, "unreadable image skipped");
                    report.skipped += 1;
                    continue;
                }
            };
            let (width, height) = img.dimensions();
            let faces = locator
                .locate(img.as_raw(), width, height)
                .with_context(|| format!("face location failed on {}", image_path.display()))?;

            match faces.into_iter().next() {
                Some(face) => {
                    entries.push(GalleryEntry {
                        label: label.clone(),
                        embedding: face.embedding,
                    });
                    report.encoded += 1;
                }
                None => {
                    tracing::warn!(path = %image_path.display(), "no face found; skipped");
                    report.skipped += 1;
                }
            }
        }
    }

    let gallery = Gallery::from_entries(entries).context("inconsistent embeddings")?;
    Ok((gallery, report))
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = std::fs::read_dir(dir)
        .with_context(|| format!("cannot read {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort();
    Ok(paths)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
