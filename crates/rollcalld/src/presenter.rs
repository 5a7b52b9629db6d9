//! Display surface: where each processed frame and its annotations go.

use crate::glyphs::{glyph, GLYPH_HEIGHT, GLYPH_WIDTH};
use image::{Rgb, RgbImage};
use rollcall_core::FaceBox;
use rollcall_hw::Frame;
use std::path::PathBuf;

const KNOWN_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([220, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BORDER_PX: u32 = 2;
/// Space around caption text inside its band.
const CAPTION_PAD: u32 = 1;

/// A face box and the label it was matched to.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub face_box: FaceBox,
    pub label: String,
    pub known: bool,
}

pub trait Presenter: Send {
    /// Called once per frame read. `annotations` is `None` when the frame
    /// skipped face location (or location failed) and `Some` otherwise,
    /// empty when no face was found.
    fn present(&mut self, frame: &Frame, annotations: Option<&[Annotation]>);
}

/// Headless: frames go nowhere.
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn present(&mut self, _frame: &Frame, _annotations: Option<&[Annotation]>) {}
}

/// Writes the most recently processed frame to an image file, overwriting
/// it. Each face gets a box plus a caption band with its label; a processed
/// frame with no faces still replaces the file so old boxes do not linger.
pub struct SnapshotPresenter {
    path: PathBuf,
}

impl SnapshotPresenter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Presenter for SnapshotPresenter {
    fn present(&mut self, frame: &Frame, annotations: Option<&[Annotation]>) {
        let Some(annotations) = annotations else {
            return;
        };
        let Some(mut img) = frame.to_image() else {
            tracing::warn!(sequence = frame.sequence, "frame buffer does not match its size; snapshot skipped");
            return;
        };
        for annotation in annotations {
            let color = if annotation.known { KNOWN_COLOR } else { UNKNOWN_COLOR };
            draw_box(&mut img, &annotation.face_box, color);
            draw_caption(&mut img, &annotation.face_box, &annotation.label, color);
        }
        if let Err(e) = img.save(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write snapshot");
        }
    }
}

/// Outline `face_box` with a `BORDER_PX` wide rectangle, clipped to the image.
pub fn draw_box(img: &mut RgbImage, face_box: &FaceBox, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let left = face_box.left.min(w - 1);
    let right = face_box.right.min(w - 1);
    let top = face_box.top.min(h - 1);
    let bottom = face_box.bottom.min(h - 1);

    for t in 0..BORDER_PX {
        for x in left..=right {
            if let Some(y) = top.checked_add(t).filter(|&y| y <= bottom) {
                img.put_pixel(x, y, color);
            }
            if let Some(y) = bottom.checked_sub(t).filter(|&y| y >= top) {
                img.put_pixel(x, y, color);
            }
        }
        for y in top..=bottom {
            if let Some(x) = left.checked_add(t).filter(|&x| x <= right) {
                img.put_pixel(x, y, color);
            }
            if let Some(x) = right.checked_sub(t).filter(|&x| x >= left) {
                img.put_pixel(x, y, color);
            }
        }
    }
}

/// Label text on a `color` band, above the box when it fits and just inside
/// its top edge otherwise. Clipped to the image.
pub fn draw_caption(img: &mut RgbImage, face_box: &FaceBox, label: &str, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let band_height = GLYPH_HEIGHT + 2 * CAPTION_PAD;
    let chars = label.chars().count() as u32;
    let band_width = chars.saturating_mul(GLYPH_WIDTH + 1).saturating_add(CAPTION_PAD);

    let left = face_box.left.min(w - 1);
    let top = match face_box.top.checked_sub(band_height) {
        Some(above) => above,
        None => face_box.top.min(h - 1),
    };

    for y in top..top.saturating_add(band_height).min(h) {
        for x in left..left.saturating_add(band_width).min(w) {
            img.put_pixel(x, y, color);
        }
    }

    for (i, ch) in label.chars().enumerate() {
        let origin_x = left
            .saturating_add(CAPTION_PAD)
            .saturating_add((i as u32).saturating_mul(GLYPH_WIDTH + 1));
        if origin_x >= w {
            break;
        }
        for (row, bits) in glyph(ch).iter().enumerate() {
            let y = top + CAPTION_PAD + row as u32;
            for col in 0..GLYPH_WIDTH {
                let x = origin_x + col;
                if bits & (0x10 >> col) != 0 && x < w && y < h {
                    img.put_pixel(x, y, TEXT_COLOR);
                }
            }
        }
    }
}
