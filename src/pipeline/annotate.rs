//! Frame overlays: detection boxes, class labels, identity labels and FPS.

use std::collections::BTreeMap;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use nalgebra::Point2;

use super::glyphs::{self, GLYPH_HEIGHT};
use crate::tracker::{Detection, TrackId};

const PALETTE: [Rgb<u8>; 8] = [
    Rgb([255, 56, 56]),
    Rgb([255, 157, 151]),
    Rgb([255, 112, 31]),
    Rgb([255, 178, 29]),
    Rgb([72, 249, 10]),
    Rgb([26, 147, 52]),
    Rgb([0, 194, 255]),
    Rgb([132, 56, 255]),
];

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const FPS_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Stable colour per class label.
pub fn class_color(label: &str) -> Rgb<u8> {
    let hash = label
        .bytes()
        .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
    PALETTE[hash as usize % PALETTE.len()]
}

#[derive(Debug, Clone)]
pub struct Annotator {
    /// Box outline thickness in pixels
    pub thickness: u32,
    /// Integer scale of the bitmap font
    pub text_scale: u32,
    pub show_confidence: bool,
    pub show_fps: bool,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            thickness: 2,
            text_scale: 2,
            show_confidence: true,
            show_fps: true,
        }
    }
}

impl Annotator {
    /// Outline every detection and put its label on a filled tab above the box.
    pub fn draw_detections(&self, image: &mut RgbImage, detections: &[Detection]) {
        let (width, height) = image.dimensions();
        for det in detections {
            let Some((x, y, w, h)) = det.bbox.clip_to(width, height) else {
                continue;
            };
            let color = class_color(&det.label);
            for offset in 0..self.thickness.min(w / 2).min(h / 2) {
                let rect = imageproc::rect::Rect::at(x + offset as i32, y + offset as i32)
                    .of_size(w - 2 * offset, h - 2 * offset);
                draw_hollow_rect_mut(image, rect, color);
            }

            let text = if self.show_confidence {
                format!("{} {:.2}", det.label, det.confidence)
            } else {
                det.label.clone()
            };
            let (text_w, text_h) = glyphs::text_size(&text, self.text_scale);
            if text_w == 0 {
                continue;
            }
            let pad = self.text_scale as i32;
            let tab_h = text_h + 2 * self.text_scale;
            let tab_y = if y >= tab_h as i32 { y - tab_h as i32 } else { y };
            draw_filled_rect_mut(
                image,
                imageproc::rect::Rect::at(x, tab_y).of_size(text_w + 2 * self.text_scale, tab_h),
                color,
            );
            glyphs::draw_text(image, &text, x + pad, tab_y + pad, self.text_scale, WHITE);
        }
    }

    /// Write `ID:<n>` just above each tracked centre.
    pub fn draw_identities(&self, image: &mut RgbImage, tracks: &BTreeMap<TrackId, Point2<f32>>) {
        let glyph_h = (GLYPH_HEIGHT * self.text_scale) as i32;
        let (width, height) = image.dimensions();
        for (id, center) in tracks {
            let text = format!("ID:{id}");
            // Centres come from detector output; keep them on the image.
            let x = center.x.clamp(0.0, width as f32).round() as i32;
            let y = center.y.clamp(0.0, height as f32).round() as i32 - 5 - glyph_h;
            // One-pixel shadow keeps white text readable on bright frames.
            glyphs::draw_text(image, &text, x + 1, y + 1, self.text_scale, BLACK);
            glyphs::draw_text(image, &text, x, y, self.text_scale, WHITE);
        }
    }

    pub fn draw_fps(&self, image: &mut RgbImage, fps: f64) {
        if self.show_fps {
            glyphs::draw_text(image, &format!("FPS: {fps:.2}"), 20, 20, self.text_scale, FPS_COLOR);
        }
    }
}
