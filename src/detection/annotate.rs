use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::error::{LeakError, Result};
use crate::models::BoundingBox;

pub const JPEG_QUALITY: u8 = 90;

const BOX_COLOR: Rgb<u8> = Rgb([239, 68, 68]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: u32 = 4;
/// Glyphs are 8x8, drawn at this integer scale.
const GLYPH_SCALE: u32 = 2;
const CAPTION_OFFSET: i64 = 18;
const CAPTION_MIN_Y: i64 = 2;

pub fn caption(detection: &BoundingBox) -> String {
    format!("{} {:.2}", detection.label, detection.confidence)
}

/// Draw every detection onto a copy of `image` and encode it as JPEG.
/// With no detections the result is an unmarked copy.
pub fn annotate(image: &RgbImage, detections: &[BoundingBox]) -> Result<Vec<u8>> {
    let mut annotated = image.clone();

    for det in detections {
        draw_box(&mut annotated, det);
        let x = det.x1 as i64 + 4;
        let y = (det.y1 as i64 - CAPTION_OFFSET).max(CAPTION_MIN_Y);
        draw_caption(&mut annotated, x, y, &caption(det));
    }

    encode_jpeg(&annotated)
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
        encoder.encode_image(image).map_err(LeakError::Encode)?;
    }
    Ok(buffer)
}

fn draw_box(canvas: &mut RgbImage, det: &BoundingBox) {
    let x1 = det.x1.round() as i32;
    let y1 = det.y1.round() as i32;
    let x2 = det.x2.round() as i32;
    let y2 = det.y2.round() as i32;

    // Stroke grows inwards from the box edge.
    for inset in 0..BOX_THICKNESS as i32 {
        let w = x2 - x1 - 2 * inset;
        let h = y2 - y1 - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, rect, BOX_COLOR);
    }
}

fn draw_caption(canvas: &mut RgbImage, x: i64, y: i64, text: &str) {
    let glyph = 8 * GLYPH_SCALE;
    let text_w = glyph * text.chars().count() as u32;
    if text_w > 0 {
        let background = Rect::at(x as i32 - 2, y as i32 - 2).of_size(text_w + 4, glyph + 4);
        draw_filled_rect_mut(canvas, background, BOX_COLOR);
    }

    for (i, ch) in text.chars().enumerate() {
        let Some(rows) = BASIC_FONTS.get(ch) else {
            continue;
        };
        let origin_x = x + (i as u32 * glyph) as i64;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..8 {
                if bits & (1 << col) == 0 {
                    continue;
                }
                for dy in 0..GLYPH_SCALE {
                    for dx in 0..GLYPH_SCALE {
                        let px = origin_x + (col * GLYPH_SCALE + dx) as i64;
                        let py = y + (row as u32 * GLYPH_SCALE + dy) as i64;
                        put_clipped(canvas, px, py);
                    }
                }
            }
        }
    }
}

fn put_clipped(canvas: &mut RgbImage, x: i64, y: i64) {
    if x >= 0 && y >= 0 && (x as u64) < canvas.width() as u64 && (y as u64) < canvas.height() as u64 {
        canvas.put_pixel(x as u32, y as u32, TEXT_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeakCategory;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox { x1, y1, x2, y2, confidence: 0.8765, label: LeakCategory::BurstPipe }
    }

    #[test]
    fn caption_has_two_decimals() {
        assert_eq!(caption(&det(0.0, 0.0, 1.0, 1.0)), "Burst pipe 0.88");
    }

    #[test]
    fn input_is_not_mutated() -> anyhow::Result<()> {
        let image = RgbImage::from_pixel(64, 48, Rgb([10, 10, 10]));
        let before = image.clone();
        let bytes = annotate(&image, &[det(5.0, 5.0, 40.0, 30.0)])?;
        assert_eq!(image, before);

        let decoded = image::load_from_memory(&bytes)?.to_rgb8();
        assert_eq!(decoded.dimensions(), (64, 48));
        // left edge of the box, below the caption
        let p = decoded.get_pixel(6, 25);
        assert!(p[0] > 150 && p[1] < 120, "{p:?}");
        Ok(())
    }

    #[test]
    fn degenerate_and_edge_boxes_do_not_panic() -> anyhow::Result<()> {
        let image = RgbImage::new(32, 32);
        let bytes = annotate(&image, &[det(0.0, 0.0, 0.0, 0.0), det(-10.0, 25.0, 60.0, 31.0)])?;
        assert!(!bytes.is_empty());
        Ok(())
    }
}
