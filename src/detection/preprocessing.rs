use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::edges::canny;
use imageproc::map::map_colors;

/// Hue/saturation/value image on the 8-bit OpenCV scale: H in 0..=180,
/// S and V in 0..=255, stored in the three channels of an `Rgb<u8>` buffer.
pub type HsvImage = ImageBuffer<Rgb<u8>, Vec<u8>>;

const FOREGROUND: Luma<u8> = Luma([255]);

/// Decode to the 3-channel layout every detector works on.
pub fn to_rgb(img: &DynamicImage) -> RgbImage {
    img.to_rgb8()
}

/// Convert image to grayscale with BT.601 weights (0.299, 0.587, 0.114).
/// The dark-pixel band of the crack cue is tuned for this weighting, not
/// the Rec.709 one `imageops::grayscale` uses.
pub fn to_grayscale(img: &RgbImage) -> GrayImage {
    map_colors(img, |Rgb([r, g, b])| {
        let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000;
        Luma([luma as u8])
    })
}

pub fn rgb_to_hsv(pixel: &Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = pixel.0.map(|c| c as f32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v > 0.0 { diff / v * 255.0 } else { 0.0 };
    let mut h = if diff == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / diff
    } else if v == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    Rgb([(h / 2.0).round() as u8, s.round() as u8, v as u8])
}

pub fn to_hsv(img: &RgbImage) -> HsvImage {
    let (width, height) = img.dimensions();
    ImageBuffer::from_fn(width, height, |x, y| rgb_to_hsv(img.get_pixel(x, y)))
}

/// Foreground where every channel lies within `[lower, upper]` inclusive.
pub fn hsv_in_range(hsv: &HsvImage, lower: [u8; 3], upper: [u8; 3]) -> GrayImage {
    let (width, height) = hsv.dimensions();
    let mut mask = GrayImage::new(width, height);
    for (x, y, pixel) in hsv.enumerate_pixels() {
        let inside = (0..3).all(|c| pixel[c] >= lower[c] && pixel[c] <= upper[c]);
        if inside {
            mask.put_pixel(x, y, FOREGROUND);
        }
    }
    mask
}

pub fn gray_in_range(gray: &GrayImage, lower: u8, upper: u8) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut mask = GrayImage::new(width, height);
    for (x, y, pixel) in gray.enumerate_pixels() {
        if pixel[0] >= lower && pixel[0] <= upper {
            mask.put_pixel(x, y, FOREGROUND);
        }
    }
    mask
}

/// Detect edges using Canny edge detector
/// Canny edges. `imageproc` smooths with a sigma 1.4 Gaussian first, so
/// thin lines need a few pixels of width to survive.
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

pub fn union(a: &GrayImage, b: &GrayImage) -> GrayImage {
    combine(a, b, |p, q| p > 0 || q > 0)
}

pub fn intersect(a: &GrayImage, b: &GrayImage) -> GrayImage {
    combine(a, b, |p, q| p > 0 && q > 0)
}

fn combine(a: &GrayImage, b: &GrayImage, keep: impl Fn(u8, u8) -> bool) -> GrayImage {
    let (width, height) = a.dimensions();
    let mut out = GrayImage::new(width, height);
    for (x, y, pixel) in a.enumerate_pixels() {
        let other = b.get_pixel_checked(x, y).map(|p| p[0]).unwrap_or(0);
        if keep(pixel[0], other) {
            out.put_pixel(x, y, FOREGROUND);
        }
    }
    out
}

pub fn count_nonzero(mask: &GrayImage) -> u64 {
    mask.pixels().filter(|p| p[0] > 0).count() as u64
}

/// Scale and padding used to fit an image into a square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub size: u32,
}

impl Letterbox {
    /// Map a point in model-input space back onto the source image.
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Resize keeping aspect ratio, centred on a square grey (114) canvas.
pub fn letterbox(img: &RgbImage, size: u32) -> (RgbImage, Letterbox) {
    let (width, height) = img.dimensions();
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let scaled_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let scaled_h = ((height as f32 * scale).round() as u32).clamp(1, size);

    let scaled = imageops::resize(img, scaled_w, scaled_h, FilterType::Triangle);

    let mut canvas = RgbImage::from_pixel(size, size, Rgb([114, 114, 114]));
    let offset_x = (size - scaled_w) / 2;
    let offset_y = (size - scaled_h) / 2;
    imageops::overlay(&mut canvas, &scaled, offset_x.into(), offset_y.into());

    (
        canvas,
        Letterbox {
            scale,
            pad_x: offset_x as f32,
            pad_y: offset_y as f32,
            size,
        },
    )
}
