use crate::detection::preprocessing;
use crate::pipeline::{MaskContext, MaskStep};
use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology;

/// How a freshly thresholded mask merges into the running mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combine {
    Replace,
    Union,
    Intersect,
}

impl Combine {
    fn apply(self, current: GrayImage, fresh: GrayImage) -> GrayImage {
        match self {
            Combine::Replace => fresh,
            Combine::Union => preprocessing::union(&current, &fresh),
            Combine::Intersect => preprocessing::intersect(&current, &fresh),
        }
    }
}

/// Threshold the HSV view to a colour band
pub struct HsvRangeStep {
    pub name: &'static str,
    pub lower: [u8; 3],
    pub upper: [u8; 3],
    pub combine: Combine,
}

impl MaskStep for HsvRangeStep {
    fn process(&self, mask: GrayImage, context: &MaskContext) -> GrayImage {
        let fresh = preprocessing::hsv_in_range(&context.hsv, self.lower, self.upper);
        self.combine.apply(mask, fresh)
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Threshold the grayscale view to an intensity band
pub struct GrayRangeStep {
    pub lower: u8,
    pub upper: u8,
    pub combine: Combine,
}

impl MaskStep for GrayRangeStep {
    fn process(&self, mask: GrayImage, context: &MaskContext) -> GrayImage {
        let fresh = preprocessing::gray_in_range(&context.gray, self.lower, self.upper);
        self.combine.apply(mask, fresh)
    }

    fn name(&self) -> &str {
        "Intensity Range"
    }
}

/// Detect edges using Canny
pub struct EdgeDetectionStep {
    pub low_threshold: f32,
    pub high_threshold: f32,
    pub combine: Combine,
}

impl MaskStep for EdgeDetectionStep {
    fn process(&self, mask: GrayImage, context: &MaskContext) -> GrayImage {
        let edges = preprocessing::detect_edges(&context.gray, self.low_threshold, self.high_threshold);
        self.combine.apply(mask, edges)
    }

    fn name(&self) -> &str {
        "Edge Detection"
    }
}

/// Erode then dilate with a square kernel of side `2 * radius + 1`; removes speckle
pub struct OpenStep {
    pub radius: u8,
}

impl MaskStep for OpenStep {
    fn process(&self, mask: GrayImage, _context: &MaskContext) -> GrayImage {
        morphology::open(&mask, Norm::LInf, self.radius)
    }

    fn name(&self) -> &str {
        "Open"
    }
}

/// Dilate then erode with a square kernel; fills small gaps
pub struct CloseStep {
    pub radius: u8,
}

impl MaskStep for CloseStep {
    fn process(&self, mask: GrayImage, _context: &MaskContext) -> GrayImage {
        morphology::close(&mask, Norm::LInf, self.radius)
    }

    fn name(&self) -> &str {
        "Close"
    }
}

pub struct DilateStep {
    pub radius: u8,
    pub iterations: usize,
}

impl MaskStep for DilateStep {
    fn process(&self, mut mask: GrayImage, _context: &MaskContext) -> GrayImage {
        for _ in 0..self.iterations {
            mask = morphology::dilate(&mask, Norm::LInf, self.radius);
        }
        mask
    }

    fn name(&self) -> &str {
        "Dilate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn open_removes_isolated_pixels() {
        let rgb = RgbImage::new(20, 20);
        let context = MaskContext::new(&rgb);
        let mut mask = GrayImage::new(20, 20);
        mask.put_pixel(3, 3, Luma([255]));
        for y in 8..16 {
            for x in 8..16 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let opened = OpenStep { radius: 1 }.process(mask, &context);
        assert_eq!(opened.get_pixel(3, 3)[0], 0);
        assert_eq!(preprocessing::count_nonzero(&opened), 64);
    }

    #[test]
    fn union_then_intersect() {
        let mut rgb = RgbImage::from_pixel(4, 1, Rgb([90, 90, 90]));
        rgb.put_pixel(0, 0, Rgb([30, 60, 200]));
        rgb.put_pixel(1, 0, Rgb([220, 220, 220]));
        let context = MaskContext::new(&rgb);

        let blue = HsvRangeStep {
            name: "Blue",
            lower: [80, 35, 25],
            upper: [140, 255, 255],
            combine: Combine::Union,
        };
        let reflect = HsvRangeStep {
            name: "Reflective",
            lower: [0, 0, 130],
            upper: [180, 70, 255],
            combine: Combine::Union,
        };
        let mask = blue.process(GrayImage::new(4, 1), &context);
        let mask = reflect.process(mask, &context);
        assert_eq!(preprocessing::count_nonzero(&mask), 2);

        let bright = GrayRangeStep { lower: 200, upper: 255, combine: Combine::Intersect };
        let mask = bright.process(mask, &context);
        assert_eq!(preprocessing::count_nonzero(&mask), 1);
        assert_eq!(mask.get_pixel(1, 0)[0], 255);
    }
}
