//! Region crops for per-element text enrichment.

use image::RgbImage;

use crate::perception::types::BoundingBox;

/// Pixel rectangle of a crop, clamped to the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Clamp `bbox` to a `w`×`h` image, rounding outward. `None` for zero-area results.
pub fn crop_rect(bbox: &BoundingBox, w: u32, h: u32) -> Option<CropRect> {
    let x1 = bbox.x1().floor().clamp(0.0, w as f64) as u32;
    let y1 = bbox.y1().floor().clamp(0.0, h as f64) as u32;
    let x2 = bbox.x2().ceil().clamp(0.0, w as f64) as u32;
    let y2 = bbox.y2().ceil().clamp(0.0, h as f64) as u32;

    let width = x2.saturating_sub(x1);
    let height = y2.saturating_sub(y1);
    if width == 0 || height == 0 {
        return None;
    }
    Some(CropRect {
        x: x1,
        y: y1,
        width,
        height,
    })
}

/// Cut the pixels under `bbox` out of `src`. Degenerate boxes give an empty
/// image rather than an error.
pub fn crop_region(src: &RgbImage, bbox: &BoundingBox) -> RgbImage {
    match crop_rect(bbox, src.width(), src.height()) {
        Some(r) => image::imageops::crop_imm(src, r.x, r.y, r.width, r.height).to_image(),
        None => RgbImage::new(0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_rounds_outward_and_clamps() {
        let r = crop_rect(&BoundingBox::new(10.4, 10.6, 110.2, 700.0), 200, 100).unwrap();
        assert_eq!(
            r,
            CropRect {
                x: 10,
                y: 10,
                width: 101,
                height: 90
            }
        );
    }

    #[test]
    fn zero_area_boxes_produce_empty_crops() {
        let src = RgbImage::new(50, 50);
        assert!(crop_rect(&BoundingBox::new(5.0, 5.0, 5.0, 30.0), 50, 50).is_none());
        let out = crop_region(&src, &BoundingBox::new(60.0, 60.0, 80.0, 80.0));
        assert_eq!(out.dimensions(), (0, 0));
    }

    #[test]
    fn crop_copies_the_region_pixels() {
        let mut src = RgbImage::new(20, 20);
        src.put_pixel(12, 7, image::Rgb([255, 0, 0]));
        let out = crop_region(&src, &BoundingBox::new(10.0, 5.0, 15.0, 10.0));
        assert_eq!(out.dimensions(), (5, 5));
        assert_eq!(out.get_pixel(2, 2), &image::Rgb([255, 0, 0]));
    }
}
