//! Split a cropped element into text-line strips by horizontal ink projection.
//!
//! Element crops are small and mostly axis-aligned, so a projection profile
//! is enough to feed a line recognizer without a separate detection model.

use image::{GrayImage, RgbImage};

use crate::perception::crop::CropRect;

/// Minimum luma distance from the background for a pixel to count as ink.
const INK_DELTA: i16 = 48;
/// Blank rows tolerated inside one line (dots, accents).
const MAX_GAP_ROWS: u32 = 2;
const MIN_LINE_HEIGHT: u32 = 4;
const LINE_PAD: u32 = 2;

fn background_luma(gray: &GrayImage) -> u8 {
    let (w, h) = gray.dimensions();
    let mut sum = 0u64;
    let mut n = 0u64;
    for x in 0..w {
        sum += gray.get_pixel(x, 0)[0] as u64 + gray.get_pixel(x, h - 1)[0] as u64;
        n += 2;
    }
    for y in 0..h {
        sum += gray.get_pixel(0, y)[0] as u64 + gray.get_pixel(w - 1, y)[0] as u64;
        n += 2;
    }
    (sum / n.max(1)) as u8
}

/// Line rectangles in top-to-bottom order, relative to `region`.
pub fn split_lines(region: &RgbImage) -> Vec<CropRect> {
    let (w, h) = region.dimensions();
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let gray = image::imageops::grayscale(region);
    let bg = background_luma(&gray) as i16;
    let is_ink = |x: u32, y: u32| (gray.get_pixel(x, y)[0] as i16 - bg).abs() > INK_DELTA;

    let min_ink = (w / 100).max(1);
    let ink_rows: Vec<bool> = (0..h)
        .map(|y| (0..w).filter(|&x| is_ink(x, y)).count() as u32 >= min_ink)
        .collect();

    // Group ink rows, bridging short gaps.
    let mut spans: Vec<(u32, u32)> = Vec::new();
    for (y, &ink) in ink_rows.iter().enumerate() {
        if !ink {
            continue;
        }
        let y = y as u32;
        match spans.last_mut() {
            Some((_, end)) if y <= *end + MAX_GAP_ROWS + 1 => *end = y,
            _ => spans.push((y, y)),
        }
    }

    spans
        .into_iter()
        .filter(|(top, bottom)| bottom - top + 1 >= MIN_LINE_HEIGHT)
        .filter_map(|(top, bottom)| {
            let cols: Vec<u32> = (0..w)
                .filter(|&x| (top..=bottom).any(|y| is_ink(x, y)))
                .collect();
            let (&left, &right) = (cols.first()?, cols.last()?);
            let x = left.saturating_sub(LINE_PAD * 2);
            let y = top.saturating_sub(LINE_PAD);
            let x2 = (right + 1 + LINE_PAD * 2).min(w);
            let y2 = (bottom + 1 + LINE_PAD).min(h);
            Some(CropRect {
                x,
                y,
                width: x2 - x,
                height: y2 - y,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn canvas(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([250, 250, 250]))
    }

    fn fill(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32) {
        for yy in y..y + h {
            for xx in x..x + w {
                img.put_pixel(xx, yy, Rgb([20, 20, 20]));
            }
        }
    }

    #[test]
    fn two_text_rows_give_two_lines_in_reading_order() {
        let mut img = canvas(120, 60);
        fill(&mut img, 10, 8, 80, 12);
        fill(&mut img, 30, 36, 50, 10);
        let lines = split_lines(&img);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].y < lines[1].y);
        assert_eq!(lines[0].x, 6);
        assert_eq!(lines[0].y, 6);
        assert_eq!(lines[0].height, 16);
    }

    #[test]
    fn small_gaps_are_bridged() {
        let mut img = canvas(60, 40);
        fill(&mut img, 5, 10, 40, 5);
        fill(&mut img, 5, 17, 40, 5);
        assert_eq!(split_lines(&img).len(), 1);
    }

    #[test]
    fn blank_and_thin_noise_yield_nothing() {
        assert!(split_lines(&canvas(40, 40)).is_empty());
        let mut img = canvas(40, 40);
        fill(&mut img, 0, 20, 40, 1);
        assert!(split_lines(&img).is_empty());
        assert!(split_lines(&RgbImage::new(0, 0)).is_empty());
    }

    #[test]
    fn light_text_on_dark_background_is_found() {
        let mut img = RgbImage::from_pixel(80, 30, Rgb([15, 15, 15]));
        for y in 10..20 {
            for x in 10..60 {
                img.put_pixel(x, y, Rgb([240, 240, 240]));
            }
        }
        assert_eq!(split_lines(&img).len(), 1);
    }
}
