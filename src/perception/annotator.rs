//! Draw detected element boxes and index labels on a screenshot.
//!
//! Each record gets a rectangle coloured by its semantic name and its
//! position in the set as a label, so a dumped JSON list can be matched
//! against the picture.

use image::{Rgba, RgbaImage};

use crate::errors::{VisionDomError, VisionDomResult};
use crate::perception::types::ElementRecord;

const PALETTE: [[u8; 4]; 8] = [
    [230, 57, 70, 220],
    [46, 196, 82, 220],
    [58, 98, 235, 220],
    [247, 159, 31, 220],
    [199, 64, 199, 220],
    [24, 190, 222, 220],
    [150, 150, 60, 220],
    [240, 110, 150, 220],
];

/// Stable colour per semantic name.
fn name_colour(name: &str) -> Rgba<u8> {
    let h = name
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    Rgba(PALETTE[h as usize % PALETTE.len()])
}

/// Annotate `src_bytes` (JPEG/PNG) with one box per record.
/// Returns PNG-encoded bytes.
pub fn annotate_image<'a, I>(src_bytes: &[u8], records: I) -> VisionDomResult<Vec<u8>>
where
    I: IntoIterator<Item = &'a ElementRecord>,
{
    let img = image::load_from_memory(src_bytes)
        .map_err(|e| VisionDomError::Inference(format!("cannot decode image to annotate: {e}")))?;
    let mut painter = Painter::new(img.to_rgba8());

    for (idx, record) in records.into_iter().enumerate() {
        let b = record.bounding_box();
        let rect = Rect {
            left: b.x1().round() as i64,
            top: b.y1().round() as i64,
            right: b.x2().round() as i64,
            bottom: b.y2().round() as i64,
        };
        let colour = name_colour(record.semantic_name());
        painter.outline(rect, colour);
        painter.label(rect.left, rect.top, &idx.to_string(), colour);
    }

    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(painter.canvas)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| VisionDomError::Inference(format!("PNG encode: {e}")))?;
    Ok(out)
}

/// Inclusive pixel rectangle; may extend past the canvas.
#[derive(Debug, Clone, Copy)]
struct Rect {
    left: i64,
    top: i64,
    right: i64,
    bottom: i64,
}

struct Painter {
    canvas: RgbaImage,
    /// Glyph pixel size; doubled on wide screenshots.
    scale: i64,
    stroke: i64,
}

impl Painter {
    fn new(canvas: RgbaImage) -> Self {
        let wide = canvas.width() > 1600;
        Self {
            canvas,
            scale: if wide { 2 } else { 1 },
            stroke: if wide { 3 } else { 2 },
        }
    }

    /// Apply `f` to every on-canvas pixel of `r`.
    fn each_pixel(&mut self, r: Rect, mut f: impl FnMut(&mut Rgba<u8>)) {
        let (w, h) = (self.canvas.width() as i64, self.canvas.height() as i64);
        let (x0, x1) = (r.left.max(0), r.right.min(w - 1));
        let (y0, y1) = (r.top.max(0), r.bottom.min(h - 1));
        for y in y0..=y1 {
            for x in x0..=x1 {
                f(self.canvas.get_pixel_mut(x as u32, y as u32));
            }
        }
    }

    fn blend(&mut self, r: Rect, colour: Rgba<u8>) {
        let a = colour[3] as f32 / 255.0;
        self.each_pixel(r, |p| {
            for c in 0..3 {
                p[c] = (p[c] as f32 * (1.0 - a) + colour[c] as f32 * a).round() as u8;
            }
            p[3] = 255;
        });
    }

    fn outline(&mut self, r: Rect, colour: Rgba<u8>) {
        let t = self.stroke - 1;
        let edges = [
            Rect { bottom: r.top + t, ..r },
            Rect { top: r.bottom - t, ..r },
            Rect { right: r.left + t, ..r },
            Rect { left: r.right - t, ..r },
        ];
        for edge in edges {
            self.blend(edge, colour);
        }
    }

    /// Dark plate above the box's top-left corner with `text` in `colour`.
    fn label(&mut self, left: i64, top: i64, text: &str, colour: Rgba<u8>) {
        let advance = 5 * self.scale + 1;
        let pad = 2 * self.scale;
        let height = 5 * self.scale + 2 * pad;
        let plate = Rect {
            left: left.max(0),
            top: (top - height).max(0),
            right: left.max(0) + text.len() as i64 * advance + 2 * pad - 1,
            bottom: (top - height).max(0) + height - 1,
        };
        self.each_pixel(plate, |p| {
            for c in 0..3 {
                p[c] = (p[c] as f32 * 0.2) as u8;
            }
            p[3] = 255;
        });

        for (i, ch) in text.chars().enumerate() {
            let Some(d) = ch.to_digit(10) else { continue };
            let gx = plate.left + pad + i as i64 * advance;
            let gy = plate.top + pad;
            let glyph = DIGITS[d as usize];
            for row in 0..5i64 {
                for col in 0..5i64 {
                    if (glyph >> (24 - (row * 5 + col))) & 1 == 0 {
                        continue;
                    }
                    let x = gx + col * self.scale;
                    let y = gy + row * self.scale;
                    let cell = Rect {
                        left: x,
                        top: y,
                        right: x + self.scale - 1,
                        bottom: y + self.scale - 1,
                    };
                    self.blend(cell, colour);
                }
            }
        }
    }
}

/// 5x5 digit glyphs, row-major, most significant of the 25 bits first.
const DIGITS: [u32; 10] = [
    0x0e8c62e,
    0x046108e,
    0x0e8991f,
    0x1e0983e,
    0x0654be2,
    0x1f8783e,
    0x0e87a2e,
    0x1f08884,
    0x0e8ba2e,
    0x0e8bc2e,
];
