//! In-process placeholder rasterizer.
//!
//! Used when no browser session can be started to render the error page:
//! a tinted canvas with the failure text drawn in an 8x8 bitmap font.

use crate::{Error, Result};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

const BACKGROUND: Rgba<u8> = Rgba([255, 224, 224, 255]);
const HEADER: Rgba<u8> = Rgba([176, 0, 32, 255]);
const TEXT: Rgba<u8> = Rgba([40, 0, 0, 255]);
const MARGIN: u32 = 20;
const SCALE: u32 = 2;

/// Encode a `width`x`height` PNG showing `title` and `lines`, wrapped to fit.
pub fn render_placeholder(width: u32, height: u32, title: &str, lines: &[String]) -> Result<Vec<u8>> {
    let width = width.max(64);
    let height = height.max(64);
    let mut img = RgbaImage::from_pixel(width, height, BACKGROUND);

    let cell = 8 * SCALE;
    let columns = ((width.saturating_sub(2 * MARGIN)) / cell).max(1) as usize;
    let max_rows = ((height.saturating_sub(2 * MARGIN)) / (cell + 4)).max(1) as usize;

    let mut y = MARGIN as i32;
    let mut rows = 0usize;
    for row in wrap(title, columns) {
        draw_text(&mut img, MARGIN as i32, y, &row, HEADER, SCALE);
        y += (cell + 4) as i32;
        rows += 1;
    }
    y += cell as i32;
    'outer: for line in lines {
        for row in wrap(line, columns) {
            if rows >= max_rows {
                break 'outer;
            }
            draw_text(&mut img, MARGIN as i32, y, &row, TEXT, SCALE);
            y += (cell + 4) as i32;
            rows += 1;
        }
    }

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| Error::CaptureError(format!("Failed to encode placeholder PNG: {}", e)))?;
    Ok(out.into_inner())
}

/// Break `text` into rows of at most `columns` characters.
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut rows = Vec::new();
    for line in text.lines() {
        let chars: Vec<char> = line.chars().map(|c| if c == '\t' { ' ' } else { c }).collect();
        if chars.is_empty() {
            rows.push(String::new());
            continue;
        }
        for chunk in chars.chunks(columns) {
            rows.push(chunk.iter().collect());
        }
    }
    rows
}

fn draw_text(img: &mut RgbaImage, x: i32, y: i32, text: &str, color: Rgba<u8>, scale: u32) {
    let scale = scale.max(1) as i32;
    let mut cursor_x = x;
    for ch in text.chars() {
        let glyph = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?'));
        if let Some(glyph) = glyph {
            for (row_idx, bits) in glyph.iter().enumerate() {
                for col in 0..8 {
                    if (bits >> col) & 1 == 0 {
                        continue;
                    }
                    let px = cursor_x + col * scale;
                    let py = y + row_idx as i32 * scale;
                    for sy in 0..scale {
                        for sx in 0..scale {
                            let (tx, ty) = (px + sx, py + sy);
                            if tx >= 0 && ty >= 0 && (tx as u32) < img.width() && (ty as u32) < img.height() {
                                img.put_pixel(tx as u32, ty as u32, color);
                            }
                        }
                    }
                }
            }
        }
        cursor_x += 8 * scale;
    }
}
