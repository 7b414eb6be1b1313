// Built-in 5x7 bitmap font
//
// Always available, ASCII only. Glyphs are column-major with bit 0 at the
// top row; each cell is 6x8 units (one column and one row of spacing) and a
// font size of N scales one unit to N/8 pixels.

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use super::fonts::{FontFace, TextExtent};
use crate::core::errors::RenderingResult;

const CELL_WIDTH: u32 = 6;
const CELL_HEIGHT: u32 = 8;
const UNITS_PER_EM: f32 = 8.0;

/// Drawn for characters outside printable ASCII
const REPLACEMENT: [u8; 5] = [0x7F, 0x41, 0x41, 0x41, 0x7F];

#[rustfmt::skip]
const GLYPHS: [[u8; 5]; 95] = [
    [0x00, 0x00, 0x00, 0x00, 0x00], // ' '
    [0x00, 0x00, 0x5F, 0x00, 0x00], // !
    [0x00, 0x07, 0x00, 0x07, 0x00], // "
    [0x14, 0x7F, 0x14, 0x7F, 0x14], // #
    [0x24, 0x2A, 0x7F, 0x2A, 0x12], // $
    [0x23, 0x13, 0x08, 0x64, 0x62], // %
    [0x36, 0x49, 0x55, 0x22, 0x50], // &
    [0x00, 0x05, 0x03, 0x00, 0x00], // '
    [0x00, 0x1C, 0x22, 0x41, 0x00], // (
    [0x00, 0x41, 0x22, 0x1C, 0x00], // )
    [0x08, 0x2A, 0x1C, 0x2A, 0x08], // *
    [0x08, 0x08, 0x3E, 0x08, 0x08], // +
    [0x00, 0x50, 0x30, 0x00, 0x00], // ,
    [0x08, 0x08, 0x08, 0x08, 0x08], // -
    [0x00, 0x60, 0x60, 0x00, 0x00], // .
    [0x20, 0x10, 0x08, 0x04, 0x02], // /
    [0x3E, 0x51, 0x49, 0x45, 0x3E], // 0
    [0x00, 0x42, 0x7F, 0x40, 0x00], // 1
    [0x42, 0x61, 0x51, 0x49, 0x46], // 2
    [0x21, 0x41, 0x45, 0x4B, 0x31], // 3
    [0x18, 0x14, 0x12, 0x7F, 0x10], // 4
    [0x27, 0x45, 0x45, 0x45, 0x39], // 5
    [0x3C, 0x4A, 0x49, 0x49, 0x30], // 6
    [0x01, 0x71, 0x09, 0x05, 0x03], // 7
    [0x36, 0x49, 0x49, 0x49, 0x36], // 8
    [0x06, 0x49, 0x49, 0x29, 0x1E], // 9
    [0x00, 0x36, 0x36, 0x00, 0x00], // :
    [0x00, 0x56, 0x36, 0x00, 0x00], // ;
    [0x08, 0x14, 0x22, 0x41, 0x00], // <
    [0x14, 0x14, 0x14, 0x14, 0x14], // =
    [0x00, 0x41, 0x22, 0x14, 0x08], // >
    [0x02, 0x01, 0x51, 0x09, 0x06], // ?
    [0x32, 0x49, 0x79, 0x41, 0x3E], // @
    [0x7E, 0x11, 0x11, 0x11, 0x7E], // A
    [0x7F, 0x49, 0x49, 0x49, 0x36], // B
    [0x3E, 0x41, 0x41, 0x41, 0x22], // C
    [0x7F, 0x41, 0x41, 0x22, 0x1C], // D
    [0x7F, 0x49, 0x49, 0x49, 0x41], // E
    [0x7F, 0x09, 0x09, 0x09, 0x01], // F
    [0x3E, 0x41, 0x49, 0x49, 0x7A], // G
    [0x7F, 0x08, 0x08, 0x08, 0x7F], // H
    [0x00, 0x41, 0x7F, 0x41, 0x00], // I
    [0x20, 0x40, 0x41, 0x3F, 0x01], // J
    [0x7F, 0x08, 0x14, 0x22, 0x41], // K
    [0x7F, 0x40, 0x40, 0x40, 0x40], // L
    [0x7F, 0x02, 0x0C, 0x02, 0x7F], // M
    [0x7F, 0x04, 0x08, 0x10, 0x7F], // N
    [0x3E, 0x41, 0x41, 0x41, 0x3E], // O
    [0x7F, 0x09, 0x09, 0x09, 0x06], // P
    [0x3E, 0x41, 0x51, 0x21, 0x5E], // Q
    [0x7F, 0x09, 0x19, 0x29, 0x46], // R
    [0x46, 0x49, 0x49, 0x49, 0x31], // S
    [0x01, 0x01, 0x7F, 0x01, 0x01], // T
    [0x3F, 0x40, 0x40, 0x40, 0x3F], // U
    [0x1F, 0x20, 0x40, 0x20, 0x1F], // V
    [0x3F, 0x40, 0x38, 0x40, 0x3F], // W
    [0x63, 0x14, 0x08, 0x14, 0x63], // X
    [0x07, 0x08, 0x70, 0x08, 0x07], // Y
    [0x61, 0x51, 0x49, 0x45, 0x43], // Z
    [0x00, 0x7F, 0x41, 0x41, 0x00], // [
    [0x02, 0x04, 0x08, 0x10, 0x20], // backslash
    [0x00, 0x41, 0x41, 0x7F, 0x00], // ]
    [0x04, 0x02, 0x01, 0x02, 0x04], // ^
    [0x40, 0x40, 0x40, 0x40, 0x40], // _
    [0x00, 0x01, 0x02, 0x04, 0x00], // `
    [0x20, 0x54, 0x54, 0x54, 0x78], // a
    [0x7F, 0x48, 0x44, 0x44, 0x38], // b
    [0x38, 0x44, 0x44, 0x44, 0x20], // c
    [0x38, 0x44, 0x44, 0x48, 0x7F], // d
    [0x38, 0x54, 0x54, 0x54, 0x18], // e
    [0x08, 0x7E, 0x09, 0x01, 0x02], // f
    [0x0C, 0x52, 0x52, 0x52, 0x3E], // g
    [0x7F, 0x08, 0x04, 0x04, 0x78], // h
    [0x00, 0x44, 0x7D, 0x40, 0x00], // i
    [0x20, 0x40, 0x44, 0x3D, 0x00], // j
    [0x7F, 0x10, 0x28, 0x44, 0x00], // k
    [0x00, 0x41, 0x7F, 0x40, 0x00], // l
    [0x7C, 0x04, 0x18, 0x04, 0x78], // m
    [0x7C, 0x08, 0x04, 0x04, 0x78], // n
    [0x38, 0x44, 0x44, 0x44, 0x38], // o
    [0x7C, 0x14, 0x14, 0x14, 0x08], // p
    [0x08, 0x14, 0x14, 0x18, 0x7C], // q
    [0x7C, 0x08, 0x04, 0x04, 0x08], // r
    [0x48, 0x54, 0x54, 0x54, 0x20], // s
    [0x04, 0x3F, 0x44, 0x40, 0x20], // t
    [0x3C, 0x40, 0x40, 0x20, 0x7C], // u
    [0x1C, 0x20, 0x40, 0x20, 0x1C], // v
    [0x3C, 0x40, 0x30, 0x40, 0x3C], // w
    [0x44, 0x28, 0x10, 0x28, 0x44], // x
    [0x0C, 0x50, 0x50, 0x50, 0x3C], // y
    [0x44, 0x64, 0x54, 0x4C, 0x44], // z
    [0x00, 0x08, 0x36, 0x41, 0x00], // {
    [0x00, 0x00, 0x7F, 0x00, 0x00], // |
    [0x00, 0x41, 0x36, 0x08, 0x00], // }
    [0x02, 0x01, 0x02, 0x04, 0x02], // ~
];

fn glyph(c: char) -> Option<&'static [u8; 5]> {
    let code = c as u32;
    if (0x20..=0x7E).contains(&code) {
        Some(&GLYPHS[(code - 0x20) as usize])
    } else {
        None
    }
}

/// Last-resort font; scales the bitmap to the requested size
#[derive(Debug, Clone, Copy)]
pub struct BuiltinFont {
    size: u32,
}

impl BuiltinFont {
    pub fn new(size: u32) -> Self {
        Self { size: size.max(1) }
    }

    fn scale(&self) -> f32 {
        self.size as f32 / UNITS_PER_EM
    }

    /// Pixel offset of a unit coordinate
    fn px(&self, units: u32) -> i32 {
        (units as f32 * self.scale()).floor() as i32
    }
}

impl FontFace for BuiltinFont {
    fn label(&self) -> &str {
        "builtin"
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn measure(&self, text: &str) -> RenderingResult<TextExtent> {
        let lines: Vec<&str> = text.split('\n').collect();
        let columns = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as u32;
        let missing_glyphs = text
            .chars()
            .filter(|&c| c != '\n' && glyph(c).is_none())
            .count();

        if columns == 0 {
            return Ok(TextExtent {
                width: 0,
                height: 0,
                missing_glyphs,
            });
        }

        let scale = self.scale();
        let width_units = columns * CELL_WIDTH - 1;
        let height_units = lines.len() as u32 * CELL_HEIGHT - 1;
        Ok(TextExtent {
            width: (width_units as f32 * scale).ceil() as u32,
            height: (height_units as f32 * scale).ceil() as u32,
            missing_glyphs,
        })
    }

    fn draw(
        &self,
        canvas: &mut RgbaImage,
        text: &str,
        x: i32,
        y: i32,
        color: Rgba<u8>,
    ) -> RenderingResult<()> {
        for (line_idx, line) in text.split('\n').enumerate() {
            let line_units = line_idx as u32 * CELL_HEIGHT;
            for (char_idx, c) in line.chars().enumerate() {
                let columns = glyph(c).unwrap_or(&REPLACEMENT);
                let char_units = char_idx as u32 * CELL_WIDTH;

                for (col, bits) in columns.iter().enumerate() {
                    let x0 = self.px(char_units + col as u32);
                    let x1 = self.px(char_units + col as u32 + 1).max(x0 + 1);
                    for row in 0..7u32 {
                        if bits & (1 << row) == 0 {
                            continue;
                        }
                        let y0 = self.px(line_units + row);
                        let y1 = self.px(line_units + row + 1).max(y0 + 1);
                        draw_filled_rect_mut(
                            canvas,
                            Rect::at(x + x0, y + y0).of_size((x1 - x0) as u32, (y1 - y0) as u32),
                            color,
                        );
                    }
                }
            }
        }
        Ok(())
    }
}
