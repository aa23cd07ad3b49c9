//! # 1-bit Frame Buffers
//!
//! Every layer of the clock (panels, background, the composed frame) is a
//! [`Bitmap`]: a packed black/white pixel buffer in the same layout the e-paper
//! controller expects, so the composed frame can be shipped without a
//! conversion pass.
//!
//! ## Memory Layout
//! - Rows of `ceil(width / 8)` bytes, most significant bit first
//! - Bit set = white, bit clear = black (e-paper RAM convention)
//! - A 250x122 frame is 32 bytes x 122 rows = 3.9 KB
//!
//! Bitmaps implement embedded-graphics' [`DrawTarget`] with [`BinaryColor`],
//! where `BinaryColor::On` is ink (black). Text and primitives are drawn
//! straight into panel canvases with the usual embedded-graphics styles.

use embedded_graphics::{pixelcolor::BinaryColor, prelude::*};

/// Pixel colors of a monochrome e-paper panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    White,
    Black,
}

impl From<BinaryColor> for Color {
    fn from(color: BinaryColor) -> Self {
        match color {
            BinaryColor::On => Color::Black,
            BinaryColor::Off => Color::White,
        }
    }
}

/// Border thickness on each side of a canvas, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Border {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Border {
    pub const NONE: Border = Border::new(0, 0, 0, 0);

    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn uniform(width: u32) -> Self {
        Self::new(width, width, width, width)
    }
}

/// Packed 1-bit image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Bitmap {
    /// Create an all-white bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        let bytes_per_row = width.div_ceil(8);
        Self {
            width,
            height,
            data: vec![0xFF; (bytes_per_row * height) as usize],
        }
    }

    /// Create a white canvas framed by a black border.
    ///
    /// This is the blank state every panel resets to before drawing its body.
    pub fn bordered(width: u32, height: u32, border: Border) -> Self {
        let mut bitmap = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let inside = x >= border.left
                    && y >= border.top
                    && x + border.right < width
                    && y + border.bottom < height;
                if !inside {
                    bitmap.set_pixel(x, y, Color::Black);
                }
            }
        }
        bitmap
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_row(&self) -> u32 {
        self.width.div_ceil(8)
    }

    /// Raw packed rows, ready for the controller's RAM.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self, color: Color) {
        match color {
            Color::White => self.data.fill(0xFF),
            Color::Black => self.data.fill(0x00),
        }
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        if x >= self.width || y >= self.height {
            return;
        }

        let byte_index = (y * self.bytes_per_row() + x / 8) as usize;
        let bit_mask = 0x80 >> (x % 8);

        match color {
            Color::White => self.data[byte_index] |= bit_mask,
            Color::Black => self.data[byte_index] &= !bit_mask,
        }
    }

    /// Pixel color, or `None` outside the bitmap.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let byte = self.data[(y * self.bytes_per_row() + x / 8) as usize];
        if byte & (0x80 >> (x % 8)) == 0 {
            Some(Color::Black)
        } else {
            Some(Color::White)
        }
    }

    pub fn black_pixels(&self) -> usize {
        (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .filter(|&(x, y)| self.pixel(x, y) == Some(Color::Black))
            .count()
    }

    /// Copy `source` onto this bitmap with its top-left corner at `(x, y)`.
    /// Pixels falling outside are clipped.
    pub fn paste(&mut self, source: &Bitmap, x: i32, y: i32) {
        for sy in 0..source.height {
            let ty = y + sy as i32;
            if ty < 0 || ty >= self.height as i32 {
                continue;
            }
            for sx in 0..source.width {
                let tx = x + sx as i32;
                if tx < 0 || tx >= self.width as i32 {
                    continue;
                }
                if let Some(color) = source.pixel(sx, sy) {
                    self.set_pixel(tx as u32, ty as u32, color);
                }
            }
        }
    }

    /// Rectangular region starting at `(x, y)`. Areas past the edge stay white.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Bitmap {
        let mut cropped = Bitmap::new(width, height);
        cropped.paste(self, -(x as i32), -(y as i32));
        cropped
    }

    /// Grow the bitmap by a black border, like PIL's `ImageOps.expand`.
    pub fn expanded(&self, border: Border) -> Bitmap {
        let mut expanded = Bitmap::new(
            self.width + border.left + border.right,
            self.height + border.top + border.bottom,
        );
        expanded.clear(Color::Black);
        expanded.paste(self, border.left as i32, border.top as i32);
        expanded
    }

    pub fn rotated_180(&self) -> Bitmap {
        let mut rotated = Bitmap::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                if self.pixel(x, y) == Some(Color::Black) {
                    rotated.set_pixel(self.width - 1 - x, self.height - 1 - y, Color::Black);
                }
            }
        }
        rotated
    }

    /// Rotate a quarter turn counter-clockwise; width and height swap.
    pub fn rotated_90_ccw(&self) -> Bitmap {
        let mut rotated = Bitmap::new(self.height, self.width);
        for y in 0..rotated.height {
            for x in 0..rotated.width {
                if self.pixel(self.width - 1 - y, x) == Some(Color::Black) {
                    rotated.set_pixel(x, y, Color::Black);
                }
            }
        }
        rotated
    }
}

impl OriginDimensions for Bitmap {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for Bitmap {
    type Color = BinaryColor;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }
            self.set_pixel(point.x as u32, point.y as u32, color.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bitmap_is_white_and_padded_per_row() {
        let bitmap = Bitmap::new(10, 3);
        assert_eq!(bitmap.bytes_per_row(), 2);
        assert_eq!(bitmap.as_bytes().len(), 6);
        assert!(bitmap.as_bytes().iter().all(|&b| b == 0xFF));
        assert_eq!(bitmap.black_pixels(), 0);
    }

    #[test]
    fn set_pixel_uses_msb_first_and_clears_bit_for_black() {
        let mut bitmap = Bitmap::new(16, 1);
        bitmap.set_pixel(0, 0, Color::Black);
        bitmap.set_pixel(9, 0, Color::Black);
        assert_eq!(bitmap.as_bytes(), &[0x7F, 0xBF]);

        // Out of range writes are ignored
        bitmap.set_pixel(16, 0, Color::Black);
        bitmap.set_pixel(0, 1, Color::Black);
        assert_eq!(bitmap.black_pixels(), 2);
    }

    #[test]
    fn bordered_canvas_only_inks_requested_sides() {
        let bitmap = Bitmap::bordered(6, 4, Border::new(0, 1, 1, 1));
        assert_eq!(bitmap.pixel(0, 1), Some(Color::White));
        assert_eq!(bitmap.pixel(5, 1), Some(Color::Black));
        assert_eq!(bitmap.pixel(2, 0), Some(Color::Black));
        assert_eq!(bitmap.pixel(2, 3), Some(Color::Black));
        assert_eq!(bitmap.pixel(2, 2), Some(Color::White));
    }

    #[test]
    fn paste_clips_at_edges() {
        let mut target = Bitmap::new(4, 4);
        let mut source = Bitmap::new(3, 3);
        source.clear(Color::Black);

        target.paste(&source, 2, -1);
        assert_eq!(target.black_pixels(), 4);
        assert_eq!(target.pixel(3, 0), Some(Color::Black));
        assert_eq!(target.pixel(3, 2), Some(Color::White));
    }

    #[test]
    fn rotation_by_180_twice_is_identity() {
        let mut bitmap = Bitmap::new(13, 7);
        bitmap.set_pixel(0, 0, Color::Black);
        bitmap.set_pixel(12, 3, Color::Black);

        let rotated = bitmap.rotated_180();
        assert_eq!(rotated.pixel(12, 6), Some(Color::Black));
        assert_eq!(rotated.pixel(0, 3), Some(Color::Black));
        assert_eq!(rotated.rotated_180(), bitmap);
    }

    #[test]
    fn quarter_turn_moves_top_right_to_top_left() {
        let mut bitmap = Bitmap::new(5, 2);
        bitmap.set_pixel(4, 0, Color::Black);

        let rotated = bitmap.rotated_90_ccw();
        assert_eq!((rotated.width(), rotated.height()), (2, 5));
        assert_eq!(rotated.pixel(0, 0), Some(Color::Black));
        assert_eq!(rotated.black_pixels(), 1);
    }

    #[test]
    fn expanded_and_cropped_regions() {
        let bitmap = Bitmap::new(4, 2).expanded(Border::new(1, 0, 1, 0));
        assert_eq!((bitmap.width(), bitmap.height()), (6, 2));
        assert_eq!(bitmap.pixel(0, 0), Some(Color::Black));
        assert_eq!(bitmap.pixel(5, 1), Some(Color::Black));
        assert_eq!(bitmap.pixel(1, 0), Some(Color::White));

        let cropped = bitmap.crop(0, 0, 2, 2);
        assert_eq!(cropped.black_pixels(), 2);
    }
}
