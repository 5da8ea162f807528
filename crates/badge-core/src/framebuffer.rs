//! 1-bpp framebuffer with change detection.
//!
//! The layout matches the SSD1306 GDDRAM: eight horizontal pages of eight
//! rows, one byte per column per page, LSB on top. Frames are drawn here and
//! only the rectangle of changed pixels is pushed to the panel.

use core::convert::Infallible;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use log::debug;

pub const DISPLAY_WIDTH_PX: usize = 128;
pub const DISPLAY_HEIGHT_PX: usize = 64;

const PAGE_COUNT: usize = DISPLAY_HEIGHT_PX / 8;

/// Bounding box of pixels that have changed since the last flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DirtyRect {
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
}

impl DirtyRect {
    fn from_point(x: usize, y: usize) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn expand(&mut self, x: usize, y: usize) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> usize {
        self.max_y - self.min_y + 1
    }
}

#[inline]
fn lit(pages: &[[u8; DISPLAY_WIDTH_PX]; PAGE_COUNT], x: usize, y: usize) -> bool {
    pages[y / 8][x] & (1 << (y % 8)) != 0
}

/// 128x64 monochrome framebuffer implementing `DrawTarget<Color = BinaryColor>`
pub struct MonoFrameBuffer {
    pages: [[u8; DISPLAY_WIDTH_PX]; PAGE_COUNT],
    dirty: Option<DirtyRect>,
}

impl Default for MonoFrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MonoFrameBuffer {
    /// A blank buffer
    pub const fn new() -> Self {
        Self {
            pages: [[0; DISPLAY_WIDTH_PX]; PAGE_COUNT],
            dirty: None,
        }
    }

    /// Whether the pixel at (`x`, `y`) is lit; out of bounds reads as off
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        if x >= DISPLAY_WIDTH_PX || y >= DISPLAY_HEIGHT_PX {
            return false;
        }
        lit(&self.pages, x, y)
    }

    /// Raw page data, SSD1306 order
    pub fn pages(&self) -> &[[u8; DISPLAY_WIDTH_PX]; PAGE_COUNT] {
        &self.pages
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    #[inline]
    fn set_pixel(&mut self, x: usize, y: usize, on: bool) {
        let byte = &mut self.pages[y / 8][x];
        let mask = 1 << (y % 8);
        let updated = if on { *byte | mask } else { *byte & !mask };
        if updated != *byte {
            *byte = updated;
            match &mut self.dirty {
                Some(rect) => rect.expand(x, y),
                None => self.dirty = Some(DirtyRect::from_point(x, y)),
            }
        }
    }

    /// Push the changed region to `display` and reset the dirty state.
    ///
    /// No-op when nothing changed since the previous flush.
    pub fn flush<D>(&mut self, display: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        let Some(rect) = self.dirty.take() else {
            return Ok(());
        };

        debug!(
            "Flushing {}x{} dirty region at ({}, {})",
            rect.width(),
            rect.height(),
            rect.min_x,
            rect.min_y
        );

        let area = Rectangle::new(
            Point::new(rect.min_x as i32, rect.min_y as i32),
            Size::new(rect.width() as u32, rect.height() as u32),
        );
        let pages = &self.pages;
        let colors = (rect.min_y..=rect.max_y).flat_map(move |y| {
            (rect.min_x..=rect.max_x).map(move |x| BinaryColor::from(lit(pages, x, y)))
        });

        display.fill_contiguous(&area, colors)
    }
}

impl OriginDimensions for MonoFrameBuffer {
    fn size(&self) -> Size {
        Size::new(DISPLAY_WIDTH_PX as u32, DISPLAY_HEIGHT_PX as u32)
    }
}

impl DrawTarget for MonoFrameBuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            let (x, y) = (coord.x, coord.y);
            if x >= 0 && y >= 0 && (x as usize) < DISPLAY_WIDTH_PX && (y as usize) < DISPLAY_HEIGHT_PX
            {
                self.set_pixel(x as usize, y as usize, color.is_on());
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let area = area.intersection(&self.bounding_box());
        let Some(bottom_right) = area.bottom_right() else {
            return Ok(());
        };
        for y in area.top_left.y..=bottom_right.y {
            for x in area.top_left.x..=bottom_right.x {
                self.set_pixel(x as usize, y as usize, color.is_on());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TimeOfDay;
    use crate::display::{Frame, LINE_PITCH_PX, render_frame};

    /// Records the area and pixel count of each `fill_contiguous` call
    #[derive(Default)]
    struct Recorder {
        fills: heapless::Vec<(Rectangle, usize), 4>,
    }

    impl OriginDimensions for Recorder {
        fn size(&self) -> Size {
            Size::new(DISPLAY_WIDTH_PX as u32, DISPLAY_HEIGHT_PX as u32)
        }
    }

    impl DrawTarget for Recorder {
        type Color = BinaryColor;
        type Error = Infallible;

        fn draw_iter<I>(&mut self, _pixels: I) -> Result<(), Self::Error>
        where
            I: IntoIterator<Item = Pixel<Self::Color>>,
        {
            Ok(())
        }

        fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
        where
            I: IntoIterator<Item = Self::Color>,
        {
            let count = colors.into_iter().count();
            let _ = self.fills.push((*area, count));
            Ok(())
        }
    }

    #[test]
    fn test_page_layout_matches_panel() {
        let mut fb = MonoFrameBuffer::new();
        Pixel(Point::new(3, 9), BinaryColor::On).draw(&mut fb).unwrap();
        assert!(fb.pixel(3, 9));
        assert_eq!(fb.pages()[1][3], 0b0000_0010);
        // Clipped
        Pixel(Point::new(-1, 70), BinaryColor::On).draw(&mut fb).unwrap();
    }

    #[test]
    fn test_flush_sends_only_dirty_region() {
        let mut fb = MonoFrameBuffer::new();
        let mut panel = Recorder::default();

        fb.flush(&mut panel).unwrap();
        assert!(panel.fills.is_empty());

        Pixel(Point::new(10, 20), BinaryColor::On).draw(&mut fb).unwrap();
        Pixel(Point::new(12, 21), BinaryColor::On).draw(&mut fb).unwrap();
        fb.flush(&mut panel).unwrap();

        let (area, count) = panel.fills[0];
        assert_eq!(area, Rectangle::new(Point::new(10, 20), Size::new(3, 2)));
        assert_eq!(count, 6);
        assert!(!fb.is_dirty());

        // Redrawing identical pixels leaves nothing to flush
        Pixel(Point::new(10, 20), BinaryColor::On).draw(&mut fb).unwrap();
        assert!(!fb.is_dirty());
    }

    #[test]
    fn test_rendered_time_only_frame_leaves_lower_lines_blank() {
        let mut fb = MonoFrameBuffer::new();
        let frame = Frame::time_only(TimeOfDay {
            hours: 12,
            minutes: 34,
            seconds: 56,
        });
        render_frame(&frame, &mut fb).unwrap();

        let lit = |rows: core::ops::Range<usize>| {
            rows.flat_map(|y| (0..DISPLAY_WIDTH_PX).map(move |x| (x, y)))
                .filter(|&(x, y)| fb.pixel(x, y))
                .count()
        };
        assert!(lit(0..LINE_PITCH_PX as usize) > 0);
        assert_eq!(lit(LINE_PITCH_PX as usize..DISPLAY_HEIGHT_PX), 0);
    }
}
