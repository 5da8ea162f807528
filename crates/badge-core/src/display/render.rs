//! Frame rasterisation with an ISO-8859-1 mono font

use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::iso_8859_1::FONT_6X10;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};

use super::Frame;

/// Vertical distance between line tops
pub const LINE_PITCH_PX: i32 = 12;

const LEFT_MARGIN_PX: i32 = 2;

/// Clear `target` and draw each line of `frame` top to bottom
pub fn render_frame<D>(frame: &Frame, target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    target.clear(BinaryColor::Off)?;
    let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
    for (row, line) in frame.lines().enumerate() {
        let origin = Point::new(LEFT_MARGIN_PX, row as i32 * LINE_PITCH_PX);
        Text::with_baseline(line, origin, style, Baseline::Top).draw(target)?;
    }
    Ok(())
}
