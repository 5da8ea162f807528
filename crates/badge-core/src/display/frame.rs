//! Text content of one display refresh

use core::fmt::{self, Write};

use heapless::{String, Vec};
use log::debug;

use crate::clock::TimeOfDay;
use crate::config::TemperatureUnit;
use crate::telemetry::EnvironmentReading;

/// Bytes per line; fits 16 glyphs of the 6x10 font plus multi-byte symbols
pub const LINE_CAPACITY: usize = 16;

/// Time, pressure, temperature, humidity, battery
pub const MAX_LINES: usize = 5;

pub type Line = String<LINE_CAPACITY>;

/// Fixed-layout frame: a time line, optionally followed by the sensor block
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    lines: Vec<Line, MAX_LINES>,
}

impl Frame {
    /// Frame with only the time line
    pub fn time_only(time: TimeOfDay) -> Self {
        let mut frame = Self::default();
        frame.push(format_args!("{}", time));
        frame
    }

    /// Full frame: time followed by pressure, temperature, humidity and battery
    pub fn with_readings(
        time: TimeOfDay,
        reading: &EnvironmentReading,
        battery_mv: u32,
        unit: TemperatureUnit,
    ) -> Self {
        let mut frame = Self::time_only(time);
        frame.push(format_args!("{:.1}hPa", reading.pressure_pa / 100.0));
        frame.push(format_args!(
            "{:.1}{}",
            unit.convert(reading.temperature_c),
            unit.suffix()
        ));
        // Whole percent, truncated
        frame.push(format_args!("{}%RH", reading.humidity_rh as i32));
        frame.push(format_args!("{}mV", battery_mv));
        frame
    }

    fn push(&mut self, args: fmt::Arguments<'_>) {
        let mut line = Line::new();
        if line.write_fmt(args).is_err() {
            debug!("Display line overflow: {}", args);
            line.clear();
            let _ = line.push_str("---");
        }
        let _ = self.lines.push(line);
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(Line::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIME: TimeOfDay = TimeOfDay {
        hours: 9,
        minutes: 5,
        seconds: 7,
    };

    #[test]
    fn test_full_frame_layout() {
        let reading = EnvironmentReading {
            temperature_c: 22.54,
            pressure_pa: 101_320.0,
            humidity_rh: 45.9,
        };
        let frame = Frame::with_readings(TIME, &reading, 3_912, TemperatureUnit::Celsius);
        let mut lines = frame.lines();
        assert_eq!(lines.next(), Some("09:05:07"));
        assert_eq!(lines.next(), Some("1013.2hPa"));
        assert_eq!(lines.next(), Some("22.5°C"));
        assert_eq!(lines.next(), Some("45%RH"));
        assert_eq!(lines.next(), Some("3912mV"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_fahrenheit_line() {
        let reading = EnvironmentReading {
            temperature_c: 20.0,
            ..EnvironmentReading::ZERO
        };
        let frame = Frame::with_readings(TIME, &reading, 0, TemperatureUnit::Fahrenheit);
        assert_eq!(frame.lines().nth(2), Some("68.0°F"));
    }

    #[test]
    fn test_oversized_value_is_replaced() {
        let reading = EnvironmentReading {
            pressure_pa: f32::MAX,
            ..EnvironmentReading::ZERO
        };
        let frame = Frame::with_readings(TIME, &reading, 0, TemperatureUnit::Celsius);
        assert_eq!(frame.len(), MAX_LINES);
        assert_eq!(frame.lines().nth(1), Some("---"));
    }
}
