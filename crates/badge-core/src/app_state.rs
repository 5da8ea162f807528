//! Application-wide state and error types for the badge

use core::cell::Cell;
use core::fmt::{self, Write};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::error;
use thiserror_no_std::Error;

use crate::button::PressLatch;
use crate::clock::ClockConfig;
use crate::display::{DisplayMode, DisplayModeCell};
use crate::gatt::ScratchAttribute;
use crate::sensors::SensorError;
use crate::telemetry::TelemetryStore;

/// Peripheral groups that can be lost at start-up without stopping the badge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Subsystem {
    EnvironmentSensor = 1 << 0,
    Battery = 1 << 1,
    Display = 1 << 2,
    Button = 1 << 3,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EnvironmentSensor => "environment sensor",
            Self::Battery => "battery ADC",
            Self::Display => "display",
            Self::Button => "button",
        })
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{subsystem} configuration failed: {details}")]
    Configuration {
        subsystem: Subsystem,
        details: heapless::String<64>,
    },
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),
}

impl AppError {
    /// Configuration error with formatted details, truncated to fit
    pub fn configuration(subsystem: Subsystem, details: impl fmt::Debug) -> Self {
        let mut text = heapless::String::new();
        // Overflow keeps the prefix that fit
        let _ = write!(text, "{:?}", details);
        Self::Configuration {
            subsystem,
            details: text,
        }
    }
}

/// Subsystems disabled for the rest of the process lifetime
///
/// A bit set updated under a critical section: the chip has no atomic
/// read-modify-write instructions.
pub struct Subsystems {
    disabled: Mutex<CriticalSectionRawMutex, Cell<u8>>,
}

impl Default for Subsystems {
    fn default() -> Self {
        Self::new()
    }
}

impl Subsystems {
    pub const fn new() -> Self {
        Self {
            disabled: Mutex::new(Cell::new(0)),
        }
    }

    pub fn disable(&self, subsystem: Subsystem) {
        self.disabled
            .lock(|disabled| disabled.set(disabled.get() | subsystem as u8));
    }

    pub fn is_enabled(&self, subsystem: Subsystem) -> bool {
        self.disabled.lock(Cell::get) & subsystem as u8 == 0
    }

    /// Log a start-up failure and disable the subsystem it belongs to
    pub fn degrade(&self, err: &AppError) {
        error!("{}; continuing without it", err);
        match err {
            AppError::Configuration { subsystem, .. } => self.disable(*subsystem),
            AppError::Sensor(_) => self.disable(Subsystem::EnvironmentSensor),
        }
    }
}

/// Every shared cell of the badge
///
/// Built with `const fn new()` so the firmware can hold it in one `static`.
/// Each field is already synchronised; nothing here needs an outer lock.
pub struct BadgeState {
    pub telemetry: TelemetryStore,
    pub clock: ClockConfig,
    pub scratch: ScratchAttribute,
    pub display_mode: DisplayModeCell,
    pub press_latch: PressLatch,
    pub subsystems: Subsystems,
}

impl Default for BadgeState {
    fn default() -> Self {
        Self::new()
    }
}

impl BadgeState {
    pub const fn new() -> Self {
        Self {
            telemetry: TelemetryStore::new(),
            clock: ClockConfig::new(),
            scratch: ScratchAttribute::new(),
            display_mode: DisplayModeCell::new(DisplayMode::Normal),
            press_latch: PressLatch::new(),
            subsystems: Subsystems::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degrade_disables_only_failed_subsystem() {
        let state = BadgeState::new();
        let err = AppError::configuration(Subsystem::Display, "no ACK at 0x3C");
        state.subsystems.degrade(&err);

        assert!(!state.subsystems.is_enabled(Subsystem::Display));
        assert!(state.subsystems.is_enabled(Subsystem::EnvironmentSensor));
        assert!(state.subsystems.is_enabled(Subsystem::Button));
    }

    #[test]
    fn test_disabled_subsystems_accumulate() {
        let subsystems = Subsystems::new();
        subsystems.disable(Subsystem::Battery);
        subsystems.disable(Subsystem::Display);
        subsystems.disable(Subsystem::Battery);

        assert!(!subsystems.is_enabled(Subsystem::Battery));
        assert!(!subsystems.is_enabled(Subsystem::Display));
        assert!(subsystems.is_enabled(Subsystem::EnvironmentSensor));
        assert!(subsystems.is_enabled(Subsystem::Button));
    }

    #[test]
    fn test_sensor_error_converts() {
        let err: AppError = SensorError::InitializationFailed {
            sensor: "BME280",
            details: "chip id mismatch",
        }
        .into();
        let state = BadgeState::new();
        state.subsystems.degrade(&err);
        assert!(!state.subsystems.is_enabled(Subsystem::EnvironmentSensor));
    }

    #[test]
    fn test_long_details_are_truncated() {
        let AppError::Configuration { details, .. } =
            AppError::configuration(Subsystem::Battery, [0u8; 64])
        else {
            unreachable!()
        };
        assert!(details.len() <= 64);
        assert!(details.starts_with("[0, 0"));
    }
}
