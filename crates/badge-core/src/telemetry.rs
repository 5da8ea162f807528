//! Latest sensor readings shared between the sampler and its readers
//!
//! The environmental triple is one generation: the sampler replaces all three
//! fields together under a short critical section, so a reader never sees
//! temperature from one sample next to humidity from another. Battery voltage
//! is sampled on its own cadence and lives in a separate atomic.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// One sampling cycle of the environmental sensor
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnvironmentReading {
    pub temperature_c: f32,
    /// Sensor native unit (Pa)
    pub pressure_pa: f32,
    pub humidity_rh: f32,
}

impl EnvironmentReading {
    pub const ZERO: Self = Self {
        temperature_c: 0.0,
        pressure_pa: 0.0,
        humidity_rh: 0.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Generation {
    reading: EnvironmentReading,
    number: u32,
}

/// Consistent view of the store at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySnapshot {
    pub environment: EnvironmentReading,
    /// Incremented once per published environmental sample; 0 before the first
    pub generation: u32,
    /// May be older or newer than `environment`
    pub battery_mv: u32,
    pub valid: bool,
}

/// Single-writer, many-reader telemetry cell
pub struct TelemetryStore {
    environment: Mutex<CriticalSectionRawMutex, Cell<Generation>>,
    battery_mv: AtomicU32,
    valid: AtomicBool,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryStore {
    pub const fn new() -> Self {
        Self {
            environment: Mutex::new(Cell::new(Generation {
                reading: EnvironmentReading::ZERO,
                number: 0,
            })),
            battery_mv: AtomicU32::new(0),
            valid: AtomicBool::new(false),
        }
    }

    /// Replace the environmental triple with a new generation and mark the
    /// store valid. Returns the new generation number.
    pub fn publish_environment(&self, reading: EnvironmentReading) -> u32 {
        let number = self.environment.lock(|cell| {
            let number = cell.get().number.wrapping_add(1);
            cell.set(Generation { reading, number });
            number
        });
        // Set after the triple so a reader that observes `valid` also
        // observes at least the first generation.
        self.valid.store(true, Ordering::Release);
        number
    }

    /// Latest environmental triple, or `None` before the first sample
    pub fn environment(&self) -> Option<EnvironmentReading> {
        if !self.is_valid() {
            return None;
        }
        Some(self.environment.lock(|cell| cell.get().reading))
    }

    /// Latest triple regardless of validity (zeroes before the first sample)
    pub fn environment_or_zero(&self) -> EnvironmentReading {
        self.environment.lock(|cell| cell.get().reading)
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn set_battery_mv(&self, millivolts: u32) {
        self.battery_mv.store(millivolts, Ordering::Relaxed);
    }

    pub fn battery_mv(&self) -> u32 {
        self.battery_mv.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let valid = self.is_valid();
        let generation = self.environment.lock(|cell| cell.get());
        TelemetrySnapshot {
            environment: generation.reading,
            generation: generation.number,
            battery_mv: self.battery_mv(),
            valid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(t: f32, p: f32, h: f32) -> EnvironmentReading {
        EnvironmentReading {
            temperature_c: t,
            pressure_pa: p,
            humidity_rh: h,
        }
    }

    #[test]
    fn test_invalid_until_first_sample() {
        let store = TelemetryStore::new();
        assert!(!store.is_valid());
        assert_eq!(store.environment(), None);
        assert_eq!(store.snapshot().generation, 0);

        store.publish_environment(reading(21.0, 101_325.0, 40.0));
        assert!(store.is_valid());
        assert_eq!(store.environment(), Some(reading(21.0, 101_325.0, 40.0)));
    }

    #[test]
    fn test_validity_never_reverts() {
        let store = TelemetryStore::new();
        store.publish_environment(reading(20.0, 100_000.0, 50.0));
        // A battery-only update does not touch validity
        store.set_battery_mv(3_700);
        assert!(store.is_valid());
        store.publish_environment(EnvironmentReading::ZERO);
        assert!(store.is_valid());
        assert_eq!(store.environment(), Some(EnvironmentReading::ZERO));
    }

    #[test]
    fn test_generation_increments_per_publish() {
        let store = TelemetryStore::new();
        assert_eq!(store.publish_environment(reading(1.0, 1.0, 1.0)), 1);
        assert_eq!(store.publish_environment(reading(2.0, 2.0, 2.0)), 2);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.generation, 2);
        assert_eq!(snapshot.environment, reading(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_battery_is_independent_of_triple() {
        let store = TelemetryStore::new();
        store.set_battery_mv(4_100);
        assert_eq!(store.battery_mv(), 4_100);
        assert!(!store.is_valid());
        assert_eq!(store.snapshot().battery_mv, 4_100);
    }
}
