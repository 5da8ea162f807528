//! Compile-time configuration for the badge
//!
//! Timing constants, thresholds and protocol identifiers live here as
//! `const`s. The few choices that differ between builds (advertised name,
//! button strategy, displayed temperature unit) are grouped in [`BadgeConfig`].

use core::str::FromStr;

/// Default advertised device name
pub const DEFAULT_BADGE_NAME: &str = "ESP32-C3-BLE";

/// Interval between environmental samples
pub const SAMPLE_PERIOD_MS: u64 = 5_000;

/// Poll interval while waiting for the sensor to finish a conversion
pub const SAMPLE_READY_POLL_MS: u64 = 100;

/// Upper bound on "sample ready" polls before a cycle gives up
pub const SAMPLE_READY_MAX_POLLS: u32 = 20;

/// Budget for one whole environmental sample: trigger, ready wait and readout
pub const SAMPLE_TIMEOUT_MS: u64 = 3_000;

/// Consecutive sensor failures before the sampler escalates to `error!`
pub const SENSOR_FAILURE_WARN_THRESHOLD: u32 = 5;

/// Interval between display refreshes
pub const DISPLAY_PERIOD_MS: u64 = 5_000;

/// How long the display stays on after a press in button mode
pub const BUTTON_DISPLAY_WINDOW_MS: u32 = 5_000;

/// Minimum spacing between two accepted button presses
pub const DEBOUNCE_WINDOW_MS: u32 = 200;

/// Poll interval for the analog button strategy
pub const BUTTON_POLL_PERIOD_MS: u64 = 20;

/// The analog button reads as pressed below this pin voltage
pub const BUTTON_PRESSED_BELOW_MV: u32 = 1_500;

/// Full-scale voltage of an uncalibrated ADC conversion (12 dB attenuation)
pub const ADC_FULL_SCALE_MV: u32 = 2_500;

/// Largest raw code of the 12-bit ADC
pub const ADC_MAX_CODE: u32 = 4_095;

/// The battery is measured through a divider that halves the cell voltage
pub const BATTERY_DIVIDER_RATIO: u32 = 2;

/// Capacity of the opaque scratch attribute
pub const SCRATCH_CAPACITY: usize = 64;

/// Largest accepted timezone magnitude, in quarter-hours (±12 h)
pub const MAX_TZ_QUARTER_HOURS: i8 = 48;

/// Advertising window before advertising is restarted
pub const ADVERTISING_WINDOW_SECS: u64 = 180;

/// Which button handling strategy drives the press latch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStrategy {
    /// GPIO interrupt on the input edge, with an LED toggle per accepted press
    EdgeTriggered,
    /// Periodic analog sampling with software edge detection, no LED
    Polled,
}

impl FromStr for ButtonStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "edge" | "interrupt" => Ok(Self::EdgeTriggered),
            "poll" | "polled" => Ok(Self::Polled),
            _ => Err(()),
        }
    }
}

/// Unit used for the temperature line of the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Unit selected by the `fahrenheit` cargo feature
    pub const fn from_build() -> Self {
        if cfg!(feature = "fahrenheit") {
            Self::Fahrenheit
        } else {
            Self::Celsius
        }
    }

    /// Convert a Celsius reading into this unit
    pub fn convert(self, celsius: f32) -> f32 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }
}

/// Per-build configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeConfig<'a> {
    pub name: &'a str,
    pub button_strategy: ButtonStrategy,
    pub temperature_unit: TemperatureUnit,
}

impl Default for BadgeConfig<'_> {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl<'a> BadgeConfig<'a> {
    pub const DEFAULT: BadgeConfig<'static> = BadgeConfig {
        name: DEFAULT_BADGE_NAME,
        button_strategy: ButtonStrategy::Polled,
        temperature_unit: TemperatureUnit::from_build(),
    };

    /// Build a configuration from optional build-time overrides
    ///
    /// Missing or unparseable values fall back to [`BadgeConfig::DEFAULT`].
    pub fn from_build_env(name: Option<&'a str>, strategy: Option<&str>) -> Self {
        let button_strategy = match strategy.map(str::parse::<ButtonStrategy>) {
            Some(Ok(strategy)) => strategy,
            Some(Err(())) => {
                log::warn!(
                    "Unknown button strategy {:?}, using {:?}",
                    strategy,
                    BadgeConfig::DEFAULT.button_strategy
                );
                BadgeConfig::DEFAULT.button_strategy
            }
            None => BadgeConfig::DEFAULT.button_strategy,
        };

        Self {
            name: name.filter(|n| !n.is_empty()).unwrap_or(DEFAULT_BADGE_NAME),
            button_strategy,
            temperature_unit: TemperatureUnit::from_build(),
        }
    }
}
