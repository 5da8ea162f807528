//! ESP32-C3 firmware-specific modules for the sensor badge
//!
//! This crate contains the code that only builds for the chip: peripheral
//! bring-up, the BME280 and ADC adapters behind `badge_core`'s sensor traits,
//! the SSD1306 panel, the button interrupt handler and the BLE host.

#![no_std]

pub mod app_state;
pub mod ble;
pub mod button_irq;
pub mod oled;

use badge_core::config::BadgeConfig;

/// Configuration baked in by `build.rs`
pub fn build_config() -> BadgeConfig<'static> {
    BadgeConfig::from_build_env(
        option_env!("BADGE_NAME"),
        option_env!("BADGE_BUTTON_STRATEGY"),
    )
}
