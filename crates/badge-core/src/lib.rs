//! Hardware-independent core of the environmental sensor badge
//!
//! Shared state cells (telemetry, clock, button latch, display mode), the
//! custom GATT attribute service, the display policy and the sampler. Chip
//! bring-up lives in `badge-firmware`; this crate only sees traits.
//!
//! It is `#![no_std]` so it compiles on the ESP32-C3 and on desktop hosts
//! (for the simulator and tests).

#![no_std]

pub mod app_state;
pub mod async_i2c_bus;
pub mod button;
pub mod clock;
pub mod config;
pub mod display;
pub mod framebuffer;
pub mod gatt;
pub mod sensors;
pub mod telemetry;
