//! Firmware-specific application state extensions
//!
//! Re-exports the hardware-independent app state from `badge_core` and adds
//! the global state cells, ESP32-C3 peripheral initialisation and the sensor
//! adapters.

mod hardware;
mod sensors_state;

pub use hardware::*;
pub use sensors_state::*;

// Re-export all shared app state types from badge-core
pub use badge_core::app_state::*;

use badge_core::gatt::AttributeService;

/// Every shared cell of the running badge
pub static STATE: BadgeState = BadgeState::new();

/// GATT attribute handlers and connection state over [`STATE`]
pub static SERVICE: AttributeService<'static> = AttributeService::new(&STATE);
