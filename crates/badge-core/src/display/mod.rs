//! Display mode policy and the periodic refresh task
//!
//! Every [`DISPLAY_PERIOD_MS`] the controller decides whether the panel is
//! powered, from the configured [`DisplayMode`] and the time since the last
//! accepted button press, and if so builds a [`Frame`] from the clock and the
//! telemetry store.

mod frame;
mod render;

pub use frame::*;
pub use render::*;

use core::fmt::Debug;
use core::sync::atomic::{AtomicU8, Ordering};

use embassy_time::{Duration, Instant, Timer};
use log::{debug, error, info};

use crate::app_state::BadgeState;
use crate::button::ButtonMonitor;
use crate::config::{BUTTON_DISPLAY_WINDOW_MS, DISPLAY_PERIOD_MS, TemperatureUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DisplayMode {
    /// Always on
    Normal = 0,
    /// Always off
    Blank = 1,
    /// On for a short window after each button press
    Button = 2,
}

impl DisplayMode {
    /// Unrecognised values fall back to [`DisplayMode::Normal`]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Blank,
            2 => Self::Button,
            _ => Self::Normal,
        }
    }
}

/// Remotely writable display mode
///
/// Stores the raw byte exactly as written so a read returns what the peer
/// wrote, even when it is not a known mode.
pub struct DisplayModeCell(AtomicU8);

impl Default for DisplayModeCell {
    fn default() -> Self {
        Self::new(DisplayMode::Normal)
    }
}

impl DisplayModeCell {
    pub const fn new(mode: DisplayMode) -> Self {
        Self(AtomicU8::new(mode as u8))
    }

    pub fn set_raw(&self, raw: u8) {
        self.0.store(raw, Ordering::Relaxed);
    }

    pub fn raw(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn mode(&self) -> DisplayMode {
        DisplayMode::from_raw(self.raw())
    }
}

/// Whether the panel should be powered
pub fn decide_power(mode: DisplayMode, since_press: Duration) -> bool {
    match mode {
        DisplayMode::Blank => false,
        DisplayMode::Button => since_press < Duration::from_millis(BUTTON_DISPLAY_WINDOW_MS.into()),
        DisplayMode::Normal => true,
    }
}

/// Outcome of one refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayDecision {
    Off,
    On(Frame),
}

/// OLED panel driven by the controller
pub trait DisplayPanel {
    type Error: Debug;

    fn set_enabled(&mut self, enabled: bool) -> impl Future<Output = Result<(), Self::Error>>;

    fn show(&mut self, frame: &Frame) -> impl Future<Output = Result<(), Self::Error>>;
}

pub struct DisplayModeController<'a, M> {
    state: &'a BadgeState,
    button: &'a M,
    unit: TemperatureUnit,
}

impl<'a, M: ButtonMonitor> DisplayModeController<'a, M> {
    /// `button` is the read side of whichever strategy feeds the press latch
    pub fn new(state: &'a BadgeState, button: &'a M, unit: TemperatureUnit) -> Self {
        Self {
            state,
            button,
            unit,
        }
    }

    /// Decide power and content for uptime `now`
    pub fn evaluate(&self, now: Instant) -> DisplayDecision {
        let mode = self.state.display_mode.mode();
        let since_press = self.button.since_last_press(now);
        if !decide_power(mode, since_press) {
            debug!("Display mode {:?}: off", mode);
            return DisplayDecision::Off;
        }
        debug!(
            "Display mode {:?}: on (last press {} s ago)",
            mode,
            since_press.as_secs()
        );

        let time = self.state.clock.local_time(now);
        let snapshot = self.state.telemetry.snapshot();
        let frame = if snapshot.valid {
            Frame::with_readings(time, &snapshot.environment, snapshot.battery_mv, self.unit)
        } else {
            Frame::time_only(time)
        };
        DisplayDecision::On(frame)
    }

    /// Refresh `panel` forever
    pub async fn run<P: DisplayPanel>(&self, panel: &mut P) -> ! {
        info!("Display task started");
        let mut powered = None;
        loop {
            let decision = self.evaluate(Instant::now());
            let enable = matches!(decision, DisplayDecision::On(_));
            if powered != Some(enable) {
                match panel.set_enabled(enable).await {
                    Ok(()) => powered = Some(enable),
                    Err(e) => error!("Display power change failed: {:?}", e),
                }
            }
            if let DisplayDecision::On(frame) = decision
                && let Err(e) = panel.show(&frame).await
            {
                error!("Display draw failed: {:?}", e);
            }
            Timer::after_millis(DISPLAY_PERIOD_MS).await;
        }
    }
}
