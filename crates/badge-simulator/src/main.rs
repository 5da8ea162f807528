//! Desktop simulator for the environmental sensor badge.
//!
//! Runs the badge-core sampler, polled button, attribute service and display
//! controller against mock hardware on a single-threaded tokio runtime. The
//! 128x64 panel is drawn into an off-screen `SimulatorDisplay` and printed to
//! the terminal whenever its content changes.
//!
//! A scripted BLE peer connects a few seconds after start-up, sets the clock
//! and timezone, pokes the scratch attribute, switches the display into button
//! mode and then reads the environment attributes once a minute.
//!
//! Set `RUST_LOG=debug` to see every attribute access.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use badge_core::app_state::BadgeState;
use badge_core::button::{ButtonSense, PolledButton};
use badge_core::config::{
    ADC_MAX_CODE, BUTTON_PRESSED_BELOW_MV, BadgeConfig, SAMPLE_PERIOD_MS,
};
use badge_core::display::{DisplayModeController, DisplayPanel, Frame, render_frame};
use badge_core::framebuffer::{DISPLAY_HEIGHT_PX, DISPLAY_WIDTH_PX, MonoFrameBuffer};
use badge_core::gatt::{AttError, AttributeId, AttributeService, GapEvent};
use badge_core::sensors::{AdcSample, BatteryAdc, EnvironmentSensor, Sampler, SensorError};
use badge_core::telemetry::EnvironmentReading;
use embassy_time::Instant;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics_simulator::SimulatorDisplay;
use log::{debug, info, warn};

static STATE: BadgeState = BadgeState::new();
static SERVICE: AttributeService<'static> = AttributeService::new(&STATE);

/// Set by the scripted peer to hold the button down
static BUTTON_HELD: AtomicBool = AtomicBool::new(false);

// ---------------------------------------------------------------------------
// Mock hardware
// ---------------------------------------------------------------------------

/// BME280 stand-in producing slowly drifting readings
///
/// Each conversion reports "busy" for a couple of polls, and every eleventh
/// read fails so the sampler's error path is visible in the log.
struct MockEnvironment {
    started: std::time::Instant,
    busy_polls: u32,
    reads: u32,
}

impl MockEnvironment {
    fn new() -> Self {
        Self {
            started: std::time::Instant::now(),
            busy_polls: 0,
            reads: 0,
        }
    }
}

impl EnvironmentSensor for MockEnvironment {
    fn name(&self) -> &'static str {
        "mock BME280"
    }

    async fn start_conversion(&mut self) -> Result<(), SensorError> {
        self.busy_polls = 2;
        Ok(())
    }

    async fn is_sampling(&mut self) -> Result<bool, SensorError> {
        if self.busy_polls == 0 {
            return Ok(false);
        }
        self.busy_polls -= 1;
        Ok(true)
    }

    async fn read(&mut self) -> Result<EnvironmentReading, SensorError> {
        self.reads += 1;
        if self.reads % 11 == 0 {
            return Err(SensorError::ReadFailed {
                sensor: "mock BME280",
                operation: "forced measurement",
            });
        }

        let t = self.started.elapsed().as_secs_f32();
        Ok(EnvironmentReading {
            temperature_c: 22.0 + 2.5 * (t / 90.0).sin(),
            pressure_pa: 101_325.0 + 150.0 * (t / 240.0).cos(),
            humidity_rh: 45.0 + 8.0 * (t / 150.0).sin(),
        })
    }
}

/// Uncalibrated ADC on a slowly discharging cell
struct MockBattery {
    code: u32,
}

impl MockBattery {
    /// Raw code for ~4.1 V at the cell
    const FULL: u32 = 3_358;
    /// Raw code for ~3.3 V at the cell
    const EMPTY: u32 = 2_703;
}

impl BatteryAdc for MockBattery {
    fn sample(&mut self) -> Result<AdcSample, SensorError> {
        let code = self.code.min(ADC_MAX_CODE);
        self.code = if self.code <= Self::EMPTY {
            Self::FULL
        } else {
            self.code - 1
        };
        Ok(AdcSample::Raw(code))
    }
}

/// Analog button reading the pull-up unless the peer holds it down
struct MockButton;

impl ButtonSense for MockButton {
    fn read_millivolts(&mut self) -> Result<u32, SensorError> {
        Ok(if BUTTON_HELD.load(Ordering::Relaxed) {
            BUTTON_PRESSED_BELOW_MV / 10
        } else {
            3_300
        })
    }
}

// ---------------------------------------------------------------------------
// Terminal panel
// ---------------------------------------------------------------------------

/// SSD1306 stand-in that prints the panel as half-block characters
struct TerminalPanel {
    display: SimulatorDisplay<BinaryColor>,
    framebuffer: MonoFrameBuffer,
    last_frame: Option<Frame>,
}

impl TerminalPanel {
    fn new() -> Self {
        Self {
            display: SimulatorDisplay::new(Size::new(
                DISPLAY_WIDTH_PX as u32,
                DISPLAY_HEIGHT_PX as u32,
            )),
            framebuffer: MonoFrameBuffer::new(),
            last_frame: None,
        }
    }

    fn lit(&self, x: i32, y: i32) -> bool {
        self.display.get_pixel(Point::new(x, y)) == BinaryColor::On
    }

    /// Two pixel rows per text row, framed by a border
    fn print(&self) {
        let width = DISPLAY_WIDTH_PX as usize;
        let mut out = String::with_capacity((width + 3) * (DISPLAY_HEIGHT_PX as usize / 2 + 2));
        out.push('+');
        out.push_str(&"-".repeat(width));
        out.push_str("+\n");
        for y in (0..DISPLAY_HEIGHT_PX as i32).step_by(2) {
            out.push('|');
            for x in 0..DISPLAY_WIDTH_PX as i32 {
                out.push(match (self.lit(x, y), self.lit(x, y + 1)) {
                    (true, true) => '█',
                    (true, false) => '▀',
                    (false, true) => '▄',
                    (false, false) => ' ',
                });
            }
            out.push_str("|\n");
        }
        out.push('+');
        out.push_str(&"-".repeat(width));
        out.push('+');
        println!("{out}");
    }
}

impl DisplayPanel for TerminalPanel {
    type Error = core::convert::Infallible;

    async fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error> {
        info!("Panel {}", if enabled { "on" } else { "off" });
        if !enabled {
            self.last_frame = None;
        }
        Ok(())
    }

    async fn show(&mut self, frame: &Frame) -> Result<(), Self::Error> {
        render_frame(frame, &mut self.framebuffer)?;
        self.framebuffer.flush(&mut self.display)?;
        if self.last_frame.as_ref() != Some(frame) {
            self.print();
            self.last_frame = Some(frame.clone());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted BLE peer
// ---------------------------------------------------------------------------

fn write(id: AttributeId, value: &[u8]) -> Result<(), AttError> {
    let result = SERVICE.write(id, Instant::now(), value);
    match result {
        Ok(()) => debug!("peer wrote {:?} = {:02x?}", id, value),
        Err(e) => info!("peer write {:?} = {:02x?} rejected: {}", id, value, e),
    }
    result
}

fn read(id: AttributeId) -> Vec<u8> {
    let mut buf = [0u8; 64];
    match SERVICE.read(id, Instant::now(), &mut buf) {
        Ok(len) => buf[..len].to_vec(),
        Err(e) => {
            warn!("peer read {:?} failed: {}", id, e);
            Vec::new()
        }
    }
}

fn read_f32(id: AttributeId) -> f32 {
    read(id)
        .try_into()
        .map(f32::from_le_bytes)
        .unwrap_or(f32::NAN)
}

fn connect(handle: u16) {
    SERVICE.on_gap_event(GapEvent::Connected { handle });
    info!("peer connected ({:?})", SERVICE.connection_state());
}

fn disconnect(reason: u8) {
    SERVICE.on_gap_event(GapEvent::Disconnected { reason });
    info!("peer disconnected ({:?})", SERVICE.connection_state());
}

async fn press_button() {
    BUTTON_HELD.store(true, Ordering::Relaxed);
    tokio::time::sleep(Duration::from_millis(150)).await;
    BUTTON_HELD.store(false, Ordering::Relaxed);
}

async fn peer_script() {
    tokio::time::sleep(Duration::from_secs(3)).await;
    connect(1);

    let unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let _ = write(AttributeId::TIME, &unix.to_le_bytes());
    // UTC+1
    let _ = write(AttributeId::TIMEZONE, &4i8.to_le_bytes());
    // Out of range, rejected
    let _ = write(AttributeId::TIMEZONE, &60i8.to_le_bytes());
    // Read-only, rejected
    let _ = write(AttributeId::PRESSURE, &0f32.to_le_bytes());

    let _ = write(AttributeId::SCRATCH, b"hello from the simulator");
    info!(
        "scratch reads back {:?}",
        String::from_utf8_lossy(&read(AttributeId::SCRATCH))
    );

    tokio::time::sleep(Duration::from_millis(3 * SAMPLE_PERIOD_MS)).await;
    info!("switching display to button mode");
    let _ = write(AttributeId::DISPLAY_MODE, &[2]);
    disconnect(0x13);

    let mut handle = 2;
    loop {
        tokio::time::sleep(Duration::from_secs(20)).await;
        press_button().await;

        tokio::time::sleep(Duration::from_secs(40)).await;
        connect(handle);
        let battery = read(AttributeId::BATTERY)
            .try_into()
            .map(u32::from_le_bytes)
            .unwrap_or_default();
        info!(
            "peer reads {:.1} C, {:.1} Pa, {:.1} %RH, battery {} mV",
            read_f32(AttributeId::TEMPERATURE),
            read_f32(AttributeId::PRESSURE),
            read_f32(AttributeId::HUMIDITY),
            battery
        );
        disconnect(0x13);
        handle = handle.wrapping_add(1);
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let config = BadgeConfig::from_build_env(option_env!("BADGE_NAME"), None);
    info!(
        "Starting badge simulator as {} ({:?})",
        config.name, config.temperature_unit
    );
    info!("Peer link: {:?}", SERVICE.connection_state());

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            tokio::task::spawn_local(async {
                Sampler::new(
                    &STATE.telemetry,
                    Some(MockEnvironment::new()),
                    Some(MockBattery {
                        code: MockBattery::FULL,
                    }),
                )
                .run()
                .await
            });
            tokio::task::spawn_local(async {
                PolledButton::new(&STATE.press_latch, MockButton).run().await
            });
            tokio::task::spawn_local(peer_script());

            let mut panel = TerminalPanel::new();
            DisplayModeController::new(&STATE, &STATE.press_latch, config.temperature_unit)
                .run(&mut panel)
                .await
        })
        .await
}
