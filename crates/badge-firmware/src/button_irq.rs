//! Edge-triggered button strategy: GPIO interrupt handler
//!
//! The handler runs in interrupt context. It only touches the press latch
//! (atomics) and the LED pin, both owned by the handler's static.

use core::cell::RefCell;

use badge_core::button::{EdgeTriggeredButton, InterruptContext};
use critical_section::Mutex;
use embassy_time::Instant;
use esp_hal::gpio::{Event, Input, InputConfig, Io, Level, Output, OutputConfig, Pull};
use esp_hal::handler;
use esp_hal::peripherals::{GPIO4, GPIO8, IO_MUX};
use log::info;

use crate::app_state::STATE;

struct EdgeButton {
    input: Input<'static>,
    monitor: EdgeTriggeredButton<'static, Output<'static>>,
}

static BUTTON: Mutex<RefCell<Option<EdgeButton>>> = Mutex::new(RefCell::new(None));

/// Arm the falling-edge interrupt on GPIO4 and hand the LED on GPIO8 to the
/// handler
pub fn install(io_mux: IO_MUX<'static>, button: GPIO4<'static>, led: GPIO8<'static>) {
    let mut io = Io::new(io_mux);
    io.set_interrupt_handler(on_gpio);

    let mut input = Input::new(button, InputConfig::default().with_pull(Pull::Up));
    let led = Output::new(led, Level::Low, OutputConfig::default());

    critical_section::with(|cs| {
        input.listen(Event::FallingEdge);
        BUTTON.borrow_ref_mut(cs).replace(EdgeButton {
            input,
            monitor: EdgeTriggeredButton::new(&STATE.press_latch, Some(led)),
        });
    });
    info!("Button armed on GPIO4 (edge-triggered, LED on GPIO8)");
}

#[handler]
fn on_gpio() {
    let now = Instant::now();
    critical_section::with(|cs| {
        if let Some(button) = BUTTON.borrow_ref_mut(cs).as_mut()
            && button.input.is_interrupt_set()
        {
            button.monitor.on_edge(now, InterruptContext::enter());
            button.input.clear_interrupt();
        }
    });
}
