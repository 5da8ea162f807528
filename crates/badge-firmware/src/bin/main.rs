#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use badge_core::async_i2c_bus::{I2cBusDevice, SharedI2cBus};
use badge_core::button::PolledButton;
use badge_core::config::ButtonStrategy;
use badge_core::display::DisplayModeController;
use badge_core::sensors::Sampler;
use badge_firmware::app_state::{
    AdcBattery, AdcButton, AppError, Bme280Sensor, I2cBus, STATE, SERVICE, Subsystem,
    init_analog, init_i2c_bus,
};
use badge_firmware::ble::{self, CONNECTIONS_MAX, L2CAP_CHANNELS_MAX};
use badge_firmware::oled::OledPanel;
use badge_firmware::{build_config, button_irq};
use embassy_executor::Spawner;
use esp_hal::clock::CpuClock;
use esp_hal::efuse::Efuse;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::ble::controller::BleConnector;
use log::{info, warn};
use static_cell::StaticCell;
use trouble_host::prelude::*;

/// Max number of command slots for the controller
const COMMAND_SLOTS: usize = 20;

type BleController = ExternalController<BleConnector<'static>, COMMAND_SLOTS>;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
esp_bootloader_esp_idf::esp_app_desc!();

#[embassy_executor::task]
async fn sampler_task(sensor: Option<Bme280Sensor>, battery: Option<AdcBattery>) {
    Sampler::new(&STATE.telemetry, sensor, battery).run().await
}

#[embassy_executor::task]
async fn display_task(mut panel: OledPanel) {
    let config = build_config();
    DisplayModeController::new(&STATE, &STATE.press_latch, config.temperature_unit)
        .run(&mut panel)
        .await
}

#[embassy_executor::task]
async fn button_poll_task(sense: AdcButton) {
    PolledButton::new(&STATE.press_latch, sense).run().await
}

#[embassy_executor::task]
async fn ble_runner_task(runner: &'static mut Runner<'static, BleController, DefaultPacketPool>) {
    info!("BLE runner starting");
    loop {
        if let Err(e) = runner.run().await {
            panic!("BLE runner error: {:?}", e);
        }
    }
}

fn ble_addr() -> Address {
    let mut addr = Efuse::mac_address();
    addr.reverse();
    Address::random(addr)
}

async fn init_environment_sensor(
    bus: &'static SharedI2cBus<I2cBus>,
) -> Result<Bme280Sensor, AppError> {
    Ok(Bme280Sensor::init(
        I2cBusDevice::new(bus, "bme280"),
        I2cBusDevice::new(bus, "bme280-registers"),
    )
    .await?)
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = build_config();
    info!(
        "Badge starting as {} ({:?} button, {:?})",
        config.name, config.button_strategy, config.temperature_unit
    );

    let peripherals =
        esp_hal::init(esp_hal::Config::default().with_cpu_clock(CpuClock::_80MHz));

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 66320);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // --- Shared I2C bus: environment sensor and display ---
    let (sensor, panel) = match init_i2c_bus(peripherals.I2C0, peripherals.GPIO5, peripherals.GPIO6)
    {
        Ok(bus) => {
            let sensor = init_environment_sensor(bus)
                .await
                .inspect_err(|e| STATE.subsystems.degrade(e))
                .ok();
            let panel = OledPanel::init(I2cBusDevice::new(bus, "ssd1306"))
                .await
                .inspect_err(|e| STATE.subsystems.degrade(e))
                .ok();
            (sensor, panel)
        }
        Err(e) => {
            STATE.subsystems.degrade(&e);
            STATE.subsystems.disable(Subsystem::Display);
            (None, None)
        }
    };

    // --- Button strategy decides who owns GPIO4 ---
    let (button_adc_pin, button_gpio) = match config.button_strategy {
        ButtonStrategy::Polled => (Some(peripherals.GPIO4), None),
        ButtonStrategy::EdgeTriggered => (None, Some(peripherals.GPIO4)),
    };
    let analog = init_analog(peripherals.ADC1, peripherals.GPIO3, button_adc_pin);

    spawner.must_spawn(sampler_task(sensor, Some(AdcBattery::new(analog))));

    match panel {
        Some(panel) => spawner.must_spawn(display_task(panel)),
        None => warn!("Running without a display"),
    }

    match button_gpio {
        Some(pin) => button_irq::install(peripherals.IO_MUX, pin, peripherals.GPIO8),
        None => spawner.must_spawn(button_poll_task(AdcButton::new(analog))),
    }

    // --- BLE host ---
    // A badge without its radio is useless, so these failures are fatal.
    static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    let radio = RADIO.init(esp_radio::init().expect("Failed to initialize BLE controller"));
    let connector = BleConnector::new(radio, peripherals.BT, Default::default())
        .expect("Failed to create BLE connector");
    let controller: BleController = ExternalController::new(connector);

    static HOST_RESOURCES: StaticCell<
        HostResources<DefaultPacketPool, CONNECTIONS_MAX, L2CAP_CHANNELS_MAX>,
    > = StaticCell::new();
    let resources = HOST_RESOURCES.init(HostResources::new());

    static STACK: StaticCell<Stack<'static, BleController, DefaultPacketPool>> =
        StaticCell::new();
    let stack = STACK.init(trouble_host::new(controller, resources).set_random_address(ble_addr()));

    static HOST: StaticCell<Host<'static, BleController, DefaultPacketPool>> = StaticCell::new();
    let &mut Host {
        ref mut peripheral,
        ref mut runner,
        ..
    } = HOST.init(stack.build());

    spawner.must_spawn(ble_runner_task(runner));

    ble::run(config.name, &SERVICE, peripheral).await
}
