//! Hardware initialization for the badge
//!
//! Pin map (ESP32-C3 badge board):
//! - I2C0: SDA = GPIO5, SCL = GPIO6 (BME280 and SSD1306)
//! - ADC1 channel 3 (GPIO3): battery divider tap
//! - ADC1 channel 4 (GPIO4): button, active low with pull-up
//! - GPIO8: status LED

use core::cell::RefCell;

use badge_core::async_i2c_bus::{I2cBusDevice, SharedI2cBus};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use esp_hal::analog::adc::{Adc, AdcCalCurve, AdcConfig, AdcPin, Attenuation};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::peripherals::{ADC1, GPIO3, GPIO4, GPIO5, GPIO6, I2C0};
use esp_hal::time::Rate;
use esp_hal::{Async, Blocking};
use log::info;
use static_cell::StaticCell;

use super::{AppError, Subsystem};

pub type I2cBus = I2c<'static, Async>;

/// A driver's handle on the shared I2C bus
pub type BusDevice = I2cBusDevice<'static, I2cBus>;

type Calibration = AdcCalCurve<ADC1<'static>>;

/// ADC1 with the battery and button channels, calibrated to millivolts
pub struct AnalogInputs {
    pub(crate) adc: Adc<'static, ADC1<'static>, Blocking>,
    pub(crate) battery: AdcPin<GPIO3<'static>, ADC1<'static>, Calibration>,
    /// Absent when the button is wired to the GPIO interrupt instead
    pub(crate) button: Option<AdcPin<GPIO4<'static>, ADC1<'static>, Calibration>>,
}

/// [`AnalogInputs`] shared between the sampler and the button poll task
pub type SharedAnalog = Mutex<CriticalSectionRawMutex, RefCell<AnalogInputs>>;

/// Create the I2C master at 400 kHz and share it
pub fn init_i2c_bus(
    i2c0: I2C0<'static>,
    sda: GPIO5<'static>,
    scl: GPIO6<'static>,
) -> Result<&'static SharedI2cBus<I2cBus>, AppError> {
    static I2C0_BUS: StaticCell<SharedI2cBus<I2cBus>> = StaticCell::new();

    let i2c = I2c::new(i2c0, I2cConfig::default().with_frequency(Rate::from_khz(400)))
        .map_err(|e| AppError::configuration(Subsystem::EnvironmentSensor, e))?
        .with_sda(sda)
        .with_scl(scl)
        .into_async();

    info!("I2C initialized on SDA=5, SCL=6");
    Ok(I2C0_BUS.init(SharedI2cBus::new(i2c)))
}

/// Configure the ADC1 channels with 11 dB attenuation (~0-2.5 V)
pub fn init_analog(
    adc1: ADC1<'static>,
    battery_pin: GPIO3<'static>,
    button_pin: Option<GPIO4<'static>>,
) -> &'static SharedAnalog {
    static ANALOG: StaticCell<SharedAnalog> = StaticCell::new();

    let mut config = AdcConfig::new();
    let battery = config.enable_pin_with_cal::<_, Calibration>(battery_pin, Attenuation::_11dB);
    let button =
        button_pin.map(|pin| config.enable_pin_with_cal::<_, Calibration>(pin, Attenuation::_11dB));
    let adc = Adc::new(adc1, config);

    ANALOG.init(Mutex::new(RefCell::new(AnalogInputs {
        adc,
        battery,
        button,
    })))
}
