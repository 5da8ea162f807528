//! Concrete sensor adapters for the badge hardware
//!
//! Each adapter implements one of `badge_core`'s sensor traits on top of the
//! ESP32-C3 peripherals created in [`super::hardware`].

use badge_core::button::ButtonSense;
use badge_core::sensors::{AdcSample, BatteryAdc, EnvironmentSensor, SensorError};
use badge_core::telemetry::EnvironmentReading;
use bme280::i2c::AsyncBME280;
use embassy_time::Delay;
use embedded_hal_async::i2c::I2c as _;
use log::info;

use super::{BusDevice, SharedAnalog};

const BME280_ADDRESS: u8 = 0x76;
const BME280_STATUS_REGISTER: u8 = 0xF3;
const BME280_STATUS_MEASURING: u8 = 1 << 3;
const BME280_CTRL_MEAS_REGISTER: u8 = 0xF4;
/// Temperature and pressure oversampling x1 (driver default), forced mode
const BME280_CTRL_MEAS_FORCED: u8 = 0b001_001_01;

/// BME280 temperature / pressure / humidity sensor on the shared bus
///
/// The driver only offers a blocking "force, wait, read" call, so a sample
/// is triggered through the register handle, watched via the status
/// register, and then read out by the driver. The readout runs one more
/// short forced conversion of its own.
pub struct Bme280Sensor {
    driver: AsyncBME280<BusDevice>,
    /// Second handle for control and status registers; the driver owns the
    /// first
    registers: BusDevice,
}

impl Bme280Sensor {
    /// Probe and configure the sensor
    pub async fn init(driver_bus: BusDevice, register_bus: BusDevice) -> Result<Self, SensorError> {
        let mut driver = AsyncBME280::new_primary(driver_bus);
        driver
            .init(&mut Delay)
            .await
            .map_err(|_| SensorError::InitializationFailed {
                sensor: "BME280",
                details: "chip did not respond to init",
            })?;
        info!("BME280 ready at 0x{:02x}", BME280_ADDRESS);
        Ok(Self {
            driver,
            registers: register_bus,
        })
    }
}

impl EnvironmentSensor for Bme280Sensor {
    fn name(&self) -> &'static str {
        "BME280"
    }

    async fn start_conversion(&mut self) -> Result<(), SensorError> {
        self.registers
            .write(
                BME280_ADDRESS,
                &[BME280_CTRL_MEAS_REGISTER, BME280_CTRL_MEAS_FORCED],
            )
            .await
            .map_err(|_| SensorError::ReadFailed {
                sensor: "BME280",
                operation: "trigger conversion",
            })
    }

    async fn is_sampling(&mut self) -> Result<bool, SensorError> {
        let mut status = [0u8; 1];
        self.registers
            .write_read(BME280_ADDRESS, &[BME280_STATUS_REGISTER], &mut status)
            .await
            .map_err(|_| SensorError::ReadFailed {
                sensor: "BME280",
                operation: "status register",
            })?;
        Ok(status[0] & BME280_STATUS_MEASURING != 0)
    }

    async fn read(&mut self) -> Result<EnvironmentReading, SensorError> {
        let measurement =
            self.driver
                .measure(&mut Delay)
                .await
                .map_err(|_| SensorError::ReadFailed {
                    sensor: "BME280",
                    operation: "forced measurement",
                })?;
        Ok(EnvironmentReading {
            temperature_c: measurement.temperature,
            pressure_pa: measurement.pressure,
            humidity_rh: measurement.humidity,
        })
    }
}

/// Battery divider tap on ADC1 channel 3
pub struct AdcBattery {
    analog: &'static SharedAnalog,
}

impl AdcBattery {
    pub fn new(analog: &'static SharedAnalog) -> Self {
        Self { analog }
    }
}

impl BatteryAdc for AdcBattery {
    fn sample(&mut self) -> Result<AdcSample, SensorError> {
        self.analog.lock(|inputs| {
            let inputs = &mut *inputs.borrow_mut();
            let mv = nb::block!(inputs.adc.read_oneshot(&mut inputs.battery)).map_err(|_| {
                SensorError::ReadFailed {
                    sensor: "battery ADC",
                    operation: "oneshot conversion",
                }
            })?;
            Ok(AdcSample::Calibrated(mv.into()))
        })
    }
}

/// Analog button on ADC1 channel 4
pub struct AdcButton {
    analog: &'static SharedAnalog,
}

impl AdcButton {
    pub fn new(analog: &'static SharedAnalog) -> Self {
        Self { analog }
    }
}

impl ButtonSense for AdcButton {
    fn read_millivolts(&mut self) -> Result<u32, SensorError> {
        const READ_FAILED: SensorError = SensorError::ReadFailed {
            sensor: "button ADC",
            operation: "oneshot conversion",
        };
        self.analog.lock(|inputs| {
            let inputs = &mut *inputs.borrow_mut();
            let pin = inputs.button.as_mut().ok_or(READ_FAILED)?;
            let mv = nb::block!(inputs.adc.read_oneshot(pin)).map_err(|_| READ_FAILED)?;
            Ok(mv.into())
        })
    }
}
