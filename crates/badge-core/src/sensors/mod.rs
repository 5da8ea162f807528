//! Sensor traits and the periodic sampler
//!
//! The sampler is the only writer of [`TelemetryStore`]. Bus-level drivers
//! live in the firmware crate and plug in through [`EnvironmentSensor`] and
//! [`BatteryAdc`].

mod battery;

pub use battery::*;

use embassy_time::{Duration, Timer, with_timeout};
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::config::{
    SAMPLE_PERIOD_MS, SAMPLE_READY_MAX_POLLS, SAMPLE_READY_POLL_MS, SAMPLE_TIMEOUT_MS,
    SENSOR_FAILURE_WARN_THRESHOLD,
};
use crate::telemetry::{EnvironmentReading, TelemetryStore};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor} initialization failed: {details}")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor} read failed during {operation}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor} timed out during {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
}

/// Temperature / pressure / humidity sensor
///
/// One sample is `start_conversion`, then `is_sampling` until it reports
/// `false`, then `read`.
pub trait EnvironmentSensor {
    /// Short name used in log lines
    fn name(&self) -> &'static str;

    /// Kick off a new conversion
    fn start_conversion(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Whether a conversion is still in progress
    fn is_sampling(&mut self) -> impl Future<Output = Result<bool, SensorError>>;

    /// Read the last completed conversion
    fn read(&mut self) -> impl Future<Output = Result<EnvironmentReading, SensorError>>;
}

/// Periodic sampling task writing into a [`TelemetryStore`]
pub struct Sampler<'a, S, B> {
    store: &'a TelemetryStore,
    sensor: Option<S>,
    battery: Option<BatteryMonitor<B>>,
    consecutive_failures: u32,
}

impl<'a, S, B> Sampler<'a, S, B>
where
    S: EnvironmentSensor,
    B: BatteryAdc,
{
    /// A missing sensor or battery ADC disables that half of the cycle.
    pub fn new(store: &'a TelemetryStore, sensor: Option<S>, battery: Option<B>) -> Self {
        Self {
            store,
            sensor,
            battery: battery.map(BatteryMonitor::new),
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Wait (bounded) for the sensor to finish its conversion
    async fn wait_ready(sensor: &mut S) -> Result<(), SensorError> {
        for _ in 0..SAMPLE_READY_MAX_POLLS {
            if !sensor.is_sampling().await? {
                return Ok(());
            }
            Timer::after_millis(SAMPLE_READY_POLL_MS).await;
        }
        Err(SensorError::Timeout {
            sensor: sensor.name(),
            operation: "wait for sample ready",
        })
    }

    /// Trigger, wait and read, all within [`SAMPLE_TIMEOUT_MS`]
    async fn sample_environment(sensor: &mut S) -> Result<EnvironmentReading, SensorError> {
        let name = sensor.name();
        let sample = async {
            sensor.start_conversion().await?;
            Self::wait_ready(sensor).await?;
            sensor.read().await
        };
        with_timeout(Duration::from_millis(SAMPLE_TIMEOUT_MS), sample)
            .await
            .map_err(|_| SensorError::Timeout {
                sensor: name,
                operation: "sample",
            })?
    }

    /// Run one sampling cycle: environment first, then battery.
    ///
    /// Failures are logged and leave the store's last-known-good values in
    /// place.
    pub async fn sample_once(&mut self) {
        if let Some(sensor) = self.sensor.as_mut() {
            match Self::sample_environment(sensor).await {
                Ok(reading) => {
                    let generation = self.store.publish_environment(reading);
                    self.consecutive_failures = 0;
                    info!(
                        "Temperature: {:.2} °C, Pressure: {:.2} hPa, Humidity: {:.2} % (gen {})",
                        reading.temperature_c,
                        reading.pressure_pa / 100.0,
                        reading.humidity_rh,
                        generation
                    );
                }
                Err(e) => {
                    self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                    if self.consecutive_failures == SENSOR_FAILURE_WARN_THRESHOLD {
                        error!(
                            "{} failed {} times in a row: {}",
                            sensor.name(),
                            self.consecutive_failures,
                            e
                        );
                    } else {
                        warn!("Sample failed: {}", e);
                    }
                }
            }
        }

        if let Some(battery) = self.battery.as_mut() {
            match battery.read_battery_mv() {
                Ok(mv) => {
                    self.store.set_battery_mv(mv);
                    debug!("Battery: {} mV", mv);
                }
                Err(e) => warn!("Battery read failed: {}", e),
            }
        }
    }

    /// Sample forever at [`SAMPLE_PERIOD_MS`]
    pub async fn run(&mut self) -> ! {
        info!(
            "Sampler started (sensor: {}, battery: {})",
            self.sensor.is_some(),
            self.battery.is_some()
        );
        loop {
            self.sample_once().await;
            Timer::after_millis(SAMPLE_PERIOD_MS).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    /// Sensor that replays a fixed sequence of results
    struct FakeSensor {
        busy_polls: u32,
        results: &'static [Result<EnvironmentReading, SensorError>],
        next: usize,
        polls: u32,
        conversions: u32,
    }

    impl FakeSensor {
        fn new(
            busy_polls: u32,
            results: &'static [Result<EnvironmentReading, SensorError>],
        ) -> Self {
            Self {
                busy_polls,
                results,
                next: 0,
                polls: 0,
                conversions: 0,
            }
        }
    }

    impl EnvironmentSensor for FakeSensor {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn start_conversion(&mut self) -> Result<(), SensorError> {
            self.conversions += 1;
            self.polls = 0;
            Ok(())
        }

        async fn is_sampling(&mut self) -> Result<bool, SensorError> {
            self.polls += 1;
            Ok(self.polls <= self.busy_polls)
        }

        async fn read(&mut self) -> Result<EnvironmentReading, SensorError> {
            let result = self.results[self.next.min(self.results.len() - 1)];
            self.next += 1;
            result
        }
    }

    /// Sensor whose readout never completes
    struct HungBus;

    impl EnvironmentSensor for HungBus {
        fn name(&self) -> &'static str {
            "hung"
        }

        async fn start_conversion(&mut self) -> Result<(), SensorError> {
            Ok(())
        }

        async fn is_sampling(&mut self) -> Result<bool, SensorError> {
            Ok(false)
        }

        async fn read(&mut self) -> Result<EnvironmentReading, SensorError> {
            core::future::pending().await
        }
    }

    struct FixedAdc(AdcSample);

    impl BatteryAdc for FixedAdc {
        fn sample(&mut self) -> Result<AdcSample, SensorError> {
            Ok(self.0)
        }
    }

    const READING: EnvironmentReading = EnvironmentReading {
        temperature_c: 22.5,
        pressure_pa: 101_320.0,
        humidity_rh: 45.0,
    };

    const READ_ERROR: SensorError = SensorError::ReadFailed {
        sensor: "fake",
        operation: "readout",
    };

    #[test]
    fn test_successful_cycle_publishes_reading_and_battery() {
        static RESULTS: [Result<EnvironmentReading, SensorError>; 1] = [Ok(READING)];
        let store = TelemetryStore::new();
        let mut sampler = Sampler::new(
            &store,
            Some(FakeSensor::new(2, &RESULTS)),
            Some(FixedAdc(AdcSample::Calibrated(1_950))),
        );

        block_on(sampler.sample_once());

        assert_eq!(store.environment(), Some(READING));
        assert_eq!(store.battery_mv(), 3_900);
        let sensor = sampler.sensor.as_ref().unwrap();
        assert_eq!(sensor.conversions, 1);
        // Busy twice after the trigger, then ready
        assert_eq!(sensor.polls, 3);
    }

    #[test]
    fn test_failed_read_keeps_last_known_good() {
        static RESULTS: [Result<EnvironmentReading, SensorError>; 2] = [Ok(READING), Err(READ_ERROR)];
        let store = TelemetryStore::new();
        let mut sampler = Sampler::new(
            &store,
            Some(FakeSensor::new(0, &RESULTS)),
            None::<FixedAdc>,
        );

        block_on(sampler.sample_once());
        block_on(sampler.sample_once());

        assert!(store.is_valid());
        assert_eq!(store.environment(), Some(READING));
        assert_eq!(store.snapshot().generation, 1);
        assert_eq!(sampler.consecutive_failures(), 1);
    }

    #[test]
    fn test_stuck_sensor_times_out() {
        static RESULTS: [Result<EnvironmentReading, SensorError>; 1] = [Ok(READING)];
        let store = TelemetryStore::new();
        let mut sampler = Sampler::new(
            &store,
            Some(FakeSensor::new(u32::MAX, &RESULTS)),
            Some(FixedAdc(AdcSample::Calibrated(2_000))),
        );

        block_on(sampler.sample_once());

        // Never ready: no environmental data, battery still sampled
        assert!(!store.is_valid());
        assert_eq!(store.battery_mv(), 4_000);
        assert_eq!(sampler.consecutive_failures(), 1);
        let sensor = sampler.sensor.as_ref().unwrap();
        assert_eq!(sensor.polls, SAMPLE_READY_MAX_POLLS);
        assert_eq!(sensor.next, 0);
    }

    #[test]
    fn test_hung_read_times_out_and_battery_is_still_sampled() {
        let store = TelemetryStore::new();
        let mut sampler = Sampler::new(
            &store,
            Some(HungBus),
            Some(FixedAdc(AdcSample::Calibrated(1_900))),
        );

        let finished = block_on(with_timeout(
            Duration::from_millis(SAMPLE_TIMEOUT_MS + 2_000),
            sampler.sample_once(),
        ));

        assert!(finished.is_ok());
        assert!(!store.is_valid());
        assert_eq!(store.battery_mv(), 3_800);
        assert_eq!(sampler.consecutive_failures(), 1);
    }

    #[test]
    fn test_missing_sensor_still_samples_battery() {
        let store = TelemetryStore::new();
        let mut sampler: Sampler<'_, FakeSensor, FixedAdc> =
            Sampler::new(&store, None, Some(FixedAdc(AdcSample::Raw(4_095))));

        block_on(sampler.sample_once());

        assert!(!store.is_valid());
        assert_eq!(store.battery_mv(), 5_000);
    }
}
