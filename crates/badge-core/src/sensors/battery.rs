use log::warn;

use super::SensorError;
use crate::config::{ADC_FULL_SCALE_MV, ADC_MAX_CODE, BATTERY_DIVIDER_RATIO};

/// One ADC conversion of the battery divider tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcSample {
    /// Pin voltage from a calibrated conversion
    Calibrated(u32),
    /// Raw 12-bit code; calibration was unavailable
    Raw(u32),
}

impl AdcSample {
    /// Voltage at the ADC pin
    pub fn pin_millivolts(self) -> u32 {
        match self {
            Self::Calibrated(mv) => mv,
            Self::Raw(code) => code.min(ADC_MAX_CODE) * ADC_FULL_SCALE_MV / ADC_MAX_CODE,
        }
    }
}

/// Single-shot ADC channel wired to the battery divider
pub trait BatteryAdc {
    fn sample(&mut self) -> Result<AdcSample, SensorError>;
}

/// Converts divider-tap samples into cell voltage
pub struct BatteryMonitor<A> {
    adc: A,
    warned_uncalibrated: bool,
}

impl<A: BatteryAdc> BatteryMonitor<A> {
    pub fn new(adc: A) -> Self {
        Self {
            adc,
            warned_uncalibrated: false,
        }
    }

    /// Battery cell voltage in millivolts
    pub fn read_battery_mv(&mut self) -> Result<u32, SensorError> {
        let sample = self.adc.sample()?;
        if matches!(sample, AdcSample::Raw(_)) && !self.warned_uncalibrated {
            warn!("ADC calibration unavailable, using linear conversion");
            self.warned_uncalibrated = true;
        }
        Ok(sample.pin_millivolts() * BATTERY_DIVIDER_RATIO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sequence<'a>(&'a [AdcSample], usize);

    impl BatteryAdc for Sequence<'_> {
        fn sample(&mut self) -> Result<AdcSample, SensorError> {
            let sample = self.0[self.1];
            self.1 += 1;
            Ok(sample)
        }
    }

    #[test]
    fn test_linear_fallback_scale() {
        assert_eq!(AdcSample::Raw(0).pin_millivolts(), 0);
        assert_eq!(AdcSample::Raw(4_095).pin_millivolts(), 2_500);
        assert_eq!(AdcSample::Raw(2_048).pin_millivolts(), 1_250);
        // Out-of-range codes are clamped to full scale
        assert_eq!(AdcSample::Raw(9_999).pin_millivolts(), 2_500);
    }

    #[test]
    fn test_divider_doubles_pin_voltage() {
        let samples = [AdcSample::Calibrated(1_850), AdcSample::Raw(3_276)];
        let mut monitor = BatteryMonitor::new(Sequence(&samples, 0));
        assert_eq!(monitor.read_battery_mv(), Ok(3_700));
        assert_eq!(monitor.read_battery_mv(), Ok(4_000));
        assert!(monitor.warned_uncalibrated);
    }
}
