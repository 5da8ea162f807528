//! Shared async I2C bus
//!
//! The environmental sensor and the OLED sit on the same two wires. Each
//! driver gets its own [`I2cBusDevice`] handle; the handles serialise whole
//! transactions through an async mutex, so a long display flush yields to the
//! executor instead of spinning while the sampler waits for the bus.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};
use log::debug;

/// The bus itself, shared by reference between devices
pub type SharedI2cBus<T> = Mutex<CriticalSectionRawMutex, T>;

/// One driver's handle on a [`SharedI2cBus`]
pub struct I2cBusDevice<'a, T> {
    bus: &'a SharedI2cBus<T>,
    label: &'static str,
}

impl<'a, T> I2cBusDevice<'a, T> {
    /// `label` names the device in bus error logs
    #[inline]
    pub const fn new(bus: &'a SharedI2cBus<T>, label: &'static str) -> Self {
        Self { bus, label }
    }

    fn log_failure<E: core::fmt::Debug>(&self, address: u8, result: &Result<(), E>) {
        if let Err(e) = result {
            debug!("{} I2C transfer at 0x{:02x} failed: {:?}", self.label, address, e);
        }
    }
}

impl<T> ErrorType for I2cBusDevice<'_, T>
where
    T: ErrorType,
{
    type Error = T::Error;
}

impl<T> I2c for I2cBusDevice<'_, T>
where
    T: I2c,
{
    async fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        let result = self.bus.lock().await.read(address, read).await;
        self.log_failure(address, &result);
        result
    }

    async fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        let result = self.bus.lock().await.write(address, write).await;
        self.log_failure(address, &result);
        result
    }

    async fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        let result = self.bus.lock().await.write_read(address, write, read).await;
        self.log_failure(address, &result);
        result
    }

    /// The bus stays locked for every operation of the transaction
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let result = self.bus.lock().await.transaction(address, operations).await;
        self.log_failure(address, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embedded_hal_async::i2c::ErrorKind;

    /// Register file answering only at one address
    struct FakeBus {
        address: u8,
        registers: [u8; 4],
        pointer: usize,
    }

    impl ErrorType for FakeBus {
        type Error = ErrorKind;
    }

    impl I2c for FakeBus {
        async fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if address != self.address {
                return Err(ErrorKind::NoAcknowledge(
                    embedded_hal_async::i2c::NoAcknowledgeSource::Address,
                ));
            }
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        if let Some((&reg, data)) = bytes.split_first() {
                            self.pointer = reg as usize;
                            for (i, b) in data.iter().enumerate() {
                                self.registers[self.pointer + i] = *b;
                            }
                        }
                    }
                    Operation::Read(buf) => {
                        buf.copy_from_slice(&self.registers[self.pointer..self.pointer + buf.len()]);
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_devices_share_one_bus() {
        let bus = SharedI2cBus::new(FakeBus {
            address: 0x76,
            registers: [0; 4],
            pointer: 0,
        });
        let mut sensor = I2cBusDevice::new(&bus, "sensor");
        let mut other = I2cBusDevice::new(&bus, "other");

        block_on(sensor.write(0x76, &[1, 0xAB, 0xCD])).unwrap();
        let mut buf = [0u8; 2];
        block_on(other.write_read(0x76, &[1], &mut buf)).unwrap();
        assert_eq!(buf, [0xAB, 0xCD]);

        assert!(block_on(other.read(0x3C, &mut buf)).is_err());
    }
}
