//! Custom GATT service: attribute access and connection lifecycle
//!
//! The BLE host hands every characteristic read or write to
//! [`AttributeService::access`] as an [`AttributeOp`]. The service looks the
//! attribute up in a static handler table and either serialises the current
//! value or validates and applies the incoming bytes. Handlers only touch the
//! in-memory state in [`BadgeState`]; they never block on a bus.
//!
//! GAP events go through [`AttributeService::on_gap_event`], a two-state
//! machine that always asks for advertising to resume when no peer is
//! connected.

mod attributes;

pub use attributes::*;

use core::sync::atomic::{AtomicU8, Ordering};

use embassy_time::Instant;
use log::{debug, info, warn};
use thiserror_no_std::Error;

use crate::app_state::BadgeState;

/// Rejections returned to the peer as ATT error codes
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttError {
    #[error("invalid attribute value length")]
    InvalidLength,
    #[error("response buffer too small")]
    InsufficientResources,
    #[error("attribute is not readable")]
    ReadNotPermitted,
    #[error("attribute is not writable")]
    WriteNotPermitted,
    #[error("attribute not found")]
    AttributeNotFound,
    #[error("value not allowed")]
    InvalidValue,
}

impl AttError {
    /// ATT protocol error code
    pub const fn code(self) -> u8 {
        match self {
            Self::ReadNotPermitted => 0x02,
            Self::WriteNotPermitted => 0x03,
            Self::AttributeNotFound => 0x0A,
            Self::InvalidLength => 0x0D,
            Self::InsufficientResources => 0x11,
            Self::InvalidValue => 0x13,
        }
    }
}

/// One request from a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeOp<'a> {
    Read,
    Write(&'a [u8]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Advertising = 0,
    Connected = 1,
}

/// Link-layer events reported by the BLE host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapEvent {
    Connected { handle: u16 },
    ConnectFailed { status: u8 },
    Disconnected { reason: u8 },
    /// The advertising window elapsed without a connection
    AdvertisingComplete,
}

/// What the BLE loop must do after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapAction {
    None,
    StartAdvertising,
}

/// Attribute table plus the advertise/connect state machine
pub struct AttributeService<'a> {
    state: &'a BadgeState,
    connection: AtomicU8,
}

impl<'a> AttributeService<'a> {
    pub const fn new(state: &'a BadgeState) -> Self {
        Self {
            state,
            connection: AtomicU8::new(ConnectionState::Advertising as u8),
        }
    }

    /// Route `op` on attribute `id` to its handler.
    ///
    /// Reads serialise into `out` and return the number of bytes written.
    /// Writes return 0 and leave all state untouched on error.
    pub fn access(
        &self,
        id: AttributeId,
        op: AttributeOp<'_>,
        now: Instant,
        out: &mut [u8],
    ) -> Result<usize, AttError> {
        let attribute = lookup(id).ok_or(AttError::AttributeNotFound)?;
        let result = match op {
            AttributeOp::Read => match attribute.read {
                Some(read) => read(self.state, now, out),
                None => Err(AttError::ReadNotPermitted),
            },
            AttributeOp::Write(value) => match attribute.write {
                Some(write) => write(self.state, now, value).map(|()| 0),
                None => Err(AttError::WriteNotPermitted),
            },
        };
        match &result {
            Ok(_) => debug!("{} {:?} ok", attribute.name, op),
            Err(e) => warn!("{} access rejected: {}", attribute.name, e),
        }
        result
    }

    /// Read `id` into `out`
    pub fn read(&self, id: AttributeId, now: Instant, out: &mut [u8]) -> Result<usize, AttError> {
        self.access(id, AttributeOp::Read, now, out)
    }

    /// Write `value` to `id`
    pub fn write(&self, id: AttributeId, now: Instant, value: &[u8]) -> Result<(), AttError> {
        self.access(id, AttributeOp::Write(value), now, &mut []).map(|_| ())
    }

    pub fn connection_state(&self) -> ConnectionState {
        match self.connection.load(Ordering::Acquire) {
            1 => ConnectionState::Connected,
            _ => ConnectionState::Advertising,
        }
    }

    fn set_connection_state(&self, state: ConnectionState) {
        self.connection.store(state as u8, Ordering::Release);
    }

    /// Advance the connection state machine
    pub fn on_gap_event(&self, event: GapEvent) -> GapAction {
        match event {
            GapEvent::Connected { handle } => {
                info!("Connection established; handle={}", handle);
                self.set_connection_state(ConnectionState::Connected);
                GapAction::None
            }
            GapEvent::ConnectFailed { status } => {
                warn!("Connection failed; status={}", status);
                self.set_connection_state(ConnectionState::Advertising);
                GapAction::StartAdvertising
            }
            GapEvent::Disconnected { reason } => {
                info!("Disconnected; reason={}", reason);
                self.set_connection_state(ConnectionState::Advertising);
                GapAction::StartAdvertising
            }
            GapEvent::AdvertisingComplete => {
                debug!("Advertising window elapsed");
                self.set_connection_state(ConnectionState::Advertising);
                GapAction::StartAdvertising
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayMode;
    use crate::telemetry::EnvironmentReading;

    fn at(secs: u64) -> Instant {
        Instant::from_secs(secs)
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AttError::InvalidLength.code(), 0x0D);
        assert_eq!(AttError::InsufficientResources.code(), 0x11);
        assert_eq!(AttError::InvalidValue.code(), 0x13);
        assert_eq!(AttError::AttributeNotFound.code(), 0x0A);
    }

    #[test]
    fn test_scratch_last_write_wins() {
        let state = BadgeState::new();
        let service = AttributeService::new(&state);
        let mut out = [0u8; 64];

        assert_eq!(service.read(AttributeId::SCRATCH, at(0), &mut out), Ok(0));

        for value in [&b"hello"[..], &[0xAA; 64][..], &b""[..], &b"xyz"[..]] {
            service.write(AttributeId::SCRATCH, at(0), value).unwrap();
            let n = service.read(AttributeId::SCRATCH, at(0), &mut out).unwrap();
            assert_eq!(&out[..n], value);
        }
    }

    #[test]
    fn test_scratch_overlong_write_rejected() {
        let state = BadgeState::new();
        let service = AttributeService::new(&state);
        service.write(AttributeId::SCRATCH, at(0), b"keep").unwrap();

        let result = service.write(AttributeId::SCRATCH, at(0), &[1u8; 65]);
        assert_eq!(result, Err(AttError::InvalidLength));

        let mut out = [0u8; 64];
        let n = service.read(AttributeId::SCRATCH, at(0), &mut out).unwrap();
        assert_eq!(&out[..n], b"keep");
    }

    #[test]
    fn test_read_into_short_buffer() {
        let state = BadgeState::new();
        let service = AttributeService::new(&state);
        let mut out = [0u8; 3];
        assert_eq!(
            service.read(AttributeId::PRESSURE, at(0), &mut out),
            Err(AttError::InsufficientResources)
        );
        service.write(AttributeId::SCRATCH, at(0), b"four").unwrap();
        assert_eq!(
            service.read(AttributeId::SCRATCH, at(0), &mut out),
            Err(AttError::InsufficientResources)
        );
    }

    #[test]
    fn test_time_write_then_read_tracks_elapsed_time() {
        let state = BadgeState::new();
        let service = AttributeService::new(&state);
        let written = 1_700_000_000i64;
        service
            .write(AttributeId::TIME, at(10), &written.to_le_bytes())
            .unwrap();

        let mut out = [0u8; 8];
        assert_eq!(service.read(AttributeId::TIME, at(10), &mut out), Ok(8));
        assert_eq!(i64::from_le_bytes(out), written);
        service.read(AttributeId::TIME, at(25), &mut out).unwrap();
        assert_eq!(i64::from_le_bytes(out), written + 15);
    }

    #[test]
    fn test_time_write_wrong_length_leaves_clock() {
        let state = BadgeState::new();
        let service = AttributeService::new(&state);
        service
            .write(AttributeId::TIME, at(0), &500i64.to_le_bytes())
            .unwrap();

        for bad in [&[0u8; 7][..], &[0u8; 9][..], &[][..]] {
            assert_eq!(
                service.write(AttributeId::TIME, at(0), bad),
                Err(AttError::InvalidLength)
            );
        }
        assert_eq!(state.clock.utc_seconds(at(0)), 500);
    }

    #[test]
    fn test_timezone_validation() {
        let state = BadgeState::new();
        let service = AttributeService::new(&state);
        service
            .write(AttributeId::TIMEZONE, at(0), &[(-20i8) as u8])
            .unwrap();
        assert_eq!(
            service.write(AttributeId::TIMEZONE, at(0), &[49]),
            Err(AttError::InvalidValue)
        );
        assert_eq!(
            service.write(AttributeId::TIMEZONE, at(0), &[1, 2]),
            Err(AttError::InvalidLength)
        );

        let mut out = [0u8; 1];
        service.read(AttributeId::TIMEZONE, at(0), &mut out).unwrap();
        assert_eq!(out[0] as i8, -20);
    }

    #[test]
    fn test_environment_reads_are_little_endian_floats() {
        let state = BadgeState::new();
        state.telemetry.publish_environment(EnvironmentReading {
            temperature_c: 21.25,
            pressure_pa: 99_800.5,
            humidity_rh: 55.0,
        });
        state.telemetry.set_battery_mv(3_950);
        let service = AttributeService::new(&state);
        let mut out = [0u8; 4];

        service.read(AttributeId::PRESSURE, at(0), &mut out).unwrap();
        assert_eq!(f32::from_le_bytes(out), 99_800.5);
        service.read(AttributeId::TEMPERATURE, at(0), &mut out).unwrap();
        assert_eq!(f32::from_le_bytes(out), 21.25);
        service.read(AttributeId::HUMIDITY, at(0), &mut out).unwrap();
        assert_eq!(f32::from_le_bytes(out), 55.0);
        service.read(AttributeId::BATTERY, at(0), &mut out).unwrap();
        assert_eq!(u32::from_le_bytes(out), 3_950);
    }

    #[test]
    fn test_read_only_attributes_reject_writes() {
        let state = BadgeState::new();
        let service = AttributeService::new(&state);
        assert_eq!(
            service.write(AttributeId::TEMPERATURE, at(0), &[0; 4]),
            Err(AttError::WriteNotPermitted)
        );
        assert_eq!(
            service.read(AttributeId(0x1FFF), at(0), &mut [0; 8]),
            Err(AttError::AttributeNotFound)
        );
    }

    #[test]
    fn test_display_mode_round_trips_raw_byte() {
        let state = BadgeState::new();
        let service = AttributeService::new(&state);
        service
            .write(AttributeId::DISPLAY_MODE, at(0), &[DisplayMode::Blank as u8])
            .unwrap();
        assert_eq!(state.display_mode.mode(), DisplayMode::Blank);

        service.write(AttributeId::DISPLAY_MODE, at(0), &[9]).unwrap();
        let mut out = [0u8; 1];
        service.read(AttributeId::DISPLAY_MODE, at(0), &mut out).unwrap();
        assert_eq!(out[0], 9);
        assert_eq!(state.display_mode.mode(), DisplayMode::Normal);
    }

    #[test]
    fn test_disconnect_always_resumes_advertising() {
        let state = BadgeState::new();
        let service = AttributeService::new(&state);
        assert_eq!(service.connection_state(), ConnectionState::Advertising);

        assert_eq!(
            service.on_gap_event(GapEvent::Connected { handle: 1 }),
            GapAction::None
        );
        assert_eq!(service.connection_state(), ConnectionState::Connected);

        assert_eq!(
            service.on_gap_event(GapEvent::Disconnected { reason: 0x13 }),
            GapAction::StartAdvertising
        );
        assert_eq!(service.connection_state(), ConnectionState::Advertising);

        assert_eq!(
            service.on_gap_event(GapEvent::ConnectFailed { status: 0x3E }),
            GapAction::StartAdvertising
        );
        assert_eq!(
            service.on_gap_event(GapEvent::AdvertisingComplete),
            GapAction::StartAdvertising
        );
        assert_eq!(service.connection_state(), ConnectionState::Advertising);
    }
}
