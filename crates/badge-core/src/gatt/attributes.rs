//! Attribute identifiers, the handler table and the scratch attribute

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Instant;
use heapless::Vec;

use super::AttError;
use crate::app_state::BadgeState;
use crate::config::SCRATCH_CAPACITY;

/// 128-bit UUID of the badge service
pub const SERVICE_UUID: u128 = 0xdeadbeef_1000_2000_3000_aabbccddeeff;

/// Bit position of the 16-bit sub-identifier inside a 128-bit UUID
const SUB_ID_SHIFT: u32 = 80;

/// 16-bit sub-identifier of a characteristic within the badge service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeId(pub u16);

impl AttributeId {
    pub const SCRATCH: Self = Self(0x1001);
    pub const PRESSURE: Self = Self(0x1002);
    pub const TEMPERATURE: Self = Self(0x1003);
    pub const HUMIDITY: Self = Self(0x1004);
    pub const TIME: Self = Self(0x1005);
    pub const TIMEZONE: Self = Self(0x1006);
    pub const BATTERY: Self = Self(0x1007);
    pub const DISPLAY_MODE: Self = Self(0x1008);

    /// Full characteristic UUID: the service UUID with its second group
    /// replaced by the sub-identifier
    pub const fn uuid(self) -> u128 {
        (SERVICE_UUID & !(0xffff << SUB_ID_SHIFT)) | ((self.0 as u128) << SUB_ID_SHIFT)
    }
}

/// Read/write permissions of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

type ReadHandler = fn(&BadgeState, Instant, &mut [u8]) -> Result<usize, AttError>;
type WriteHandler = fn(&BadgeState, Instant, &[u8]) -> Result<(), AttError>;

/// One row of the handler table
pub struct Attribute {
    pub id: AttributeId,
    pub name: &'static str,
    pub(super) read: Option<ReadHandler>,
    pub(super) write: Option<WriteHandler>,
}

impl Attribute {
    pub fn access(&self) -> Access {
        match (self.read.is_some(), self.write.is_some()) {
            (true, true) => Access::ReadWrite,
            (false, true) => Access::Write,
            _ => Access::Read,
        }
    }
}

/// Every attribute the badge exposes
pub static ATTRIBUTES: [Attribute; 8] = [
    Attribute {
        id: AttributeId::SCRATCH,
        name: "Scratch",
        read: Some(|state, _, out| state.scratch.read_into(out)),
        write: Some(|state, _, value| state.scratch.write(value)),
    },
    Attribute {
        id: AttributeId::PRESSURE,
        name: "Pressure",
        read: Some(|state, _, out| {
            put(out, &state.telemetry.environment_or_zero().pressure_pa.to_le_bytes())
        }),
        write: None,
    },
    Attribute {
        id: AttributeId::TEMPERATURE,
        name: "Temperature",
        read: Some(|state, _, out| {
            put(out, &state.telemetry.environment_or_zero().temperature_c.to_le_bytes())
        }),
        write: None,
    },
    Attribute {
        id: AttributeId::HUMIDITY,
        name: "Humidity",
        read: Some(|state, _, out| {
            put(out, &state.telemetry.environment_or_zero().humidity_rh.to_le_bytes())
        }),
        write: None,
    },
    Attribute {
        id: AttributeId::TIME,
        name: "Time",
        read: Some(|state, now, out| put(out, &state.clock.utc_seconds(now).to_le_bytes())),
        write: Some(|state, now, value| {
            let secs = i64::from_le_bytes(fixed(value)?);
            state.clock.set_utc(secs, now);
            Ok(())
        }),
    },
    Attribute {
        id: AttributeId::TIMEZONE,
        name: "Timezone",
        read: Some(|state, _, out| put(out, &state.clock.offset().quarter_hours().to_le_bytes())),
        write: Some(|state, _, value| {
            let raw = i8::from_le_bytes(fixed(value)?);
            state.clock.set_offset(raw).map(|_| ())
        }),
    },
    Attribute {
        id: AttributeId::BATTERY,
        name: "Battery",
        read: Some(|state, _, out| put(out, &state.telemetry.battery_mv().to_le_bytes())),
        write: None,
    },
    Attribute {
        id: AttributeId::DISPLAY_MODE,
        name: "DisplayMode",
        read: Some(|state, _, out| put(out, &[state.display_mode.raw()])),
        write: Some(|state, _, value| {
            let [raw] = fixed(value)?;
            state.display_mode.set_raw(raw);
            Ok(())
        }),
    },
];

pub fn lookup(id: AttributeId) -> Option<&'static Attribute> {
    ATTRIBUTES.iter().find(|attribute| attribute.id == id)
}

/// Copy `bytes` into the response buffer
fn put(out: &mut [u8], bytes: &[u8]) -> Result<usize, AttError> {
    let dest = out
        .get_mut(..bytes.len())
        .ok_or(AttError::InsufficientResources)?;
    dest.copy_from_slice(bytes);
    Ok(bytes.len())
}

/// Require a write of exactly `N` bytes
fn fixed<const N: usize>(value: &[u8]) -> Result<[u8; N], AttError> {
    value.try_into().map_err(|_| AttError::InvalidLength)
}

/// Opaque peer-writable bytes
pub struct ScratchAttribute {
    bytes: Mutex<CriticalSectionRawMutex, RefCell<Vec<u8, SCRATCH_CAPACITY>>>,
}

impl Default for ScratchAttribute {
    fn default() -> Self {
        Self::new()
    }
}

impl ScratchAttribute {
    pub const fn new() -> Self {
        Self {
            bytes: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Replace the contents; longer than capacity is rejected untouched
    pub fn write(&self, value: &[u8]) -> Result<(), AttError> {
        let replacement = Vec::from_slice(value).map_err(|_| AttError::InvalidLength)?;
        self.bytes.lock(|bytes| *bytes.borrow_mut() = replacement);
        Ok(())
    }

    pub fn read_into(&self, out: &mut [u8]) -> Result<usize, AttError> {
        self.bytes.lock(|bytes| put(out, &bytes.borrow()))
    }

    pub fn len(&self) -> usize {
        self.bytes.lock(|bytes| bytes.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_characteristic_uuids() {
        assert_eq!(
            AttributeId::PRESSURE.uuid(),
            0xdeadbeef_1002_2000_3000_aabbccddeeff
        );
        assert_eq!(AttributeId(0x1000).uuid(), SERVICE_UUID);
    }

    #[test]
    fn test_table_ids_are_unique() {
        for (i, a) in ATTRIBUTES.iter().enumerate() {
            assert!(ATTRIBUTES[i + 1..].iter().all(|b| b.id != a.id), "{}", a.name);
        }
    }

    #[test]
    fn test_access_modes() {
        let mode = |id| lookup(id).map(Attribute::access);
        assert_eq!(mode(AttributeId::SCRATCH), Some(Access::ReadWrite));
        assert_eq!(mode(AttributeId::BATTERY), Some(Access::Read));
        assert_eq!(mode(AttributeId::TIMEZONE), Some(Access::ReadWrite));
        assert_eq!(mode(AttributeId(0x2000)), None);
    }

    #[test]
    fn test_scratch_capacity_boundary() {
        let scratch = ScratchAttribute::new();
        assert!(scratch.write(&[7; SCRATCH_CAPACITY]).is_ok());
        assert_eq!(scratch.len(), SCRATCH_CAPACITY);
        assert_eq!(
            scratch.write(&[8; SCRATCH_CAPACITY + 1]),
            Err(AttError::InvalidLength)
        );
        assert_eq!(scratch.len(), SCRATCH_CAPACITY);
    }
}
