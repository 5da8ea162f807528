//! System clock and timezone offset
//!
//! The badge has no RTC. UTC is kept as an offset from the monotonic uptime
//! clock: a Time write stores `utc - uptime`, and every read adds the current
//! uptime back. The timezone is a signed count of quarter-hours.

use core::cell::Cell;
use core::fmt;
use core::sync::atomic::{AtomicI8, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Instant;

use crate::config::MAX_TZ_QUARTER_HOURS;
use crate::gatt::AttError;

const MICROS_PER_SEC: i64 = 1_000_000;
const SECS_PER_QUARTER_HOUR: i64 = 15 * 60;
const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Timezone offset in quarter-hours from UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TzOffset(i8);

impl TzOffset {
    pub const UTC: Self = Self(0);

    /// Validate a raw quarter-hour count
    pub fn new(quarter_hours: i8) -> Result<Self, AttError> {
        if quarter_hours.unsigned_abs() > MAX_TZ_QUARTER_HOURS.unsigned_abs() {
            return Err(AttError::InvalidValue);
        }
        Ok(Self(quarter_hours))
    }

    pub const fn quarter_hours(self) -> i8 {
        self.0
    }

    pub const fn as_secs(self) -> i64 {
        self.0 as i64 * SECS_PER_QUARTER_HOUR
    }
}

/// Wall-clock time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

impl TimeOfDay {
    /// Time of day for a count of seconds since the Unix epoch
    pub fn from_unix_secs(secs: i64) -> Self {
        let in_day = secs.rem_euclid(SECS_PER_DAY);
        Self {
            hours: (in_day / 3600) as u8,
            minutes: (in_day / 60 % 60) as u8,
            seconds: (in_day % 60) as u8,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// Remote-settable clock and timezone
pub struct ClockConfig {
    /// UTC microseconds at uptime zero
    utc_at_boot_us: Mutex<CriticalSectionRawMutex, Cell<i64>>,
    offset: AtomicI8,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockConfig {
    /// Clock starting at the Unix epoch, UTC
    pub const fn new() -> Self {
        Self {
            utc_at_boot_us: Mutex::new(Cell::new(0)),
            offset: AtomicI8::new(0),
        }
    }

    /// Set the UTC clock to `unix_secs` as of uptime `now`
    pub fn set_utc(&self, unix_secs: i64, now: Instant) {
        let base = unix_secs
            .saturating_mul(MICROS_PER_SEC)
            .saturating_sub(uptime_us(now));
        self.utc_at_boot_us.lock(|cell| cell.set(base));
    }

    /// Current UTC time in whole seconds
    pub fn utc_seconds(&self, now: Instant) -> i64 {
        let base = self.utc_at_boot_us.lock(|cell| cell.get());
        base.saturating_add(uptime_us(now)).div_euclid(MICROS_PER_SEC)
    }

    /// Store a new offset; out-of-range values leave the current one untouched
    pub fn set_offset(&self, quarter_hours: i8) -> Result<TzOffset, AttError> {
        let offset = TzOffset::new(quarter_hours)?;
        self.offset.store(offset.quarter_hours(), Ordering::Relaxed);
        Ok(offset)
    }

    pub fn offset(&self) -> TzOffset {
        TzOffset(self.offset.load(Ordering::Relaxed))
    }

    /// Local seconds since the epoch (UTC adjusted by the offset)
    pub fn local_seconds(&self, now: Instant) -> i64 {
        self.utc_seconds(now).saturating_add(self.offset().as_secs())
    }

    pub fn local_time(&self, now: Instant) -> TimeOfDay {
        TimeOfDay::from_unix_secs(self.local_seconds(now))
    }
}

fn uptime_us(now: Instant) -> i64 {
    i64::try_from(now.as_micros()).unwrap_or(i64::MAX)
}
