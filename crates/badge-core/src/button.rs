//! Debounced button presses
//!
//! A single [`PressLatch`] holds the time of the last accepted press. Exactly
//! one producer feeds it, chosen at configuration time:
//!
//! - [`EdgeTriggeredButton`] runs inside the GPIO interrupt handler and
//!   toggles the status LED on every accepted press.
//! - [`PolledButton`] samples an analog voltage on a fixed period and detects
//!   the not-pressed to pressed transition in software. It has no LED.
//!
//! Both apply the same debounce window and both satisfy [`ButtonMonitor`],
//! the read side the display controller consumes.
//!
//! Timestamps are 64-bit milliseconds since boot, biased by [`BOOT_BIAS_MS`]
//! so that the reset value of the latch already lies a minute in the past.
//! The target only has 32-bit atomic loads and stores, so the stamp is kept
//! as two halves published behind a sequence counter that only the producer
//! writes.

use core::hint::spin_loop;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU32, Ordering, fence};

use embassy_time::{Duration, Instant, Timer};
use embedded_hal::digital::StatefulOutputPin;
use log::{debug, warn};

use crate::config::{BUTTON_POLL_PERIOD_MS, BUTTON_PRESSED_BELOW_MV, DEBOUNCE_WINDOW_MS};
use crate::sensors::SensorError;

/// How far before boot the latch's reset value lies
pub const BOOT_BIAS_MS: u64 = 60_000;

/// Capability marker for the restricted, non-blocking context
///
/// Code holding an `InterruptContext` may be running in an interrupt handler:
/// it must not allocate, block, await or take a lock that a task could be
/// holding. [`PressLatch::accept`] demands this marker and is implemented
/// with plain atomic loads and stores only.
#[derive(Clone, Copy)]
pub struct InterruptContext<'a> {
    // Not Send: the marker stays with the handler invocation that made it.
    _not_send: PhantomData<*const &'a ()>,
}

impl InterruptContext<'_> {
    /// Enter the restricted context.
    ///
    /// Constructing the marker is always allowed; it is the *caller's*
    /// obligation to honour the restrictions for as long as it is held.
    #[inline(always)]
    pub fn enter() -> Self {
        Self {
            _not_send: PhantomData,
        }
    }
}

/// Millisecond timestamp in the latch's biased time base
#[inline]
pub fn press_stamp(now: Instant) -> u64 {
    now.as_millis().saturating_add(BOOT_BIAS_MS)
}

/// Time of the last accepted button press
///
/// Single producer, many readers. The producer bumps `sequence` to an odd
/// value, writes both halves, then bumps it to the next even value. Readers
/// retry while a write is in flight, so they must never preempt the
/// producer on the same core.
pub struct PressLatch {
    sequence: AtomicU32,
    high: AtomicU32,
    low: AtomicU32,
    debounce_ms: u64,
}

impl Default for PressLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl PressLatch {
    pub const fn new() -> Self {
        Self::with_debounce(DEBOUNCE_WINDOW_MS as u64)
    }

    pub const fn with_debounce(debounce_ms: u64) -> Self {
        Self {
            sequence: AtomicU32::new(0),
            high: AtomicU32::new(0),
            low: AtomicU32::new(0),
            debounce_ms,
        }
    }

    /// Record a press at `now` unless it falls inside the debounce window of
    /// the previous accepted press. Returns whether the press was accepted.
    ///
    /// Single producer: the load and store need not be one atomic
    /// read-modify-write because nothing else stores to the latch.
    #[inline]
    pub fn accept(&self, now: Instant, _cx: InterruptContext<'_>) -> bool {
        let stamp = press_stamp(now);
        if stamp.saturating_sub(self.last_press_stamp()) < self.debounce_ms {
            return false;
        }
        self.publish(stamp);
        true
    }

    fn publish(&self, stamp: u64) {
        let sequence = self.sequence.load(Ordering::Relaxed);
        self.sequence
            .store(sequence.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        self.high.store((stamp >> 32) as u32, Ordering::Relaxed);
        self.low.store(stamp as u32, Ordering::Relaxed);
        self.sequence
            .store(sequence.wrapping_add(2), Ordering::Release);
    }

    /// Biased timestamp of the last accepted press
    pub fn last_press_stamp(&self) -> u64 {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            let high = self.high.load(Ordering::Relaxed);
            let low = self.low.load(Ordering::Relaxed);
            fence(Ordering::Acquire);
            let after = self.sequence.load(Ordering::Relaxed);
            if before == after && before % 2 == 0 {
                return (u64::from(high) << 32) | u64::from(low);
            }
            spin_loop();
        }
    }

    /// Time elapsed between the last accepted press and `now`
    pub fn since_last_press(&self, now: Instant) -> Duration {
        Duration::from_millis(press_stamp(now).saturating_sub(self.last_press_stamp()))
    }
}

/// Read side of a debounced button, whichever strategy feeds it
pub trait ButtonMonitor {
    /// The latch presses are recorded in
    fn latch(&self) -> &PressLatch;

    fn since_last_press(&self, now: Instant) -> Duration {
        self.latch().since_last_press(now)
    }
}

impl ButtonMonitor for PressLatch {
    fn latch(&self) -> &PressLatch {
        self
    }
}

/// Interrupt-driven strategy with an LED toggle side effect
pub struct EdgeTriggeredButton<'a, L> {
    latch: &'a PressLatch,
    led: Option<L>,
}

impl<'a, L: StatefulOutputPin> EdgeTriggeredButton<'a, L> {
    pub fn new(latch: &'a PressLatch, led: Option<L>) -> Self {
        Self { latch, led }
    }

    /// Handle one input edge. Call from the GPIO interrupt handler.
    pub fn on_edge(&mut self, now: Instant, cx: InterruptContext<'_>) -> bool {
        if !self.latch.accept(now, cx) {
            return false;
        }
        if let Some(led) = self.led.as_mut() {
            // A GPIO write; an error here has nowhere to go from an ISR.
            let _ = led.toggle();
        }
        true
    }
}

impl<L> ButtonMonitor for EdgeTriggeredButton<'_, L> {
    fn latch(&self) -> &PressLatch {
        self.latch
    }
}

/// Analog input that reports the voltage on the button's divider pin
pub trait ButtonSense {
    fn read_millivolts(&mut self) -> Result<u32, SensorError>;
}

/// Poll-driven strategy with software edge detection
pub struct PolledButton<'a, S> {
    latch: &'a PressLatch,
    sense: S,
    was_pressed: bool,
}

impl<'a, S: ButtonSense> PolledButton<'a, S> {
    pub fn new(latch: &'a PressLatch, sense: S) -> Self {
        Self {
            latch,
            sense,
            was_pressed: false,
        }
    }

    /// Sample the input once. Returns `true` when a new press was accepted.
    ///
    /// A failed read counts as "not pressed", which re-arms edge detection.
    pub fn poll(&mut self, now: Instant) -> bool {
        let pressed = match self.sense.read_millivolts() {
            Ok(mv) => mv < BUTTON_PRESSED_BELOW_MV,
            Err(e) => {
                warn!("Button read failed: {}", e);
                false
            }
        };

        let rising = pressed && !self.was_pressed;
        self.was_pressed = pressed;

        // Task context honours the same restrictions, so it may use the
        // interrupt-safe accept path.
        rising && self.latch.accept(now, InterruptContext::enter())
    }

    /// Poll forever at [`BUTTON_POLL_PERIOD_MS`]
    pub async fn run(&mut self) -> ! {
        loop {
            if self.poll(Instant::now()) {
                debug!("Button press accepted");
            }
            Timer::after_millis(BUTTON_POLL_PERIOD_MS).await;
        }
    }
}

impl<S> ButtonMonitor for PolledButton<'_, S> {
    fn latch(&self) -> &PressLatch {
        self.latch
    }
}
