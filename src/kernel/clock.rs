// Monotonic millisecond time for the task scheduler
//
// Instants are a wrapping u32 millisecond count, the same width as the
// uptime counter a timer ISR bumps. Comparisons use the unsigned
// difference, so a deadline set just before the counter wraps still
// fires just after it. The price is a horizon: anything more than
// 2^31 ms (~24.8 days) ahead is indistinguishable from the past.
//
// TickCounter is the ISR-fed source: the timer interrupt calls
// advance(), the main loop reads now(). Critical section guards
// riscv32imc (no atomic RMW).

use alloc::rc::Rc;
use core::cell::Cell;
use core::fmt;
use core::ops::Add;

use log::warn;

/// Longest delay or period a task can use. Longer values are clamped.
pub const MAX_DELAY_MS: u32 = (1 << 31) - 1;

/// Cap `ms` at [`MAX_DELAY_MS`], warning when it had to.
pub fn clamp_delay(ms: u32) -> u32 {
    if ms > MAX_DELAY_MS {
        warn!("delay {}ms past wrap horizon, clamped to {}ms", ms, MAX_DELAY_MS);
        MAX_DELAY_MS
    } else {
        ms
    }
}

/// A reading of a wrapping millisecond counter.
///
/// Not `Ord`: two instants can only be compared relative to each other
/// within [`MAX_DELAY_MS`], see [`Instant::has_reached`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Instant(u32);

impl Instant {
    pub const fn from_millis(ms: u32) -> Self {
        Instant(ms)
    }

    pub const fn as_millis(self) -> u32 {
        self.0
    }

    /// `self + ms`, wrapping at `u32::MAX`.
    pub const fn wrapping_add(self, ms: u32) -> Self {
        Instant(self.0.wrapping_add(ms))
    }

    /// True once `self` is at or past `deadline`.
    #[inline]
    pub const fn has_reached(self, deadline: Instant) -> bool {
        self.0.wrapping_sub(deadline.0) <= MAX_DELAY_MS
    }

    /// Milliseconds from `self` until `later`, 0 if already reached.
    #[inline]
    pub const fn millis_until(self, later: Instant) -> u32 {
        if self.has_reached(later) {
            0
        } else {
            later.0.wrapping_sub(self.0)
        }
    }
}

impl Add<u32> for Instant {
    type Output = Instant;

    fn add(self, ms: u32) -> Instant {
        self.wrapping_add(ms)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Source of the current time for registrations and [`poll`].
///
/// [`poll`]: crate::kernel::Scheduler::poll
pub trait Clock {
    fn now(&self) -> Instant;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

impl<T: Clock + ?Sized> Clock for Rc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

// bare `fn() -> Instant`, e.g. a HAL's millis()
impl Clock for fn() -> Instant {
    fn now(&self) -> Instant {
        self()
    }
}

/// Millisecond counter advanced from a timer interrupt.
///
/// Usable as a `static` shared between the ISR and the main loop:
///
/// ```
/// use pulp_tasks::kernel::{Clock, TickCounter};
///
/// static UPTIME: TickCounter = TickCounter::new();
///
/// // timer ISR, every 10 ms
/// UPTIME.advance(10);
/// assert_eq!(UPTIME.now().as_millis(), 10);
/// ```
pub struct TickCounter {
    // cs: riscv32imc has no atomic add
    millis: critical_section::Mutex<Cell<u32>>,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    pub const fn starting_at(ms: u32) -> Self {
        Self {
            millis: critical_section::Mutex::new(Cell::new(ms)),
        }
    }

    /// Add `ms` to the counter, wrapping.
    #[inline]
    pub fn advance(&self, ms: u32) {
        critical_section::with(|cs| {
            let millis = self.millis.borrow(cs);
            millis.set(millis.get().wrapping_add(ms));
        });
    }

    pub fn set(&self, at: Instant) {
        critical_section::with(|cs| self.millis.borrow(cs).set(at.as_millis()));
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TickCounter {
    fn now(&self) -> Instant {
        Instant(critical_section::with(|cs| self.millis.borrow(cs).get()))
    }
}

/// Reads the embassy time driver, truncated to u32 milliseconds.
#[cfg(feature = "embassy-time")]
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

#[cfg(feature = "embassy-time")]
impl Clock for EmbassyClock {
    fn now(&self) -> Instant {
        // truncation is fine, comparisons are wrap-aware
        Instant(embassy_time::Instant::now().as_millis() as u32)
    }
}
