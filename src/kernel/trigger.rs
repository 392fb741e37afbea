// When a task is due, and what happens to it after it fired
//
//   Deadline  once, at or after an instant; slot freed after firing
//   Interval  every `period` ms; next += period (not now + period) so a
//             late tick pulls the following firing earlier and the
//             average rate holds. One firing per tick, no catch-up.
//   Predicate whenever the predicate is true at a tick (level, not
//             edge). Never self-removes.

use alloc::boxed::Box;
use core::fmt;

use super::callback::Rearm;
use super::clock::{Instant, clamp_delay};

enum Test {
    Fn(fn() -> bool),
    Boxed(Box<dyn FnMut() -> bool>),
}

/// Boolean condition polled once per tick by a predicate task.
pub struct Predicate {
    test: Test,
}

impl Predicate {
    pub const fn from_fn(f: fn() -> bool) -> Self {
        Self { test: Test::Fn(f) }
    }

    pub fn new<F>(f: F) -> Self
    where
        F: FnMut() -> bool + 'static,
    {
        Self {
            test: Test::Boxed(Box::new(f)),
        }
    }

    pub fn evaluate(&mut self) -> bool {
        match &mut self.test {
            Test::Fn(f) => f(),
            Test::Boxed(f) => f(),
        }
    }
}

impl<F> From<F> for Predicate
where
    F: FnMut() -> bool + 'static,
{
    fn from(f: F) -> Self {
        Predicate::new(f)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.test {
            Test::Fn(_) => write!(f, "Predicate::Fn"),
            Test::Boxed(_) => write!(f, "Predicate::Boxed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Deadline,
    Interval,
    Predicate,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Deadline => write!(f, "deadline"),
            TriggerKind::Interval => write!(f, "interval"),
            TriggerKind::Predicate => write!(f, "predicate"),
        }
    }
}

#[derive(Debug)]
pub enum Trigger {
    Deadline(Instant),
    Interval { next: Instant, period: u32 },
    Predicate(Predicate),
}

/// Slot outcome after a task fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterFire {
    Keep,
    Release,
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Deadline(_) => TriggerKind::Deadline,
            Trigger::Interval { .. } => TriggerKind::Interval,
            Trigger::Predicate(_) => TriggerKind::Predicate,
        }
    }

    /// Evaluate against `now`. Runs the predicate for predicate triggers.
    pub fn is_due(&mut self, now: Instant) -> bool {
        match self {
            Trigger::Deadline(at) => now.has_reached(*at),
            Trigger::Interval { next, .. } => now.has_reached(*next),
            Trigger::Predicate(pred) => pred.evaluate(),
        }
    }

    /// Apply the post-fire transition. `rearm` is what a rearming
    /// callback returned; only deadlines honour it.
    pub fn after_fire(&mut self, now: Instant, rearm: Option<Rearm>) -> AfterFire {
        match self {
            Trigger::Deadline(at) => match rearm {
                Some(Rearm::After(ms)) => {
                    *at = now + clamp_delay(ms);
                    AfterFire::Keep
                }
                Some(Rearm::At(next)) => {
                    *at = next;
                    AfterFire::Keep
                }
                Some(Rearm::Done) | None => AfterFire::Release,
            },
            Trigger::Interval { next, period } => {
                *next = *next + *period;
                AfterFire::Keep
            }
            Trigger::Predicate(_) => AfterFire::Keep,
        }
    }

    /// Instant the trigger waits for; `None` for predicates.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self {
            Trigger::Deadline(at) => Some(*at),
            Trigger::Interval { next, .. } => Some(*next),
            Trigger::Predicate(_) => None,
        }
    }
}
