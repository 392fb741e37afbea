// Owned, type-erased task bodies
//
// A plain fn() is stored as-is (no allocation). Anything capturing
// state is boxed; the box owns the captured values and drops them
// exactly once, when the owning slot lets go of the Callback.

use alloc::boxed::Box;
use core::fmt;

use super::clock::Instant;

/// What a rearming callback wants after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rearm {
    /// Finished, free the slot.
    Done,
    /// Run again this many ms after the tick that just ran it.
    After(u32),
    /// Run again once the clock reaches this instant.
    At(Instant),
}

enum Body {
    Fn(fn()),
    Boxed(Box<dyn FnMut()>),
    Rearming(Box<dyn FnMut() -> Rearm>),
}

pub struct Callback {
    body: Body,
}

impl Callback {
    /// Wrap a stateless function. Never allocates.
    pub const fn from_fn(f: fn()) -> Self {
        Self { body: Body::Fn(f) }
    }

    /// Box a closure together with whatever it captured.
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self {
            body: Body::Boxed(Box::new(f)),
        }
    }

    /// Box a closure whose return value decides if it runs again.
    pub fn rearming<F>(f: F) -> Self
    where
        F: FnMut() -> Rearm + 'static,
    {
        Self {
            body: Body::Rearming(Box::new(f)),
        }
    }

    /// Run the body. `Some` only for rearming callbacks.
    pub fn invoke(&mut self) -> Option<Rearm> {
        match &mut self.body {
            Body::Fn(f) => {
                f();
                None
            }
            Body::Boxed(f) => {
                f();
                None
            }
            Body::Rearming(f) => Some(f()),
        }
    }

    pub fn captures_state(&self) -> bool {
        !matches!(self.body, Body::Fn(_))
    }

    pub fn is_rearming(&self) -> bool {
        matches!(self.body, Body::Rearming(_))
    }
}

impl<F> From<F> for Callback
where
    F: FnMut() + 'static,
{
    fn from(f: F) -> Self {
        Callback::new(f)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            Body::Fn(func) => write!(f, "Callback::Fn({:p})", *func as *const ()),
            Body::Boxed(_) => write!(f, "Callback::Boxed"),
            Body::Rearming(_) => write!(f, "Callback::Rearming"),
        }
    }
}
