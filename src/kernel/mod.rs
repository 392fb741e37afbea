// Cooperative deferred-callback scheduler
// Single core, no preemption. The host loop calls tick()/poll(); due
// callbacks run to completion inside it, in slot order.
//
// clock:     wrapping millisecond Instants, ISR-fed TickCounter
// callback:  owned fn()/closure bodies
// trigger:   deadline / interval / predicate
// slots:     fixed table, generation-checked handles

pub mod callback;
pub mod clock;
pub mod scheduler;
pub mod slots;
pub mod trigger;

pub use callback::{Callback, Rearm};
pub use clock::{Clock, Instant, MAX_DELAY_MS, TickCounter};
#[cfg(feature = "embassy-time")]
pub use clock::EmbassyClock;
pub use scheduler::{DEFAULT_MAX_TASKS, ScheduleError, Scheduler};
pub use slots::TaskHandle;
pub use trigger::{Predicate, TriggerKind};
