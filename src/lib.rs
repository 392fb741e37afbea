// setTimeout/setInterval for a bare-metal main loop
//
// No threads, no interrupts touching the task table, no growth past
// the slot count chosen at compile time. Captured closure state lives
// on the heap (alloc), one box per task.
//
//     let sched: Scheduler<_, 8> = Scheduler::new(&UPTIME);
//     sched.schedule_interval(blink, 500)?;
//     loop {
//         sched.poll();
//         wait_for_interrupt();
//     }

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod kernel;

pub use kernel::{
    Callback, Clock, DEFAULT_MAX_TASKS, Instant, Predicate, Rearm, ScheduleError, Scheduler,
    TaskHandle, TickCounter, TriggerKind,
};
