// Deferred-callback scheduler for a cooperative main loop
//
// Run once after a delay, every N ms, or whenever a predicate holds.
// The host calls tick(now) (or poll()) from its loop; every due task
// runs to completion inside that call. No priorities: same-tick tasks
// run in slot order, which means nothing to the caller.
//
// All methods take &self so callbacks can hold the scheduler (Rc, or a
// leaked &'static on device) and schedule/cancel from inside tick.
// Anything scheduled during a tick is first looked at on the next one.

use core::cell::Cell;
use core::fmt;

use log::{debug, trace, warn};

use super::callback::{Callback, Rearm};
use super::clock::{Clock, Instant, clamp_delay};
use super::slots::{Removal, SlotTable, Task, TaskHandle};
use super::trigger::{AfterFire, Predicate, Trigger, TriggerKind};

/// Slot count when none is given, same as the C headers' MAX_TASKS.
pub const DEFAULT_MAX_TASKS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// Every slot is taken. Nothing was registered.
    CapacityExceeded { capacity: usize },
    /// The handle's task already fired, was canceled, or never existed.
    InvalidHandle(TaskHandle),
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::CapacityExceeded { capacity } => {
                write!(f, "task table full ({} slots)", capacity)
            }
            ScheduleError::InvalidHandle(handle) => write!(f, "no live task for {}", handle),
        }
    }
}

impl core::error::Error for ScheduleError {}

// Clears the dispatching flag when tick ends. If a callback or
// predicate unwinds, the slot it was checked out of is freed too.
struct Dispatching<'a, const N: usize> {
    flag: &'a Cell<bool>,
    slots: &'a SlotTable<N>,
    in_flight: Option<usize>,
}

impl<const N: usize> Drop for Dispatching<'_, N> {
    fn drop(&mut self) {
        if let Some(index) = self.in_flight.take() {
            warn!("task in slot {} unwound, slot released", index);
            self.slots.release_running(index);
        }
        self.flag.set(false);
    }
}

pub struct Scheduler<C: Clock, const N: usize = DEFAULT_MAX_TASKS> {
    clock: C,
    slots: SlotTable<N>,
    dispatching: Cell<bool>,
}

impl<C: Clock, const N: usize> Scheduler<C, N> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            slots: SlotTable::new(),
            dispatching: Cell::new(false),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    // checked before any callback/predicate conversion runs, so a
    // rejected registration never builds (or boxes) anything
    fn reserve(&self, kind: TriggerKind) -> Result<(), ScheduleError> {
        if self.slots.is_full() {
            warn!("task table full ({} slots), rejected {} task", N, kind);
            return Err(ScheduleError::CapacityExceeded { capacity: N });
        }
        Ok(())
    }

    fn insert(&self, task: Task) -> Result<TaskHandle, ScheduleError> {
        let kind = task.kind();
        match self.slots.try_insert(task) {
            Ok(handle) => {
                debug!("scheduled {} task {}", kind, handle);
                Ok(handle)
            }
            // only reachable if an Into<Callback> impl filled the table
            Err(_rejected) => {
                warn!("task table full ({} slots), rejected {} task", N, kind);
                Err(ScheduleError::CapacityExceeded { capacity: N })
            }
        }
    }

    /// Run `callback` once, on the first tick at or after `now + delay_ms`.
    pub fn schedule_once(
        &self,
        callback: impl Into<Callback>,
        delay_ms: u32,
    ) -> Result<TaskHandle, ScheduleError> {
        self.reserve(TriggerKind::Deadline)?;
        let at = self.now() + clamp_delay(delay_ms);
        self.insert(Task::new(callback.into(), Trigger::Deadline(at)))
    }

    /// Run `callback` every `period_ms`, first at `now + period_ms`.
    pub fn schedule_interval(
        &self,
        callback: impl Into<Callback>,
        period_ms: u32,
    ) -> Result<TaskHandle, ScheduleError> {
        self.schedule_interval_from(callback, self.now(), period_ms)
    }

    /// Run `callback` every `period_ms`, first at `start + period_ms`.
    ///
    /// Each firing moves the next one forward by exactly one period, so a
    /// late tick does not shift the phase. At most one firing per tick.
    pub fn schedule_interval_from(
        &self,
        callback: impl Into<Callback>,
        start: Instant,
        period_ms: u32,
    ) -> Result<TaskHandle, ScheduleError> {
        self.reserve(TriggerKind::Interval)?;
        let period = clamp_delay(period_ms);
        self.insert(Task::new(
            callback.into(),
            Trigger::Interval {
                next: start + period,
                period,
            },
        ))
    }

    /// Run `callback` on every tick where `predicate` returns true.
    ///
    /// Level-triggered: a predicate that stays true fires every tick.
    /// The task lives until canceled.
    pub fn schedule_on_predicate(
        &self,
        callback: impl Into<Callback>,
        predicate: impl Into<Predicate>,
    ) -> Result<TaskHandle, ScheduleError> {
        self.reserve(TriggerKind::Predicate)?;
        self.insert(Task::new(
            callback.into(),
            Trigger::Predicate(predicate.into()),
        ))
    }

    /// One-shot at `now + delay_ms` whose return value decides if and
    /// when it runs again.
    pub fn schedule_rearming<F>(&self, callback: F, delay_ms: u32) -> Result<TaskHandle, ScheduleError>
    where
        F: FnMut() -> Rearm + 'static,
    {
        self.reserve(TriggerKind::Deadline)?;
        let at = self.now() + clamp_delay(delay_ms);
        self.insert(Task::new(Callback::rearming(callback), Trigger::Deadline(at)))
    }

    /// Remove a task. Returns false, and does nothing, if it is already
    /// gone. Captured state is dropped before this returns, unless the
    /// task is the one currently running, in which case it is dropped
    /// as soon as its callback returns.
    pub fn cancel(&self, handle: TaskHandle) -> bool {
        match self.slots.remove(handle) {
            Some(Removal::Idle(task)) => {
                debug!("canceled {} task {}", task.kind(), handle);
                drop(task);
                true
            }
            Some(Removal::InFlight) => {
                debug!("canceled running task {}", handle);
                true
            }
            None => {
                trace!("cancel {}: not scheduled", handle);
                false
            }
        }
    }

    /// Like [`cancel`](Self::cancel) but reports stale handles.
    pub fn try_cancel(&self, handle: TaskHandle) -> Result<(), ScheduleError> {
        if self.cancel(handle) {
            Ok(())
        } else {
            Err(ScheduleError::InvalidHandle(handle))
        }
    }

    /// Cancel everything. Returns how many tasks were removed.
    pub fn cancel_all(&self) -> usize {
        (0..N)
            .filter_map(|index| self.slots.handle_at(index))
            .filter(|&handle| self.cancel(handle))
            .count()
    }

    /// Dispatch every task due at `now`. Returns how many callbacks ran.
    ///
    /// Calling tick from inside a callback does nothing.
    pub fn tick(&self, now: Instant) -> usize {
        if self.dispatching.replace(true) {
            warn!("nested tick at {} ignored", now);
            return 0;
        }
        let mut guard = Dispatching {
            flag: &self.dispatching,
            slots: &self.slots,
            in_flight: None,
        };

        self.slots.arm_all();

        let mut fired = 0;
        for index in 0..N {
            // no borrow is held from here on: the task is ours until
            // restored or released
            let Some(mut task) = self.slots.checkout(index) else {
                continue;
            };
            guard.in_flight = Some(index);

            if !task.trigger.is_due(now) {
                guard.in_flight = None;
                if self.slots.restore(index, task).is_err() {
                    debug!("slot {} canceled by its own predicate", index);
                }
                continue;
            }

            // the predicate may have canceled its own task
            if !self.slots.is_running(index) {
                guard.in_flight = None;
                debug!("slot {} canceled by its own predicate", index);
                drop(task);
                continue;
            }

            trace!("firing {} task in slot {} at {}", task.kind(), index, now);
            let rearm = task.callback.invoke();
            guard.in_flight = None;
            fired += 1;

            match task.trigger.after_fire(now, rearm) {
                AfterFire::Keep => {
                    if self.slots.restore(index, task).is_err() {
                        debug!("slot {} canceled while running", index);
                    }
                }
                AfterFire::Release => {
                    // free the slot before captured state drops
                    self.slots.release_running(index);
                    drop(task);
                }
            }
        }
        fired
    }

    /// [`tick`](Self::tick) with the scheduler's own clock.
    pub fn poll(&self) -> usize {
        self.tick(self.now())
    }

    /// Milliseconds the host can idle before the next tick matters.
    ///
    /// `None` with nothing scheduled; `Some(0)` if something is already
    /// due or a predicate task needs polling.
    pub fn time_until_next(&self, now: Instant) -> Option<u32> {
        let mut soonest: Option<u32> = None;
        self.slots.for_each_occupied(|_, task| {
            let wait = task
                .trigger
                .next_deadline()
                .map_or(0, |at| now.millis_until(at));
            soonest = Some(soonest.map_or(wait, |s| s.min(wait)));
        });
        soonest
    }

    pub fn is_scheduled(&self, handle: TaskHandle) -> bool {
        self.slots.contains(handle)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Tasks of one trigger kind, not counting one that is mid-dispatch.
    pub fn pending_by_kind(&self, kind: TriggerKind) -> usize {
        let mut count = 0;
        self.slots.for_each_occupied(|_, task| {
            if task.kind() == kind {
                count += 1;
            }
        });
        count
    }
}

impl<C: Clock + Default, const N: usize> Default for Scheduler<C, N> {
    fn default() -> Self {
        Self::new(C::default())
    }
}
