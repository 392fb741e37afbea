// Fixed-capacity task table
//
// N slots, first-fit, reused as soon as they are freed. Every slot has
// its own RefCell so a callback can schedule or cancel while the
// dispatch loop is between slots; no borrow is held across user code.
// While a task runs it is checked out and its slot reads Running, which
// still counts as occupied.
//
// Each slot carries a generation bumped on every free. Handles embed
// it, so a handle outliving its task cannot touch the slot's next
// tenant.

use core::cell::{Cell, RefCell};
use core::fmt;

use super::callback::Callback;
use super::trigger::{Trigger, TriggerKind};

pub struct Task {
    pub callback: Callback,
    pub trigger: Trigger,
    // set at the start of each tick; tasks added mid-tick wait for the next
    armed: bool,
}

impl Task {
    pub fn new(callback: Callback, trigger: Trigger) -> Self {
        Self {
            callback,
            trigger,
            armed: false,
        }
    }

    pub fn kind(&self) -> TriggerKind {
        self.trigger.kind()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("callback", &self.callback)
            .field("trigger", &self.trigger)
            .field("armed", &self.armed)
            .finish()
    }
}

/// Identifies one task for [`cancel`](crate::kernel::Scheduler::cancel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    index: u32,
    generation: u32,
}

impl TaskHandle {
    pub const fn index(&self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task{}.{}", self.index, self.generation)
    }
}

enum Slot {
    Vacant,
    Occupied(Task),
    Running,
}

struct Entry {
    generation: Cell<u32>,
    slot: RefCell<Slot>,
}

impl Entry {
    fn new() -> Self {
        Self {
            generation: Cell::new(0),
            slot: RefCell::new(Slot::Vacant),
        }
    }

    fn free(&self, slot: &mut Slot) -> Slot {
        self.generation.set(self.generation.get().wrapping_add(1));
        core::mem::replace(slot, Slot::Vacant)
    }
}

/// What [`SlotTable::remove`] took out of a slot.
#[derive(Debug)]
pub enum Removal {
    Idle(Task),
    /// The task was mid-dispatch; the dispatch loop still holds it and
    /// drops it once its callback returns.
    InFlight,
}

pub struct SlotTable<const N: usize> {
    entries: [Entry; N],
}

impl<const N: usize> SlotTable<N> {
    pub fn new() -> Self {
        Self {
            entries: core::array::from_fn(|_| Entry::new()),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Lowest free index.
    pub fn vacant(&self) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| matches!(*e.slot.borrow(), Slot::Vacant))
    }

    /// Insert into the lowest free slot; hands the task back when full.
    pub fn try_insert(&self, task: Task) -> Result<TaskHandle, Task> {
        let Some(index) = self.vacant() else {
            return Err(task);
        };
        let entry = &self.entries[index];
        *entry.slot.borrow_mut() = Slot::Occupied(task);
        Ok(TaskHandle {
            index: index as u32,
            generation: entry.generation.get(),
        })
    }

    fn live_entry(&self, handle: TaskHandle) -> Option<&Entry> {
        self.entries
            .get(handle.index())
            .filter(|e| e.generation.get() == handle.generation)
    }

    /// Free the slot `handle` refers to. `None` for stale handles.
    ///
    /// The returned task must be dropped by the caller, after this
    /// returns, so captured state is released outside any borrow.
    pub fn remove(&self, handle: TaskHandle) -> Option<Removal> {
        let entry = self.live_entry(handle)?;
        let mut slot = entry.slot.borrow_mut();
        if matches!(*slot, Slot::Vacant) {
            return None;
        }
        match entry.free(&mut slot) {
            Slot::Occupied(task) => Some(Removal::Idle(task)),
            _ => Some(Removal::InFlight),
        }
    }

    pub fn contains(&self, handle: TaskHandle) -> bool {
        self.live_entry(handle)
            .is_some_and(|e| !matches!(*e.slot.borrow(), Slot::Vacant))
    }

    /// Handle for whatever currently lives at `index`.
    pub fn handle_at(&self, index: usize) -> Option<TaskHandle> {
        let entry = self.entries.get(index)?;
        if matches!(*entry.slot.borrow(), Slot::Vacant) {
            return None;
        }
        Some(TaskHandle {
            index: index as u32,
            generation: entry.generation.get(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !matches!(*e.slot.borrow(), Slot::Vacant))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.vacant().is_none()
    }

    /// Visit idle tasks in index order. Running tasks are skipped.
    /// `f` runs under the slot borrow and must not call back into the table.
    pub fn for_each_occupied(&self, mut f: impl FnMut(usize, &Task)) {
        for (index, entry) in self.entries.iter().enumerate() {
            if let Slot::Occupied(task) = &*entry.slot.borrow() {
                f(index, task);
            }
        }
    }

    // ── dispatch loop only ─────────────────────────────────────────

    /// Mark everything currently in the table eligible for this tick.
    pub fn arm_all(&self) {
        for entry in &self.entries {
            if let Slot::Occupied(task) = &mut *entry.slot.borrow_mut() {
                task.armed = true;
            }
        }
    }

    /// Take an armed task out of its slot, leaving it Running.
    pub fn checkout(&self, index: usize) -> Option<Task> {
        let entry = self.entries.get(index)?;
        let mut slot = entry.slot.borrow_mut();
        match &*slot {
            Slot::Occupied(task) if task.armed => {}
            _ => return None,
        }
        match core::mem::replace(&mut *slot, Slot::Running) {
            Slot::Occupied(task) => Some(task),
            _ => None,
        }
    }

    /// True while the task checked out of `index` still owns its slot,
    /// i.e. nobody canceled it since checkout.
    pub fn is_running(&self, index: usize) -> bool {
        self.entries
            .get(index)
            .is_some_and(|e| matches!(*e.slot.borrow(), Slot::Running))
    }

    /// Put a checked-out task back. Hands it back if it was canceled
    /// while running, in which case the slot may already have a new tenant.
    pub fn restore(&self, index: usize, task: Task) -> Result<(), Task> {
        let mut slot = self.entries[index].slot.borrow_mut();
        if matches!(*slot, Slot::Running) {
            *slot = Slot::Occupied(task);
            Ok(())
        } else {
            Err(task)
        }
    }

    /// Free a Running slot whose task is finished. False if it was
    /// already canceled from inside its own callback.
    pub fn release_running(&self, index: usize) -> bool {
        let entry = &self.entries[index];
        let mut slot = entry.slot.borrow_mut();
        if matches!(*slot, Slot::Running) {
            entry.free(&mut slot);
            true
        } else {
            false
        }
    }
}

impl<const N: usize> Default for SlotTable<N> {
    fn default() -> Self {
        Self::new()
    }
}
