// End-to-end behaviour of the scheduler as a host loop sees it.

use std::cell::Cell;
use std::rc::Rc;

use pulp_tasks::{Clock, Instant, ScheduleError, Scheduler, TickCounter, TriggerKind};

fn at(ms: u32) -> Instant {
    Instant::from_millis(ms)
}

fn counter() -> (Rc<Cell<u32>>, impl FnMut() + 'static) {
    let hits = Rc::new(Cell::new(0));
    let seen = hits.clone();
    (hits, move || seen.set(seen.get() + 1))
}

struct DropProbe(Rc<Cell<u32>>);

impl Drop for DropProbe {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

#[test]
fn capacity_scenario() {
    let clock = TickCounter::new();
    let sched: Scheduler<&TickCounter, 2> = Scheduler::new(&clock);

    let (a_hits, a) = counter();
    let (b_hits, b) = counter();
    let (c_hits, c) = counter();
    sched.schedule_once(a, 10).unwrap();
    sched.schedule_once(b, 10).unwrap();
    assert_eq!(
        sched.schedule_once(c, 10),
        Err(ScheduleError::CapacityExceeded { capacity: 2 })
    );
    assert_eq!(sched.len(), 2);

    clock.advance(10);
    assert_eq!(sched.poll(), 2);
    assert_eq!((a_hits.get(), b_hits.get(), c_hits.get()), (1, 1, 0));

    let (_, d) = counter();
    assert!(sched.schedule_once(d, 10).is_ok());
}

#[test]
fn capacity_failure_leaves_table_untouched() {
    let clock = TickCounter::new();
    let sched: Scheduler<&TickCounter, 1> = Scheduler::new(&clock);
    let (hits, cb) = counter();
    let h = sched.schedule_interval(cb, 5).unwrap();

    assert!(sched.schedule_on_predicate(|| {}, || true).is_err());
    assert!(sched.schedule_interval(|| {}, 1).is_err());
    assert!(sched.schedule_rearming(|| pulp_tasks::Rearm::Done, 1).is_err());
    assert_eq!(sched.len(), 1);
    assert!(sched.is_scheduled(h));

    sched.tick(at(5));
    assert_eq!(hits.get(), 1);

    // freeing one slot makes exactly one registration possible
    sched.cancel(h);
    assert!(sched.schedule_once(|| {}, 1).is_ok());
    assert!(sched.schedule_once(|| {}, 1).is_err());
}

#[test]
fn interval_late_ticks_scenario() {
    let clock = TickCounter::new();
    let sched: Scheduler<&TickCounter, 4> = Scheduler::new(&clock);
    let (hits, cb) = counter();
    sched.schedule_interval(cb, 100).unwrap();

    assert_eq!(sched.tick(at(95)), 0);
    assert_eq!(sched.tick(at(205)), 1);
    // two periods behind, still one firing
    assert_eq!(sched.tick(at(310)), 1);
    assert_eq!(hits.get(), 2);
    assert_eq!(sched.time_until_next(at(310)), Some(0));
}

#[test]
fn interval_rate_holds_under_jitter() {
    let clock = TickCounter::new();
    let sched: Scheduler<&TickCounter, 1> = Scheduler::new(&clock);
    let (hits, cb) = counter();
    let period = 50;
    sched.schedule_interval(cb, period).unwrap();

    // cadence never exceeds the period, with uneven steps
    let steps = [13, 47, 5, 50, 29, 31, 2, 44];
    let mut now = 0u32;
    for step in steps.iter().cycle().take(400) {
        now += step;
        sched.tick(at(now));
        let expected = now / period;
        let got = hits.get();
        assert!(
            got == expected || got + 1 == expected,
            "at {}: {} firings, expected ~{}",
            now,
            got,
            expected
        );
    }
}

#[test]
fn once_fires_exactly_once() {
    let clock = TickCounter::starting_at(700);
    let sched: Scheduler<&TickCounter> = Scheduler::new(&clock);
    let (hits, cb) = counter();
    let h = sched.schedule_once(cb, 30).unwrap();

    for t in 700..800 {
        sched.tick(at(t));
        let expected = if t >= 730 { 1 } else { 0 };
        assert_eq!(hits.get(), expected, "at {}", t);
    }
    assert!(!sched.is_scheduled(h));
    assert!(sched.is_empty());
    assert_eq!(sched.capacity(), pulp_tasks::DEFAULT_MAX_TASKS);
}

#[test]
fn predicate_fires_iff_true_and_stays() {
    let clock = TickCounter::new();
    let sched: Scheduler<&TickCounter, 2> = Scheduler::new(&clock);
    let level = Rc::new(Cell::new(false));
    let (hits, cb) = counter();
    let l = level.clone();
    let h = sched.schedule_on_predicate(cb, move || l.get()).unwrap();

    let pattern = [false, true, true, false, true, false, false, true];
    let mut expected = 0;
    for (k, &high) in pattern.iter().enumerate() {
        level.set(high);
        sched.tick(at(k as u32));
        if high {
            expected += 1;
        }
        assert_eq!(hits.get(), expected, "tick {}", k);
    }
    assert!(sched.is_scheduled(h));
    assert_eq!(sched.pending_by_kind(TriggerKind::Predicate), 1);
}

#[test]
fn cancel_is_final_and_idempotent() {
    let clock = TickCounter::new();
    let sched: Scheduler<&TickCounter, 4> = Scheduler::new(&clock);
    let (hits, cb) = counter();
    let h = sched.schedule_interval(cb, 10).unwrap();

    sched.tick(at(10));
    assert!(sched.cancel(h));
    assert!(!sched.cancel(h));
    for t in (20..200).step_by(10) {
        sched.tick(at(t));
    }
    assert_eq!(hits.get(), 1);

    // a fired one-shot's handle is just as dead
    let once = sched.schedule_once(|| {}, 0).unwrap();
    sched.tick(at(200));
    assert!(!sched.cancel(once));
}

#[test]
fn stale_handle_cannot_cancel_slot_reuser() {
    let clock = TickCounter::new();
    let sched: Scheduler<&TickCounter, 1> = Scheduler::new(&clock);
    let first = sched.schedule_once(|| {}, 0).unwrap();
    sched.tick(at(0));

    let (hits, cb) = counter();
    let second = sched.schedule_once(cb, 5).unwrap();
    assert_eq!(first.index(), second.index());
    assert!(!sched.cancel(first));

    sched.tick(at(5));
    assert_eq!(hits.get(), 1);
}

#[test]
fn captured_state_released_exactly_once() {
    let clock = TickCounter::new();
    let fired = Rc::new(Cell::new(0));
    let canceled = Rc::new(Cell::new(0));
    let dropped_with_scheduler = Rc::new(Cell::new(0));
    {
        let sched: Scheduler<&TickCounter, 4> = Scheduler::new(&clock);

        let probe = DropProbe(fired.clone());
        sched
            .schedule_once(
                move || {
                    let _held = &probe;
                },
                1,
            )
            .unwrap();

        let probe = DropProbe(canceled.clone());
        let h = sched
            .schedule_interval(
                move || {
                    let _held = &probe;
                },
                1,
            )
            .unwrap();

        let probe = DropProbe(dropped_with_scheduler.clone());
        sched
            .schedule_on_predicate(
                move || {
                    let _held = &probe;
                },
                || false,
            )
            .unwrap();

        sched.tick(at(1));
        assert_eq!(fired.get(), 1);
        assert_eq!(canceled.get(), 0);

        sched.cancel(h);
        assert_eq!(canceled.get(), 1);
        sched.cancel(h);
        assert_eq!(dropped_with_scheduler.get(), 0);
    }
    assert_eq!(fired.get(), 1);
    assert_eq!(canceled.get(), 1);
    assert_eq!(dropped_with_scheduler.get(), 1);
}

#[test]
fn deadlines_across_counter_wrap() {
    let clock = TickCounter::starting_at(u32::MAX - 20);
    let sched: Scheduler<&TickCounter, 2> = Scheduler::new(&clock);
    let (once_hits, once) = counter();
    let (every_hits, every) = counter();
    sched.schedule_once(once, 30).unwrap();
    sched.schedule_interval(every, 15).unwrap();

    clock.advance(10);
    sched.poll();
    assert_eq!((once_hits.get(), every_hits.get()), (0, 0));

    // counter is at u32::MAX - 5
    clock.advance(5);
    sched.poll();
    assert_eq!((once_hits.get(), every_hits.get()), (0, 1));

    // wrapped to 9
    clock.advance(15);
    assert_eq!(clock.now(), at(9));
    sched.poll();
    assert_eq!((once_hits.get(), every_hits.get()), (1, 2));
}
