//! Cooperative scheduling.
//!
//! Nodes never block and never spawn threads. Periodic work ("read the sensor
//! every 500 ms", "check the WiFi link every 5 s") and deferred work ("restart
//! in 500 ms") is registered with a [`Scheduler`] and runs to completion on
//! the single thread that drives the loop.
//!
//! [`EventLoop`] is the provided implementation. It keeps a virtual clock
//! that only moves when the owner calls [`EventLoop::advance`]; a firmware
//! main loop advances it from a hardware timer, a host binary from a tokio
//! interval, and tests by hand.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::time::Duration;

/// Timer registration service. Registrations are fire-and-forget: there is
/// no handle and no cancellation.
pub trait Scheduler {
    /// Run `callback` every `interval`, starting one interval from now.
    fn on_repeat(&self, interval: Duration, callback: Box<dyn FnMut()>);

    /// Run `callback` once after `delay`.
    fn on_delay(&self, delay: Duration, callback: Box<dyn FnOnce()>);
}

enum Task {
    Once(Box<dyn FnOnce()>),
    Repeat {
        interval_ms: u64,
        callback: Box<dyn FnMut()>,
    },
}

struct Timer {
    due_ms: u64,
    seq: u64,
    task: Task,
}

/// Single-threaded timer loop with a virtual millisecond clock.
#[derive(Default)]
pub struct EventLoop {
    now_ms: Cell<u64>,
    next_seq: Cell<u64>,
    timers: RefCell<Vec<Timer>>,
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since the loop was created.
    pub fn now(&self) -> Duration {
        Duration::from_millis(self.now_ms.get())
    }

    /// Number of registered timers (repeating timers count once).
    pub fn pending(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Move the clock forward by `by`, running every timer that falls due.
    pub fn advance(&self, by: Duration) {
        let target = self.now_ms.get().saturating_add(as_millis(by));
        self.run_until(target);
    }

    /// Move the clock forward to `elapsed` (no-op if already past it).
    pub fn advance_to(&self, elapsed: Duration) {
        let target = as_millis(elapsed);
        if target > self.now_ms.get() {
            self.run_until(target);
        }
    }

    fn push(&self, due_ms: u64, task: Task) {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        self.timers.borrow_mut().push(Timer { due_ms, seq, task });
    }

    /// Timers run in due order, ties in registration order. No borrow is held
    /// while a callback runs, so callbacks may register further timers.
    fn run_until(&self, target: u64) {
        loop {
            let next = self
                .timers
                .borrow()
                .iter()
                .enumerate()
                .filter(|(_, timer)| timer.due_ms <= target)
                .min_by_key(|(_, timer)| (timer.due_ms, timer.seq))
                .map(|(index, _)| index);

            let Some(index) = next else {
                break;
            };

            let timer = self.timers.borrow_mut().swap_remove(index);
            if timer.due_ms > self.now_ms.get() {
                self.now_ms.set(timer.due_ms);
            }

            match timer.task {
                Task::Once(callback) => callback(),
                Task::Repeat {
                    interval_ms,
                    mut callback,
                } => {
                    callback();
                    self.push(
                        timer.due_ms + interval_ms,
                        Task::Repeat {
                            interval_ms,
                            callback,
                        },
                    );
                }
            }
        }

        self.now_ms.set(target);
    }
}

impl Scheduler for EventLoop {
    fn on_repeat(&self, interval: Duration, callback: Box<dyn FnMut()>) {
        let interval_ms = as_millis(interval).max(1);
        self.push(
            self.now_ms.get() + interval_ms,
            Task::Repeat {
                interval_ms,
                callback,
            },
        );
    }

    fn on_delay(&self, delay: Duration, callback: Box<dyn FnOnce()>) {
        self.push(
            self.now_ms.get().saturating_add(as_millis(delay)),
            Task::Once(callback),
        );
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("now_ms", &self.now_ms.get())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn counter() -> (Rc<Cell<u32>>, impl FnMut()) {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        (count, move || c.set(c.get() + 1))
    }

    #[test]
    fn test_repeat_fires_once_per_interval() {
        let event_loop = EventLoop::new();
        let (count, tick) = counter();
        event_loop.on_repeat(Duration::from_millis(100), Box::new(tick));

        event_loop.advance(Duration::from_millis(99));
        assert_eq!(count.get(), 0);

        event_loop.advance(Duration::from_millis(1));
        assert_eq!(count.get(), 1);

        event_loop.advance(Duration::from_millis(450));
        assert_eq!(count.get(), 5);
        assert_eq!(event_loop.now(), Duration::from_millis(550));
    }

    #[test]
    fn test_delay_fires_exactly_once() {
        let event_loop = EventLoop::new();
        let (count, mut tick) = counter();
        event_loop.on_delay(Duration::from_millis(500), Box::new(move || tick()));

        event_loop.advance(Duration::from_secs(10));
        event_loop.advance(Duration::from_secs(10));

        assert_eq!(count.get(), 1);
        assert_eq!(event_loop.pending(), 0);
    }

    #[test]
    fn test_timers_run_in_due_order() {
        let event_loop = EventLoop::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for (label, delay) in [("c", 30), ("a", 10), ("b", 20), ("a2", 10)] {
            let order = Rc::clone(&order);
            event_loop.on_delay(
                Duration::from_millis(delay),
                Box::new(move || order.borrow_mut().push(label)),
            );
        }

        event_loop.advance(Duration::from_millis(30));
        assert_eq!(*order.borrow(), vec!["a", "a2", "b", "c"]);
    }

    #[test]
    fn test_clock_reads_due_time_inside_callback() {
        let event_loop = Rc::new(EventLoop::new());
        let seen = Rc::new(Cell::new(Duration::ZERO));

        let el = Rc::clone(&event_loop);
        let s = Rc::clone(&seen);
        event_loop.on_delay(
            Duration::from_millis(250),
            Box::new(move || s.set(el.now())),
        );

        event_loop.advance(Duration::from_secs(1));
        assert_eq!(seen.get(), Duration::from_millis(250));
    }

    #[test]
    fn test_callback_can_schedule_more_work() {
        let event_loop = Rc::new(EventLoop::new());
        let (count, tick) = counter();

        let el = Rc::clone(&event_loop);
        event_loop.on_delay(
            Duration::from_millis(10),
            Box::new(move || el.on_delay(Duration::from_millis(10), Box::new(tick))),
        );

        event_loop.advance(Duration::from_millis(15));
        assert_eq!(count.get(), 0);

        event_loop.advance(Duration::from_millis(5));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let event_loop = EventLoop::new();
        let (count, tick) = counter();
        event_loop.on_repeat(Duration::ZERO, Box::new(tick));

        event_loop.advance(Duration::from_millis(5));
        assert_eq!(count.get(), 5);
    }
}
