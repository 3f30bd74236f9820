//! Sensors: nodes that only produce.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use sknode_core::{ObservableValue, Scheduler, ValueProducer};
use tracing::debug;

/// A producer that polls its source on a timer.
///
/// Construction only wires state; nothing is read until [`enable`](Sensor::enable)
/// registers the polling task with the scheduler.
pub trait Sensor<T: Clone + 'static>: ValueProducer<T> {
    /// Start periodic reads.
    fn enable(self: Rc<Self>, scheduler: &dyn Scheduler);
}

/// Calls a closure every `interval` and emits the result.
pub struct RepeatSensor<T> {
    interval: Duration,
    read: RefCell<Box<dyn FnMut() -> T>>,
    output: ObservableValue<T>,
}

impl<T: Clone + 'static> RepeatSensor<T> {
    pub fn new<F>(interval: Duration, initial: T, read: F) -> Rc<Self>
    where
        F: FnMut() -> T + 'static,
    {
        Rc::new(Self {
            interval,
            read: RefCell::new(Box::new(read)),
            output: ObservableValue::new(initial),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn poll(&self) {
        let value = (self.read.borrow_mut())();
        self.output.set(value);
    }
}

impl<T: Clone + 'static> ValueProducer<T> for RepeatSensor<T> {
    fn output(&self) -> &ObservableValue<T> {
        &self.output
    }
}

impl<T: Clone + 'static> Sensor<T> for RepeatSensor<T> {
    fn enable(self: Rc<Self>, scheduler: &dyn Scheduler) {
        debug!("Enabling repeat sensor every {:?}", self.interval);
        let interval = self.interval;
        scheduler.on_repeat(interval, Box::new(move || self.poll()));
    }
}
