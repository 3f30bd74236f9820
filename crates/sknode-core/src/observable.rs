//! Typed value channels.
//!
//! A producer owns an [`ObservableValue`] holding its current value and the
//! ordered list of consumers registered against it. Calling
//! [`ObservableValue::set`] stores the value and then invokes every consumer
//! synchronously, in registration order. There is no batching and no change
//! detection: every `set` notifies, even when the value did not change.
//!
//! Everything here is single-threaded (`Rc`/`RefCell`). Notification chains
//! (sensor -> transform -> output) run to completion inside the callback that
//! triggered them. Wiring must be acyclic; a producer that ends up consuming
//! its own output recurses until the stack overflows.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type Callback<T> = Rc<dyn Fn(T, u8)>;

struct Observer<T> {
    callback: Callback<T>,
    input_channel: u8,
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            callback: Rc::clone(&self.callback),
            input_channel: self.input_channel,
        }
    }
}

/// Receives values pushed by a producer.
///
/// `input_channel` lets a consumer with several inputs tell them apart; it is
/// the index given when the consumer was connected.
pub trait ValueConsumer<T> {
    fn set_input(&self, value: T, input_channel: u8);
}

/// A node that owns an output channel.
pub trait ValueProducer<T: Clone + 'static> {
    /// The channel this producer emits on.
    fn output(&self) -> &ObservableValue<T>;

    /// Current output value.
    fn value(&self) -> T {
        self.output().get()
    }

    /// Connect a consumer on input channel 0. Returns the consumer so chains
    /// can be written left to right.
    fn connect_to<C>(&self, consumer: Rc<C>) -> Rc<C>
    where
        Self: Sized,
        C: ValueConsumer<T> + ?Sized + 'static,
    {
        self.output().connect_to_channel(consumer, 0)
    }

    /// Connect a consumer on a specific input channel.
    fn connect_to_channel<C>(&self, consumer: Rc<C>, input_channel: u8) -> Rc<C>
    where
        Self: Sized,
        C: ValueConsumer<T> + ?Sized + 'static,
    {
        self.output().connect_to_channel(consumer, input_channel)
    }

    /// Register a plain callback.
    fn attach<F>(&self, callback: F)
    where
        Self: Sized,
        F: Fn(T) + 'static,
    {
        self.output().attach(callback)
    }
}

/// A current value plus the consumers observing it.
pub struct ObservableValue<T> {
    value: RefCell<T>,
    observers: RefCell<Vec<Observer<T>>>,
}

impl<T: Clone + 'static> ObservableValue<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: RefCell::new(initial),
            observers: RefCell::new(Vec::new()),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Store a new value and notify every consumer.
    pub fn set(&self, value: T) {
        self.value.replace(value);
        self.notify();
    }

    /// Notify every consumer with the current value, in registration order.
    pub fn notify(&self) {
        // Work on a snapshot: consumers may connect further consumers while
        // being notified. Those only see the next notification.
        let observers: Vec<Observer<T>> = self.observers.borrow().clone();
        let value = self.get();
        for observer in observers {
            (observer.callback)(value.clone(), observer.input_channel);
        }
    }

    /// Register a consumer on the given input channel.
    pub fn connect_to_channel<C>(&self, consumer: Rc<C>, input_channel: u8) -> Rc<C>
    where
        C: ValueConsumer<T> + ?Sized + 'static,
    {
        let target = Rc::clone(&consumer);
        self.observers.borrow_mut().push(Observer {
            callback: Rc::new(move |value, channel| target.set_input(value, channel)),
            input_channel,
        });
        consumer
    }

    /// Register a plain callback on channel 0.
    pub fn attach<F>(&self, callback: F)
    where
        F: Fn(T) + 'static,
    {
        self.observers.borrow_mut().push(Observer {
            callback: Rc::new(move |value, _| callback(value)),
            input_channel: 0,
        });
    }

    /// Number of registered consumers.
    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }
}

impl<T: Clone + 'static> ValueProducer<T> for ObservableValue<T> {
    fn output(&self) -> &ObservableValue<T> {
        self
    }
}

/// An observable can sit in the middle of a chain: whatever it receives it
/// stores and re-broadcasts.
impl<T: Clone + 'static> ValueConsumer<T> for ObservableValue<T> {
    fn set_input(&self, value: T, _input_channel: u8) {
        self.set(value);
    }
}

impl<T: Clone + Default + 'static> Default for ObservableValue<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableValue")
            .field("value", &*self.value.borrow())
            .field("observers", &self.observers.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Consumer that records everything it receives.
    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Vec<(f64, u8)>>,
    }

    impl ValueConsumer<f64> for Recorder {
        fn set_input(&self, value: f64, input_channel: u8) {
            self.seen.borrow_mut().push((value, input_channel));
        }
    }

    #[test]
    fn test_notifies_in_registration_order() {
        let value = ObservableValue::new(0.0);
        let log = Rc::new(RefCell::new(Vec::new()));

        for id in 0..4 {
            let log = Rc::clone(&log);
            value.attach(move |v: f64| log.borrow_mut().push((id, v)));
        }

        value.set(2.5);

        assert_eq!(
            *log.borrow(),
            vec![(0, 2.5), (1, 2.5), (2, 2.5), (3, 2.5)]
        );
    }

    #[test]
    fn test_set_notifies_even_if_unchanged() {
        let value = ObservableValue::new(1);
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        value.attach(move |_| c.set(c.get() + 1));

        value.set(1);
        value.set(1);

        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_zero_consumers_is_valid() {
        let value = ObservableValue::new(String::new());
        value.set("discarded".to_string());
        assert_eq!(value.get(), "discarded");
        assert_eq!(value.observer_count(), 0);
    }

    #[test]
    fn test_channel_index_is_delivered() {
        let a = ObservableValue::new(0.0);
        let b = ObservableValue::new(0.0);
        let recorder = Rc::new(Recorder::default());

        a.connect_to_channel(Rc::clone(&recorder), 0);
        b.connect_to_channel(Rc::clone(&recorder), 1);

        b.set(4.0);
        a.set(3.0);

        assert_eq!(*recorder.seen.borrow(), vec![(4.0, 1), (3.0, 0)]);
    }

    #[test]
    fn test_chained_propagation() {
        let source = ObservableValue::new(0.0);
        let middle = source.connect_to(Rc::new(ObservableValue::new(0.0)));
        let recorder = middle.connect_to(Rc::new(Recorder::default()));

        source.set(9.0);

        assert_eq!(middle.get(), 9.0);
        assert_eq!(*recorder.seen.borrow(), vec![(9.0, 0)]);
    }

    #[test]
    fn test_subscribing_during_notify_does_not_panic() {
        let value = Rc::new(ObservableValue::new(0));
        let late_hits = Rc::new(Cell::new(0));

        let v = Rc::downgrade(&value);
        let hits = Rc::clone(&late_hits);
        value.attach(move |_| {
            if let Some(v) = v.upgrade() {
                let hits = Rc::clone(&hits);
                v.attach(move |_| hits.set(hits.get() + 1));
            }
        });

        value.set(1);
        assert_eq!(late_hits.get(), 0);

        value.set(2);
        assert_eq!(late_hits.get(), 1);
    }
}
