//! LED pattern playback.
//!
//! A [`BlinkPattern`] is a loop of durations, alternating on and off and
//! starting with on. [`PatternBlinker`] plays one pattern at a time on a
//! [`LedPin`], stepping through it with one-shot scheduler timers.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use sknode_core::Scheduler;
use tracing::trace;

/// Default length of each half of a [`blip`](PatternPlayer::blip).
pub const BLIP_DURATION: Duration = Duration::from_millis(20);

/// What the LED should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkPattern {
    /// Steady on or off.
    Solid(bool),
    /// Durations in milliseconds, alternating on and off, repeated forever.
    /// Zero-length steps are skipped.
    Sequence(&'static [u32]),
}

impl BlinkPattern {
    pub const OFF: BlinkPattern = BlinkPattern::Solid(false);
    pub const ON: BlinkPattern = BlinkPattern::Solid(true);

    /// A sequence with no time in it behaves as solid off.
    fn normalized(self) -> BlinkPattern {
        match self {
            BlinkPattern::Sequence(steps) if steps.iter().all(|&ms| ms == 0) => BlinkPattern::OFF,
            other => other,
        }
    }
}

/// A digital output driving the LED.
pub trait LedPin {
    fn set(&mut self, on: bool);
}

/// Something that can show a [`BlinkPattern`].
pub trait PatternPlayer {
    /// Replace the current pattern, starting it from its first step.
    fn set_pattern(&self, pattern: BlinkPattern);

    /// Flash briefly without changing the pattern.
    fn blip(&self);
}

/// Plays patterns on a pin using the scheduler.
///
/// Every pattern change bumps a generation counter; timers from an older
/// generation find it changed and do nothing, so there is never more than
/// one live step chain.
pub struct PatternBlinker {
    pin: RefCell<Box<dyn LedPin>>,
    scheduler: Rc<dyn Scheduler>,
    pattern: Cell<BlinkPattern>,
    index: Cell<usize>,
    generation: Cell<u64>,
    state: Cell<bool>,
    update_counter: Cell<u64>,
    blipping: Cell<bool>,
    blip_duration: Duration,
    this: Weak<PatternBlinker>,
}

impl PatternBlinker {
    /// Start with the LED off.
    pub fn new(pin: Box<dyn LedPin>, scheduler: Rc<dyn Scheduler>) -> Rc<Self> {
        Self::with_blip_duration(pin, scheduler, BLIP_DURATION)
    }

    pub fn with_blip_duration(
        pin: Box<dyn LedPin>,
        scheduler: Rc<dyn Scheduler>,
        blip_duration: Duration,
    ) -> Rc<Self> {
        let blinker = Rc::new_cyclic(|this| Self {
            pin: RefCell::new(pin),
            scheduler,
            pattern: Cell::new(BlinkPattern::OFF),
            index: Cell::new(0),
            generation: Cell::new(0),
            state: Cell::new(false),
            update_counter: Cell::new(0),
            blipping: Cell::new(false),
            blip_duration,
            this: this.clone(),
        });
        blinker.set_state(false);
        blinker
    }

    pub fn pattern(&self) -> BlinkPattern {
        self.pattern.get()
    }

    /// Current LED state.
    pub fn is_on(&self) -> bool {
        self.state.get()
    }

    fn set_state(&self, on: bool) {
        self.state.set(on);
        self.update_counter.set(self.update_counter.get() + 1);
        self.pin.borrow_mut().set(on);
    }

    /// Show the step at `index` and schedule the next one.
    fn step(&self, generation: u64) {
        if generation != self.generation.get() {
            return;
        }
        let BlinkPattern::Sequence(steps) = self.pattern.get() else {
            return;
        };

        // At least one step is non-zero; normalized() turned the rest into OFF.
        let mut index = self.index.get() % steps.len();
        while steps[index] == 0 {
            index = (index + 1) % steps.len();
        }

        self.set_state(index % 2 == 0);
        self.index.set(index + 1);

        let this = self.this.clone();
        self.scheduler.on_delay(
            Duration::from_millis(u64::from(steps[index])),
            Box::new(move || {
                if let Some(blinker) = this.upgrade() {
                    blinker.step(generation);
                }
            }),
        );
    }

    fn blip_on(&self, counter: u64, restore: bool) {
        if self.update_counter.get() != counter {
            self.blipping.set(false);
            return;
        }
        self.set_state(true);
        let counter = self.update_counter.get();

        let this = self.this.clone();
        self.scheduler.on_delay(
            self.blip_duration,
            Box::new(move || {
                if let Some(blinker) = this.upgrade() {
                    if blinker.update_counter.get() == counter {
                        blinker.set_state(restore);
                    }
                    blinker.blipping.set(false);
                }
            }),
        );
    }
}

impl PatternPlayer for PatternBlinker {
    fn set_pattern(&self, pattern: BlinkPattern) {
        let pattern = pattern.normalized();
        trace!("LED pattern {:?}", pattern);

        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        self.pattern.set(pattern);
        self.index.set(0);

        match pattern {
            BlinkPattern::Solid(on) => self.set_state(on),
            BlinkPattern::Sequence(_) => self.step(generation),
        }
    }

    /// Off, on, then back to whatever the LED showed before, each for the
    /// blip duration. Abandoned if the pattern writes the LED in between.
    fn blip(&self) {
        if self.blipping.replace(true) {
            return;
        }
        let restore = self.state.get();
        self.set_state(false);
        let counter = self.update_counter.get();

        let this = self.this.clone();
        self.scheduler.on_delay(
            self.blip_duration,
            Box::new(move || {
                if let Some(blinker) = this.upgrade() {
                    blinker.blip_on(counter, restore);
                }
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sknode_core::EventLoop;

    struct RecordingPin(Rc<RefCell<Vec<bool>>>);

    impl LedPin for RecordingPin {
        fn set(&mut self, on: bool) {
            self.0.borrow_mut().push(on);
        }
    }

    fn blinker() -> (Rc<EventLoop>, Rc<RefCell<Vec<bool>>>, Rc<PatternBlinker>) {
        let event_loop = Rc::new(EventLoop::new());
        let writes = Rc::new(RefCell::new(Vec::new()));
        let blinker = PatternBlinker::new(
            Box::new(RecordingPin(Rc::clone(&writes))),
            event_loop.clone(),
        );
        writes.borrow_mut().clear();
        (event_loop, writes, blinker)
    }

    #[test]
    fn test_sequence_loops() {
        let (event_loop, writes, blinker) = blinker();

        blinker.set_pattern(BlinkPattern::Sequence(&[100, 300]));
        for _ in 0..4 {
            event_loop.advance(Duration::from_millis(100));
        }

        // on@0, off@100, on@400
        assert_eq!(*writes.borrow(), vec![true, false, true]);
    }

    #[test]
    fn test_new_pattern_cancels_old_chain() {
        let (event_loop, writes, blinker) = blinker();

        blinker.set_pattern(BlinkPattern::Sequence(&[50, 50]));
        blinker.set_pattern(BlinkPattern::ON);
        event_loop.advance(Duration::from_millis(1000));

        assert_eq!(*writes.borrow(), vec![true, true]);
        assert!(blinker.is_on());
    }

    #[test]
    fn test_zero_length_steps_are_skipped() {
        let (event_loop, writes, blinker) = blinker();

        blinker.set_pattern(BlinkPattern::Sequence(&[1000, 0]));
        event_loop.advance(Duration::from_millis(3000));

        assert!(writes.borrow().iter().all(|&on| on));
        assert_eq!(writes.borrow().len(), 4);
    }

    #[test]
    fn test_all_zero_sequence_is_off() {
        let (event_loop, _, blinker) = blinker();

        blinker.set_pattern(BlinkPattern::Sequence(&[0, 0]));
        event_loop.advance(Duration::from_millis(100));

        assert_eq!(blinker.pattern(), BlinkPattern::OFF);
        assert!(!blinker.is_on());
    }

    #[test]
    fn test_blip_restores_state() {
        let (event_loop, writes, blinker) = blinker();
        blinker.set_pattern(BlinkPattern::ON);

        blinker.blip();
        blinker.blip();
        event_loop.advance(Duration::from_millis(40));

        assert_eq!(*writes.borrow(), vec![true, false, true, true]);

        blinker.blip();
        event_loop.advance(Duration::from_millis(40));
        assert_eq!(writes.borrow().len(), 7);
    }
}
