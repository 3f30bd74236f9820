//! # sknode-system
//!
//! Device status indication.
//!
//! [`LedController`] consumes the WiFi state, the server connection state
//! and the delta activity count and picks a [`BlinkPattern`];
//! [`PatternBlinker`] plays it on an LED pin through the scheduler.

pub mod blinker;
pub mod led_controller;

pub use blinker::{BlinkPattern, LedPin, PatternBlinker, PatternPlayer, BLIP_DURATION};
pub use led_controller::{pattern_for, LedController};
