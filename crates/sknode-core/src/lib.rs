//! # sknode-core
//!
//! Core building blocks for sknode sensor applications.
//!
//! This crate provides:
//! - Typed value channels (producers, consumers, synchronous notification)
//! - The `Configurable` contract with JSON schema and persistence
//! - Configuration storage backends (memory, file)
//! - A cooperative, single-threaded scheduler
//! - The SignalK delta model used by output nodes
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! making it usable on both Linux hosts and ESP32 targets.

pub mod config;
pub mod model;
pub mod observable;
pub mod registry;
pub mod scheduler;
pub mod schema;
pub mod storage;

pub use config::{
    number_field, require_keys, string_field, unsigned_field, ConfigError, Configurable,
};
pub use model::{Delta, DeltaQueue, PathValue, Update, SELF_CONTEXT};
pub use observable::{ObservableValue, ValueConsumer, ValueProducer};
pub use registry::ConfigRegistry;
pub use scheduler::{EventLoop, Scheduler};
pub use schema::{ConfigSchema, Field, FieldType};
pub use storage::{ConfigStorage, FileConfigStorage, MemoryConfigStorage};
