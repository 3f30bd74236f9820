//! # sknode-sensors
//!
//! Sensor, transform and output nodes built on the sknode-core value
//! channels.
//!
//! - [`sensor`]: the [`Sensor`] trait and a generic polling sensor
//! - [`ina219`]: INA219 high side current sensor configuration and readers
//! - [`transforms`]: map, filter and combine nodes
//! - [`output`]: SignalK output nodes feeding a [`DeltaQueue`](sknode_core::DeltaQueue)

pub mod ina219;
pub mod output;
pub mod sensor;
pub mod transforms;

pub use ina219::{BusVoltageRange, Ina219, Ina219Driver, Ina219Settings, Ina219Value, Ina219ValueType, ShuntGain};
pub use output::{SkOutput, SkOutputFloat};
pub use sensor::{RepeatSensor, Sensor};
pub use transforms::{ChangeFilter, Difference, LambdaTransform, Linear};
