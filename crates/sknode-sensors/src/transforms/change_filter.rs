//! Pass values only when they move by a meaningful amount.

use std::cell::Cell;
use std::rc::Rc;

use serde_json::{json, Map, Value};
use sknode_core::{
    number_field, require_keys, unsigned_field, ConfigError, ConfigSchema, ConfigStorage,
    Configurable, Field, ObservableValue, ValueConsumer, ValueProducer,
};

/// Emits an input only if it differs from the last emitted value by at least
/// `min_delta` and at most `max_delta`.
///
/// Jumps larger than `max_delta` are treated as glitches. A value is forced
/// through anyway once more than `max_skips` consecutive inputs have been
/// suppressed, so a real step change is eventually accepted. The first input
/// always passes.
pub struct ChangeFilter {
    min_delta: Cell<f64>,
    max_delta: Cell<f64>,
    max_skips: Cell<u32>,
    skips: Cell<u32>,
    primed: Cell<bool>,
    config_path: Option<String>,
    output: ObservableValue<f64>,
}

impl ChangeFilter {
    pub fn new(
        min_delta: f64,
        max_delta: f64,
        max_skips: u32,
        config_path: Option<&str>,
        storage: &dyn ConfigStorage,
    ) -> Rc<Self> {
        let filter = Rc::new(Self {
            min_delta: Cell::new(min_delta),
            max_delta: Cell::new(max_delta),
            max_skips: Cell::new(max_skips),
            skips: Cell::new(0),
            primed: Cell::new(false),
            config_path: config_path.map(String::from),
            output: ObservableValue::new(0.0),
        });
        filter.restore_configuration(storage);
        filter
    }

    /// Inputs suppressed since the last emitted value.
    pub fn skips(&self) -> u32 {
        self.skips.get()
    }
}

impl ValueConsumer<f64> for ChangeFilter {
    fn set_input(&self, input: f64, _input_channel: u8) {
        let delta = (input - self.output.get()).abs();
        let in_band = delta >= self.min_delta.get() && delta <= self.max_delta.get();

        if !self.primed.get() || in_band || self.skips.get() > self.max_skips.get() {
            self.primed.set(true);
            self.skips.set(0);
            self.output.set(input);
        } else {
            self.skips.set(self.skips.get() + 1);
        }
    }
}

impl ValueProducer<f64> for ChangeFilter {
    fn output(&self) -> &ObservableValue<f64> {
        &self.output
    }
}

impl Configurable for ChangeFilter {
    fn config_path(&self) -> Option<&str> {
        self.config_path.as_deref()
    }

    fn get_configuration(&self, root: &mut Map<String, Value>) {
        root.insert("min_delta".to_string(), json!(self.min_delta.get()));
        root.insert("max_delta".to_string(), json!(self.max_delta.get()));
        root.insert("max_skips".to_string(), json!(self.max_skips.get()));
    }

    fn get_config_schema(&self) -> Value {
        ConfigSchema::new()
            .property(
                "min_delta",
                Field::number("Minimum delta").description("Minimum difference in change of value before forwarding"),
            )
            .property(
                "max_delta",
                Field::number("Maximum delta").description("Maximum difference in change of value to allow forwarding"),
            )
            .property(
                "max_skips",
                Field::number("Max skip count").description("Maximum number of consecutive filtered values before one is allowed through"),
            )
            .into()
    }

    fn set_configuration(&self, config: &Value) -> Result<(), ConfigError> {
        let map = require_keys(config, &["min_delta", "max_delta", "max_skips"])?;
        let min_delta = number_field(map, "min_delta")?;
        let max_delta = number_field(map, "max_delta")?;
        let max_skips = unsigned_field(map, "max_skips")?;
        if min_delta > max_delta {
            return Err(ConfigError::InvalidValue {
                key: "min_delta".to_string(),
                reason: format!("{} is larger than max_delta {}", min_delta, max_delta),
            });
        }
        self.min_delta.set(min_delta);
        self.max_delta.set(max_delta);
        self.max_skips.set(max_skips);
        Ok(())
    }
}
