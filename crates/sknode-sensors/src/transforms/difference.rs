//! `output = k1 * in0 - k2 * in1`

use std::cell::Cell;
use std::rc::Rc;

use serde_json::{json, Map, Value};
use sknode_core::{
    number_field, require_keys, ConfigError, ConfigSchema, ConfigStorage, Configurable, Field,
    ObservableValue, ValueConsumer, ValueProducer,
};
use tracing::warn;

/// Weighted difference of two inputs.
///
/// Connect the minuend on channel 0 and the subtrahend on channel 1. Each
/// input recomputes the output from the latest value of both.
pub struct Difference {
    k1: Cell<f64>,
    k2: Cell<f64>,
    inputs: Cell<[f64; 2]>,
    config_path: Option<String>,
    output: ObservableValue<f64>,
}

impl Difference {
    pub fn new(
        k1: f64,
        k2: f64,
        config_path: Option<&str>,
        storage: &dyn ConfigStorage,
    ) -> Rc<Self> {
        let difference = Rc::new(Self {
            k1: Cell::new(k1),
            k2: Cell::new(k2),
            inputs: Cell::new([0.0; 2]),
            config_path: config_path.map(String::from),
            output: ObservableValue::new(0.0),
        });
        difference.restore_configuration(storage);
        difference
    }
}

impl ValueConsumer<f64> for Difference {
    fn set_input(&self, input: f64, input_channel: u8) {
        let mut inputs = self.inputs.get();
        match input_channel {
            0 | 1 => inputs[usize::from(input_channel)] = input,
            other => {
                warn!("Difference has no input channel {}, ignoring", other);
                return;
            }
        }
        self.inputs.set(inputs);
        self.output
            .set(self.k1.get() * inputs[0] - self.k2.get() * inputs[1]);
    }
}

impl ValueProducer<f64> for Difference {
    fn output(&self) -> &ObservableValue<f64> {
        &self.output
    }
}

impl Configurable for Difference {
    fn config_path(&self) -> Option<&str> {
        self.config_path.as_deref()
    }

    fn get_configuration(&self, root: &mut Map<String, Value>) {
        root.insert("k1".to_string(), json!(self.k1.get()));
        root.insert("k2".to_string(), json!(self.k2.get()));
        root.insert("value".to_string(), json!(self.output.get()));
    }

    fn get_config_schema(&self) -> Value {
        ConfigSchema::new()
            .property("k1", Field::number("Input 0 multiplier"))
            .property("k2", Field::number("Input 1 multiplier"))
            .property("value", Field::number("Last value").read_only(true))
            .into()
    }

    fn set_configuration(&self, config: &Value) -> Result<(), ConfigError> {
        let map = require_keys(config, &["k1", "k2"])?;
        let k1 = number_field(map, "k1")?;
        let k2 = number_field(map, "k2")?;
        self.k1.set(k1);
        self.k2.set(k2);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sknode_core::MemoryConfigStorage;

    #[test]
    fn test_combines_by_channel() {
        let storage = MemoryConfigStorage::new();
        let charge = ObservableValue::new(0.0);
        let discharge = ObservableValue::new(0.0);
        let net = Difference::new(1.0, 1.0, None, &storage);

        charge.connect_to_channel(Rc::clone(&net), 0);
        discharge.connect_to_channel(Rc::clone(&net), 1);

        charge.set(5.0);
        assert_eq!(net.value(), 5.0);

        discharge.set(2.0);
        assert_eq!(net.value(), 3.0);
    }

    #[test]
    fn test_unknown_channel_is_ignored() {
        let net = Difference::new(2.0, 1.0, None, &MemoryConfigStorage::new());
        net.set_input(4.0, 0);
        net.set_input(100.0, 7);

        assert_eq!(net.value(), 8.0);
    }
}
