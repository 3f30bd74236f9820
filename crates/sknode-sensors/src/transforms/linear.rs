//! `output = k * input + c`

use std::cell::Cell;
use std::rc::Rc;

use serde_json::{json, Map, Value};
use sknode_core::{
    number_field, require_keys, ConfigError, ConfigSchema, ConfigStorage, Configurable, Field,
    ObservableValue, ValueConsumer, ValueProducer,
};

/// Linear calibration of a numeric input.
pub struct Linear {
    k: Cell<f64>,
    c: Cell<f64>,
    config_path: Option<String>,
    output: ObservableValue<f64>,
}

impl Linear {
    pub fn new(k: f64, c: f64, config_path: Option<&str>, storage: &dyn ConfigStorage) -> Rc<Self> {
        let linear = Rc::new(Self {
            k: Cell::new(k),
            c: Cell::new(c),
            config_path: config_path.map(String::from),
            output: ObservableValue::new(0.0),
        });
        linear.restore_configuration(storage);
        linear
    }

    pub fn k(&self) -> f64 {
        self.k.get()
    }

    pub fn c(&self) -> f64 {
        self.c.get()
    }
}

impl ValueConsumer<f64> for Linear {
    fn set_input(&self, input: f64, _input_channel: u8) {
        self.output.set(self.k.get() * input + self.c.get());
    }
}

impl ValueProducer<f64> for Linear {
    fn output(&self) -> &ObservableValue<f64> {
        &self.output
    }
}

impl Configurable for Linear {
    fn config_path(&self) -> Option<&str> {
        self.config_path.as_deref()
    }

    fn get_configuration(&self, root: &mut Map<String, Value>) {
        root.insert("k".to_string(), json!(self.k.get()));
        root.insert("c".to_string(), json!(self.c.get()));
        root.insert("value".to_string(), json!(self.output.get()));
    }

    fn get_config_schema(&self) -> Value {
        ConfigSchema::new()
            .property("k", Field::number("Multiplier"))
            .property("c", Field::number("Constant offset"))
            .property("value", Field::number("Last value").read_only(true))
            .into()
    }

    fn set_configuration(&self, config: &Value) -> Result<(), ConfigError> {
        let map = require_keys(config, &["k", "c"])?;
        let k = number_field(map, "k")?;
        let c = number_field(map, "c")?;
        self.k.set(k);
        self.c.set(c);
        Ok(())
    }
}
