//! SignalK output nodes.
//!
//! An output consumes a value and queues it under a SignalK path in a shared
//! [`DeltaQueue`]. The transport drains the queue into deltas at its own pace.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use sknode_core::{
    require_keys, string_field, ConfigError, ConfigSchema, ConfigStorage, Configurable, DeltaQueue,
    Field, ValueConsumer,
};
use tracing::{debug, warn};

/// Publishes every input under a configurable SignalK path.
pub struct SkOutput<T> {
    sk_path: RefCell<String>,
    queue: Rc<DeltaQueue>,
    config_path: Option<String>,
    _marker: PhantomData<fn(T)>,
}

/// Numeric output, the common case.
pub type SkOutputFloat = SkOutput<f64>;

impl<T: Serialize> SkOutput<T> {
    pub fn new(
        sk_path: &str,
        queue: Rc<DeltaQueue>,
        config_path: Option<&str>,
        storage: &dyn ConfigStorage,
    ) -> Rc<Self> {
        let output = Rc::new(Self {
            sk_path: RefCell::new(sk_path.to_string()),
            queue,
            config_path: config_path.map(String::from),
            _marker: PhantomData,
        });
        output.restore_configuration(storage);
        output
    }

    pub fn sk_path(&self) -> String {
        self.sk_path.borrow().clone()
    }
}

impl<T: Serialize> ValueConsumer<T> for SkOutput<T> {
    fn set_input(&self, value: T, _input_channel: u8) {
        let sk_path = self.sk_path.borrow();
        if sk_path.is_empty() {
            debug!("No SignalK path configured, dropping value");
            return;
        }
        match serde_json::to_value(&value) {
            Ok(json) => self.queue.append(&sk_path, json),
            Err(e) => warn!("Failed to serialize value for {}: {}", sk_path, e),
        }
    }
}

impl<T> Configurable for SkOutput<T> {
    fn config_path(&self) -> Option<&str> {
        self.config_path.as_deref()
    }

    fn get_configuration(&self, root: &mut Map<String, Value>) {
        root.insert("sk_path".to_string(), json!(*self.sk_path.borrow()));
    }

    fn get_config_schema(&self) -> Value {
        ConfigSchema::new()
            .property(
                "sk_path",
                Field::string("SignalK Path")
                    .description("Path the value is published under, e.g. electrical.batteries.house.current"),
            )
            .into()
    }

    fn set_configuration(&self, config: &Value) -> Result<(), ConfigError> {
        let map = require_keys(config, &["sk_path"])?;
        let sk_path = string_field(map, "sk_path")?;
        self.sk_path.replace(sk_path.to_string());
        Ok(())
    }
}
