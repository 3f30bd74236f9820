//! INA219 high side DC current sensor.
//!
//! [`Ina219`] owns the chip configuration (bus voltage range, shunt gain,
//! shunt rating) and pushes it to the driver as calibration. One or more
//! [`Ina219Value`] readers poll the chip and emit a single quantity each, in
//! SI units.
//!
//! Register access lives behind [`Ina219Driver`]; this module only decides
//! what to ask for and when.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use sknode_core::{
    require_keys, unsigned_field, ConfigError, ConfigSchema, ConfigStorage,
    Configurable, Field, ObservableValue, Scheduler, ValueProducer,
};
use tracing::{debug, warn};

use crate::sensor::Sensor;

/// Maximum voltage expected on the positive side of the shunt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusVoltageRange {
    #[default]
    V16,
    V32,
}

impl BusVoltageRange {
    /// Map a configured voltage. Anything other than 32 falls back to 16 V.
    pub fn from_volts(volts: u32) -> Self {
        match volts {
            32 => BusVoltageRange::V32,
            16 => BusVoltageRange::V16,
            other => {
                warn!("Unsupported INA219 bus voltage range {}, using 16 V", other);
                BusVoltageRange::V16
            }
        }
    }

    pub fn volts(&self) -> u32 {
        match self {
            BusVoltageRange::V16 => 16,
            BusVoltageRange::V32 => 32,
        }
    }
}

/// PGA gain matching the maximum voltage expected across the shunt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShuntGain {
    #[default]
    Gain1_40mV,
    Gain2_80mV,
    Gain4_160mV,
    Gain8_320mV,
}

impl ShuntGain {
    /// Map a configured gain factor. Unknown factors fall back to gain 1.
    pub fn from_factor(factor: u32) -> Self {
        match factor {
            1 => ShuntGain::Gain1_40mV,
            2 => ShuntGain::Gain2_80mV,
            4 => ShuntGain::Gain4_160mV,
            8 => ShuntGain::Gain8_320mV,
            other => {
                warn!("Unsupported INA219 shunt gain {}, using 1", other);
                ShuntGain::Gain1_40mV
            }
        }
    }

    pub fn factor(&self) -> u32 {
        match self {
            ShuntGain::Gain1_40mV => 1,
            ShuntGain::Gain2_80mV => 2,
            ShuntGain::Gain4_160mV => 4,
            ShuntGain::Gain8_320mV => 8,
        }
    }

    /// Full scale shunt voltage in millivolts.
    pub fn full_scale_mv(&self) -> u32 {
        40 * self.factor()
    }
}

/// Register level access to an INA219 chip.
pub trait Ina219Driver {
    /// Program the calibration register.
    fn set_calibration(
        &mut self,
        range: BusVoltageRange,
        gain: ShuntGain,
        max_current_a: f64,
        shunt_ohms: f64,
    );

    fn bus_voltage_v(&mut self) -> f64;
    fn shunt_voltage_mv(&mut self) -> f64;
    fn current_ma(&mut self) -> f64;
    fn power_mw(&mut self) -> f64;
}

/// Chip configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ina219Settings {
    pub range: BusVoltageRange,
    pub gain: ShuntGain,
    pub max_current_ma: u32,
    pub shunt_uohms: u32,
}

impl Default for Ina219Settings {
    /// 32 V and 2 A across a 0.1 ohm shunt, the chip's power-on calibration.
    fn default() -> Self {
        Self {
            range: BusVoltageRange::V32,
            gain: ShuntGain::Gain8_320mV,
            max_current_ma: 2000,
            shunt_uohms: 100_000,
        }
    }
}

/// A configured INA219 chip.
pub struct Ina219 {
    config_path: Option<String>,
    settings: Cell<Ina219Settings>,
    driver: RefCell<Box<dyn Ina219Driver>>,
}

impl Ina219 {
    /// Load any stored configuration over `settings` and calibrate the chip.
    pub fn new(
        driver: Box<dyn Ina219Driver>,
        settings: Ina219Settings,
        config_path: Option<&str>,
        storage: &dyn ConfigStorage,
    ) -> Rc<Self> {
        let ina219 = Rc::new(Self {
            config_path: config_path.map(String::from),
            settings: Cell::new(settings),
            driver: RefCell::new(driver),
        });
        ina219.restore_configuration(storage);
        ina219.calibrate();
        ina219
    }

    pub fn settings(&self) -> Ina219Settings {
        self.settings.get()
    }

    fn calibrate(&self) {
        let settings = self.settings.get();
        debug!(
            "Calibrating INA219: {} V, gain {}, {} mA, {} uOhm",
            settings.range.volts(),
            settings.gain.factor(),
            settings.max_current_ma,
            settings.shunt_uohms
        );
        self.driver.borrow_mut().set_calibration(
            settings.range,
            settings.gain,
            f64::from(settings.max_current_ma) / 1000.0,
            f64::from(settings.shunt_uohms) / 1_000_000.0,
        );
    }

    fn read(&self, value_type: Ina219ValueType) -> f64 {
        let mut driver = self.driver.borrow_mut();
        match value_type {
            Ina219ValueType::BusVoltage => driver.bus_voltage_v(),
            Ina219ValueType::ShuntVoltage => driver.shunt_voltage_mv() / 1000.0,
            Ina219ValueType::Current => driver.current_ma() / 1000.0,
            Ina219ValueType::Power => driver.power_mw() / 1000.0,
            Ina219ValueType::LoadVoltage => {
                driver.bus_voltage_v() + driver.shunt_voltage_mv() / 1000.0
            }
        }
    }
}

impl Configurable for Ina219 {
    fn config_path(&self) -> Option<&str> {
        self.config_path.as_deref()
    }

    fn get_configuration(&self, root: &mut Map<String, Value>) {
        let settings = self.settings.get();
        root.insert("range".to_string(), json!(settings.range.volts()));
        root.insert("gain".to_string(), json!(settings.gain.factor()));
        root.insert("max_current_ma".to_string(), json!(settings.max_current_ma));
        root.insert("shunt_uohms".to_string(), json!(settings.shunt_uohms));
    }

    fn get_config_schema(&self) -> Value {
        ConfigSchema::new()
            .property(
                "range",
                Field::number("Bus Voltage Range").description(
                    "Must be 16 or 32, the max voltage expected on the positive side of the shunt",
                ),
            )
            .property(
                "gain",
                Field::number("Shunt Gain").description(
                    "Must be 1 (40mv), 2 (80mv), 4 (160mv) or 8 (320mv), the gain that matches the max voltage expected across the shunt",
                ),
            )
            .property(
                "max_current_ma",
                Field::number("Shunt Max Current in mA")
                    .description("Max current the shunt can handle, in milliAmps"),
            )
            .property(
                "shunt_uohms",
                Field::number("Resistance of the shunt in uOhms")
                    .description("Resistance of the shunt, in microOhms"),
            )
            .into()
    }

    fn set_configuration(&self, config: &Value) -> Result<(), ConfigError> {
        let map = require_keys(config, &["range", "gain", "max_current_ma", "shunt_uohms"])?;

        let settings = Ina219Settings {
            range: BusVoltageRange::from_volts(unsigned_field(map, "range")?),
            gain: ShuntGain::from_factor(unsigned_field(map, "gain")?),
            max_current_ma: unsigned_field(map, "max_current_ma")?,
            shunt_uohms: unsigned_field(map, "shunt_uohms")?,
        };

        self.settings.set(settings);
        self.calibrate();
        Ok(())
    }
}

/// Which quantity an [`Ina219Value`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ina219ValueType {
    /// Volts on the load side of the shunt.
    BusVoltage,
    /// Volts across the shunt.
    ShuntVoltage,
    /// Amps.
    Current,
    /// Watts.
    Power,
    /// Bus voltage plus shunt voltage, in volts.
    LoadVoltage,
}

/// Reads one quantity from an [`Ina219`] every `read_delay` milliseconds.
pub struct Ina219Value {
    ina219: Rc<Ina219>,
    value_type: Ina219ValueType,
    read_delay: Cell<u32>,
    config_path: Option<String>,
    output: ObservableValue<f64>,
}

impl Ina219Value {
    pub fn new(
        ina219: Rc<Ina219>,
        value_type: Ina219ValueType,
        read_delay: u32,
        config_path: Option<&str>,
        storage: &dyn ConfigStorage,
    ) -> Rc<Self> {
        let value = Rc::new(Self {
            ina219,
            value_type,
            read_delay: Cell::new(read_delay),
            config_path: config_path.map(String::from),
            output: ObservableValue::new(0.0),
        });
        value.restore_configuration(storage);
        value
    }

    pub fn value_type(&self) -> Ina219ValueType {
        self.value_type
    }

    pub fn read_delay(&self) -> u32 {
        self.read_delay.get()
    }

    fn update(&self) {
        let reading = self.ina219.read(self.value_type);
        self.output.set(reading);
    }
}

impl ValueProducer<f64> for Ina219Value {
    fn output(&self) -> &ObservableValue<f64> {
        &self.output
    }
}

impl Sensor<f64> for Ina219Value {
    /// The read interval is fixed when the sensor is enabled.
    fn enable(self: Rc<Self>, scheduler: &dyn Scheduler) {
        let interval = Duration::from_millis(u64::from(self.read_delay.get()));
        debug!("Enabling INA219 {:?} reads every {:?}", self.value_type, interval);
        scheduler.on_repeat(interval, Box::new(move || self.update()));
    }
}

impl Configurable for Ina219Value {
    fn config_path(&self) -> Option<&str> {
        self.config_path.as_deref()
    }

    fn get_configuration(&self, root: &mut Map<String, Value>) {
        root.insert("read_delay".to_string(), json!(self.read_delay.get()));
    }

    fn get_config_schema(&self) -> Value {
        ConfigSchema::new()
            .property(
                "read_delay",
                Field::number("Read delay")
                    .description("The time, in milliseconds, between each read of the input"),
            )
            .into()
    }

    fn set_configuration(&self, config: &Value) -> Result<(), ConfigError> {
        let map = require_keys(config, &["read_delay"])?;
        self.read_delay.set(unsigned_field(map, "read_delay")?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sknode_core::{EventLoop, MemoryConfigStorage};

    #[derive(Default)]
    struct FakeChip {
        calibrations: Rc<RefCell<Vec<(BusVoltageRange, ShuntGain, f64, f64)>>>,
    }

    impl Ina219Driver for FakeChip {
        fn set_calibration(
            &mut self,
            range: BusVoltageRange,
            gain: ShuntGain,
            max_current_a: f64,
            shunt_ohms: f64,
        ) {
            self.calibrations
                .borrow_mut()
                .push((range, gain, max_current_a, shunt_ohms));
        }

        fn bus_voltage_v(&mut self) -> f64 {
            12.5
        }

        fn shunt_voltage_mv(&mut self) -> f64 {
            50.0
        }

        fn current_ma(&mut self) -> f64 {
            1500.0
        }

        fn power_mw(&mut self) -> f64 {
            18750.0
        }
    }

    #[test]
    fn test_calibrates_on_construction() {
        let chip = FakeChip::default();
        let calibrations = Rc::clone(&chip.calibrations);

        Ina219::new(
            Box::new(chip),
            Ina219Settings::default(),
            None,
            &MemoryConfigStorage::new(),
        );

        assert_eq!(
            *calibrations.borrow(),
            vec![(BusVoltageRange::V32, ShuntGain::Gain8_320mV, 2.0, 0.1)]
        );
    }

    #[test]
    fn test_unknown_range_and_gain_fall_back() {
        let ina219 = Ina219::new(
            Box::new(FakeChip::default()),
            Ina219Settings::default(),
            None,
            &MemoryConfigStorage::new(),
        );

        ina219
            .set_configuration(
                &json!({ "range": 24, "gain": 3, "max_current_ma": 1000, "shunt_uohms": 500 }),
            )
            .unwrap();

        let settings = ina219.settings();
        assert_eq!(settings.range, BusVoltageRange::V16);
        assert_eq!(settings.gain, ShuntGain::Gain1_40mV);
    }

    #[test]
    fn test_fractional_range_is_rejected() {
        let ina219 = Ina219::new(
            Box::new(FakeChip::default()),
            Ina219Settings::default(),
            None,
            &MemoryConfigStorage::new(),
        );
        let before = ina219.configuration();

        for config in [
            json!({ "range": 32.9, "gain": 8, "max_current_ma": 2000, "shunt_uohms": 100000 }),
            json!({ "range": 32, "gain": 2.5, "max_current_ma": 2000, "shunt_uohms": 100000 }),
        ] {
            let result = ina219.set_configuration(&config);
            assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        }
        assert_eq!(ina219.configuration(), before);
    }

    #[test]
    fn test_missing_key_leaves_settings_and_calibration() {
        let chip = FakeChip::default();
        let calibrations = Rc::clone(&chip.calibrations);
        let ina219 = Ina219::new(
            Box::new(chip),
            Ina219Settings::default(),
            None,
            &MemoryConfigStorage::new(),
        );
        let before = ina219.configuration();

        let err = ina219
            .set_configuration(&json!({ "range": 16, "gain": 1, "max_current_ma": 400 }))
            .unwrap_err();

        assert_eq!(err, ConfigError::MissingKey("shunt_uohms".to_string()));
        assert_eq!(ina219.configuration(), before);
        assert_eq!(calibrations.borrow().len(), 1);
    }

    #[test]
    fn test_value_types_in_si_units() {
        let event_loop = EventLoop::new();
        let storage = MemoryConfigStorage::new();
        let ina219 = Ina219::new(
            Box::new(FakeChip::default()),
            Ina219Settings::default(),
            None,
            &storage,
        );

        let expected = [
            (Ina219ValueType::BusVoltage, 12.5),
            (Ina219ValueType::ShuntVoltage, 0.05),
            (Ina219ValueType::Current, 1.5),
            (Ina219ValueType::Power, 18.75),
            (Ina219ValueType::LoadVoltage, 12.55),
        ];

        for (value_type, want) in expected {
            let reader = Ina219Value::new(Rc::clone(&ina219), value_type, 100, None, &storage);
            Rc::clone(&reader).enable(&event_loop);
            event_loop.advance(Duration::from_millis(100));
            assert!(
                (reader.value() - want).abs() < 1e-9,
                "{:?}: got {}",
                value_type,
                reader.value()
            );
        }
    }

    #[test]
    fn test_schema_is_stable() {
        let ina219 = Ina219::new(
            Box::new(FakeChip::default()),
            Ina219Settings::default(),
            None,
            &MemoryConfigStorage::new(),
        );
        let schema = ina219.get_config_schema();
        assert_eq!(schema, ina219.get_config_schema());
        assert_eq!(schema["properties"]["range"]["title"], "Bus Voltage Range");
    }
}
