use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

use sknode_core::{
    ConfigRegistry, ConfigStorage, DeltaQueue, EventLoop, FileConfigStorage, Scheduler,
    ValueProducer,
};
use sknode_net::{
    DeviceControl, Networking, NetworkingSettings, PortalSubmission, ProvisioningPortal, Radio,
    RadioError, RadioEvent, RadioMode, RestartReason,
};
use sknode_sensors::{
    Ina219, Ina219Driver, Ina219Settings, Ina219Value, Ina219ValueType, Linear, Sensor,
    SkOutputFloat, BusVoltageRange, ShuntGain,
};
use sknode_system::{LedController, LedPin, PatternBlinker};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Event loop tick on the host.
const TICK: Duration = Duration::from_millis(10);

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sknode=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("sknode starting...");

    // Configuration
    let config_dir =
        std::env::var("SKNODE_CONFIG_DIR").unwrap_or_else(|_| "./sknode-config".into());
    let storage = Rc::new(FileConfigStorage::new(&config_dir)?);
    tracing::info!("Configuration stored in {}", config_dir);

    let mut settings = NetworkingSettings::default();
    if let Some(ssid) = option_env!("SKNODE_WIFI_SSID") {
        settings = settings.with_wifi(ssid, option_env!("SKNODE_WIFI_PASSWORD").unwrap_or(""));
    }
    if let Some(hostname) = option_env!("SKNODE_HOSTNAME") {
        settings = settings.with_hostname(hostname);
    }

    let event_loop = Rc::new(EventLoop::new());
    let registry = ConfigRegistry::new(storage.clone());
    let queue = Rc::new(DeltaQueue::new("sknode.ina219"));

    // Sensor graph: INA219 current -> calibration -> SignalK output
    let ina219 = registry.register(Ina219::new(
        Box::new(SimulatedIna219::default()),
        Ina219Settings {
            range: BusVoltageRange::V16,
            gain: ShuntGain::Gain2_80mV,
            max_current_ma: 10_000,
            shunt_uohms: 7_500,
        },
        Some("/house/ina219"),
        &*storage,
    ))?;
    let current = registry.register(Ina219Value::new(
        Rc::clone(&ina219),
        Ina219ValueType::Current,
        500,
        Some("/house/current/read"),
        &*storage,
    ))?;
    let voltage = registry.register(Ina219Value::new(
        ina219,
        Ina219ValueType::LoadVoltage,
        1000,
        Some("/house/voltage/read"),
        &*storage,
    ))?;
    let calibrated = registry.register(Linear::new(
        1.0,
        0.0,
        Some("/house/current/linear"),
        &*storage,
    ))?;
    current.connect_to(calibrated).connect_to(registry.register(SkOutputFloat::new(
        "electrical.batteries.house.current",
        Rc::clone(&queue),
        Some("/house/current/sk"),
        &*storage,
    ))?);
    voltage.connect_to(registry.register(SkOutputFloat::new(
        "electrical.batteries.house.voltage",
        Rc::clone(&queue),
        Some("/house/voltage/sk"),
        &*storage,
    ))?);

    // Networking on a simulated radio
    let radio_events = Rc::new(RefCell::new(VecDeque::new()));
    let portal_active = Rc::new(Cell::new(false));
    let restart = Rc::new(Cell::new(None));
    let networking = registry.register(Networking::new(
        settings,
        Box::new(SimulatedRadio {
            events: Rc::clone(&radio_events),
            associated: false,
        }),
        Box::new(SimulatedPortal {
            active: Rc::clone(&portal_active),
        }),
        Rc::new(SimulatedDevice {
            restart: Rc::clone(&restart),
        }),
        event_loop.clone(),
        storage.clone(),
    ))?;

    // Status LED
    let blinker = PatternBlinker::new(Box::new(LoggingPin), event_loop.clone());
    let led = LedController::new(blinker);
    networking.connect_to(Rc::clone(&led));
    queue.delta_count().connect_to(Rc::clone(&led));

    for path in registry.paths() {
        tracing::debug!("Configurable: {}", path);
    }

    // Drain queued values once per second
    {
        let queue = Rc::clone(&queue);
        event_loop.on_repeat(
            Duration::from_secs(1),
            Box::new(move || {
                if let Some(delta) = queue.take_delta() {
                    match serde_json::to_string(&delta) {
                        Ok(text) => tracing::info!("Delta: {}", text),
                        Err(e) => tracing::error!("Failed to serialize delta: {}", e),
                    }
                }
            }),
        );
    }

    networking.setup(|connected| tracing::info!("Network connected: {}", connected));
    current.enable(&*event_loop);
    voltage.enable(&*event_loop);

    tracing::info!("sknode ready, hostname {}", networking.hostname().get());

    let portal_submission = std::env::var("SKNODE_PORTAL_SSID").ok();
    let start = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval(TICK);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down...");
                break;
            }
            _ = ticker.tick() => {
                event_loop.advance_to(start.elapsed());

                let pending: Vec<RadioEvent> = radio_events.borrow_mut().drain(..).collect();
                for event in pending {
                    networking.handle_event(event);
                }

                if portal_active.get() {
                    if let Some(ssid) = portal_submission.as_deref() {
                        let submission = PortalSubmission {
                            ssid: ssid.to_string(),
                            password: std::env::var("SKNODE_PORTAL_PASSWORD").unwrap_or_default(),
                            hostname: networking.hostname().get(),
                        };
                        if let Err(e) = networking.submit_portal(submission) {
                            tracing::warn!("Portal submission rejected: {}", e);
                        }
                    }
                }

                if let Some(reason) = restart.get() {
                    tracing::warn!("Restart requested ({}), exiting", reason);
                    break;
                }
            }
        }
    }

    if let Err(e) = registry.save_all() {
        tracing::error!("Failed to save configuration: {}", e);
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

/// INA219 stand-in: a battery bank with a slowly cycling load.
#[derive(Default)]
struct SimulatedIna219 {
    reads: u32,
    max_current_a: f64,
}

impl SimulatedIna219 {
    fn load_a(&mut self) -> f64 {
        self.reads = self.reads.wrapping_add(1);
        let phase = f64::from(self.reads) / 20.0;
        (4.0 + 3.0 * phase.sin()).min(self.max_current_a)
    }
}

impl Ina219Driver for SimulatedIna219 {
    fn set_calibration(
        &mut self,
        range: BusVoltageRange,
        gain: ShuntGain,
        max_current_a: f64,
        shunt_ohms: f64,
    ) {
        tracing::debug!(
            "Simulated INA219 calibrated: {} V, gain {}, {} A, {} ohm",
            range.volts(),
            gain.factor(),
            max_current_a,
            shunt_ohms
        );
        self.max_current_a = max_current_a;
    }

    fn bus_voltage_v(&mut self) -> f64 {
        12.8
    }

    fn shunt_voltage_mv(&mut self) -> f64 {
        self.load_a() * 0.75
    }

    fn current_ma(&mut self) -> f64 {
        self.load_a() * 1000.0
    }

    fn power_mw(&mut self) -> f64 {
        self.load_a() * 12.8 * 1000.0
    }
}

/// Radio that associates as soon as it is asked to.
struct SimulatedRadio {
    events: Rc<RefCell<VecDeque<RadioEvent>>>,
    associated: bool,
}

impl Radio for SimulatedRadio {
    fn is_associated(&self) -> bool {
        self.associated
    }

    fn set_mode(&mut self, mode: RadioMode) {
        tracing::debug!("Radio mode {:?}", mode);
        if mode == RadioMode::Off && self.associated {
            self.associated = false;
            self.events
                .borrow_mut()
                .push_back(RadioEvent::Disassociated { reason: 8 });
        }
    }

    fn begin(&mut self, ssid: &str, _password: &str) -> Result<(), RadioError> {
        if ssid.len() > 32 {
            return Err(RadioError::Rejected(format!("SSID longer than 32 bytes: {}", ssid)));
        }
        self.associated = true;
        let mut events = self.events.borrow_mut();
        events.push_back(RadioEvent::Associated {
            ssid: ssid.to_string(),
            rssi: -55,
        });
        events.push_back(RadioEvent::IpAcquired(Ipv4Addr::new(192, 168, 1, 50)));
        Ok(())
    }
}

struct SimulatedPortal {
    active: Rc<Cell<bool>>,
}

impl ProvisioningPortal for SimulatedPortal {
    fn start(&mut self, ap_ssid: &str, hostname: &str, timeout: Duration) {
        tracing::info!(
            "Provisioning portal '{}' for {} open for {:?}",
            ap_ssid,
            hostname,
            timeout
        );
        self.active.set(true);
    }

    fn stop(&mut self) {
        tracing::info!("Provisioning portal closed");
        self.active.set(false);
    }

    fn reset(&mut self) {
        tracing::info!("Provisioning portal credentials cleared");
    }
}

struct SimulatedDevice {
    restart: Rc<Cell<Option<RestartReason>>>,
}

impl DeviceControl for SimulatedDevice {
    fn restart(&self, reason: RestartReason) {
        self.restart.set(Some(reason));
    }
}

struct LoggingPin;

impl LedPin for LoggingPin {
    fn set(&mut self, on: bool) {
        tracing::trace!("LED {}", if on { "on" } else { "off" });
    }
}
