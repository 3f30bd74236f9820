//! The WiFi connection manager.
//!
//! ```text
//!              setup, credentials            IpAcquired
//! Disconnected ------------------> Connecting ----------> Connected
//!      |  ^                            ^                      |
//!      |  +------ Disassociated -------|----------------------+
//!      |                               |
//!      |                           watchdog
//!      |
//!      +--- setup, no credentials ---> ApMode --- submission ---> Connected (restart in 500 ms)
//!           or begin fails             |
//!                                      +------ timeout -------> restart
//! ```
//!
//! The watchdog re-associates with the last known credentials and never
//! opens the portal; only a boot without usable credentials provisions.
//! Going offline closes an open portal, and coming back online without
//! credentials opens it again with a fresh timeout.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use serde_json::{json, Map, Value};
use sknode_core::{
    require_keys, string_field, ConfigError, ConfigSchema, ConfigStorage, Configurable, Field,
    ObservableValue, Scheduler, ValueProducer,
};
use tracing::{debug, error, info, warn};

use crate::error::NetworkingError;
use crate::hardware::{DeviceControl, PortalSubmission, ProvisioningPortal, Radio, RadioMode, RestartReason};
use crate::settings::NetworkingSettings;
use crate::state::{DisconnectReason, RadioEvent, WifiState};

type ConnectionCallback = Rc<dyn Fn(bool)>;

/// Stored WiFi credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Credentials {
    ssid: String,
    password: String,
}

/// Owns the WiFi association lifecycle and publishes [`WifiState`].
pub struct Networking {
    settings: NetworkingSettings,
    credentials: RefCell<Credentials>,
    hostname: ObservableValue<String>,
    state: ObservableValue<WifiState>,
    offline: Cell<bool>,
    last_disconnect_reason: Cell<Option<DisconnectReason>>,
    portal_session: Cell<u64>,
    restart_pending: Cell<bool>,
    connection_callback: RefCell<Option<ConnectionCallback>>,
    radio: RefCell<Box<dyn Radio>>,
    portal: RefCell<Box<dyn ProvisioningPortal>>,
    device: Rc<dyn DeviceControl>,
    scheduler: Rc<dyn Scheduler>,
    storage: Rc<dyn ConfigStorage>,
    this: Weak<Networking>,
}

impl Networking {
    /// Create the manager and apply stored configuration.
    ///
    /// Nothing touches the radio until [`setup`](Self::setup).
    pub fn new(
        settings: NetworkingSettings,
        radio: Box<dyn Radio>,
        portal: Box<dyn ProvisioningPortal>,
        device: Rc<dyn DeviceControl>,
        scheduler: Rc<dyn Scheduler>,
        storage: Rc<dyn ConfigStorage>,
    ) -> Rc<Self> {
        let credentials = if settings.wifi_preset() {
            info!("Using build-time SSID {}", settings.preset_ssid);
            Credentials {
                ssid: settings.preset_ssid.clone(),
                password: settings.preset_password.clone(),
            }
        } else {
            Credentials::default()
        };
        let hostname = settings.preset_hostname.clone();

        let networking = Rc::new_cyclic(|this| Self {
            settings,
            credentials: RefCell::new(credentials),
            hostname: ObservableValue::new(hostname),
            state: ObservableValue::new(WifiState::Disconnected),
            offline: Cell::new(false),
            last_disconnect_reason: Cell::new(None),
            portal_session: Cell::new(0),
            restart_pending: Cell::new(false),
            connection_callback: RefCell::new(None),
            radio: RefCell::new(radio),
            portal: RefCell::new(portal),
            device,
            scheduler,
            storage,
            this: this.clone(),
        });

        networking.restore_configuration(networking.storage.as_ref());
        networking
    }

    /// Start connecting and register the watchdog.
    ///
    /// `connection_callback` is told `true` when the device gets an address
    /// and `false` whenever it loses it or goes offline.
    pub fn setup<F>(&self, connection_callback: F)
    where
        F: Fn(bool) + 'static,
    {
        self.connection_callback
            .replace(Some(Rc::new(connection_callback)));

        self.connect_or_provision();

        let this = self.this.clone();
        self.scheduler.on_repeat(
            self.settings.watchdog_interval,
            Box::new(move || {
                if let Some(networking) = this.upgrade() {
                    networking.check_connection();
                }
            }),
        );
    }

    /// Watchdog step: re-associate if the link dropped.
    ///
    /// Does nothing while offline, while the portal runs, or once a restart
    /// has been scheduled.
    pub fn check_connection(&self) {
        if self.offline.get()
            || self.restart_pending.get()
            || self.state.get() == WifiState::ApMode
        {
            return;
        }
        if self.radio.borrow().is_associated() {
            return;
        }

        debug!("WiFi not associated (state {})", self.state.get());
        if self.has_credentials() {
            self.connect_saved_ssid();
        }
    }

    /// Dispatch an event from the radio layer.
    pub fn handle_event(&self, event: RadioEvent) {
        if self.state.get() == WifiState::ApMode {
            debug!("Ignoring {:?} while provisioning portal is active", event);
            return;
        }

        match event {
            RadioEvent::Associated { ssid, rssi } => {
                info!("Connected to WiFi, SSID: {} (signal: {})", ssid, rssi);
            }
            RadioEvent::IpAcquired(ip) => {
                info!("Got IP address: {}", ip);
                self.transition(WifiState::Connected);
                self.notify_connection(true);
            }
            RadioEvent::Disassociated { reason } => {
                let reason = DisconnectReason::from_code(reason);
                debug!("WiFi disconnected. Reason={}", reason);
                self.last_disconnect_reason.set(Some(reason));
                self.transition(WifiState::Disconnected);
                self.notify_connection(false);
            }
        }
    }

    /// Accept credentials from the provisioning portal.
    ///
    /// Applies whatever is not fixed at build time, saves, reports the
    /// connection and schedules a restart so the new settings take effect on
    /// a fresh boot.
    pub fn submit_portal(&self, submission: PortalSubmission) -> Result<(), NetworkingError> {
        if self.state.get() != WifiState::ApMode {
            return Err(NetworkingError::PortalInactive);
        }
        if submission.ssid.is_empty() && !self.settings.wifi_preset() {
            return Err(NetworkingError::InvalidSubmission(
                "SSID must not be empty".to_string(),
            ));
        }

        self.portal.borrow_mut().stop();

        if !self.settings.hostname_preset() && !submission.hostname.is_empty() {
            info!("Got new custom hostname: {}", submission.hostname);
            self.hostname.set(submission.hostname);
        }
        if !self.settings.wifi_preset() {
            info!("Got new SSID and password: {}", submission.ssid);
            self.credentials.replace(Credentials {
                ssid: submission.ssid,
                password: submission.password,
            });
        }
        if let Err(e) = self.save_configuration(self.storage.as_ref()) {
            error!("Failed to save network configuration: {}", e);
        }

        self.transition(WifiState::Connected);
        self.notify_connection(true);

        warn!("Restarting in {:?}", self.settings.restart_delay);
        self.schedule_restart(RestartReason::ApplySettings);
        Ok(())
    }

    /// Force the radio off (`true`) or let the watchdog reconnect (`false`).
    ///
    /// Leaving offline mode without credentials reopens the portal.
    pub fn set_offline(&self, offline: bool) {
        info!("Setting offline parameter to {}", offline);
        let was_offline = self.offline.replace(offline);

        if offline {
            if self.state.get() == WifiState::ApMode {
                self.portal.borrow_mut().stop();
            }
            self.radio.borrow_mut().set_mode(RadioMode::Off);
            self.transition(WifiState::Disconnected);
            self.notify_connection(false);
        } else if was_offline && !self.has_credentials() {
            self.connect_or_provision();
        }
    }

    pub fn is_offline(&self) -> bool {
        self.offline.get()
    }

    /// Restore build-time credentials (or none), save them, and clear the
    /// portal's own stored credentials.
    pub fn reset_settings(&self) -> Result<(), NetworkingError> {
        info!("Resetting WiFi settings");
        self.credentials.replace(Credentials {
            ssid: self.settings.preset_ssid.clone(),
            password: self.settings.preset_password.clone(),
        });
        self.save_configuration(self.storage.as_ref())?;
        self.portal.borrow_mut().reset();
        Ok(())
    }

    /// The device hostname.
    pub fn hostname(&self) -> &ObservableValue<String> {
        &self.hostname
    }

    /// The connection state channel.
    pub fn wifi_state(&self) -> &ObservableValue<WifiState> {
        &self.state
    }

    /// The most recent disassociation cause, if any.
    pub fn last_disconnect_reason(&self) -> Option<DisconnectReason> {
        self.last_disconnect_reason.get()
    }

    /// SSID currently used for association.
    pub fn ssid(&self) -> String {
        self.credentials.borrow().ssid.clone()
    }

    fn has_credentials(&self) -> bool {
        !self.credentials.borrow().ssid.is_empty()
    }

    /// Boot decision: associate with saved credentials, or open the portal
    /// when there are none or the radio refuses them outright.
    fn connect_or_provision(&self) {
        if self.has_credentials() && self.connect_saved_ssid() {
            return;
        }
        if self.settings.use_portal {
            self.start_portal();
        } else {
            warn!("No usable WiFi credentials and provisioning portal disabled");
        }
    }

    /// Returns `false` when the radio failed to start associating.
    fn connect_saved_ssid(&self) -> bool {
        let Credentials { ssid, password } = self.credentials.borrow().clone();
        info!("Connecting to WiFi SSID {}", ssid);
        let started = {
            let mut radio = self.radio.borrow_mut();
            radio.set_mode(RadioMode::Station);
            radio.begin(&ssid, &password)
        };

        match started {
            Ok(()) => {
                self.transition(WifiState::Connecting);
                true
            }
            Err(e) => {
                warn!("WiFi.begin for {} failed: {}", ssid, e);
                self.transition(WifiState::Disconnected);
                false
            }
        }
    }

    fn start_portal(&self) {
        let hostname = self.hostname.get();
        let ap_ssid = format!("Configure {}", hostname);
        info!("Starting provisioning portal {}", ap_ssid);

        self.portal
            .borrow_mut()
            .start(&ap_ssid, &hostname, self.settings.portal_timeout);
        let session = self.portal_session.get() + 1;
        self.portal_session.set(session);
        self.transition(WifiState::ApMode);

        let this = self.this.clone();
        self.scheduler.on_delay(
            self.settings.portal_timeout,
            Box::new(move || {
                if let Some(networking) = this.upgrade() {
                    networking.portal_timed_out(session);
                }
            }),
        );
    }

    fn portal_timed_out(&self, session: u64) {
        if self.state.get() != WifiState::ApMode || self.portal_session.get() != session {
            return;
        }
        error!("Failed to connect to WiFi and config timed out. Restarting...");
        self.portal.borrow_mut().stop();
        self.request_restart(RestartReason::ProvisioningTimeout);
    }

    fn schedule_restart(&self, reason: RestartReason) {
        if self.restart_pending.replace(true) {
            debug!("Restart already requested, ignoring {}", reason);
            return;
        }
        let device = Rc::clone(&self.device);
        self.scheduler
            .on_delay(self.settings.restart_delay, Box::new(move || device.restart(reason)));
    }

    fn request_restart(&self, reason: RestartReason) {
        if self.restart_pending.replace(true) {
            debug!("Restart already requested, ignoring {}", reason);
            return;
        }
        self.device.restart(reason);
    }

    fn transition(&self, next: WifiState) {
        let current = self.state.get();
        if current != next {
            debug!("WiFi state {} -> {}", current, next);
            self.state.set(next);
        }
    }

    fn notify_connection(&self, connected: bool) {
        let callback = self.connection_callback.borrow().clone();
        if let Some(callback) = callback {
            callback(connected);
        }
    }
}

impl ValueProducer<WifiState> for Networking {
    fn output(&self) -> &ObservableValue<WifiState> {
        &self.state
    }
}

/// Schema row for the networking page. Read-only rows get a title suffix
/// so the UI shows why they can't be edited.
fn property_row(title: &str, read_only: bool) -> Field {
    let title = if read_only {
        format!("{} (readonly)", title)
    } else {
        title.to_string()
    };
    Field::string(title).read_only(read_only)
}

impl Configurable for Networking {
    fn config_path(&self) -> Option<&str> {
        self.settings.config_path.as_deref()
    }

    fn get_configuration(&self, root: &mut Map<String, Value>) {
        let credentials = self.credentials.borrow();
        root.insert("hostname".to_string(), json!(self.hostname.get()));
        root.insert("ap_ssid".to_string(), json!(credentials.ssid));
        root.insert("ap_password".to_string(), json!(credentials.password));
    }

    fn get_config_schema(&self) -> Value {
        let hostname_preset = self.settings.hostname_preset();
        let wifi_preset = self.settings.wifi_preset();
        ConfigSchema::new()
            .property("hostname", property_row("Device hostname", hostname_preset))
            .property("ap_ssid", property_row("Wifi Access Point SSID", wifi_preset))
            .property("ap_password", property_row("Wifi Access Point Password", wifi_preset))
            .into()
    }

    /// `hostname` is required. `ap_ssid` and `ap_password` keep their current
    /// values when absent. Preset values are never replaced.
    fn set_configuration(&self, config: &Value) -> Result<(), ConfigError> {
        let map = require_keys(config, &["hostname"])?;
        let hostname = string_field(map, "hostname")?;
        let ssid = optional_string(map, "ap_ssid")?;
        let password = optional_string(map, "ap_password")?;

        if !self.settings.hostname_preset() {
            self.hostname.set(hostname.to_string());
        }
        if !self.settings.wifi_preset() {
            let mut credentials = self.credentials.borrow_mut();
            if let Some(ssid) = ssid {
                credentials.ssid = ssid.to_string();
            }
            if let Some(password) = password {
                credentials.password = password.to_string();
            }
        }
        Ok(())
    }
}

fn optional_string<'a>(map: &'a Map<String, Value>, key: &str) -> Result<Option<&'a str>, ConfigError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => string_field(map, key).map(Some),
    }
}
