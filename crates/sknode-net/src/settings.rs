//! Connection manager settings.

use std::time::Duration;

/// Hostname used when none was fixed at build time.
pub const DEFAULT_HOSTNAME: &str = "sknode";

/// Construction-time settings for [`Networking`](crate::Networking).
///
/// `preset_*` values are fixed at build time. A preset SSID (non-empty)
/// locks SSID and password; a preset hostname (anything other than
/// [`DEFAULT_HOSTNAME`]) locks the hostname. Locked values are read-only in
/// the configuration UI and are never overwritten by stored or submitted
/// configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkingSettings {
    pub config_path: Option<String>,
    pub preset_ssid: String,
    pub preset_password: String,
    pub preset_hostname: String,
    /// How long the provisioning portal waits before restarting.
    pub portal_timeout: Duration,
    /// Association check interval.
    pub watchdog_interval: Duration,
    /// Delay between saving portal credentials and restarting.
    pub restart_delay: Duration,
    /// Fall back to the provisioning portal when there are no credentials.
    pub use_portal: bool,
}

impl Default for NetworkingSettings {
    fn default() -> Self {
        Self {
            config_path: Some("/system/networking".to_string()),
            preset_ssid: String::new(),
            preset_password: String::new(),
            preset_hostname: DEFAULT_HOSTNAME.to_string(),
            portal_timeout: Duration::from_secs(180),
            watchdog_interval: Duration::from_millis(5000),
            restart_delay: Duration::from_millis(500),
            use_portal: true,
        }
    }
}

impl NetworkingSettings {
    /// Fix SSID and password at build time.
    pub fn with_wifi(mut self, ssid: impl Into<String>, password: impl Into<String>) -> Self {
        self.preset_ssid = ssid.into();
        self.preset_password = password.into();
        self
    }

    /// Fix the hostname at build time.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.preset_hostname = hostname.into();
        self
    }

    pub fn wifi_preset(&self) -> bool {
        !self.preset_ssid.is_empty()
    }

    pub fn hostname_preset(&self) -> bool {
        self.preset_hostname != DEFAULT_HOSTNAME
    }
}
