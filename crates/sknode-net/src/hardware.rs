//! Seams to the radio, the provisioning portal and the device.

use std::fmt;
use std::time::Duration;

use crate::error::RadioError;

/// Radio operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    /// Client of an access point.
    Station,
    /// Radio powered down.
    Off,
}

/// The WiFi radio.
///
/// Association is asynchronous: `begin` only starts it and reports failures
/// it can see straight away. Later outcomes arrive as
/// [`RadioEvent`](crate::RadioEvent)s passed to
/// [`Networking::handle_event`](crate::Networking::handle_event).
pub trait Radio {
    /// Whether the radio currently holds an association.
    fn is_associated(&self) -> bool;

    fn set_mode(&mut self, mode: RadioMode);

    /// Start associating with `ssid`. An empty password means an open network.
    fn begin(&mut self, ssid: &str, password: &str) -> Result<(), RadioError>;
}

/// Credentials entered in the provisioning portal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortalSubmission {
    pub ssid: String,
    pub password: String,
    pub hostname: String,
}

/// The captive provisioning portal: an access point plus a form for
/// SSID, password and hostname.
///
/// Submissions are delivered to
/// [`Networking::submit_portal`](crate::Networking::submit_portal).
pub trait ProvisioningPortal {
    /// Advertise `ap_ssid` and serve the form. `timeout` is informational;
    /// the connection manager enforces it.
    fn start(&mut self, ap_ssid: &str, hostname: &str, timeout: Duration);

    fn stop(&mut self);

    /// Forget any credentials the portal has stored.
    fn reset(&mut self);
}

/// Why a restart was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// The portal timed out without a submission.
    ProvisioningTimeout,
    /// New settings were saved and need a fresh boot to apply.
    ApplySettings,
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartReason::ProvisioningTimeout => f.write_str("provisioning timed out"),
            RestartReason::ApplySettings => f.write_str("applying new settings"),
        }
    }
}

/// Device level control.
pub trait DeviceControl {
    /// Restart the device. On hardware this does not return.
    fn restart(&self, reason: RestartReason);
}
