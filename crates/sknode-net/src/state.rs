//! Connection states and radio events.

use std::fmt;
use std::net::Ipv4Addr;

/// Connection state published by [`Networking`](crate::Networking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum WifiState {
    /// Not associated, or deliberately offline.
    #[default]
    Disconnected,
    /// Association in progress with known credentials.
    Connecting,
    /// Provisioning portal active, waiting for credentials.
    ApMode,
    /// Associated and holding an IP address.
    Connected,
}

impl fmt::Display for WifiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WifiState::Disconnected => "disconnected",
            WifiState::Connecting => "connecting",
            WifiState::ApMode => "ap-mode",
            WifiState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// State of the upstream SignalK server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerConnectionState {
    #[default]
    Disconnected,
    /// Waiting for the server to approve the device's access request.
    Authorizing,
    Connecting,
    Connected,
}

/// Events reported by the radio layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    /// Associated with an access point.
    Associated { ssid: String, rssi: i8 },
    /// Lost (or failed) association, with the radio's reason code.
    Disassociated { reason: u8 },
    /// DHCP lease obtained.
    IpAcquired(Ipv4Addr),
}

/// Why the radio dropped the association.
///
/// Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    NoApFound,
    Rejected,
    Other(u8),
}

impl DisconnectReason {
    pub const NOT_AUTHED: u8 = 6;
    pub const NOT_ASSOCED: u8 = 7;
    pub const NO_AP_FOUND: u8 = 201;

    /// Classify a raw reason code.
    pub fn from_code(code: u8) -> Self {
        match code {
            Self::NO_AP_FOUND => DisconnectReason::NoApFound,
            Self::NOT_ASSOCED | Self::NOT_AUTHED => DisconnectReason::Rejected,
            other => DisconnectReason::Other(other),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::NoApFound => f.write_str("no AP found"),
            DisconnectReason::Rejected => f.write_str("rejected or bad password"),
            DisconnectReason::Other(code) => write!(f, "{}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reason_classification() {
        assert_eq!(DisconnectReason::from_code(201), DisconnectReason::NoApFound);
        assert_eq!(DisconnectReason::from_code(6), DisconnectReason::Rejected);
        assert_eq!(DisconnectReason::from_code(7), DisconnectReason::Rejected);
        assert_eq!(DisconnectReason::from_code(8), DisconnectReason::Other(8));
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(DisconnectReason::NoApFound.to_string(), "no AP found");
        assert_eq!(DisconnectReason::Rejected.to_string(), "rejected or bad password");
        assert_eq!(DisconnectReason::Other(15).to_string(), "15");
    }

    #[test]
    fn test_default_state_is_disconnected() {
        assert_eq!(WifiState::default(), WifiState::Disconnected);
        assert_eq!(WifiState::ApMode.to_string(), "ap-mode");
    }
}
