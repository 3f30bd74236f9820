//! # sknode-net
//!
//! WiFi connection manager for sknode devices.
//!
//! [`Networking`] owns the association lifecycle: direct connection with
//! stored or build-time credentials, a captive provisioning portal when
//! there are none, a watchdog that re-associates after a drop, and restart
//! as the recovery action when provisioning times out. Its [`WifiState`]
//! channel drives status indicators.
//!
//! The radio, the portal and the device reset are reached only through the
//! traits in [`hardware`], so the state machine runs unchanged on a host.

pub mod error;
pub mod hardware;
pub mod networking;
pub mod settings;
pub mod state;

pub use error::{NetworkingError, RadioError};
pub use hardware::{DeviceControl, PortalSubmission, ProvisioningPortal, Radio, RadioMode, RestartReason};
pub use networking::Networking;
pub use settings::{NetworkingSettings, DEFAULT_HOSTNAME};
pub use state::{DisconnectReason, RadioEvent, ServerConnectionState, WifiState};
