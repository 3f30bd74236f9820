//! Networking errors.

use sknode_core::ConfigError;
use thiserror::Error;

/// Errors returned by [`Networking`](crate::Networking) operations.
///
/// Association failures are not errors here; they show up as state
/// transitions on the WiFi state channel and are retried by the watchdog.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetworkingError {
    /// A portal submission arrived while the portal was not running.
    #[error("Provisioning portal is not active")]
    PortalInactive,

    /// A portal submission was missing a usable value.
    #[error("Invalid portal submission: {0}")]
    InvalidSubmission(String),

    /// Persisting the network configuration failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Why the radio could not start an association.
///
/// Only immediate failures are reported here. A link that comes up and
/// later drops arrives as [`RadioEvent::Disassociated`](crate::RadioEvent).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    /// The radio rejected the credentials without trying them.
    #[error("Association rejected: {0}")]
    Rejected(String),

    /// The radio hardware did not respond.
    #[error("Radio unavailable: {0}")]
    Unavailable(String),
}
