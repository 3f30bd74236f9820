//! Maps connection state to LED patterns.

use std::cell::Cell;
use std::rc::Rc;

use sknode_core::ValueConsumer;
use sknode_net::{ServerConnectionState, WifiState};
use tracing::debug;

use crate::blinker::{BlinkPattern, PatternPlayer};

/// Trying to associate with a known access point.
pub const WIFI_CONNECTING: BlinkPattern = BlinkPattern::Sequence(&[50, 2000]);
/// Association lost.
pub const WIFI_DISCONNECTED: BlinkPattern = BlinkPattern::Sequence(&[50, 50, 50, 2000]);
/// Provisioning portal waiting for credentials.
pub const PROVISIONING: BlinkPattern = BlinkPattern::Sequence(&[50, 50]);
/// WiFi up, no server link.
pub const WIFI_CONNECTED: BlinkPattern = BlinkPattern::Sequence(&[1900, 100]);
/// Waiting for the server to approve access.
pub const SERVER_AUTHORIZING: BlinkPattern = BlinkPattern::Sequence(&[200, 200]);
/// Opening the server connection.
pub const SERVER_CONNECTING: BlinkPattern = BlinkPattern::Sequence(&[50, 100, 1900, 100]);
/// Everything up.
pub const SERVER_CONNECTED: BlinkPattern = BlinkPattern::ON;

/// Pattern for a combination of WiFi and server state.
///
/// WiFi governs until it is connected; from then on the server connection
/// selects the pattern. States without a mapping show solid off.
pub fn pattern_for(wifi: WifiState, server: ServerConnectionState) -> BlinkPattern {
    match wifi {
        WifiState::Disconnected => WIFI_DISCONNECTED,
        WifiState::Connecting => WIFI_CONNECTING,
        WifiState::ApMode => PROVISIONING,
        WifiState::Connected => match server {
            ServerConnectionState::Disconnected => WIFI_CONNECTED,
            ServerConnectionState::Authorizing => SERVER_AUTHORIZING,
            ServerConnectionState::Connecting => SERVER_CONNECTING,
            ServerConnectionState::Connected => SERVER_CONNECTED,
        },
        _ => BlinkPattern::OFF,
    }
}

/// Status LED driven by the WiFi state, the server connection state and an
/// activity counter.
///
/// Connect the networking state channel, the server state channel and the
/// delta count channel; each input type has its own `set_input`. Every
/// non-zero activity count flashes the LED once.
pub struct LedController {
    player: Rc<dyn PatternPlayer>,
    wifi: Cell<WifiState>,
    server: Cell<ServerConnectionState>,
    current: Cell<Option<BlinkPattern>>,
}

impl LedController {
    pub fn new(player: Rc<dyn PatternPlayer>) -> Rc<Self> {
        let controller = Rc::new(Self {
            player,
            wifi: Cell::new(WifiState::Disconnected),
            server: Cell::new(ServerConnectionState::Disconnected),
            current: Cell::new(None),
        });
        controller.refresh();
        controller
    }

    /// Pattern currently shown.
    pub fn pattern(&self) -> Option<BlinkPattern> {
        self.current.get()
    }

    fn refresh(&self) {
        let pattern = pattern_for(self.wifi.get(), self.server.get());
        if self.current.get() == Some(pattern) {
            return;
        }
        debug!(
            "Status LED for wifi {} / server {:?}",
            self.wifi.get(),
            self.server.get()
        );
        self.current.set(Some(pattern));
        self.player.set_pattern(pattern);
    }
}

impl ValueConsumer<WifiState> for LedController {
    fn set_input(&self, state: WifiState, _input_channel: u8) {
        self.wifi.set(state);
        self.refresh();
    }
}

impl ValueConsumer<ServerConnectionState> for LedController {
    fn set_input(&self, state: ServerConnectionState, _input_channel: u8) {
        self.server.set(state);
        self.refresh();
    }
}

impl ValueConsumer<i32> for LedController {
    fn set_input(&self, count: i32, _input_channel: u8) {
        if count > 0 {
            self.player.blip();
        }
    }
}
