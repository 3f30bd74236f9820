//! The status LED following a live connection manager.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use sknode_core::{DeltaQueue, EventLoop, MemoryConfigStorage, ObservableValue, ValueProducer};
use sknode_net::{
    DeviceControl, Networking, NetworkingSettings, ProvisioningPortal, Radio, RadioError,
    RadioEvent, RadioMode, RestartReason, ServerConnectionState,
};
use sknode_system::led_controller::{PROVISIONING, SERVER_CONNECTED, WIFI_CONNECTED, WIFI_CONNECTING};
use sknode_system::{LedController, LedPin, PatternBlinker};

struct IdleRadio;

impl Radio for IdleRadio {
    fn is_associated(&self) -> bool {
        true
    }
    fn set_mode(&mut self, _mode: RadioMode) {}
    fn begin(&mut self, _ssid: &str, _password: &str) -> Result<(), RadioError> {
        Ok(())
    }
}

struct IdlePortal;

impl ProvisioningPortal for IdlePortal {
    fn start(&mut self, _ap_ssid: &str, _hostname: &str, _timeout: Duration) {}
    fn stop(&mut self) {}
    fn reset(&mut self) {}
}

struct NoRestart;

impl DeviceControl for NoRestart {
    fn restart(&self, _reason: RestartReason) {}
}

struct Pin(Rc<RefCell<Vec<bool>>>);

impl LedPin for Pin {
    fn set(&mut self, on: bool) {
        self.0.borrow_mut().push(on);
    }
}

fn networking(settings: NetworkingSettings, event_loop: &Rc<EventLoop>) -> Rc<Networking> {
    Networking::new(
        settings,
        Box::new(IdleRadio),
        Box::new(IdlePortal),
        Rc::new(NoRestart),
        event_loop.clone(),
        Rc::new(MemoryConfigStorage::new()),
    )
}

#[test]
fn led_tracks_wifi_and_server_state() {
    let event_loop = Rc::new(EventLoop::new());
    let writes = Rc::new(RefCell::new(Vec::new()));
    let blinker = PatternBlinker::new(Box::new(Pin(Rc::clone(&writes))), event_loop.clone());
    let led = LedController::new(blinker.clone());

    let net = networking(
        NetworkingSettings::default().with_wifi("harbor", "secret"),
        &event_loop,
    );
    net.connect_to(Rc::clone(&led));
    let server = ObservableValue::new(ServerConnectionState::Disconnected);
    server.connect_to(Rc::clone(&led));

    net.setup(|_| {});
    assert_eq!(led.pattern(), Some(WIFI_CONNECTING));

    net.handle_event(RadioEvent::IpAcquired(Ipv4Addr::new(10, 0, 0, 7)));
    assert_eq!(blinker.pattern(), WIFI_CONNECTED);

    server.set(ServerConnectionState::Connected);
    assert_eq!(blinker.pattern(), SERVER_CONNECTED);
    assert!(blinker.is_on());
}

#[test]
fn led_shows_portal_without_credentials() {
    let event_loop = Rc::new(EventLoop::new());
    let writes = Rc::new(RefCell::new(Vec::new()));
    let blinker = PatternBlinker::new(Box::new(Pin(Rc::clone(&writes))), event_loop.clone());
    let led = LedController::new(blinker.clone());
    let net = networking(NetworkingSettings::default(), &event_loop);
    net.connect_to(Rc::clone(&led));

    net.setup(|_| {});
    writes.borrow_mut().clear();
    event_loop.advance(Duration::from_millis(200));

    assert_eq!(led.pattern(), Some(PROVISIONING));
    assert_eq!(*writes.borrow(), vec![false, true, false, true]);
}

#[test]
fn delta_activity_blips_the_led() {
    let event_loop = Rc::new(EventLoop::new());
    let writes = Rc::new(RefCell::new(Vec::new()));
    let blinker = PatternBlinker::new(Box::new(Pin(Rc::clone(&writes))), event_loop.clone());
    let led = LedController::new(blinker.clone());
    let queue = DeltaQueue::new("sknode.test");
    queue.delta_count().connect_to(Rc::clone(&led));

    assert!(blinker.is_on());
    queue.append("a.b", serde_json::json!(1));
    queue.take_delta();

    assert!(!blinker.is_on());
    event_loop.advance(Duration::from_millis(20));
    assert!(blinker.is_on());
}
