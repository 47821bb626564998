//! LED device driving a set of bridge lights.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bridge::{Bridge, BridgeEvent, CommandSink};
use crate::config::DeviceConfig;
use crate::errors::Error;
use crate::inventory::{GroupEntry, LightEntry};
use crate::light::Light;
use crate::stream::{
    DtlsTransport, LightStates, SecureTransport, SessionOutcome, SessionState, StopSignal,
    StreamSession,
};
use crate::types::Color;

type Result<T> = std::result::Result<T, Error>;

/// A running stream as seen by the device. The session's outcome is
/// forwarded into the bridge's event channel by a watcher task.
struct ActiveStream {
    stop: StopSignal,
    state: watch::Receiver<SessionState>,
    watcher: JoinHandle<()>,
}

impl ActiveStream {
    fn is_running(&self) -> bool {
        !self.state.borrow().is_terminal()
    }
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

/// Owns the bridge connection and the lights taken over from it, and turns
/// upstream colour frames into light updates.
///
/// Bridge events must be fed back through [`HueDevice::handle_event`] in the
/// order they arrive.
///
/// In control mode every colour change becomes a command on the bridge's
/// HTTP API. In streaming mode colours are only stored, and a
/// [`StreamSession`] sends them to the bridge's entertainment endpoint.
pub struct HueDevice<T: SecureTransport + Clone = DtlsTransport> {
    bridge: Bridge,
    config: DeviceConfig,
    transport: Option<T>,
    lights: LightStates,
    stream: Option<ActiveStream>,
    enabled: bool,
    ready: bool,
}

impl HueDevice<DtlsTransport> {
    /// Create a device for `bridge`. In streaming mode the bridge endpoint must
    /// carry a valid client key.
    pub fn new(bridge: Bridge, config: DeviceConfig) -> Result<Self> {
        let transport = if config.streaming {
            Some(DtlsTransport::from_endpoint(
                bridge.endpoint(),
                config.stream.write_timeout(),
            )?)
        } else {
            None
        };
        Ok(Self::build(bridge, config, transport))
    }
}

impl<T: SecureTransport + Clone> HueDevice<T> {
    /// Create a device that streams over a custom transport.
    pub fn with_transport(bridge: Bridge, config: DeviceConfig, transport: T) -> Self {
        Self::build(bridge, config, Some(transport))
    }

    fn build(bridge: Bridge, config: DeviceConfig, transport: Option<T>) -> Self {
        Self {
            bridge,
            config,
            transport,
            lights: LightStates::default(),
            stream: None,
            enabled: true,
            ready: false,
        }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Ids of the lights currently driven, in LED order.
    pub fn light_ids(&self) -> Vec<u16> {
        self.lights.ids()
    }

    pub fn lights(&self) -> &LightStates {
        &self.lights
    }

    /// Phase of the current streaming session, if one was started.
    pub fn stream_state(&self) -> Option<SessionState> {
        self.stream.as_ref().map(|s| *s.state.borrow())
    }

    pub fn subscribe_stream(&self) -> Option<watch::Receiver<SessionState>> {
        self.stream.as_ref().map(|s| s.state.clone())
    }

    /// Whether [`write`](HueDevice::write) will be accepted.
    pub fn is_ready(&self) -> bool {
        if !self.ready || self.lights.is_empty() {
            return false;
        }
        !self.config.streaming || self.stream.as_ref().is_some_and(ActiveStream::is_running)
    }

    /// React to one bridge event.
    ///
    /// Errors are logged as well as returned; on error the device is left not
    /// ready.
    pub async fn handle_event(&mut self, event: BridgeEvent) -> Result<()> {
        match event {
            BridgeEvent::InventoryReady { groups, lights } => {
                let result = self.apply_inventory(&groups, &lights).await;
                if let Err(e) = &result {
                    error!("Bridge inventory rejected: {e}");
                    self.ready = false;
                }
                result
            }
            BridgeEvent::TransportError(e) => {
                warn!("Bridge unreachable ({e}), device not ready");
                self.ready = false;
                Ok(())
            }
            BridgeEvent::StreamStopped(outcome) => {
                self.on_stream_stopped(outcome);
                Ok(())
            }
        }
    }

    /// Apply one frame of upstream colours, one per light in order.
    ///
    /// Extra colours are ignored. Fewer colours than lights is rejected before
    /// anything is changed.
    pub fn write(&mut self, colors: &[Color]) -> Result<()> {
        if !self.is_ready() {
            return Err(Error::NotReady);
        }

        let count = self.lights.len();
        if colors.len() < count {
            error!("More light ids configured than leds, each light id requires one led!");
            return Err(Error::ColorCountMismatch {
                lights: count,
                colors: colors.len(),
            });
        }

        let DeviceConfig {
            brightness_factor: factor,
            brightness_min: min,
            brightness_max: max,
            switch_off_on_black,
            transition_time,
            streaming,
            ..
        } = self.config;

        for (idx, color) in colors.iter().take(count).enumerate() {
            let mut lights = self.lights.lock();
            let Some(light) = lights.get_mut(idx) else {
                break;
            };
            let point = color.to_point(light.triangle());

            if streaming {
                light.set_color(point, factor, min, max, true);
            } else {
                light.set_on(!(switch_off_on_black && point.brightness() == 0.0));
                light.set_transition_time(transition_time);
                light.set_color(point, factor, min, max, false);
            }
        }
        Ok(())
    }

    /// Toggle the group's streaming mode and start a new session over the
    /// current lights. A running session is stopped first.
    pub async fn start_streaming(&mut self) -> Result<()> {
        let Some(transport) = self.transport.clone() else {
            return Err(Error::stream("start", "streaming is not configured"));
        };
        if self.lights.is_empty() {
            return Err(Error::NotReady);
        }
        self.stop_stream().await;

        let group_id = self.bridge.endpoint().group_id;
        if let Err(e) = self.bridge.set_streaming(group_id, false).await {
            warn!("Failed to reset streaming on group {group_id}: {e}");
        }
        self.bridge.set_streaming(group_id, true).await?;

        let handle = StreamSession::start(
            transport,
            &self.bridge.endpoint().host,
            self.config.stream.clone(),
            self.lights.clone(),
        );
        let stop = handle.stop_signal();
        let state = handle.subscribe();
        let events = self.bridge.event_sender();
        let watcher = tokio::spawn(async move {
            let outcome = handle.join().await;
            let _ = events.send(BridgeEvent::StreamStopped(outcome));
        });

        info!("Streaming to group {group_id} with {} light(s)", self.lights.len());
        self.stream = Some(ActiveStream {
            stop,
            state,
            watcher,
        });
        self.ready = true;
        Ok(())
    }

    /// Stop streaming and hand the group back to the bridge.
    pub async fn switch_off(&mut self) {
        self.stop_stream().await;
        if self.config.streaming {
            let group_id = self.bridge.endpoint().group_id;
            if let Err(e) = self.bridge.set_streaming(group_id, false).await {
                warn!("Failed to stop streaming on group {group_id}: {e}");
            }
        }
    }

    /// Enable or disable the device.
    ///
    /// Enabling connects to the bridge when no lights are known yet, and
    /// otherwise restarts streaming. Disabling cancels any pending reconnect,
    /// switches off and releases all lights, which restores their original
    /// state. Inventory arriving while disabled is ignored.
    pub async fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.enabled = enabled;
        if enabled {
            if self.lights.is_empty() {
                self.bridge.connect();
            } else if self.config.streaming {
                self.start_streaming().await?;
            } else {
                self.ready = true;
            }
        } else {
            self.bridge.cancel_reconnect();
            self.switch_off().await;
            self.ready = false;
            drop(self.lights.replace(Vec::new()));
        }
        Ok(())
    }

    async fn apply_inventory(
        &mut self,
        groups: &BTreeMap<u16, GroupEntry>,
        lights: &BTreeMap<u16, LightEntry>,
    ) -> Result<()> {
        if !self.enabled {
            debug!("Device disabled, ignoring bridge inventory");
            return Ok(());
        }

        let ids = if self.config.streaming {
            let group_id = self.bridge.endpoint().group_id;
            let group = groups.get(&group_id).ok_or(Error::GroupNotFound(group_id))?;
            if !group.is_entertainment() {
                return Err(Error::NotEntertainmentGroup(group_id));
            }
            debug!("Entertainment group {group_id} ({:?}): {:?}", group.name, group.lights);
            group.light_ids()
        } else {
            self.config.light_ids.clone()
        };

        self.stop_stream().await;

        let sink: Arc<dyn CommandSink> = Arc::new(self.bridge.clone());
        let mut created = Vec::with_capacity(ids.len());
        for id in ids {
            match lights.get(&id) {
                Some(entry) => created.push(Light::new(id, entry, sink.clone())),
                None => error!("Light id {id} isn't used on this bridge"),
            }
        }
        drop(self.lights.replace(created));

        if self.lights.is_empty() {
            return Err(Error::NotReady);
        }

        if self.config.streaming {
            self.start_streaming().await
        } else {
            self.ready = true;
            Ok(())
        }
    }

    fn on_stream_stopped(&mut self, outcome: SessionOutcome) {
        if self.stream.as_ref().is_some_and(ActiveStream::is_running) {
            debug!("Ignoring end of a previous stream: {outcome}");
            return;
        }

        if outcome.is_failure() {
            error!("Streaming stopped: {outcome}");
        } else {
            info!("Streaming stopped: {outcome}");
        }
        self.stream = None;
        self.ready = false;
    }

    async fn stop_stream(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        stream.stop.stop();
        if let Err(e) = (&mut stream.watcher).await {
            warn!("Stream watcher ended abnormally: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeEndpoint;
    use crate::stream::session::tests::{ScriptedTransport, fast_config};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn inventory() -> (BTreeMap<u16, GroupEntry>, BTreeMap<u16, LightEntry>) {
        let groups = serde_json::from_value(json!({
            "1": {"name": "TV", "type": "Entertainment", "lights": ["4", "2"]},
            "2": {"name": "Kitchen", "type": "Room", "lights": ["2"]},
        }))
        .unwrap();
        let lights = serde_json::from_value(json!({
            "2": {"state": {"on": false}, "modelid": "LCT015", "name": "Left"},
            "4": {"state": {"on": true, "xy": [0.3, 0.3], "bri": 100}, "modelid": "LCT001", "name": "Right"},
        }))
        .unwrap();
        (groups, lights)
    }

    async fn bridge(group_id: u16) -> (MockServer, Bridge, mpsc::UnboundedReceiver<BridgeEvent>) {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"success": {}}])))
            .mount(&server)
            .await;
        let endpoint = BridgeEndpoint::new(&server.address().to_string(), "user")
            .with_client_key("00ff")
            .with_group(group_id);
        let (bridge, rx) = Bridge::with_client(endpoint, reqwest::Client::new(), Duration::from_secs(5));
        (server, bridge, rx)
    }

    fn control_config(light_ids: Vec<u16>) -> DeviceConfig {
        DeviceConfig {
            light_ids,
            ..Default::default()
        }
    }

    fn streaming_config() -> DeviceConfig {
        DeviceConfig {
            streaming: true,
            stream: fast_config(),
            ..Default::default()
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_write_before_inventory_is_rejected() {
        let (_server, bridge, _rx) = bridge(1).await;
        let mut device = HueDevice::new(bridge, control_config(vec![2])).unwrap();
        assert!(!device.is_ready());
        assert_eq!(device.write(&[Color::rgb(255, 0, 0)]), Err(Error::NotReady));
    }

    #[tokio::test]
    async fn test_control_mode_sends_commands() {
        let (_server, bridge, _rx) = bridge(1).await;
        let mut device = HueDevice::new(bridge.clone(), control_config(vec![4, 2, 9])).unwrap();
        let (groups, lights) = inventory();

        device
            .handle_event(BridgeEvent::InventoryReady { groups, lights })
            .await
            .unwrap();
        assert_eq!(device.light_ids(), vec![4, 2]);
        assert!(device.is_ready());

        device
            .write(&[Color::BLACK, Color::rgb(255, 0, 0), Color::rgb(0, 0, 255)])
            .unwrap();
        settle().await;

        let history = bridge.history();
        let right: Vec<_> = history.commands_to("lights/4/state").cloned().collect();
        assert!(right.contains(&json!({"on": false})));
        assert!(right.contains(&json!({"transitiontime": 1})));

        let left: Vec<_> = history.commands_to("lights/2/state").cloned().collect();
        assert!(left.contains(&json!({"on": true})));
        assert!(left.iter().any(|b| b.get("xy").is_some() && b["bri"] == json!(254)));
    }

    #[tokio::test]
    async fn test_short_frame_changes_nothing() {
        let (_server, bridge, _rx) = bridge(1).await;
        let mut device = HueDevice::new(bridge.clone(), control_config(vec![2, 4])).unwrap();
        let (groups, lights) = inventory();
        device
            .handle_event(BridgeEvent::InventoryReady { groups, lights })
            .await
            .unwrap();
        let before = device.lights().snapshot();

        assert_eq!(
            device.write(&[Color::rgb(10, 20, 30)]),
            Err(Error::ColorCountMismatch { lights: 2, colors: 1 })
        );
        settle().await;

        assert_eq!(device.lights().snapshot(), before);
        assert_eq!(bridge.history().summary().command_count, 0);
    }

    #[tokio::test]
    async fn test_non_entertainment_group_is_rejected() {
        let (_server, bridge, _rx) = bridge(2).await;
        let mut device = HueDevice::with_transport(bridge, streaming_config(), ScriptedTransport::default());
        let (groups, lights) = inventory();

        assert_eq!(
            device
                .handle_event(BridgeEvent::InventoryReady { groups, lights })
                .await,
            Err(Error::NotEntertainmentGroup(2))
        );
        assert!(!device.is_ready());
        assert!(device.light_ids().is_empty());
        assert_eq!(device.stream_state(), None);
    }

    #[tokio::test]
    async fn test_missing_group_is_rejected() {
        let (_server, bridge, _rx) = bridge(7).await;
        let mut device = HueDevice::with_transport(bridge, streaming_config(), ScriptedTransport::default());
        let (groups, lights) = inventory();

        assert_eq!(
            device
                .handle_event(BridgeEvent::InventoryReady { groups, lights })
                .await,
            Err(Error::GroupNotFound(7))
        );
        assert!(!device.is_ready());
    }

    #[tokio::test]
    async fn test_streaming_lifecycle() {
        let (_server, bridge, mut rx) = bridge(1).await;
        let transport = ScriptedTransport::default();
        let mut device = HueDevice::with_transport(bridge.clone(), streaming_config(), transport.clone());
        let (groups, lights) = inventory();
        device
            .handle_event(BridgeEvent::InventoryReady { groups, lights })
            .await
            .unwrap();

        assert_eq!(device.light_ids(), vec![2, 4]);
        assert!(device.is_ready());
        let mut state = device.subscribe_stream().unwrap();
        tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == SessionState::Streaming))
            .await
            .unwrap()
            .unwrap();

        device
            .write(&[Color::rgb(255, 0, 0), Color::rgb(0, 255, 0)])
            .unwrap();
        let snapshot = device.lights().snapshot();
        assert!(snapshot.iter().all(|(_, p)| p.brightness() == 1.0));

        device.switch_off().await;
        assert_eq!(device.stream_state(), None);
        assert!(!device.is_ready());
        assert!(transport.script.close_notified.load(std::sync::atomic::Ordering::SeqCst));

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            BridgeEvent::StreamStopped(outcome) => {
                assert_eq!(outcome, SessionOutcome::Stopped);
                device.handle_event(BridgeEvent::StreamStopped(outcome)).await.unwrap();
            }
            other => panic!("unexpected event {other:?}"),
        }

        let puts: Vec<_> = bridge
            .history()
            .commands_to("groups/1")
            .map(|body| body["stream"]["active"].clone())
            .collect();
        assert_eq!(puts, vec![json!(false), json!(true), json!(false)]);
    }

    #[tokio::test]
    async fn test_failed_handshake_leaves_device_not_ready() {
        let (_server, bridge, mut rx) = bridge(1).await;
        let transport = ScriptedTransport::failing_handshakes(10);
        let mut device = HueDevice::with_transport(bridge, streaming_config(), transport);
        let (groups, lights) = inventory();
        device
            .handle_event(BridgeEvent::InventoryReady { groups, lights })
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let BridgeEvent::StreamStopped(outcome) = event else {
            panic!("unexpected event {event:?}");
        };
        assert_eq!(outcome, SessionOutcome::HandshakeFailed(3));

        device.handle_event(BridgeEvent::StreamStopped(outcome)).await.unwrap();
        assert!(!device.is_ready());
        assert_eq!(device.stream_state(), None);
        assert_eq!(device.write(&[Color::BLACK, Color::BLACK]), Err(Error::NotReady));
    }

    #[tokio::test]
    async fn test_disable_restores_lights() {
        let (_server, bridge, _rx) = bridge(1).await;
        let mut device = HueDevice::new(bridge.clone(), control_config(vec![4])).unwrap();
        let (groups, lights) = inventory();
        device
            .handle_event(BridgeEvent::InventoryReady { groups, lights })
            .await
            .unwrap();

        device.set_enabled(false).await.unwrap();
        settle().await;

        assert!(device.light_ids().is_empty());
        assert!(!device.is_ready());
        assert_eq!(
            bridge.history().last_command("lights/4/state"),
            Some(&json!({"on": true, "xy": [0.3, 0.3], "bri": 100}))
        );
    }

    #[tokio::test]
    async fn test_disable_stops_reconnecting() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let endpoint = BridgeEndpoint::new(&server.address().to_string(), "user");
        let (bridge, _rx) =
            Bridge::with_client(endpoint, reqwest::Client::new(), Duration::from_millis(20));
        let mut device = HueDevice::new(bridge, control_config(vec![4])).unwrap();

        device.set_enabled(true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(70)).await;
        device.set_enabled(false).await.unwrap();
        settle().await;

        let polled = server.received_requests().await.unwrap().len();
        assert!(polled >= 1);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(server.received_requests().await.unwrap().len(), polled);

        let (groups, lights) = inventory();
        device
            .handle_event(BridgeEvent::InventoryReady { groups, lights })
            .await
            .unwrap();
        assert!(device.light_ids().is_empty());
        assert!(!device.is_ready());
    }

    #[tokio::test]
    async fn test_transport_error_marks_not_ready() {
        let (_server, bridge, _rx) = bridge(1).await;
        let mut device = HueDevice::new(bridge, control_config(vec![2])).unwrap();
        let (groups, lights) = inventory();
        device
            .handle_event(BridgeEvent::InventoryReady { groups, lights })
            .await
            .unwrap();
        assert!(device.is_ready());

        device
            .handle_event(BridgeEvent::TransportError("refused".to_string()))
            .await
            .unwrap();
        assert!(!device.is_ready());
    }
}
