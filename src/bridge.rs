//! Request/response control channel to the bridge.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::BridgeEndpoint;
use crate::errors::Error;
use crate::history::{ExchangeHistory, ExchangeKind};
use crate::inventory::{GroupEntry, Inventory, LightEntry, parse_inventory};
use crate::stream::SessionOutcome;

type Result<T> = std::result::Result<T, Error>;

/// Something that accepts fire-and-forget state commands for the bridge.
///
/// [`Bridge`] is the production implementation; lights only ever talk to the
/// bridge through this trait.
pub trait CommandSink: Send + Sync {
    /// Send `body` as a PUT to `route`, relative to `/api/{username}/`.
    fn post(&self, route: &str, body: Value);
}

/// Notifications published to whoever owns the bridge connection.
#[derive(Debug)]
pub enum BridgeEvent {
    /// A fresh inventory arrived. Either map may be empty, never both.
    InventoryReady {
        groups: BTreeMap<u16, GroupEntry>,
        lights: BTreeMap<u16, LightEntry>,
    },
    /// The inventory request failed at the transport level; a reconnect is
    /// already scheduled.
    TransportError(String),
    /// A streaming session ended.
    StreamStopped(SessionOutcome),
}

/// Handle to a bridge's HTTP API.
///
/// Cloning is cheap and every clone talks to the same bridge, shares the same
/// reconnect timer and publishes to the same event channel.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    endpoint: BridgeEndpoint,
    client: reqwest::Client,
    reconnect_delay: Duration,
    events: mpsc::UnboundedSender<BridgeEvent>,
    pending: Mutex<Option<JoinHandle<()>>>,
    history: Mutex<ExchangeHistory>,
}

impl Bridge {
    pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a bridge handle and the receiving end of its event channel.
    pub fn new(endpoint: BridgeEndpoint) -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self::with_client(endpoint, client, Self::RECONNECT_DELAY)
    }

    /// Like [`Bridge::new`] with a caller supplied HTTP client and reconnect
    /// delay.
    pub fn with_client(
        endpoint: BridgeEndpoint,
        client: reqwest::Client,
        reconnect_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let bridge = Bridge {
            inner: Arc::new(BridgeInner {
                endpoint,
                client,
                reconnect_delay,
                events,
                pending: Mutex::new(None),
                history: Mutex::new(ExchangeHistory::new()),
            }),
        };
        (bridge, rx)
    }

    pub fn endpoint(&self) -> &BridgeEndpoint {
        &self.inner.endpoint
    }

    /// Sender half of the event channel, for components that report into the
    /// same stream of events (e.g. a finished streaming session).
    pub fn event_sender(&self) -> mpsc::UnboundedSender<BridgeEvent> {
        self.inner.events.clone()
    }

    pub fn history(&self) -> ExchangeHistory {
        self.inner.history.lock().clone()
    }

    /// Request the inventory in the background.
    ///
    /// The result is published as [`BridgeEvent::InventoryReady`]. Transport
    /// failures publish [`BridgeEvent::TransportError`] and retry after the
    /// reconnect delay until a reply arrives. Calling `connect` again cancels
    /// any pending retry. Empty credentials are logged and nothing is sent.
    pub fn connect(&self) {
        if !self.inner.endpoint.has_credentials() {
            error!("Username or IP address is empty!");
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("No async runtime running; cannot connect to bridge");
            return;
        };

        let bridge = self.clone();
        let task = runtime.spawn(async move {
            while !bridge.refresh().await {
                tokio::time::sleep(bridge.inner.reconnect_delay).await;
            }
        });

        if let Some(previous) = self.inner.pending.lock().replace(task) {
            previous.abort();
        }
    }

    /// Stop any scheduled reconnect.
    pub fn cancel_reconnect(&self) {
        if let Some(task) = self.inner.pending.lock().take() {
            task.abort();
        }
    }

    /// Fetch and parse the inventory once.
    pub async fn fetch_inventory(&self) -> Result<Inventory> {
        debug!("Connect to bridge http://{}/api/<username>", self.inner.endpoint.host);
        let result = self.request_inventory().await;
        let body = match &result {
            Ok(inventory) => json!({"groups": inventory.groups.len(), "lights": inventory.lights.len()}),
            Err(_) => Value::Null,
        };
        self.inner
            .history
            .lock()
            .record(ExchangeKind::Inventory, "", body, &result);
        result
    }

    async fn request_inventory(&self) -> Result<Inventory> {
        let response = self
            .inner
            .client
            .get(self.api_url())
            .send()
            .await
            .map_err(|e| Error::http("get", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status));
        }

        let body = response.text().await.map_err(|e| Error::http("read", e))?;
        parse_inventory(&body)
    }

    /// PUT a JSON body and wait for the bridge to answer. The reply content
    /// is not inspected.
    pub async fn put(&self, route: &str, body: &Value) -> Result<()> {
        let url = format!("{}/{}", self.api_url(), route);
        debug!("Post http://IP/api/USR/{route}: {body}");

        let result = self.send_put(&url, body).await;
        self.inner
            .history
            .lock()
            .record(ExchangeKind::Command, route, body.clone(), &result);
        result
    }

    async fn send_put(&self, url: &str, body: &Value) -> Result<()> {
        let response = self
            .inner
            .client
            .put(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::http("put", e))?;
        match response.status() {
            status if status.is_success() => Ok(()),
            status => Err(Error::HttpStatus(status)),
        }
    }

    /// Switch the entertainment streaming mode of a group.
    pub async fn set_streaming(&self, group_id: u16, active: bool) -> Result<()> {
        self.put(
            &format!("groups/{group_id}"),
            &json!({"stream": {"active": active}}),
        )
        .await
    }

    /// One inventory round trip. Returns `false` when the attempt should be
    /// retried after the reconnect delay.
    async fn refresh(&self) -> bool {
        match self.fetch_inventory().await {
            Ok(inventory) => {
                self.publish(inventory);
                true
            }
            Err(e @ (Error::Http { .. } | Error::HttpStatus(_))) => {
                error!("Network Error: {e}");
                let _ = self.inner.events.send(BridgeEvent::TransportError(e.to_string()));
                false
            }
            Err(e) => {
                error!("Got invalid response from bridge: {e}");
                true
            }
        }
    }

    fn publish(&self, inventory: Inventory) {
        let Inventory { groups, lights } = inventory;
        if groups.is_empty() {
            error!("Bridge has no registered groups");
        }
        if lights.is_empty() {
            error!("Bridge has no registered bulbs/stripes");
        }
        if groups.is_empty() && lights.is_empty() {
            return;
        }

        info!(
            "Bridge inventory: {} group(s), {} light(s)",
            groups.len(),
            lights.len()
        );
        let _ = self
            .inner
            .events
            .send(BridgeEvent::InventoryReady { groups, lights });
    }

    fn api_url(&self) -> String {
        let endpoint = &self.inner.endpoint;
        format!("http://{}/api/{}", endpoint.host, endpoint.username)
    }
}

impl CommandSink for Bridge {
    fn post(&self, route: &str, body: Value) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime running; dropping command for {route}");
            return;
        };

        let bridge = self.clone();
        let route = route.to_string();
        runtime.spawn(async move {
            if let Err(e) = bridge.put(&route, &body).await {
                warn!("Command for {route} failed: {e}");
            }
        });
    }
}
