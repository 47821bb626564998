//! # hue_stream_rs
//!
//! An async Rust library for driving Philips Hue lights from a stream of RGB
//! colours, as produced by an ambient lighting engine.
//!
//! The crate maps RGB values into each lamp's colour gamut, manages the
//! bridge and its lights over the bridge's HTTP API, and can push colours in
//! real time over the DTLS entertainment streaming protocol.
//!
//! ## Quick Start
//!
//! ```ignore
//! use hue_stream_rs::{Bridge, BridgeEndpoint, Color, DeviceConfig, HueDevice};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint = BridgeEndpoint::new("192.168.1.2", "api-username")
//!         .with_client_key("0123456789abcdef0123456789abcdef")
//!         .with_group(1);
//!     let (bridge, mut events) = Bridge::new(endpoint);
//!
//!     let config = DeviceConfig { streaming: true, ..Default::default() };
//!     let mut device = HueDevice::new(bridge.clone(), config)?;
//!     bridge.connect();
//!
//!     while let Some(event) = events.recv().await {
//!         device.handle_event(event).await.ok();
//!         if device.is_ready() {
//!             device.write(&[Color::rgb(255, 0, 0); 4]).ok();
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Gamut mapping**: convert RGB to CIE xy plus brightness, clipped to the
//!   lamp's [`Gamut`] (see [`colorspace`])
//! - **Bridge control**: inventory, light commands and reconnects via
//!   [`Bridge`]
//! - **Light takeover**: each [`Light`] restores its original state when
//!   dropped
//! - **Entertainment streaming**: a retried DTLS-PSK session pushing
//!   [`stream::frame`]s at a fixed cadence, see [`stream::StreamSession`]
//! - **Diagnostics**: recent bridge exchanges in an [`ExchangeHistory`]
//!
//! ## Communication
//!
//! Control commands go to `http://{bridge}/api/{username}`. Streaming uses
//! UDP port 2100 with `TLS_PSK_WITH_AES_128_GCM_SHA256`; the username is the
//! PSK identity and the hex client key is the PSK.
//!
//! Everything runs on tokio.

mod bridge;
pub mod colorspace;
mod config;
mod device;
mod errors;
mod history;
mod inventory;
mod light;
pub mod stream;
mod types;

// Re-export public API
pub use bridge::{Bridge, BridgeEvent, CommandSink};
pub use config::{BridgeEndpoint, DeviceConfig, StreamConfig};
pub use device::HueDevice;
pub use errors::Error;
pub use history::{ExchangeEntry, ExchangeHistory, ExchangeKind, HistorySummary};
pub use inventory::{GroupEntry, Inventory, LightEntry, LightEntryState, parse_inventory};
pub use light::Light;
pub use stream::{SessionOutcome, SessionState};
pub use types::{Color, Gamut, GamutTriangle, Point, PowerMode};
