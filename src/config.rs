//! Bridge, device and streaming configuration.
//!
//! These types are filled by an external JSON loader; field names follow the
//! keys used in LED device configuration files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// Where the bridge lives and how to authenticate with it.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct BridgeEndpoint {
    /// Host name or IP address of the bridge.
    #[serde(rename = "output")]
    pub host: String,
    /// Whitelisted API user; also the PSK identity when streaming.
    pub username: String,
    /// Hex encoded PSK used for entertainment streaming.
    #[serde(rename = "clientkey", default)]
    pub client_key: Option<String>,
    /// Entertainment group used for streaming.
    #[serde(rename = "groupId", default)]
    pub group_id: u16,
}

impl BridgeEndpoint {
    pub fn new(host: &str, username: &str) -> Self {
        Self {
            host: host.to_string(),
            username: username.to_string(),
            ..Default::default()
        }
    }

    pub fn with_client_key(mut self, client_key: &str) -> Self {
        self.client_key = Some(client_key.to_string());
        self
    }

    pub fn with_group(mut self, group_id: u16) -> Self {
        self.group_id = group_id;
        self
    }

    pub fn has_credentials(&self) -> bool {
        !self.host.trim().is_empty() && !self.username.trim().is_empty()
    }

    /// Decode the hex client key into raw PSK bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use hue_stream_rs::BridgeEndpoint;
    ///
    /// let endpoint = BridgeEndpoint::new("10.0.0.2", "user").with_client_key("0aFF");
    /// assert_eq!(endpoint.psk().unwrap(), vec![0x0a, 0xff]);
    /// ```
    pub fn psk(&self) -> Result<Vec<u8>> {
        let key = self.client_key.as_deref().unwrap_or_default().trim();
        if key.is_empty() {
            return Err(Error::MissingCredentials);
        }
        decode_hex(key).ok_or_else(|| Error::InvalidClientKey(key.to_string()))
    }

    /// PSK identity: the username bytes as-is, not hex decoded.
    pub fn psk_identity(&self) -> Vec<u8> {
        self.username.as_bytes().to_vec()
    }
}

/// Behaviour of the LED device that owns the bridge connection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Lights driven over the control channel, in LED order. Ignored when
    /// streaming; the entertainment group decides the lights then.
    #[serde(rename = "lightIds")]
    pub light_ids: Vec<u16>,
    #[serde(rename = "switchOffOnBlack")]
    pub switch_off_on_black: bool,
    /// Transition time in deciseconds for control channel updates.
    #[serde(rename = "transitiontime")]
    pub transition_time: u16,
    #[serde(rename = "brightnessFactor")]
    pub brightness_factor: f64,
    #[serde(rename = "brightnessMin")]
    pub brightness_min: f64,
    #[serde(rename = "brightnessMax")]
    pub brightness_max: f64,
    /// Use the entertainment streaming API instead of per-light commands.
    pub streaming: bool,
    #[serde(flatten)]
    pub stream: StreamConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            light_ids: Vec::new(),
            switch_off_on_black: true,
            transition_time: 1,
            brightness_factor: 1.0,
            brightness_min: 0.0,
            brightness_max: 1.0,
            streaming: false,
            stream: StreamConfig::default(),
        }
    }
}

/// Tuning of the secure streaming session. Durations are in milliseconds on
/// the wire.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    #[serde(rename = "sslport")]
    pub port: u16,
    #[serde(rename = "hs_attempts")]
    pub handshake_attempts: u32,
    #[serde(rename = "hs_timeout_min")]
    pub handshake_timeout_min_ms: u64,
    #[serde(rename = "hs_timeout_max")]
    pub handshake_timeout_max_ms: u64,
    #[serde(rename = "hs_retry_delay")]
    pub handshake_retry_delay_ms: u64,
    #[serde(rename = "retry_left")]
    pub write_retries: u32,
    #[serde(rename = "write_timeout")]
    pub write_timeout_ms: u64,
    #[serde(rename = "latchTime")]
    pub tick_ms: u64,
}

impl StreamConfig {
    pub const DEFAULT_PORT: u16 = 2100;

    pub fn handshake_timeout_min(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_min_ms)
    }

    pub fn handshake_timeout_max(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_max_ms)
    }

    pub fn handshake_retry_delay(&self) -> Duration {
        Duration::from_millis(self.handshake_retry_delay_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            port: Self::DEFAULT_PORT,
            handshake_attempts: 5,
            handshake_timeout_min_ms: 400,
            handshake_timeout_max_ms: 1000,
            handshake_retry_delay_ms: 200,
            write_retries: 5,
            write_timeout_ms: 1000,
            tick_ms: 40,
        }
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    s.as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = char::from(pair[0]).to_digit(16)?;
            let lo = char::from(pair[1]).to_digit(16)?;
            u8::try_from(hi << 4 | lo).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_device_config_defaults() {
        let config: DeviceConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, DeviceConfig::default());
        assert_eq!(config.stream.port, 2100);
        assert_eq!(config.stream.tick(), Duration::from_millis(40));
    }

    #[test]
    fn test_device_config_from_json_keys() {
        let config: DeviceConfig = serde_json::from_value(json!({
            "lightIds": [3, 1],
            "switchOffOnBlack": false,
            "transitiontime": 4,
            "brightnessFactor": 1.5,
            "streaming": true,
            "hs_attempts": 2,
            "retry_left": 1,
        }))
        .unwrap();
        assert_eq!(config.light_ids, vec![3, 1]);
        assert!(!config.switch_off_on_black);
        assert_eq!(config.transition_time, 4);
        assert_eq!(config.brightness_factor, 1.5);
        assert!(config.streaming);
        assert_eq!(config.stream.handshake_attempts, 2);
        assert_eq!(config.stream.write_retries, 1);
        assert_eq!(config.stream.handshake_timeout_max_ms, 1000);
    }

    #[test]
    fn test_endpoint_from_json_keys() {
        let endpoint: BridgeEndpoint = serde_json::from_value(json!({
            "output": "192.168.1.2",
            "username": "abc",
            "clientkey": "00ff",
            "groupId": 7,
        }))
        .unwrap();
        assert_eq!(endpoint.host, "192.168.1.2");
        assert_eq!(endpoint.group_id, 7);
        assert_eq!(endpoint.psk().unwrap(), vec![0x00, 0xff]);
        assert_eq!(endpoint.psk_identity(), b"abc".to_vec());
    }

    #[test]
    fn test_invalid_client_key() {
        let endpoint = BridgeEndpoint::new("h", "u").with_client_key("abc");
        assert!(matches!(endpoint.psk(), Err(Error::InvalidClientKey(_))));
        let endpoint = BridgeEndpoint::new("h", "u").with_client_key("zz");
        assert!(matches!(endpoint.psk(), Err(Error::InvalidClientKey(_))));
        let endpoint = BridgeEndpoint::new("h", "u");
        assert!(matches!(endpoint.psk(), Err(Error::MissingCredentials)));
    }

    #[test]
    fn test_credentials() {
        assert!(BridgeEndpoint::new("h", "u").has_credentials());
        assert!(!BridgeEndpoint::new("h", " ").has_credentials());
        assert!(!BridgeEndpoint::new("", "u").has_credentials());
    }
}
