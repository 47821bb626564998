//! Bridge inventory as returned by `GET /api/{username}`.

use std::collections::BTreeMap;

use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// State block of a light entry. Every field is optional so that partial
/// entries still load; callers decide how to treat what is missing.
#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct LightEntryState {
    pub on: Option<bool>,
    pub xy: Option<[f64; 2]>,
    pub bri: Option<u8>,
    #[serde(rename = "transitiontime")]
    pub transition_time: Option<u16>,
}

/// One light as listed by the bridge.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct LightEntry {
    #[serde(default)]
    pub state: LightEntryState,
    #[serde(rename = "modelid", default)]
    pub model_id: String,
    #[serde(default)]
    pub name: String,
}

/// One group as listed by the bridge.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct GroupEntry {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Member light ids, stringified as the bridge sends them.
    #[serde(default)]
    pub lights: Vec<String>,
}

impl GroupEntry {
    pub const ENTERTAINMENT: &'static str = "Entertainment";

    pub fn is_entertainment(&self) -> bool {
        self.kind == Self::ENTERTAINMENT
    }

    /// Member light ids in ascending order; unparsable ids are skipped.
    pub fn light_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self
            .lights
            .iter()
            .filter_map(|id| id.trim().parse().ok())
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// Groups and lights keyed by their bridge id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    pub groups: BTreeMap<u16, GroupEntry>,
    pub lights: BTreeMap<u16, LightEntry>,
}

/// Parse an inventory reply.
///
/// The bridge answers an unknown username with a JSON array of errors, which
/// is reported as [`Error::Unauthorized`].
///
/// # Examples
///
/// ```
/// use hue_stream_rs::parse_inventory;
///
/// let inventory = parse_inventory(r#"{"groups": {}, "lights": {"1": {"modelid": "LCT001"}}}"#).unwrap();
/// assert!(inventory.groups.is_empty());
/// assert_eq!(inventory.lights[&1].model_id, "LCT001");
///
/// assert!(parse_inventory(r#"[{"error": {"type": 1}}]"#).is_err());
/// ```
pub fn parse_inventory(body: &str) -> Result<Inventory> {
    let doc: Value = serde_json::from_str(body).map_err(Error::JsonLoad)?;
    if doc.is_array() {
        return Err(Error::Unauthorized);
    }

    Ok(Inventory {
        groups: collect_entries(&doc, "groups"),
        lights: collect_entries(&doc, "lights"),
    })
}

fn collect_entries<T: DeserializeOwned>(doc: &Value, key: &str) -> BTreeMap<u16, T> {
    let Some(entries) = doc.get(key).and_then(Value::as_object) else {
        return BTreeMap::new();
    };

    entries
        .iter()
        .filter_map(|(id, value)| {
            let Ok(id) = id.parse::<u16>() else {
                warn!("Skipping {key} entry with non-numeric id {id:?}");
                return None;
            };
            match serde_json::from_value(value.clone()) {
                Ok(entry) => Some((id, entry)),
                Err(e) => {
                    warn!("Skipping malformed {key} entry {id}: {e}");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_inventory() {
        let body = json!({
            "groups": {
                "1": {"name": "TV", "type": "Entertainment", "lights": ["5", "2"]},
                "2": {"name": "Kitchen", "type": "Room", "lights": ["3"]},
            },
            "lights": {
                "2": {
                    "state": {"on": true, "xy": [0.3, 0.4], "bri": 200, "transitiontime": 4},
                    "modelid": "LCT015",
                    "name": "Left",
                },
                "5": {"state": {"on": false}, "modelid": "LST002", "name": "Strip"},
            },
            "config": {"name": "Bridge"},
        });
        let inventory = parse_inventory(&body.to_string()).unwrap();

        assert_eq!(inventory.groups.len(), 2);
        assert!(inventory.groups[&1].is_entertainment());
        assert_eq!(inventory.groups[&1].light_ids(), vec![2, 5]);
        assert!(!inventory.groups[&2].is_entertainment());

        let left = &inventory.lights[&2];
        assert_eq!(left.state.on, Some(true));
        assert_eq!(left.state.xy, Some([0.3, 0.4]));
        assert_eq!(left.state.bri, Some(200));
        assert_eq!(left.state.transition_time, Some(4));
        assert_eq!(left.name, "Left");
    }

    #[test]
    fn test_array_means_unauthorized() {
        let body = r#"[{"error": {"type": 1, "address": "/", "description": "unauthorized user"}}]"#;
        assert_eq!(parse_inventory(body), Err(Error::Unauthorized));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(parse_inventory("{not json"), Err(Error::JsonLoad(_))));
    }

    #[test]
    fn test_missing_categories_are_empty() {
        let inventory = parse_inventory("{}").unwrap();
        assert!(inventory.groups.is_empty());
        assert!(inventory.lights.is_empty());
    }

    #[test]
    fn test_bad_entries_are_skipped() {
        let body = json!({
            "lights": {
                "abc": {"modelid": "LCT001"},
                "3": {"state": {"on": "yes"}},
                "4": {"modelid": "LCT001"},
            }
        });
        let inventory = parse_inventory(&body.to_string()).unwrap();
        assert_eq!(inventory.lights.keys().copied().collect::<Vec<_>>(), vec![4]);
    }
}
