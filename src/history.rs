//! Bounded log of control channel exchanges, for diagnostics.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Error;

/// What an exchange with the bridge was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeKind {
    /// Inventory round trip. The body counts what came back.
    Inventory,
    /// State command. The body is what was sent.
    Command,
}

/// One finished exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeEntry {
    pub kind: ExchangeKind,
    /// Route below `/api/{username}`, empty for the inventory.
    pub route: String,
    pub body: Value,
    /// Set when the exchange failed.
    pub error: Option<String>,
    /// Seconds since history creation
    pub elapsed: f64,
}

impl ExchangeEntry {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// The most recent exchanges with a bridge, oldest dropped first, plus the
/// last command body sent to each route.
#[derive(Debug, Clone)]
pub struct ExchangeHistory {
    entries: VecDeque<ExchangeEntry>,
    capacity: usize,
    commands: HashMap<String, Value>,
    failures: usize,
    last_error: Option<String>,
    start_time: Instant,
}

impl Default for ExchangeHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeHistory {
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            commands: HashMap::new(),
            failures: 0,
            last_error: None,
            start_time: Instant::now(),
        }
    }

    /// Record a finished exchange and its outcome.
    pub fn record<T>(
        &mut self,
        kind: ExchangeKind,
        route: &str,
        body: Value,
        result: &Result<T, Error>,
    ) {
        let error = result.as_ref().err().map(ToString::to_string);
        if let Some(e) = &error {
            self.failures += 1;
            self.last_error = Some(e.clone());
        }
        if kind == ExchangeKind::Command {
            self.commands.insert(route.to_string(), body.clone());
        }

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        if self.capacity > 0 {
            self.entries.push_back(ExchangeEntry {
                kind,
                route: route.to_string(),
                body,
                error,
                elapsed: self.start_time.elapsed().as_secs_f64(),
            });
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Body of the last command sent to `route`, whether it succeeded or not.
    pub fn last_command(&self, route: &str) -> Option<&Value> {
        self.commands.get(route)
    }

    /// Exchanges, oldest first.
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &ExchangeEntry> {
        self.entries.iter()
    }

    /// Bodies of the retained commands sent to `route`, oldest first.
    pub fn commands_to<'a>(&'a self, route: &'a str) -> impl Iterator<Item = &'a Value> {
        self.entries
            .iter()
            .filter(move |e| e.kind == ExchangeKind::Command && e.route == route)
            .map(|e| &e.body)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> HistorySummary {
        let count = |kind| self.entries.iter().filter(|e| e.kind == kind).count();
        HistorySummary {
            inventory_count: count(ExchangeKind::Inventory),
            command_count: count(ExchangeKind::Command),
            failure_count: self.failures,
            last_error: self.last_error.clone(),
        }
    }
}

/// Counts over the retained exchanges. `failure_count` covers every failure
/// since creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySummary {
    pub inventory_count: usize,
    pub command_count: usize,
    pub failure_count: usize,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;

    #[test]
    fn test_record_command() {
        let mut history = ExchangeHistory::new();
        history.record(ExchangeKind::Command, "lights/1/state", json!({"on": true}), &Ok(()));

        assert_eq!(history.len(), 1);
        assert!(history.entries().all(ExchangeEntry::is_success));
        assert_eq!(
            history.last_command("lights/1/state"),
            Some(&json!({"on": true}))
        );
        assert_eq!(history.summary().command_count, 1);
    }

    #[test]
    fn test_failure_sets_last_error() {
        let mut history = ExchangeHistory::new();
        let failed: Result<(), Error> = Err(Error::HttpStatus(StatusCode::SERVICE_UNAVAILABLE));
        history.record(ExchangeKind::Inventory, "", Value::Null, &failed);
        history.record(ExchangeKind::Inventory, "", json!({"groups": 1, "lights": 2}), &Ok(()));

        let summary = history.summary();
        assert_eq!(summary.inventory_count, 2);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(history.last_error(), Some(failed.unwrap_err().to_string().as_str()));
        assert_eq!(history.last_command(""), None);
    }

    #[test]
    fn test_capacity_drops_oldest_but_keeps_last_command() {
        let mut history = ExchangeHistory::with_capacity(2);
        for i in 0..5 {
            history.record(ExchangeKind::Command, &format!("lights/{i}/state"), json!({"bri": i}), &Ok(()));
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.entries().next().map(|e| e.route.as_str()), Some("lights/3/state"));
        assert_eq!(history.last_command("lights/0/state"), Some(&json!({"bri": 0})));
        assert_eq!(history.commands_to("lights/4/state").count(), 1);
    }
}
