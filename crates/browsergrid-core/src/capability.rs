//! Capability requests — the attribute map a test session asks for.
//!
//! Requests arrive as loosely typed JSON maps. The provisioning pipeline
//! never mutates them directly: it produces a [`RequestPatch`] that the
//! caller applies with [`CapabilityRequest::apply`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::BrowserType;

/// Key holding the requested browser name.
pub const BROWSER_NAME: &str = "browserName";
/// Legacy and W3C platform keys, checked in this order.
pub const PLATFORM_KEYS: [&str; 2] = ["platform", "platformName"];
/// Key holding the requested browser version.
pub const VERSION: &str = "version";
/// Accepted spellings of the screen resolution override, checked in order.
pub const SCREEN_RESOLUTION_KEYS: [&str; 3] =
    ["screenResolution", "resolution", "screen-resolution"];
/// Key the normalized screen resolution is written back under.
pub const SCREEN_RESOLUTION: &str = "screenResolution";
/// Key holding the time zone override.
pub const TIME_ZONE: &str = "tz";
/// Max sessions a single worker accepts.
pub const MAX_INSTANCES: &str = "maxInstances";

/// Name of the dedup marker for a browser, e.g. `waitingFor_CHROME_Node`.
pub fn dedup_marker_key(browser: BrowserType) -> String {
    format!("waitingFor_{}_Node", browser.as_str().to_ascii_uppercase())
}

/// A requested set of capabilities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityRequest(Map<String, Value>);

impl CapabilityRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Textual form of a value; numbers and booleans are rendered.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn browser_name(&self) -> Option<String> {
        self.text(BROWSER_NAME)
    }

    pub fn platform(&self) -> Option<String> {
        PLATFORM_KEYS.iter().find_map(|key| self.text(key))
    }

    pub fn version(&self) -> Option<String> {
        self.text(VERSION)
    }

    /// Current dedup attempt count for a browser.
    ///
    /// A marker that is not a non-negative integer counts as absent.
    pub fn dedup_marker(&self, browser: BrowserType) -> Option<u32> {
        let value = self.0.get(&dedup_marker_key(browser))?;
        match value {
            Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Write every entry of a patch into the request.
    pub fn apply(&mut self, patch: &RequestPatch) {
        for (key, value) in patch.iter() {
            self.0.insert(key.to_string(), value.clone());
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for CapabilityRequest {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Writes the pipeline wants applied to a caller-owned request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestPatch {
    writes: Vec<(String, Value)>,
}

impl RequestPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write, replacing an earlier write to the same key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.writes.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.writes.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.writes.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.writes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}
