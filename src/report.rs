use std::fmt;

use serde::Serialize;

/// Free-form key/value log of the resolved run parameters.
///
/// Informational only, not bit-exact: meant for verbose logs and run
/// provenance, never parsed back.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    entries: Vec<(String, String)>,
}

impl RunReport {
    /// Start an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one key/value entry.
    pub fn push(&mut self, key: &str, value: impl fmt::Display) {
        self.entries.push((key.to_string(), value.to_string()));
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Look up the last value recorded for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Dump the report as a JSON object, preserving entry order.
    pub fn to_json(&self) -> String {
        let mut map = serde_json::Map::new();
        for (key, value) in &self.entries {
            map.insert(key.clone(), serde_json::Value::String(value.clone()));
        }
        serde_json::Value::Object(map).to_string()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(f, "{key}: {value}")?;
        }
        Ok(())
    }
}
