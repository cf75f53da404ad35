use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::Value;

/// Runtime overrides keyed by policy path. Iteration order is the path order,
/// so recomputing a snapshot from the same entries is deterministic.
#[derive(Clone, Debug, Default)]
pub struct RuntimeOverrideStore {
    entries: BTreeMap<String, RuntimeOverrideEntry>,
}

#[derive(Clone, Debug)]
pub struct RuntimeOverrideEntry {
    pub value: Value,
    pub owner: String,
    pub expires_at: Option<Instant>,
}

impl RuntimeOverrideStore {
    pub fn insert(&mut self, path: String, value: Value, owner: String, ttl: Option<Duration>) {
        let expires_at = ttl.map(|dur| Instant::now() + dur);
        self.entries.insert(
            path,
            RuntimeOverrideEntry {
                value,
                owner,
                expires_at,
            },
        );
    }

    pub fn remove(&mut self, path: &str) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn owner_of(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(|entry| entry.owner.as_str())
    }

    /// Drops expired entries and returns the remaining `(path, value)` pairs.
    pub fn active_entries(&mut self) -> Vec<(String, Value)> {
        let now = Instant::now();
        self.entries
            .retain(|_, entry| entry.expires_at.map_or(true, |expires| expires > now));
        self.entries
            .iter()
            .map(|(path, entry)| (path.clone(), entry.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entries_are_dropped() {
        let mut store = RuntimeOverrideStore::default();
        store.insert(
            "execution.max_retries".into(),
            Value::from(5),
            "ops".into(),
            Some(Duration::from_millis(0)),
        );
        store.insert(
            "execution.strict_mode".into(),
            Value::Bool(true),
            "ops".into(),
            None,
        );
        std::thread::sleep(Duration::from_millis(2));
        let active = store.active_entries();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0, "execution.strict_mode");
        assert_eq!(store.owner_of("execution.strict_mode"), Some("ops"));
        assert!(store.owner_of("execution.max_retries").is_none());
    }
}
