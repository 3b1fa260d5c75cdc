// ── Durable agent registry ──
//
// JSON document `{ "agents": [ { id, endpoint, credential, label, enabled } ] }`,
// read best-effort once and rewritten whole after every mutation. A missing
// or corrupt document is an empty registry; a failed write is logged and the
// in-memory state stays authoritative.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// One configured agent.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    /// Canonical id, as reported by the agent's health probe.
    pub id: String,
    pub endpoint: String,
    /// Opaque bearer token, empty when the agent is unauthenticated.
    pub credential: SecretString,
    pub label: String,
    pub enabled: bool,
}

impl AgentRecord {
    pub fn new(
        id: impl Into<String>,
        endpoint: impl Into<String>,
        credential: SecretString,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            credential,
            label: label.into(),
            enabled: true,
        }
    }
}

// ── Document shape ──────────────────────────────────────────────────

/// Entries are parsed one at a time so a single bad entry only drops itself.
#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    agents: Vec<serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
struct StoredAgent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "url")]
    endpoint: Option<String>,
    #[serde(default, alias = "apiKey")]
    credential: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
}

impl StoredAgent {
    fn into_record(self) -> Option<AgentRecord> {
        let id = self.id.filter(|s| !s.is_empty())?;
        let endpoint = self.endpoint.filter(|s| !s.is_empty())?;
        Some(AgentRecord {
            id,
            endpoint,
            credential: SecretString::from(self.credential.unwrap_or_default()),
            label: self.label.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
        })
    }

    fn from_record(record: &AgentRecord) -> Self {
        Self {
            id: Some(record.id.clone()),
            endpoint: Some(record.endpoint.clone()),
            credential: Some(record.credential.expose_secret().to_owned()),
            label: Some(record.label.clone()),
            enabled: Some(record.enabled),
        }
    }
}

#[derive(Serialize)]
struct Document {
    agents: Vec<StoredAgent>,
}

// ── Registry ────────────────────────────────────────────────────────

/// Insertion-ordered agent store. Lookups hand out clones.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    path: Option<PathBuf>,
    agents: IndexMap<String, AgentRecord>,
}

impl AgentRegistry {
    /// Load the document at `path`. Never fails: anything unreadable
    /// yields an empty registry that will be written back on first change.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let agents = load(&path);
        debug!(path = %path.display(), count = agents.len(), "agent registry loaded");
        Self {
            path: Some(path),
            agents,
        }
    }

    /// A registry with no backing document.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ── Mutations (each one rewrites the document) ───────────────────

    /// Insert or replace the record with the same id.
    pub fn add(&mut self, record: AgentRecord) -> AgentRecord {
        self.agents.insert(record.id.clone(), record.clone());
        self.persist();
        record
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let existed = self.agents.shift_remove(id).is_some();
        if existed {
            self.persist();
        }
        existed
    }

    /// Returns `false` for an unknown id.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        let Some(record) = self.agents.get_mut(id) else {
            return false;
        };
        record.enabled = enabled;
        self.persist();
        true
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<AgentRecord> {
        self.agents.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    pub fn all(&self) -> Vec<AgentRecord> {
        self.agents.values().cloned().collect()
    }

    pub fn enabled(&self) -> Vec<AgentRecord> {
        self.agents.values().filter(|a| a.enabled).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    // ── Persistence ──────────────────────────────────────────────────

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = self.write_document(path) {
            error!(path = %path.display(), error = %e, "failed to save agent registry");
        }
    }

    fn write_document(&self, path: &Path) -> std::io::Result<()> {
        let doc = Document {
            agents: self.agents.values().map(StoredAgent::from_record).collect(),
        };
        let json = serde_json::to_string_pretty(&doc).map_err(std::io::Error::other)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        // write-then-rename
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)
    }
}

fn load(path: &Path) -> IndexMap<String, AgentRecord> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return IndexMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read agent registry, starting empty");
            return IndexMap::new();
        }
    };

    let doc: RawDocument = match serde_json::from_str(&raw) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "agent registry is corrupt, starting empty");
            return IndexMap::new();
        }
    };

    let mut agents = IndexMap::new();
    for value in doc.agents {
        match serde_json::from_value::<StoredAgent>(value)
            .ok()
            .and_then(StoredAgent::into_record)
        {
            Some(record) => {
                agents.insert(record.id.clone(), record);
            }
            None => debug!("skipping incomplete agent registry entry"),
        }
    }
    agents
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(id: &str) -> AgentRecord {
        AgentRecord::new(
            id,
            format!("http://{id}:15119"),
            SecretString::from(format!("key-{id}")),
            id.to_uppercase(),
        )
    }

    fn ids(records: &[AgentRecord]) -> Vec<String> {
        records.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reg = AgentRegistry::open(dir.path().join("agents.json"));
        assert!(reg.is_empty());
    }

    #[test]
    fn corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(AgentRegistry::open(&path).is_empty());

        std::fs::write(&path, r#"{"agents": "nope"}"#).unwrap();
        assert!(AgentRegistry::open(&path).is_empty());

        std::fs::write(&path, r"{}").unwrap();
        assert!(AgentRegistry::open(&path).is_empty());
    }

    #[test]
    fn incomplete_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        let doc = json!({
            "agents": [
                { "id": "a", "endpoint": "http://a:1", "credential": "k" },
                { "endpoint": "http://nobody:1" },
                { "id": "b", "url": "http://b:1", "apiKey": "legacy", "enabled": false, "label": "B" },
                { "id": "c", "endpoint": "http://c:1", "enabled": "yes" },
                42
            ]
        });
        std::fs::write(&path, doc.to_string()).unwrap();

        let reg = AgentRegistry::open(&path);
        assert_eq!(ids(&reg.all()), vec!["a", "b"]);

        let a = reg.get("a").unwrap();
        assert!(a.enabled);
        assert_eq!(a.label, "");
        let b = reg.get("b").unwrap();
        assert!(!b.enabled);
        assert_eq!(b.credential.expose_secret(), "legacy");
    }

    #[test]
    fn mutations_round_trip_through_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("agents.json");

        let mut reg = AgentRegistry::open(&path);
        reg.add(record("edge-1"));
        reg.add(record("edge-2"));
        reg.add(record("edge-3"));
        assert!(reg.set_enabled("edge-2", false));
        assert!(!reg.set_enabled("ghost", false));
        assert!(reg.remove("edge-1"));
        assert!(!reg.remove("edge-1"));

        let reloaded = AgentRegistry::open(&path);
        assert_eq!(ids(&reloaded.all()), vec!["edge-2", "edge-3"]);
        assert_eq!(ids(&reloaded.enabled()), vec!["edge-3"]);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["agents"][0]["endpoint"], "http://edge-2:15119");
        assert_eq!(raw["agents"][0]["credential"], "key-edge-2");
        assert_eq!(raw["agents"][0]["enabled"], false);
    }

    #[test]
    fn lookups_are_copies() {
        let mut reg = AgentRegistry::in_memory();
        reg.add(record("edge-1"));

        let mut copy = reg.get("edge-1").unwrap();
        copy.label = "mutated".into();
        copy.enabled = false;

        let stored = reg.get("edge-1").unwrap();
        assert_eq!(stored.label, "EDGE-1");
        assert!(stored.enabled);
    }

    #[test]
    fn unwritable_path_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be
        let path = dir.path().join("agents.json");
        std::fs::create_dir(&path).unwrap();

        let mut reg = AgentRegistry::open(&path);
        reg.add(record("edge-1"));
        assert_eq!(reg.len(), 1);
        assert!(reg.contains("edge-1"));
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut reg = AgentRegistry::in_memory();
        for id in ["zeta", "alpha", "mid"] {
            reg.add(record(id));
        }
        assert_eq!(ids(&reg.all()), vec!["zeta", "alpha", "mid"]);
    }
}
