//! Plugin snapshots loaded from a JSON file.
//!
//! The file is an array of `{ "domain", "subject", "payload" }` entries, the
//! shape a plugin export would hand over:
//!
//! ```json
//! [
//!   { "domain": "collection-log-item", "subject": "itemId=12073,player=Foo",
//!     "payload": { "fields": { "unlocked": true }, "partial": true } }
//! ]
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use groupscape_resolution::{Payload, RequestDescriptor, SnapshotBridge};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SnapshotEntry {
    domain: String,
    subject: String,
    #[serde(default)]
    payload: Payload,
}

/// Build a bridge serving every entry of the file at `path`.
pub fn load_bridge(path: &Path) -> anyhow::Result<SnapshotBridge> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading plugin snapshot {}", path.display()))?;
    parse_bridge(&raw).with_context(|| format!("parsing plugin snapshot {}", path.display()))
}

fn parse_bridge(raw: &str) -> anyhow::Result<SnapshotBridge> {
    let entries: Vec<SnapshotEntry> = serde_json::from_str(raw)?;

    let domains: BTreeSet<String> = entries
        .iter()
        .map(|e| e.domain.trim().to_ascii_lowercase())
        .collect();
    let bridge = SnapshotBridge::new(domains);

    for entry in entries {
        let descriptor = RequestDescriptor::new(&entry.domain, &entry.subject)?;
        bridge.push(&descriptor, entry.payload);
    }
    Ok(bridge)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use groupscape_resolution::PluginBridge;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_entries_are_served_by_normalized_key() {
        let raw = r#"[
            { "domain": "Collection-Log-Item", "subject": "itemId=12073,player=Foo",
              "payload": { "fields": { "unlocked": true }, "partial": true } },
            { "domain": "activities", "subject": "group42",
              "payload": { "items": [{ "id": "a1" }] } }
        ]"#;
        let bridge = parse_bridge(raw).unwrap();

        assert_eq!(bridge.len(), 2);
        assert!(bridge.supports("collection-log-item"));
        assert!(!bridge.supports("player-stats"));

        let lookup = RequestDescriptor::new("collection-log-item", "player=foo,itemid=12073").unwrap();
        let payload = bridge.fetch(&lookup).await.unwrap().unwrap();
        assert_eq!(payload.fields["unlocked"], json!(true));
        assert!(payload.partial);
    }

    #[test]
    fn test_blank_subject_is_rejected() {
        let raw = r#"[{ "domain": "activities", "subject": "  " }]"#;
        assert!(parse_bridge(raw).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{ "domain": "activities", "subject": "group42" }}]"#).unwrap();

        let bridge = load_bridge(file.path()).unwrap();
        assert_eq!(bridge.len(), 1);
    }
}
