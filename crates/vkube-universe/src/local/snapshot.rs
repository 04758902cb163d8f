use super::layout::{write_atomic, UniverseLayout};
use crate::provider::VmInfo;
use crate::UniverseError;
use serde::{Deserialize, Serialize};
use std::fs;

/// First host port handed out for guest port forwards.
pub const FIRST_HOST_PORT: u16 = 50000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterRecord {
    pub name: String,
    pub controller: String,
    pub nodes: Vec<String>,
}

/// Everything a universe needs to be resumed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UniverseState {
    pub vms: Vec<VmInfo>,
    pub clusters: Vec<ClusterRecord>,
    pub next_port: u32,
}

impl Default for UniverseState {
    fn default() -> Self {
        Self {
            vms: Vec::new(),
            clusters: Vec::new(),
            next_port: u32::from(FIRST_HOST_PORT),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub name: String,
    pub state: UniverseState,
    pub created_at: String,
    pub saved_at: String,
    /// blake3 checksum over the record with this field unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl SnapshotRecord {
    fn compute_checksum(&self) -> Result<String, UniverseError> {
        let mut copy = self.clone();
        copy.checksum = None;
        let json = serde_json::to_string_pretty(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

pub struct SnapshotStore {
    layout: UniverseLayout,
}

impl SnapshotStore {
    pub fn new(layout: UniverseLayout) -> Self {
        Self { layout }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.layout.snapshot_file(name).exists()
    }

    pub fn put(&self, record: &SnapshotRecord) -> Result<(), UniverseError> {
        let mut with_checksum = record.clone();
        with_checksum.checksum = Some(record.compute_checksum()?);
        let content = serde_json::to_string_pretty(&with_checksum)?;

        let dir = self.layout.snapshots_dir();
        fs::create_dir_all(&dir)?;
        write_atomic(&dir, &self.layout.snapshot_file(&record.name), &content)
    }

    pub fn get(&self, name: &str) -> Result<SnapshotRecord, UniverseError> {
        let path = self.layout.snapshot_file(name);
        if !path.exists() {
            return Err(UniverseError::SnapshotNotFound(name.to_owned()));
        }
        let content = fs::read_to_string(&path)?;
        let record: SnapshotRecord = serde_json::from_str(&content)?;

        if let Some(ref expected) = record.checksum {
            let actual = record.compute_checksum()?;
            if actual != *expected {
                return Err(UniverseError::IntegrityFailure {
                    name: name.to_owned(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample(name: &str) -> SnapshotRecord {
        SnapshotRecord {
            name: name.to_owned(),
            state: UniverseState {
                vms: vec![VmInfo {
                    hostname: "vm1".to_owned(),
                    forwarded_ports: BTreeMap::from([(22, 50000)]),
                }],
                clusters: Vec::new(),
                next_port: 50001,
            },
            created_at: "2026-01-01T00:00:00+00:00".to_owned(),
            saved_at: "2026-01-01T00:00:05+00:00".to_owned(),
            checksum: None,
        }
    }

    fn store() -> (tempfile::TempDir, SnapshotStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = UniverseLayout::new(dir.path());
        layout.initialize().unwrap();
        (dir, SnapshotStore::new(layout))
    }

    #[test]
    fn put_then_get_verifies_checksum() {
        let (_dir, store) = store();
        store.put(&sample("base")).unwrap();
        let loaded = store.get("base").unwrap();
        assert!(loaded.checksum.is_some());
        assert_eq!(loaded.state, sample("base").state);
    }

    #[test]
    fn missing_snapshot_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.get("nope"),
            Err(UniverseError::SnapshotNotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn tampered_snapshot_fails_integrity() {
        let (dir, store) = store();
        store.put(&sample("base")).unwrap();
        let path = UniverseLayout::new(dir.path()).snapshot_file("base");
        let tampered = fs::read_to_string(&path)
            .unwrap()
            .replace("50000", "50999");
        fs::write(&path, tampered).unwrap();
        assert!(matches!(
            store.get("base"),
            Err(UniverseError::IntegrityFailure { .. })
        ));
    }

    #[test]
    fn overwrite_replaces_previous_record() {
        let (_dir, store) = store();
        store.put(&sample("base")).unwrap();
        let mut newer = sample("base");
        newer.state.next_port = 50010;
        store.put(&newer).unwrap();
        assert_eq!(store.get("base").unwrap().state.next_port, 50010);
    }
}
