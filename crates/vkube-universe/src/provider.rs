use crate::config::UniverseConfig;
use crate::UniverseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Guest port that `ssh` listens on inside every VM.
pub const SSH_PORT: u16 = 22;

/// Snapshot name used when a caller saves or opens with an empty name.
pub const DEFAULT_SNAPSHOT: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VmInfo {
    pub hostname: String,
    /// Guest port to host port.
    pub forwarded_ports: BTreeMap<u16, u16>,
}

impl VmInfo {
    pub fn forwarded_port(&self, guest: u16) -> Option<u16> {
        self.forwarded_ports.get(&guest).copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterInfo {
    pub name: String,
    pub kubeconfig: PathBuf,
}

/// Which path `open_or_create` took.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    Created,
    Opened,
}

/// A live universe handle.
///
/// After `save` or `close` has been called the handle is finished, even if
/// the call failed: `close` becomes a no-op and `save` is rejected with
/// [`UniverseError::Closed`].
pub trait Universe {
    fn dir(&self) -> &Path;

    /// Snapshot the universe was opened from; empty when freshly created.
    fn snapshot(&self) -> &str;

    fn vms(&self) -> Vec<VmInfo>;

    fn clusters(&self) -> Vec<ClusterInfo>;

    /// Persist the current state under `name` and shut the universe down.
    /// An empty name selects the provider's default snapshot. A failed save
    /// still shuts down but never discards the universe.
    fn save(&mut self, name: &str) -> Result<(), UniverseError>;

    /// Shut the universe down, discarding everything since it was opened.
    fn close(&mut self) -> Result<(), UniverseError>;

    fn is_closed(&self) -> bool;
}

pub trait UniverseProvider {
    type Universe: Universe;

    fn name(&self) -> &str;

    fn create(&self, dir: &Path, config: &UniverseConfig)
        -> Result<Self::Universe, UniverseError>;

    fn open(
        &self,
        dir: &Path,
        snapshot: &str,
        config: &UniverseConfig,
    ) -> Result<Self::Universe, UniverseError>;

    /// Create the universe if `dir` does not exist, otherwise open it.
    ///
    /// The existence check and the following create/open are not atomic
    /// with respect to other processes touching `dir`.
    fn open_or_create(
        &self,
        dir: &Path,
        snapshot: &str,
        config: &UniverseConfig,
    ) -> Result<(Self::Universe, OpenMode), UniverseError> {
        if dir.as_os_str().is_empty() {
            return Err(UniverseError::NoDirectory);
        }

        match std::fs::metadata(dir) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("creating universe at {}", dir.display());
                Ok((self.create(dir, config)?, OpenMode::Created))
            }
            Err(e) => Err(UniverseError::Io(e)),
            Ok(_) => {
                info!(
                    "opening universe at {} (snapshot '{snapshot}')",
                    dir.display()
                );
                Ok((self.open(dir, snapshot, config)?, OpenMode::Opened))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_port_lookup() {
        let vm = VmInfo {
            hostname: "vm1".to_owned(),
            forwarded_ports: BTreeMap::from([(22, 50000), (6443, 50001)]),
        };
        assert_eq!(vm.forwarded_port(SSH_PORT), Some(50000));
        assert_eq!(vm.forwarded_port(6443), Some(50001));
        assert_eq!(vm.forwarded_port(80), None);
    }

    #[test]
    fn open_mode_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&OpenMode::Created).unwrap(),
            "\"created\""
        );
    }
}
