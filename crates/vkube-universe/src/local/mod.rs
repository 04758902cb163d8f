//! File-backed universe provider.
//!
//! VMs and clusters are simulated: the provider allocates forwarded ports,
//! writes kubeconfigs, and traces the qemu/kubeadm commands it would run
//! to the configured command log. Snapshots are persisted as checksummed
//! JSON records under `<dir>/snapshots/`.

pub mod layout;
pub mod lock;
pub mod snapshot;

pub use layout::{UniverseLayout, UNIVERSE_FORMAT_VERSION};

use crate::config::UniverseConfig;
use crate::provider::{
    ClusterInfo, Universe, UniverseProvider, VmInfo, DEFAULT_SNAPSHOT, SSH_PORT,
};
use crate::{terminal, UniverseError};
use lock::UniverseLock;
use snapshot::{ClusterRecord, SnapshotRecord, SnapshotStore, UniverseState};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Guest port of the Kubernetes API server on a cluster controller.
pub const API_SERVER_PORT: u16 = 6443;

pub fn validate_name(kind: &str, name: &str) -> Result<(), UniverseError> {
    if name.is_empty() || name.len() > 64 {
        return Err(UniverseError::InvalidName(format!(
            "{kind} name must be 1-64 characters"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(UniverseError::InvalidName(format!(
            "{kind} name '{name}' must match [a-zA-Z0-9_-]"
        )));
    }
    Ok(())
}

fn effective_snapshot_name(name: &str) -> &str {
    if name.is_empty() {
        DEFAULT_SNAPSHOT
    } else {
        name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmSpec {
    pub hostname: String,
    /// Guest ports to forward in addition to ssh.
    pub ports: Vec<u16>,
}

impl VmSpec {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ports: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_port(mut self, guest: u16) -> Self {
        self.ports.push(guest);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub name: String,
    /// Worker nodes in addition to the controller.
    pub nodes: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProvider;

impl LocalProvider {
    pub fn new() -> Self {
        Self
    }

    /// Saved snapshot names of the universe at `dir`, without opening it.
    pub fn snapshots(dir: &Path) -> Result<Vec<String>, UniverseError> {
        fs::metadata(dir)?;
        UniverseLayout::new(dir).snapshot_names()
    }
}

impl UniverseProvider for LocalProvider {
    type Universe = LocalUniverse;

    fn name(&self) -> &str {
        "local"
    }

    fn create(&self, dir: &Path, config: &UniverseConfig) -> Result<LocalUniverse, UniverseError> {
        if dir.exists() {
            return Err(UniverseError::AlreadyExists(dir.display().to_string()));
        }
        let layout = UniverseLayout::new(dir);
        layout.initialize()?;
        let lock = UniverseLock::try_acquire(&layout.lock_file())?
            .ok_or_else(|| UniverseError::Locked(dir.display().to_string()))?;

        let now = chrono::Utc::now().to_rfc3339();
        LocalUniverse::start(
            layout,
            String::new(),
            UniverseState::default(),
            now,
            config.clone(),
            true,
            lock,
        )
    }

    fn open(
        &self,
        dir: &Path,
        snapshot: &str,
        config: &UniverseConfig,
    ) -> Result<LocalUniverse, UniverseError> {
        let layout = UniverseLayout::new(dir);
        layout.verify_version()?;
        let lock = UniverseLock::try_acquire(&layout.lock_file())?
            .ok_or_else(|| UniverseError::Locked(dir.display().to_string()))?;

        // We hold the lock, so a leftover runtime dir belongs to a dead session.
        let runtime = layout.runtime_dir();
        if runtime.exists() {
            debug!("removing stale runtime directory: {}", runtime.display());
            fs::remove_dir_all(&runtime)?;
        }

        let effective = effective_snapshot_name(snapshot);
        validate_name("snapshot", effective)?;
        let store = SnapshotStore::new(layout.clone());
        let (state, created_at) = if store.exists(effective) {
            let record = store.get(effective)?;
            (record.state, record.created_at)
        } else if snapshot.is_empty() && layout.snapshot_names()?.is_empty() {
            (UniverseState::default(), chrono::Utc::now().to_rfc3339())
        } else {
            return Err(UniverseError::SnapshotNotFound(effective.to_owned()));
        };

        LocalUniverse::start(
            layout,
            snapshot.to_owned(),
            state,
            created_at,
            config.clone(),
            false,
            lock,
        )
    }
}

/// An open local universe. Dropping an open handle closes it.
pub struct LocalUniverse {
    layout: UniverseLayout,
    snapshots: SnapshotStore,
    config: UniverseConfig,
    snapshot: String,
    state: UniverseState,
    created_at: String,
    /// Created by this session and never saved: closing removes it entirely.
    fresh: bool,
    lock: Option<UniverseLock>,
}

impl LocalUniverse {
    fn start(
        layout: UniverseLayout,
        snapshot: String,
        state: UniverseState,
        created_at: String,
        config: UniverseConfig,
        fresh: bool,
        lock: UniverseLock,
    ) -> Result<Self, UniverseError> {
        fs::create_dir_all(layout.runtime_dir())?;
        let universe = Self {
            snapshots: SnapshotStore::new(layout.clone()),
            layout,
            config,
            snapshot,
            state,
            created_at,
            fresh,
            lock: Some(lock),
        };

        let resume = effective_snapshot_name(&universe.snapshot).to_owned();
        for vm in &universe.state.vms {
            universe
                .config
                .log_command(&universe.qemu_command(vm, Some(&resume)));
        }
        for cluster in &universe.state.clusters {
            universe.write_kubeconfig(cluster)?;
        }

        if universe.config.interactive {
            terminal::print_universe_banner(
                universe.layout.root(),
                &universe.snapshot,
                universe.state.vms.len(),
            );
        }
        Ok(universe)
    }

    fn ensure_open(&self) -> Result<(), UniverseError> {
        if self.lock.is_none() {
            return Err(UniverseError::Closed);
        }
        Ok(())
    }

    fn qemu_command(&self, vm: &VmInfo, resume: Option<&str>) -> String {
        let accel = if self.config.acceleration { "kvm" } else { "tcg" };
        let display = if self.config.vm_graphics { "gtk" } else { "none" };
        let forwards = vm
            .forwarded_ports
            .iter()
            .map(|(guest, host)| format!("hostfwd=tcp::{host}-:{guest}"))
            .collect::<Vec<_>>()
            .join(",");
        let disk = self
            .layout
            .runtime_dir()
            .join(format!("{}.qcow2", vm.hostname));
        let mut cmd = format!(
            "qemu-system-x86_64 -name {} -accel {accel} -display {display} -nic user,{forwards} -drive file={},if=virtio",
            vm.hostname,
            disk.display()
        );
        if let Some(snapshot) = resume {
            cmd.push_str(" -loadvm ");
            cmd.push_str(snapshot);
        }
        cmd
    }

    fn write_kubeconfig(&self, cluster: &ClusterRecord) -> Result<PathBuf, UniverseError> {
        let api_port = self
            .state
            .vms
            .iter()
            .find(|vm| vm.hostname == cluster.controller)
            .and_then(|vm| vm.forwarded_port(API_SERVER_PORT))
            .ok_or_else(|| {
                UniverseError::Backend(format!(
                    "controller '{}' of cluster '{}' has no API server forward",
                    cluster.controller, cluster.name
                ))
            })?;

        let path = self.layout.kubeconfig(&cluster.name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let name = &cluster.name;
        fs::write(
            &path,
            format!(
                "apiVersion: v1\n\
                 kind: Config\n\
                 clusters:\n\
                 - cluster:\n    insecure-skip-tls-verify: true\n    server: https://127.0.0.1:{api_port}\n  name: {name}\n\
                 contexts:\n\
                 - context:\n    cluster: {name}\n    user: admin\n  name: {name}\n\
                 current-context: {name}\n\
                 users:\n\
                 - name: admin\n  user: {{}}\n"
            ),
        )?;
        Ok(path)
    }

    /// Boot a new VM with ssh plus the requested guest ports forwarded.
    pub fn new_vm(&mut self, spec: &VmSpec) -> Result<VmInfo, UniverseError> {
        self.ensure_open()?;
        validate_name("hostname", &spec.hostname)?;
        if self.state.vms.iter().any(|vm| vm.hostname == spec.hostname) {
            return Err(UniverseError::AlreadyExists(format!(
                "vm '{}'",
                spec.hostname
            )));
        }

        let guest_ports: BTreeSet<u16> = spec
            .ports
            .iter()
            .copied()
            .chain(std::iter::once(SSH_PORT))
            .collect();
        let mut next = self.state.next_port;
        let mut forwarded_ports = BTreeMap::new();
        for guest in guest_ports {
            let host = u16::try_from(next).map_err(|_| UniverseError::PortsExhausted)?;
            forwarded_ports.insert(guest, host);
            next += 1;
        }

        let vm = VmInfo {
            hostname: spec.hostname.clone(),
            forwarded_ports,
        };
        let disk = self
            .layout
            .runtime_dir()
            .join(format!("{}.qcow2", vm.hostname));
        self.config.log_command(&format!(
            "qemu-img create -f qcow2 -b base.qcow2 -F qcow2 {}",
            disk.display()
        ));
        self.config.log_command(&self.qemu_command(&vm, None));

        self.state.next_port = next;
        self.state.vms.push(vm.clone());
        info!("started vm {}", vm.hostname);
        Ok(vm)
    }

    /// Boot a controller plus `nodes` workers and join them into a cluster.
    ///
    /// On failure the universe is left exactly as it was before the call.
    pub fn new_cluster(&mut self, spec: &ClusterSpec) -> Result<ClusterInfo, UniverseError> {
        self.ensure_open()?;
        validate_name("cluster", &spec.name)?;
        if self.state.clusters.iter().any(|c| c.name == spec.name) {
            return Err(UniverseError::AlreadyExists(format!(
                "cluster '{}'",
                spec.name
            )));
        }

        let before = self.state.clone();
        match self.boot_cluster(spec) {
            Ok(info) => Ok(info),
            Err(e) => {
                self.state = before;
                Err(e)
            }
        }
    }

    fn boot_cluster(&mut self, spec: &ClusterSpec) -> Result<ClusterInfo, UniverseError> {
        let controller =
            self.new_vm(&VmSpec::new(format!("{}-controller", spec.name)).with_port(API_SERVER_PORT))?;
        let ssh = controller.forwarded_port(SSH_PORT).unwrap_or(SSH_PORT);
        self.config.log_command(&format!(
            "ssh -p{ssh} root@localhost kubeadm init --pod-network-cidr=10.244.0.0/16"
        ));

        let mut nodes = Vec::with_capacity(spec.nodes);
        for i in 1..=spec.nodes {
            let node = self.new_vm(&VmSpec::new(format!("{}-node{i}", spec.name)))?;
            let node_ssh = node.forwarded_port(SSH_PORT).unwrap_or(SSH_PORT);
            self.config.log_command(&format!(
                "ssh -p{node_ssh} root@localhost kubeadm join {}:{API_SERVER_PORT}",
                controller.hostname
            ));
            nodes.push(node.hostname);
        }

        let record = ClusterRecord {
            name: spec.name.clone(),
            controller: controller.hostname,
            nodes,
        };
        let kubeconfig = self.write_kubeconfig(&record)?;
        self.state.clusters.push(record);
        info!("cluster {} is up", spec.name);
        Ok(ClusterInfo {
            name: spec.name.clone(),
            kubeconfig,
        })
    }

    fn write_snapshot(&self, name: &str) -> Result<String, UniverseError> {
        let effective = effective_snapshot_name(name).to_owned();
        validate_name("snapshot", &effective)?;

        for vm in &self.state.vms {
            self.config
                .log_command(&format!("qemu-monitor {} savevm {effective}", vm.hostname));
        }
        let record = SnapshotRecord {
            name: effective.clone(),
            state: self.state.clone(),
            created_at: self.created_at.clone(),
            saved_at: chrono::Utc::now().to_rfc3339(),
            checksum: None,
        };
        self.snapshots.put(&record)?;
        info!(
            "saved universe {} as snapshot '{effective}'",
            self.layout.root().display()
        );
        Ok(effective)
    }

    /// Release the lock and remove runtime state. The handle is closed
    /// afterwards even if cleanup fails.
    fn shutdown(&mut self) -> Result<(), UniverseError> {
        let Some(lock) = self.lock.take() else {
            return Ok(());
        };
        let runtime = self.layout.runtime_dir();
        let result = if runtime.exists() {
            fs::remove_dir_all(&runtime).map_err(UniverseError::from)
        } else {
            Ok(())
        };
        drop(lock);
        result
    }
}

impl Universe for LocalUniverse {
    fn dir(&self) -> &Path {
        self.layout.root()
    }

    fn snapshot(&self) -> &str {
        &self.snapshot
    }

    fn vms(&self) -> Vec<VmInfo> {
        self.state.vms.clone()
    }

    fn clusters(&self) -> Vec<ClusterInfo> {
        self.state
            .clusters
            .iter()
            .map(|c| ClusterInfo {
                name: c.name.clone(),
                kubeconfig: self.layout.kubeconfig(&c.name),
            })
            .collect()
    }

    fn save(&mut self, name: &str) -> Result<(), UniverseError> {
        self.ensure_open()?;
        // A save attempt is final. The handle is shut down and the
        // directory kept even when the snapshot write fails.
        let written = self.write_snapshot(name);
        self.fresh = false;
        let shutdown = self.shutdown();
        let effective = written?;
        shutdown?;
        if self.config.interactive {
            terminal::print_universe_exit(self.layout.root(), Some(&effective));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), UniverseError> {
        if self.lock.is_none() {
            return Ok(());
        }
        for vm in &self.state.vms {
            self.config
                .log_command(&format!("qemu-monitor {} quit", vm.hostname));
        }
        self.shutdown()?;

        if self.fresh {
            debug!(
                "removing never-saved universe {}",
                self.layout.root().display()
            );
            fs::remove_dir_all(self.layout.root())?;
        }
        info!("closed universe {}", self.layout.root().display());
        if self.config.interactive {
            terminal::print_universe_exit(self.layout.root(), None);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.lock.is_none()
    }
}

impl Drop for LocalUniverse {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(
                "closing universe {} on drop failed: {e}",
                self.layout.root().display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_name_accepts_simple_names() {
        assert!(validate_name("snapshot", "base").is_ok());
        assert!(validate_name("snapshot", "after-install_2").is_ok());
    }

    #[test]
    fn validate_name_rejects_bad_names() {
        assert!(validate_name("snapshot", "").is_err());
        assert!(validate_name("snapshot", "../escape").is_err());
        assert!(validate_name("snapshot", "has space").is_err());
        assert!(validate_name("snapshot", &"a".repeat(65)).is_err());
    }

    #[test]
    fn empty_snapshot_name_maps_to_default() {
        assert_eq!(effective_snapshot_name(""), DEFAULT_SNAPSHOT);
        assert_eq!(effective_snapshot_name("base"), "base");
    }

    #[test]
    fn vm_spec_builder_collects_ports() {
        let spec = VmSpec::new("vm1").with_port(80).with_port(443);
        assert_eq!(spec.ports, vec![80, 443]);
    }
}
