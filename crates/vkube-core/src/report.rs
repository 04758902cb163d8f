use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use vkube_universe::{Universe, SSH_PORT};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ClusterEndpoint {
    pub name: String,
    pub kubeconfig: PathBuf,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VmEndpoint {
    pub hostname: String,
    pub ssh_port: Option<u16>,
}

/// How to reach everything running in a universe.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ResourceReport {
    pub clusters: Vec<ClusterEndpoint>,
    pub vms: Vec<VmEndpoint>,
}

impl ResourceReport {
    pub fn collect<U: Universe + ?Sized>(universe: &U) -> Self {
        let clusters = universe
            .clusters()
            .into_iter()
            .map(|c| ClusterEndpoint {
                name: c.name,
                kubeconfig: c.kubeconfig,
            })
            .collect();
        let vms = universe
            .vms()
            .into_iter()
            .map(|vm| VmEndpoint {
                ssh_port: vm.forwarded_port(SSH_PORT),
                hostname: vm.hostname,
            })
            .collect();
        Self { clusters, vms }
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty() && self.vms.is_empty()
    }
}

impl fmt::Display for ResourceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Resources available:")?;
        writeln!(f)?;
        if self.is_empty() {
            return writeln!(f, "  (none)");
        }
        for c in &self.clusters {
            writeln!(
                f,
                "  Cluster {:?}: export KUBECONFIG={:?}",
                c.name,
                c.kubeconfig.display().to_string()
            )?;
        }
        for vm in &self.vms {
            match vm.ssh_port {
                Some(port) => writeln!(f, "  VM {:?}: ssh -p{port} root@localhost", vm.hostname)?,
                None => writeln!(f, "  VM {:?}: no ssh forward", vm.hostname)?,
            }
        }
        Ok(())
    }
}
