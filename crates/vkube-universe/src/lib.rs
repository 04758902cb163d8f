//! Universe providers for vkube.
//!
//! A universe is a directory holding a set of virtual machines and
//! Kubernetes clusters that share one lifecycle. This crate defines the
//! provider contract (`UniverseProvider` and `Universe`), the immutable
//! `UniverseConfig` handed to providers, a file-backed `LocalProvider`
//! that persists named snapshots, and an in-memory `MockProvider` that
//! records every lifecycle call for tests.

pub mod config;
pub mod local;
pub mod mock;
pub mod provider;
pub mod terminal;

pub use config::{CommandLog, SharedBuffer, UniverseConfig};
pub use local::{validate_name, ClusterSpec, LocalProvider, LocalUniverse, VmSpec};
pub use mock::{MockCall, MockProvider, MockUniverse};
pub use provider::{
    ClusterInfo, OpenMode, Universe, UniverseProvider, VmInfo, DEFAULT_SNAPSHOT, SSH_PORT,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("universe directory not specified")]
    NoDirectory,
    #[error("universe I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("universe {0} is in use by another session")]
    Locked(String),
    #[error("universe is closed")]
    Closed,
    #[error("no free host ports left to forward")]
    PortsExhausted,
    #[error("integrity check failed for snapshot '{name}': expected {expected}, got {actual}")]
    IntegrityFailure {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("universe format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("provider failure: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_closed() {
        assert_eq!(UniverseError::Closed.to_string(), "universe is closed");
    }

    #[test]
    fn io_error_keeps_kind() {
        let e = UniverseError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        match e {
            UniverseError::Io(inner) => {
                assert_eq!(inner.kind(), std::io::ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
