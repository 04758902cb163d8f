use crate::UniverseError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current on-disk format version. Incremented on incompatible layout changes.
pub const UNIVERSE_FORMAT_VERSION: u32 = 1;
const VERSION_FILE: &str = "version";

/// Directory layout of a local universe.
///
/// Snapshots are the only persistent state. Everything under `runtime/`
/// exists only while a session holds the universe open.
#[derive(Debug, Clone)]
pub struct UniverseLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct UniverseVersion {
    format_version: u32,
}

impl UniverseLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    #[inline]
    pub fn snapshot_file(&self, name: &str) -> PathBuf {
        self.snapshots_dir().join(format!("{name}.json"))
    }

    #[inline]
    pub fn runtime_dir(&self) -> PathBuf {
        self.root.join("runtime")
    }

    #[inline]
    pub fn kubeconfig(&self, cluster: &str) -> PathBuf {
        self.runtime_dir()
            .join("clusters")
            .join(cluster)
            .join("kubeconfig")
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".lock")
    }

    pub fn initialize(&self) -> Result<(), UniverseError> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(self.snapshots_dir())?;

        let version_path = self.root.join(VERSION_FILE);
        if version_path.exists() {
            return self.verify_version();
        }
        let ver = UniverseVersion {
            format_version: UNIVERSE_FORMAT_VERSION,
        };
        write_atomic(&self.root, &version_path, &serde_json::to_string_pretty(&ver)?)
    }

    pub fn verify_version(&self) -> Result<(), UniverseError> {
        let content = fs::read_to_string(self.root.join(VERSION_FILE))?;
        let ver: UniverseVersion = serde_json::from_str(&content)?;

        if ver.format_version != UNIVERSE_FORMAT_VERSION {
            return Err(UniverseError::VersionMismatch {
                expected: UNIVERSE_FORMAT_VERSION,
                found: ver.format_version,
            });
        }
        Ok(())
    }

    /// Names of all saved snapshots, sorted.
    pub fn snapshot_names(&self) -> Result<Vec<String>, UniverseError> {
        let dir = self.snapshots_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Fsync a directory so that a preceding `rename()` into it is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = fs::File::open(dir)?;
    f.sync_all()
}

/// Write `content` to `dest` via a synced temp file in `dir` and a rename.
pub(crate) fn write_atomic(dir: &Path, dest: &Path, content: &str) -> Result<(), UniverseError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| UniverseError::Io(e.error))?;
    fsync_dir(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_are_correct() {
        let layout = UniverseLayout::new("/tmp/vkube-test");
        assert_eq!(
            layout.snapshot_file("base"),
            PathBuf::from("/tmp/vkube-test/snapshots/base.json")
        );
        assert_eq!(
            layout.kubeconfig("c1"),
            PathBuf::from("/tmp/vkube-test/runtime/clusters/c1/kubeconfig")
        );
        assert_eq!(layout.lock_file(), PathBuf::from("/tmp/vkube-test/.lock"));
    }

    #[test]
    fn initialize_writes_version_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = UniverseLayout::new(dir.path().join("u"));
        layout.initialize().unwrap();
        layout.initialize().unwrap();
        layout.verify_version().unwrap();
        assert!(layout.snapshots_dir().is_dir());
    }

    #[test]
    fn version_mismatch_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let layout = UniverseLayout::new(dir.path());
        layout.initialize().unwrap();
        fs::write(dir.path().join(VERSION_FILE), r#"{"format_version": 99}"#).unwrap();
        assert!(matches!(
            layout.verify_version(),
            Err(UniverseError::VersionMismatch { found: 99, .. })
        ));
    }

    #[test]
    fn snapshot_names_are_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let layout = UniverseLayout::new(dir.path());
        layout.initialize().unwrap();
        fs::write(layout.snapshot_file("zeta"), "{}").unwrap();
        fs::write(layout.snapshot_file("alpha"), "{}").unwrap();
        fs::write(layout.snapshots_dir().join("notes.txt"), "x").unwrap();
        assert_eq!(layout.snapshot_names().unwrap(), vec!["alpha", "zeta"]);
    }
}
