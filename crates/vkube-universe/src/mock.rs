use crate::config::UniverseConfig;
use crate::provider::{ClusterInfo, Universe, UniverseProvider, VmInfo};
use crate::UniverseError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One lifecycle call observed by a [`MockProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Create { dir: PathBuf },
    Open { dir: PathBuf, snapshot: String },
    Save { name: String },
    Close,
}

#[derive(Debug, Default)]
struct Failures {
    open: Option<String>,
    save: Option<String>,
    close: Option<String>,
}

/// In-memory provider that journals every call and can be told to fail.
///
/// Existence of the universe directory is still decided by the real
/// filesystem check in `open_or_create`; nothing is written to disk.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    journal: Arc<Mutex<Vec<MockCall>>>,
    failures: Arc<Mutex<Failures>>,
    vms: Vec<VmInfo>,
    clusters: Vec<ClusterInfo>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_vm(mut self, vm: VmInfo) -> Self {
        self.vms.push(vm);
        self
    }

    #[must_use]
    pub fn with_cluster(mut self, cluster: ClusterInfo) -> Self {
        self.clusters.push(cluster);
        self
    }

    pub fn fail_open(&self, msg: &str) {
        self.set_failure(|f| f.open = Some(msg.to_owned()));
    }

    pub fn fail_save(&self, msg: &str) {
        self.set_failure(|f| f.save = Some(msg.to_owned()));
    }

    pub fn fail_close(&self, msg: &str) {
        self.set_failure(|f| f.close = Some(msg.to_owned()));
    }

    fn set_failure(&self, apply: impl FnOnce(&mut Failures)) {
        if let Ok(mut failures) = self.failures.lock() {
            apply(&mut failures);
        }
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.journal
            .lock()
            .map(|journal| journal.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, matches: impl Fn(&MockCall) -> bool) -> usize {
        self.calls().iter().filter(|c| matches(c)).count()
    }

    fn record(&self, call: MockCall) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(call);
        }
    }

    fn failure(&self, pick: impl FnOnce(&Failures) -> Option<String>) -> Option<String> {
        self.failures.lock().ok().and_then(|f| pick(&f))
    }

    fn universe(&self, dir: &Path, snapshot: &str) -> MockUniverse {
        MockUniverse {
            provider: self.clone(),
            dir: dir.to_path_buf(),
            snapshot: snapshot.to_owned(),
            closed: false,
        }
    }
}

impl UniverseProvider for MockProvider {
    type Universe = MockUniverse;

    fn name(&self) -> &str {
        "mock"
    }

    fn create(&self, dir: &Path, _config: &UniverseConfig) -> Result<MockUniverse, UniverseError> {
        self.record(MockCall::Create {
            dir: dir.to_path_buf(),
        });
        if let Some(msg) = self.failure(|f| f.open.clone()) {
            return Err(UniverseError::Backend(msg));
        }
        Ok(self.universe(dir, ""))
    }

    fn open(
        &self,
        dir: &Path,
        snapshot: &str,
        _config: &UniverseConfig,
    ) -> Result<MockUniverse, UniverseError> {
        self.record(MockCall::Open {
            dir: dir.to_path_buf(),
            snapshot: snapshot.to_owned(),
        });
        if let Some(msg) = self.failure(|f| f.open.clone()) {
            return Err(UniverseError::Backend(msg));
        }
        Ok(self.universe(dir, snapshot))
    }
}

pub struct MockUniverse {
    provider: MockProvider,
    dir: PathBuf,
    snapshot: String,
    closed: bool,
}

impl Universe for MockUniverse {
    fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot(&self) -> &str {
        &self.snapshot
    }

    fn vms(&self) -> Vec<VmInfo> {
        self.provider.vms.clone()
    }

    fn clusters(&self) -> Vec<ClusterInfo> {
        self.provider.clusters.clone()
    }

    fn save(&mut self, name: &str) -> Result<(), UniverseError> {
        if self.closed {
            return Err(UniverseError::Closed);
        }
        self.provider.record(MockCall::Save {
            name: name.to_owned(),
        });
        self.closed = true;
        if let Some(msg) = self.provider.failure(|f| f.save.clone()) {
            return Err(UniverseError::Backend(msg));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), UniverseError> {
        if self.closed {
            return Ok(());
        }
        self.provider.record(MockCall::Close);
        self.closed = true;
        if let Some(msg) = self.provider.failure(|f| f.close.clone()) {
            return Err(UniverseError::Backend(msg));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
