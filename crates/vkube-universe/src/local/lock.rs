use crate::UniverseError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Exclusive advisory lock held for as long as a universe is open.
pub struct UniverseLock {
    lock_file: File,
}

impl UniverseLock {
    /// Returns `Ok(None)` when another handle already holds the lock.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, UniverseError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for UniverseLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");

        let _held = UniverseLock::try_acquire(&path).unwrap().unwrap();
        assert!(UniverseLock::try_acquire(&path).unwrap().is_none());
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");

        {
            let _held = UniverseLock::try_acquire(&path).unwrap().unwrap();
        }
        assert!(UniverseLock::try_acquire(&path).unwrap().is_some());
    }
}
