//! テスト用の fake 実装（Archiver / RemoteStore / CycleRunner）

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ArchiveError, RemoteError};
use crate::exec::ExecutionError;
use crate::ports::{Archiver, CycleRunError, CycleRunner, RemoteStore};

pub(crate) fn exec_failure(command: &str) -> ExecutionError {
    ExecutionError::Failed {
        command: command.to_string(),
        attempts: 1,
        code: Some(1),
        stderr: "fake failure".to_string(),
    }
}

/// Writes a small file instead of a real archive.
#[derive(Default)]
pub(crate) struct FakeArchiver {
    fail_create: Mutex<HashSet<String>>,
    fail_extract: Mutex<bool>,
    created: Mutex<Vec<PathBuf>>,
}

impl FakeArchiver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Archiving sources whose directory name is `volume` writes a partial file, then fails.
    pub(crate) fn fail_create_for(&self, volume: &str) {
        self.fail_create.lock().unwrap().insert(volume.to_string());
    }

    pub(crate) fn fail_extract(&self) {
        *self.fail_extract.lock().unwrap() = true;
    }

    pub(crate) fn created(&self) -> Vec<PathBuf> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl Archiver for FakeArchiver {
    fn extension(&self) -> &str {
        "tar.gz"
    }

    async fn create(&self, source: &Path, destination: &Path) -> Result<(), ArchiveError> {
        let volume = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
        self.created.lock().unwrap().push(destination.to_path_buf());

        if self.fail_create.lock().unwrap().contains(&volume) {
            std::fs::write(destination, b"partial").unwrap();
            return Err(ArchiveError::Command(exec_failure("tar")));
        }
        std::fs::write(destination, format!("archive of {volume}")).unwrap();
        Ok(())
    }

    async fn extract(&self, _archive: &Path, into: &Path) -> Result<(), ArchiveError> {
        if *self.fail_extract.lock().unwrap() {
            return Err(ArchiveError::Command(exec_failure("tar -x")));
        }
        std::fs::write(into.join("restored"), b"ok").unwrap();
        Ok(())
    }
}

/// Remote directories kept in memory: dir -> (file -> size).
#[derive(Default)]
pub(crate) struct FakeRemote {
    files: Mutex<BTreeMap<String, BTreeMap<String, u64>>>,
    fail_upload: Mutex<HashSet<String>>,
    fail_delete: Mutex<HashSet<String>>,
    fail_listing: Mutex<bool>,
    size_skew: Mutex<u64>,
    uploads: AtomicUsize,
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn put(&self, dir: &str, file: &str, size: u64) {
        self.files
            .lock()
            .unwrap()
            .entry(dir.to_string())
            .or_default()
            .insert(file.to_string(), size);
    }

    pub(crate) fn files(&self, dir: &str) -> Vec<String> {
        self.files
            .lock()
            .unwrap()
            .get(dir)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Uploads into a dir ending with `/{volume}` fail.
    pub(crate) fn fail_upload_for(&self, volume: &str) {
        self.fail_upload.lock().unwrap().insert(volume.to_string());
    }

    pub(crate) fn fail_delete_of(&self, file: &str) {
        self.fail_delete.lock().unwrap().insert(file.to_string());
    }

    pub(crate) fn fail_listing(&self) {
        *self.fail_listing.lock().unwrap() = true;
    }

    /// Stored sizes are off by `bytes`.
    pub(crate) fn skew_sizes(&self, bytes: u64) {
        *self.size_skew.lock().unwrap() = bytes;
    }

    pub(crate) fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    fn describe(&self, remote_dir: &str) -> String {
        format!("fake:{remote_dir}")
    }

    async fn upload(&self, local: &Path, remote_dir: &str) -> Result<(), RemoteError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let failing = self.fail_upload.lock().unwrap().clone();
        if failing
            .iter()
            .any(|v| remote_dir.rsplit('/').next() == Some(v.as_str()))
        {
            return Err(RemoteError::Command(exec_failure("rclone copy")));
        }
        let size = std::fs::metadata(local).unwrap().len() + *self.size_skew.lock().unwrap();
        let name = local.file_name().unwrap().to_string_lossy().into_owned();
        self.put(remote_dir, &name, size);
        Ok(())
    }

    async fn list(&self, remote_dir: &str) -> Result<Vec<String>, RemoteError> {
        if *self.fail_listing.lock().unwrap() {
            return Err(RemoteError::Command(exec_failure("rclone lsf")));
        }
        Ok(self.files(remote_dir))
    }

    async fn size_of(&self, remote_dir: &str, file_name: &str) -> Result<Option<u64>, RemoteError> {
        if *self.fail_listing.lock().unwrap() {
            return Err(RemoteError::Command(exec_failure("rclone lsjson")));
        }
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(remote_dir)
            .and_then(|m| m.get(file_name).copied()))
    }

    async fn delete(&self, remote_dir: &str, file_name: &str) -> Result<(), RemoteError> {
        if self.fail_delete.lock().unwrap().contains(file_name) {
            return Err(RemoteError::Command(exec_failure("rclone deletefile")));
        }
        if let Some(m) = self.files.lock().unwrap().get_mut(remote_dir) {
            m.remove(file_name);
        }
        Ok(())
    }
}

/// Counts cycles; optionally slow or failing.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    calls: AtomicUsize,
    delay: Duration,
    fail: bool,
}

impl ScriptedRunner {
    pub(crate) fn ok() -> Self {
        Self::default()
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CycleRunner for ScriptedRunner {
    async fn run_cycle(&self) -> Result<(), CycleRunError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            Err(CycleRunError::new("exit status 1"))
        } else {
            Ok(())
        }
    }
}
