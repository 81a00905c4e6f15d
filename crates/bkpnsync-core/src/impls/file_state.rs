//! JsonFileStateStore - JSON ファイルに ProcessState を永続化する
//!
//! # 実装詳細
//! - read-modify-write 全体を tokio::sync::Mutex で直列化（プロセス内）
//! - `<file>.tmp` に書いてから rename（同一ディレクトリ内なので atomic）
//! - ファイルが無い / 壊れている場合は `ProcessState::default()` として読む
//!
//! Across processes (scheduler and cycle subprocess) the last writer wins.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::{ProcessState, StateError, StateUpdate};
use crate::ports::StateStore;

pub struct JsonFileStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read(&self) -> Result<ProcessState, StateError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file yet");
                return Ok(ProcessState::default());
            }
            Err(source) => {
                return Err(StateError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable state file, starting from defaults");
                Ok(ProcessState::default())
            }
        }
    }

    async fn write(&self, state: &ProcessState) -> Result<(), StateError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(io_error(parent))?;
        }

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, &bytes).await.map_err(io_error(&tmp))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(io_error(&self.path))?;
        Ok(())
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StateError {
    let path = path.to_path_buf();
    move |source| StateError::Io { path, source }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn get(&self) -> Result<ProcessState, StateError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    async fn apply(&self, updates: Vec<StateUpdate>) -> Result<ProcessState, StateError> {
        let _guard = self.lock.lock().await;
        let mut state = self.read().await?;
        state.apply_all(updates);
        self.write(&state).await?;
        Ok(state)
    }
}
