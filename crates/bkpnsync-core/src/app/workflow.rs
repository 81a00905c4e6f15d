//! VolumeBackupWorkflow - 1 ボリュームのバックアップ手順
//!
//! # 状態遷移
//! ```text
//! Pending -> SourceChecked -> Prescripted -> Archived -> Checksummed -> Uploaded
//!         -> Verified -> RestoreTested -> RetentionApplied -> Postscripted -> Done
//! ```
//! どの段階からでも `Skipped(reason)` / `Failed(reason)` で抜ける。
//! `run` はエラーを返さない: 失敗はすべて `VolumeReport` に畳み込む。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{Instrument, error, info, info_span, warn};

use super::checksum::sha256_file;
use super::hooks::HookRunner;
use super::retention::RetentionPolicy;
use crate::domain::{
    ArtifactGuard, RestoreCheck, StateUpdate, Verification, Volume, VolumeOutcome, VolumeReport,
    WorkflowStage, archive_file_name,
};
use crate::ports::{Archiver, Clock, RemoteStore, StateStore};

/// Where artifacts are staged and uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowOptions {
    /// `{BKP_BASE_DIR}/{host}`; artifacts go to `{staging_dir}/{volume}/`.
    pub staging_dir: PathBuf,
    /// `{prefix}/{host}/{suffix}`; a volume's archives live in `{remote_root}/{volume}`.
    pub remote_root: String,
    pub restore_test: bool,
}

pub struct VolumeBackupWorkflow {
    archiver: Arc<dyn Archiver>,
    remote: Arc<dyn RemoteStore>,
    hooks: HookRunner,
    retention: RetentionPolicy,
    clock: Arc<dyn Clock>,
    store: Arc<dyn StateStore>,
    options: WorkflowOptions,
}

impl VolumeBackupWorkflow {
    pub fn new(
        archiver: Arc<dyn Archiver>,
        remote: Arc<dyn RemoteStore>,
        hooks: HookRunner,
        retention: RetentionPolicy,
        clock: Arc<dyn Clock>,
        store: Arc<dyn StateStore>,
        options: WorkflowOptions,
    ) -> Self {
        Self {
            archiver,
            remote,
            hooks,
            retention,
            clock,
            store,
            options,
        }
    }

    pub fn remote_dir(&self, volume: &str) -> String {
        format!("{}/{}", self.options.remote_root.trim_end_matches('/'), volume)
    }

    /// Back up one volume. Never fails; the outcome is in the report.
    pub async fn run(&self, volume: &Volume) -> VolumeReport {
        let span = info_span!("volume", volume = %volume.name());
        async {
            let started = Instant::now();
            let mut report = VolumeReport::new(volume.name());
            report.outcome = self.drive(volume, &mut report).await;
            if report.outcome == VolumeOutcome::Success {
                report.stage = WorkflowStage::Done;
            }
            report.duration = started.elapsed();

            match &report.outcome {
                VolumeOutcome::Success => info!(
                    size_bytes = report.size_bytes.unwrap_or(0),
                    duration_secs = report.duration.as_secs_f64(),
                    "volume backed up"
                ),
                VolumeOutcome::Skipped(reason) => warn!(%reason, "volume skipped"),
                VolumeOutcome::Failed(reason) => {
                    error!(%reason, stage = %report.stage, "volume backup failed")
                }
            }
            report
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, volume: &Volume, report: &mut VolumeReport) -> VolumeOutcome {
        // source
        let is_dir = tokio::fs::metadata(volume.source())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return VolumeOutcome::skipped(format!(
                "source directory {} does not exist",
                volume.source().display()
            ));
        }
        self.advance(volume, report, WorkflowStage::SourceChecked).await;

        // prescript
        if let Err(e) = self.hooks.run_if_present(&volume.prescript()).await {
            return VolumeOutcome::skipped(format!("prescript failed: {e}"));
        }
        self.advance(volume, report, WorkflowStage::Prescripted).await;

        // archive; the guard owns the path from here on
        let file_name = archive_file_name(
            volume.name(),
            self.clock.now().date_naive(),
            self.archiver.extension(),
        );
        let guard = ArtifactGuard::new(
            self.options
                .staging_dir
                .join(volume.name())
                .join(&file_name),
        );
        info!(path = %guard.path().display(), "creating archive");
        if let Err(e) = self.archiver.create(volume.source(), guard.path()).await {
            return VolumeOutcome::failed(format!("archive creation failed: {e}"));
        }
        let size_bytes = match tokio::fs::metadata(guard.path()).await {
            Ok(m) => m.len(),
            Err(e) => return VolumeOutcome::failed(format!("archive missing after creation: {e}")),
        };
        report.size_bytes = Some(size_bytes);
        self.advance(volume, report, WorkflowStage::Archived).await;

        // checksum (advisory)
        match sha256_file(guard.path()).await {
            Ok(digest) => report.checksum = Some(digest),
            Err(e) => warn!(path = %guard.path().display(), error = %e, "checksum unavailable"),
        }
        self.advance(volume, report, WorkflowStage::Checksummed).await;

        // upload
        let remote_dir = self.remote_dir(volume.name());
        let location = self.remote.describe(&remote_dir);
        info!(remote = %location, "uploading archive");
        if let Err(e) = self.remote.upload(guard.path(), &remote_dir).await {
            guard.remove().await;
            return VolumeOutcome::failed(format!("upload to {location} failed: {e}"));
        }
        self.advance(volume, report, WorkflowStage::Uploaded).await;

        // verify (advisory)
        report.verification = self.verify(&remote_dir, &file_name, size_bytes).await;
        self.advance(volume, report, WorkflowStage::Verified).await;

        // restore test (advisory)
        report.restore_check = if self.options.restore_test {
            self.restore_test(guard.path()).await
        } else {
            RestoreCheck::Disabled
        };
        self.advance(volume, report, WorkflowStage::RestoreTested).await;

        guard.remove().await;

        report.retention = Some(self.retention.apply(self.remote.as_ref(), &remote_dir).await);
        self.advance(volume, report, WorkflowStage::RetentionApplied).await;

        if let Err(e) = self.hooks.run_if_present(&volume.postscript()).await {
            warn!(error = %e, "volume postscript failed");
        }
        self.advance(volume, report, WorkflowStage::Postscripted).await;

        VolumeOutcome::Success
    }

    async fn verify(&self, remote_dir: &str, file_name: &str, local_bytes: u64) -> Verification {
        let verification = match self.remote.size_of(remote_dir, file_name).await {
            Ok(Some(remote_bytes)) if remote_bytes == local_bytes => Verification::Matched {
                size_bytes: local_bytes,
            },
            Ok(Some(remote_bytes)) => Verification::SizeMismatch {
                local_bytes,
                remote_bytes,
            },
            Ok(None) => Verification::MissingRemote,
            Err(e) => Verification::Unavailable {
                reason: e.to_string(),
            },
        };
        if verification.is_ok() {
            info!(file = %file_name, "remote copy verified");
        } else {
            warn!(file = %file_name, verification = ?verification, "remote copy could not be verified");
        }
        verification
    }

    async fn restore_test(&self, archive: &Path) -> RestoreCheck {
        let scratch = match tempfile::TempDir::new() {
            Ok(dir) => dir,
            Err(e) => return RestoreCheck::Failed(format!("cannot create scratch dir: {e}")),
        };
        if let Err(e) = self.archiver.extract(archive, scratch.path()).await {
            warn!(error = %e, "restore test failed");
            return RestoreCheck::Failed(e.to_string());
        }
        let restored_any = match tokio::fs::read_dir(scratch.path()).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
            Err(_) => false,
        };
        if restored_any {
            info!("restore test passed");
            RestoreCheck::Passed
        } else {
            warn!("restore test extracted nothing");
            RestoreCheck::Failed("archive extracted to an empty directory".to_string())
        }
    }

    async fn advance(&self, volume: &Volume, report: &mut VolumeReport, stage: WorkflowStage) {
        debug_assert_eq!(report.stage.next(), stage, "stages advance one at a time");
        report.stage = stage;
        let operation = format!("{}: {}", volume.name(), stage);
        if let Err(e) = self
            .store
            .apply(vec![StateUpdate::SetCurrentOperation(Some(operation))])
            .await
        {
            warn!(error = %e, "failed to record current operation");
        }
    }
}
