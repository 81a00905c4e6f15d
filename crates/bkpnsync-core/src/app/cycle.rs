//! BackupCycle - ボリュームリストを 1 周する
//!
//! # 流れ
//! 1. status=running, 前回の per-volume 結果をクリア
//! 2. グローバル prescript（失敗しても警告のみ）
//! 3. ボリュームを順番に処理し、1 件ごとに StateStore へ反映
//! 4. サイクル終了レポート → グローバル postscript
//! 5. 最終 state 書き込み（カウンタ、所要時間、status=idle）

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{Instrument, error, info, info_span, warn};

use super::hooks::HookRunner;
use super::workflow::VolumeBackupWorkflow;
use crate::domain::{
    CycleSummary, ProcessStatus, StateUpdate, Volume, VolumeOutcome, VolumeReport, VolumeState,
    parse_volume_list,
};
use crate::ports::{Clock, CycleRunError, CycleRunner, IdGenerator, StateStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOptions {
    pub volume_list: PathBuf,
    pub source_base: PathBuf,
    pub global_prescript: PathBuf,
    pub global_postscript: PathBuf,
    /// Only run the global postscript; every volume is reported as skipped.
    pub sync_only: bool,
}

/// Failures outside the per-volume boundary.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("cannot read volume list {path}: {source}")]
    VolumeList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct BackupCycle {
    workflow: Arc<VolumeBackupWorkflow>,
    hooks: HookRunner,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    options: CycleOptions,
}

impl BackupCycle {
    pub fn new(
        workflow: Arc<VolumeBackupWorkflow>,
        hooks: HookRunner,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        options: CycleOptions,
    ) -> Self {
        Self {
            workflow,
            hooks,
            store,
            clock,
            ids,
            options,
        }
    }

    /// Run one full cycle in this process.
    pub async fn run(&self) -> Result<CycleSummary, CycleError> {
        let cycle_id = self.ids.generate_cycle_id();
        let span = info_span!("cycle", cycle_id = %cycle_id);
        async {
            let started = Instant::now();
            let mut summary = CycleSummary::new(cycle_id, self.clock.now_utc());
            info!(sync_only = self.options.sync_only, "backup cycle started");

            self.persist(vec![
                StateUpdate::SetStatus(ProcessStatus::Running),
                StateUpdate::SetCurrentOperation(Some("starting backup cycle".to_string())),
                StateUpdate::ClearVolumes,
                StateUpdate::SetCycleCounts {
                    succeeded: 0,
                    failed: 0,
                    skipped: 0,
                },
            ])
            .await;

            if !self.options.sync_only
                && let Err(e) = self.hooks.run_if_present(&self.options.global_prescript).await
            {
                warn!(error = %e, "global prescript failed, continuing");
            }

            let names = match self.read_volume_list().await {
                Ok(names) => names,
                Err(e) => {
                    error!(error = %e, "aborting backup cycle");
                    self.persist(vec![
                        StateUpdate::SetLastError(Some(e.to_string())),
                        StateUpdate::SetCurrentOperation(None),
                        StateUpdate::SetStatus(ProcessStatus::Error),
                    ])
                    .await;
                    return Err(e);
                }
            };
            if names.is_empty() {
                warn!(path = %self.options.volume_list.display(), "no volumes to back up");
            }

            for name in names {
                let volume = Volume::new(name, &self.options.source_base);
                let report = if self.options.sync_only {
                    let mut report = VolumeReport::new(volume.name());
                    report.outcome = VolumeOutcome::skipped("sync-only mode");
                    report
                } else {
                    self.run_volume(volume).await
                };

                let state = VolumeState::from_report(&report, self.clock.now_utc());
                let name = report.volume.clone();
                summary.record(report);
                self.persist(vec![
                    StateUpdate::RecordVolume { name, state },
                    counts(&summary),
                ])
                .await;
            }

            summary.finish(started.elapsed());
            log_report(&summary);

            if let Err(e) = self.hooks.run_if_present(&self.options.global_postscript).await {
                warn!(error = %e, "global postscript failed");
            }

            let mut updates = vec![
                StateUpdate::IncrementTotalCycles,
                StateUpdate::IncrementTotalFailures(summary.failed() as u64),
                counts(&summary),
                StateUpdate::SetLastDuration(summary.duration.as_secs_f64()),
                StateUpdate::SetLastTotalSize(summary.total_bytes()),
                StateUpdate::SetLastError(summary.last_failure()),
            ];
            if summary.failed() == 0 {
                updates.push(StateUpdate::SetLastSuccess(self.clock.now_utc()));
            }
            updates.push(StateUpdate::SetCurrentOperation(None));
            updates.push(StateUpdate::SetStatus(ProcessStatus::Idle));
            self.persist(updates).await;

            Ok(summary)
        }
        .instrument(span)
        .await
    }

    async fn read_volume_list(&self) -> Result<Vec<String>, CycleError> {
        let path = &self.options.volume_list;
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(parse_volume_list(&contents)),
            // sync-only never touches volumes, a missing list is fine
            Err(e) if self.options.sync_only && e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Vec::new())
            }
            Err(source) => Err(CycleError::VolumeList {
                path: path.clone(),
                source,
            }),
        }
    }

    /// Runs the workflow on its own task so that a panic stays inside the volume.
    async fn run_volume(&self, volume: Volume) -> VolumeReport {
        let workflow = self.workflow.clone();
        let name = volume.name().to_string();
        match tokio::spawn(async move { workflow.run(&volume).await }).await {
            Ok(report) => report,
            Err(e) => {
                error!(volume = %name, error = %e, "volume workflow aborted");
                let mut report = VolumeReport::new(name);
                report.outcome = VolumeOutcome::failed(format!("workflow aborted: {e}"));
                report
            }
        }
    }

    async fn persist(&self, updates: Vec<StateUpdate>) {
        if let Err(e) = self.store.apply(updates).await {
            warn!(error = %e, "failed to persist state");
        }
    }
}

fn counts(summary: &CycleSummary) -> StateUpdate {
    StateUpdate::SetCycleCounts {
        succeeded: summary.succeeded() as u64,
        failed: summary.failed() as u64,
        skipped: summary.skipped() as u64,
    }
}

/// End-of-cycle report: one line per volume, then the totals.
fn log_report(summary: &CycleSummary) {
    for report in &summary.reports {
        match &report.outcome {
            VolumeOutcome::Success => info!(
                volume = %report.volume,
                size_bytes = report.size_bytes.unwrap_or(0),
                verified = report.verification.is_ok(),
                retention_warnings = report.retention.as_ref().is_some_and(|r| r.has_warnings()),
                "success"
            ),
            VolumeOutcome::Skipped(reason) => info!(volume = %report.volume, %reason, "skipped"),
            VolumeOutcome::Failed(reason) => {
                error!(
                    volume = %report.volume,
                    stage = %report.stage,
                    uploaded = report.stage.is_uploaded(),
                    %reason,
                    "failed"
                )
            }
        }
    }
    info!(
        volumes = summary.total(),
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        skipped = summary.skipped(),
        total_bytes = summary.total_bytes(),
        duration_secs = summary.duration.as_secs_f64(),
        "backup cycle completed"
    );
}

#[async_trait]
impl CycleRunner for BackupCycle {
    async fn run_cycle(&self) -> Result<(), CycleRunError> {
        self.run()
            .await
            .map(|_| ())
            .map_err(|e| CycleRunError::new(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::retention::RetentionPolicy;
    use crate::app::workflow::WorkflowOptions;
    use crate::domain::OutcomeKind;
    use crate::exec::CommandExecutor;
    use crate::impls::InMemoryStateStore;
    use crate::ports::{FixedClock, UlidGenerator};
    use crate::testing::{FakeArchiver, FakeRemote};
    use chrono::{Local, TimeZone};

    struct Fixture {
        root: tempfile::TempDir,
        archiver: Arc<FakeArchiver>,
        remote: Arc<FakeRemote>,
        store: Arc<InMemoryStateStore>,
    }

    impl Fixture {
        fn new(volume_list: &str, existing: &[&str]) -> Self {
            let root = tempfile::tempdir().unwrap();
            std::fs::write(root.path().join("vols.txt"), volume_list).unwrap();
            for v in existing {
                std::fs::create_dir_all(root.path().join("data").join(v)).unwrap();
            }
            Self {
                root,
                archiver: Arc::new(FakeArchiver::new()),
                remote: Arc::new(FakeRemote::new()),
                store: Arc::new(InMemoryStateStore::new()),
            }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.root.path().join(rel)
        }

        fn cycle(&self, sync_only: bool) -> BackupCycle {
            let clock: Arc<dyn Clock> =
                Arc::new(FixedClock::new(Local.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()));
            let hooks = HookRunner::new(CommandExecutor::new(), "sh");
            let workflow = VolumeBackupWorkflow::new(
                self.archiver.clone(),
                self.remote.clone(),
                hooks.clone(),
                RetentionPolicy::new(7),
                clock.clone(),
                self.store.clone(),
                WorkflowOptions {
                    staging_dir: self.path("backups/host1"),
                    remote_root: "pfx/host1/dockervolumes".into(),
                    restore_test: true,
                },
            );
            BackupCycle::new(
                Arc::new(workflow),
                hooks,
                self.store.clone(),
                clock.clone(),
                Arc::new(UlidGenerator::new(clock)),
                CycleOptions {
                    volume_list: self.path("vols.txt"),
                    source_base: self.path("data"),
                    global_prescript: self.path("pre.sh"),
                    global_postscript: self.path("post.sh"),
                    sync_only,
                },
            )
        }
    }

    #[tokio::test]
    async fn outcome_counts_cover_every_listed_volume() {
        let fx = Fixture::new("# vols\na\nghost\nb\nbroken\n", &["a", "b", "broken"]);
        fx.remote.fail_upload_for("broken");

        let summary = fx.cycle(false).run().await.unwrap();

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(
            summary.succeeded() + summary.failed() + summary.skipped(),
            summary.total()
        );

        let state = fx.store.get().await.unwrap();
        assert_eq!(state.status, ProcessStatus::Idle);
        assert_eq!(state.volumes_backed_up, 2);
        assert_eq!(state.volumes_failed, 1);
        assert_eq!(state.volumes_skipped, 1);
        assert_eq!(state.total_backups, 1);
        assert_eq!(state.total_failures, 1);
        assert_eq!(state.volumes.len(), 4);
        assert_eq!(state.volumes["ghost"].state, OutcomeKind::Skipped);
        assert!(state.last_error.as_deref().unwrap().starts_with("broken:"));
        assert!(state.last_backup_time.is_none());
        assert_eq!(state.current_operation, None);
    }

    #[tokio::test]
    async fn clean_cycle_sets_last_success() {
        let fx = Fixture::new("a\n", &["a"]);

        let summary = fx.cycle(false).run().await.unwrap();

        assert_eq!(summary.succeeded(), 1);
        let state = fx.store.get().await.unwrap();
        assert!(state.last_backup_time.is_some());
        assert_eq!(state.last_error, None);
        assert!(state.last_total_size > 0);
    }

    #[tokio::test]
    async fn global_hooks_run_around_volumes_and_failures_are_tolerated() {
        let fx = Fixture::new("a\n", &["a"]);
        std::fs::write(fx.path("pre.sh"), "exit 1\n").unwrap();
        std::fs::write(
            fx.path("post.sh"),
            format!("touch '{}'\n", fx.path("post-ran").display()),
        )
        .unwrap();

        let summary = fx.cycle(false).run().await.unwrap();

        assert_eq!(summary.succeeded(), 1);
        assert!(fx.path("post-ran").exists());
    }

    #[tokio::test]
    async fn sync_only_skips_every_volume_but_runs_postscript() {
        let fx = Fixture::new("a\nb\n", &["a", "b"]);
        std::fs::write(
            fx.path("post.sh"),
            format!("touch '{}'\n", fx.path("post-ran").display()),
        )
        .unwrap();

        let summary = fx.cycle(true).run().await.unwrap();

        assert_eq!(summary.skipped(), 2);
        assert!(fx.archiver.created().is_empty());
        assert!(fx.path("post-ran").exists());
    }

    #[tokio::test]
    async fn missing_volume_list_aborts_cycle() {
        let fx = Fixture::new("", &[]);
        std::fs::remove_file(fx.path("vols.txt")).unwrap();

        let err = fx.cycle(false).run().await.unwrap_err();

        assert!(matches!(err, CycleError::VolumeList { .. }));
        let state = fx.store.get().await.unwrap();
        assert_eq!(state.status, ProcessStatus::Error);
        assert!(state.last_error.is_some());
    }

    #[tokio::test]
    async fn runner_impl_maps_errors() {
        let fx = Fixture::new("", &[]);
        std::fs::remove_file(fx.path("vols.txt")).unwrap();

        let err = fx.cycle(false).run_cycle().await.unwrap_err();
        assert!(err.reason.contains("volume list"));
    }
}
