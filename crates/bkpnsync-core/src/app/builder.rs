//! AppBuilder - Settings から各コンポーネントを組み立てる
//!
//! # 使用例
//! ```ignore
//! let app = AppBuilder::new(Settings::from_env()?);
//! let summary = app.build_cycle().run().await?;
//! ```
//!
//! Clock と StateStore は差し替え可能（テスト用）。それ以外は Settings から決まる。

use std::sync::Arc;

use super::cycle::BackupCycle;
use super::health::HealthState;
use super::hooks::HookRunner;
use super::retention::RetentionPolicy;
use super::scheduler::Scheduler;
use super::shutdown::ShutdownController;
use super::workflow::VolumeBackupWorkflow;
use crate::config::Settings;
use crate::exec::CommandExecutor;
use crate::impls::{JsonFileStateStore, RcloneRemote, TarArchiver};
use crate::ports::{
    Archiver, Clock, CycleRunner, RemoteStore, StateStore, SystemClock, UlidGenerator,
};

pub struct AppBuilder {
    settings: Settings,
    executor: CommandExecutor,
    clock: Arc<dyn Clock>,
    store: Arc<dyn StateStore>,
    archiver: Arc<dyn Archiver>,
    remote: Arc<dyn RemoteStore>,
}

impl AppBuilder {
    pub fn new(settings: Settings) -> Self {
        let executor = CommandExecutor::new();
        let store: Arc<dyn StateStore> = Arc::new(JsonFileStateStore::new(&settings.state_file));
        let remote = RcloneRemote::new(executor.clone(), &settings.rclone_target)
            .with_config(&settings.rclone_config);
        Self {
            archiver: Arc::new(TarArchiver::new(executor.clone())),
            remote: Arc::new(remote),
            clock: Arc::new(SystemClock),
            store,
            executor,
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = remote;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    pub fn store(&self) -> Arc<dyn StateStore> {
        self.store.clone()
    }

    fn hooks(&self) -> HookRunner {
        HookRunner::new(self.executor.clone(), self.settings.hook_shell.as_str())
    }

    pub fn build_workflow(&self) -> VolumeBackupWorkflow {
        VolumeBackupWorkflow::new(
            self.archiver.clone(),
            self.remote.clone(),
            self.hooks(),
            RetentionPolicy::new(self.settings.max_backups),
            self.clock.clone(),
            self.store.clone(),
            self.settings.workflow_options(),
        )
    }

    pub fn build_cycle(&self) -> BackupCycle {
        BackupCycle::new(
            Arc::new(self.build_workflow()),
            self.hooks(),
            self.store.clone(),
            self.clock.clone(),
            Arc::new(UlidGenerator::new(self.clock.clone())),
            self.settings.cycle_options(),
        )
    }

    pub fn build_scheduler(
        &self,
        runner: Arc<dyn CycleRunner>,
        shutdown: ShutdownController,
    ) -> Scheduler {
        Scheduler::new(
            self.settings.scheduler_options(),
            runner,
            self.store.clone(),
            self.clock.clone(),
            shutdown,
        )
    }

    pub fn health_state(&self) -> HealthState {
        HealthState::new(self.store.clone(), self.clock.clone(), &self.settings.host_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProcessStatus;
    use crate::testing::{FakeArchiver, FakeRemote};
    use std::collections::HashMap;

    fn settings(root: &std::path::Path, extra: &[(&str, &str)]) -> Settings {
        let mut vars: HashMap<String, String> = HashMap::new();
        let mut set = |k: &str, v: String| {
            vars.insert(k.to_string(), v);
        };
        set("RCL_TARGET", "b2".into());
        set("RCL_PREFIX", "pfx".into());
        set("HOSTID", "host1".into());
        set("VOLSLIST", root.join("vols.txt").display().to_string());
        set("SRC_VOL_BASE", root.join("data").display().to_string());
        set("BKP_BASE_DIR", root.join("backups").display().to_string());
        set("PRESCRIPT", root.join("pre.sh").display().to_string());
        set("POSTSCRIPT", root.join("post.sh").display().to_string());
        set("STATE_FILE", root.join("state/backup_state.json").display().to_string());
        set("HOOK_SHELL", "sh".into());
        for (k, v) in extra {
            set(k, v.to_string());
        }
        Settings::from_map(vars).unwrap()
    }

    #[tokio::test]
    async fn built_cycle_persists_to_state_file() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("vols.txt"), "a\nb\n").unwrap();
        std::fs::create_dir_all(root.path().join("data/a")).unwrap();
        let remote = Arc::new(FakeRemote::new());

        let app = AppBuilder::new(settings(root.path(), &[("MAXBKP", "3")]))
            .with_archiver(Arc::new(FakeArchiver::new()))
            .with_remote(remote.clone());
        let summary = app.build_cycle().run().await.unwrap();

        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(remote.files("pfx/host1/dockervolumes/a").len(), 1);

        let raw = std::fs::read_to_string(root.path().join("state/backup_state.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["status"], "idle");
        assert_eq!(json["volumes_backed_up"], 1);
        assert_eq!(json["volumes"]["b"]["state"], "skipped");
        assert_eq!(app.store().get().await.unwrap().status, ProcessStatus::Idle);
    }

    #[tokio::test]
    async fn health_state_labels_metrics_with_host_id() {
        use axum::body::Body;
        use axum::http::Request;
        use http_body_util::BodyExt;
        use tower::ServiceExt;

        let root = tempfile::tempdir().unwrap();
        let app = AppBuilder::new(settings(root.path(), &[]));

        let response = crate::app::health::router(app.health_state())
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        assert!(String::from_utf8_lossy(&body).contains(r#"backuphost="host1""#));
    }

    #[tokio::test]
    async fn metrics_reflect_cycle_with_two_successes_and_one_failure() {
        use crate::impls::InMemoryStateStore;
        use crate::ports::FixedClock;
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use chrono::{Local, TimeZone};
        use http_body_util::BodyExt;
        use tower::ServiceExt;

        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("vols.txt"), "a\nb\nc\n").unwrap();
        for v in ["a", "b", "c"] {
            std::fs::create_dir_all(root.path().join("data").join(v)).unwrap();
        }
        let remote = Arc::new(FakeRemote::new());
        remote.fail_upload_for("b");
        let noon = Local.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();

        let app = AppBuilder::new(settings(root.path(), &[]))
            .with_archiver(Arc::new(FakeArchiver::new()))
            .with_remote(remote)
            .with_store(Arc::new(InMemoryStateStore::new()))
            .with_clock(Arc::new(FixedClock::new(noon)));
        let summary = app.build_cycle().run().await.unwrap();
        assert_eq!((summary.succeeded(), summary.failed()), (2, 1));
        assert!(!root.path().join("state/backup_state.json").exists());

        let response = crate::app::health::router(app.health_state())
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&body);

        assert!(text.contains(r#"backup_volumes_success{backuphost="host1"} 2"#), "{text}");
        assert!(text.contains(r#"backup_volumes_failed{backuphost="host1"} 1"#), "{text}");
        assert!(text.contains(r#"backup_volume_state{backuphost="host1",volume="b"} 0"#));
        assert!(text.contains(r#"backup_volume_state{backuphost="host1",volume="c"} 1"#));
    }
}
