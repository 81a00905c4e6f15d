//! Scheduler - 毎日決まった時刻にバックアップサイクルを起動する
//!
//! # 学習ポイント
//! - 長いスリープを短いスライスに分け、スライスごとにキャンセルを確認
//! - サイクル中のシグナルは ShutdownController で遅延させる
//! - サイクルの成否は CycleRunner の戻り値だけで判断する

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::shutdown::ShutdownController;
use crate::domain::{ProcessStatus, StateUpdate};
use crate::ports::{Clock, CycleRunner, StateStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Daily local time of day; `None` runs a single cycle and returns.
    pub wakeup: Option<NaiveTime>,
    pub skip_first_run: bool,
    pub poll_interval: Duration,
    pub gauge_refresh: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            wakeup: None,
            skip_first_run: false,
            poll_interval: Duration::from_secs(1),
            gauge_refresh: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerExit {
    /// Run-once mode finished its cycle.
    Completed { cycle_ok: bool },
    /// Stopped by a shutdown request.
    Shutdown,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("cannot compute next run after {0}")]
    NoNextRun(NaiveDateTime),
}

/// Next occurrence of `target` strictly in the future of `now`'s time of day:
/// today when not reached yet, otherwise tomorrow.
pub fn next_run_after(now: NaiveDateTime, target: NaiveTime) -> Option<NaiveDateTime> {
    let day = if now.time() >= target {
        now.date().succ_opt()?
    } else {
        now.date()
    };
    Some(day.and_time(target))
}

fn to_local(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    // a wakeup inside a DST gap moves forward by an hour
    Local
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| Local.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
}

pub struct Scheduler {
    options: SchedulerOptions,
    runner: Arc<dyn CycleRunner>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    shutdown: ShutdownController,
}

impl Scheduler {
    pub fn new(
        options: SchedulerOptions,
        runner: Arc<dyn CycleRunner>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            options,
            runner,
            store,
            clock,
            shutdown,
        }
    }

    pub async fn run(&self) -> Result<SchedulerExit, SchedulerError> {
        self.persist(vec![
            StateUpdate::SetStartTime(self.clock.now_utc()),
            StateUpdate::SetStatus(ProcessStatus::Idle),
        ])
        .await;

        let Some(wakeup) = self.options.wakeup else {
            info!("no wakeup time configured, running a single cycle");
            return Ok(match self.run_cycle().await {
                Some(cycle_ok) => SchedulerExit::Completed { cycle_ok },
                None => SchedulerExit::Shutdown,
            });
        };

        let now = self.clock.now();
        if self.options.skip_first_run {
            info!("skipping first run");
        } else if now.time() >= wakeup {
            info!(wakeup = %wakeup, "wakeup time already passed today, running now");
            self.run_cycle().await;
        }

        loop {
            if self.shutdown.is_requested() {
                return Ok(SchedulerExit::Shutdown);
            }

            let now = self.clock.now();
            let naive = next_run_after(now.naive_local(), wakeup)
                .ok_or(SchedulerError::NoNextRun(now.naive_local()))?;
            let next = to_local(naive).ok_or(SchedulerError::NoNextRun(naive))?;
            let next_utc = next.with_timezone(&Utc);
            self.persist(vec![StateUpdate::SetNextRun(Some(next_utc))]).await;

            let wait = (next - now).to_std().unwrap_or_default();
            info!(next_run = %next, wait_secs = wait.as_secs(), "next backup scheduled");

            if !self.sleep_until(wait, next_utc).await {
                info!("shutdown requested while waiting");
                return Ok(SchedulerExit::Shutdown);
            }
            if self.run_cycle().await.is_none() {
                info!("shutdown requested at wakeup, cycle not started");
                return Ok(SchedulerExit::Shutdown);
            }
        }
    }

    /// Sleep `wait` in poll slices. Returns false when cancelled.
    async fn sleep_until(&self, wait: Duration, next_utc: DateTime<Utc>) -> bool {
        let token = self.shutdown.token();
        let deadline = Instant::now() + wait;
        let mut last_refresh = Instant::now();
        loop {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let slice = self.options.poll_interval.min(deadline - now);
            tokio::select! {
                _ = token.cancelled() => return false,
                _ = tokio::time::sleep(slice) => {}
            }
            if last_refresh.elapsed() >= self.options.gauge_refresh {
                self.persist(vec![StateUpdate::SetNextRun(Some(next_utc))]).await;
                last_refresh = Instant::now();
            }
        }
    }

    /// One cycle plus the state write after it; shutdown waits for both.
    ///
    /// Returns `None` without starting when shutdown was already requested.
    async fn run_cycle(&self) -> Option<bool> {
        let _in_flight = self.shutdown.begin_cycle();
        if self.shutdown.is_requested() {
            return None;
        }
        let started = Instant::now();
        let (ok, updates) = match self.runner.run_cycle().await {
            Ok(()) => {
                info!(duration_secs = started.elapsed().as_secs_f64(), "backup cycle finished");
                (true, vec![StateUpdate::SetCurrentOperation(None)])
            }
            Err(e) => {
                error!(error = %e, "backup cycle failed");
                (
                    false,
                    vec![
                        StateUpdate::SetStatus(ProcessStatus::Error),
                        StateUpdate::IncrementTotalFailures(1),
                        StateUpdate::SetLastError(Some(e.to_string())),
                        StateUpdate::SetCurrentOperation(None),
                    ],
                )
            }
        };
        self.persist(updates).await;
        Some(ok)
    }

    async fn persist(&self, updates: Vec<StateUpdate>) {
        if let Err(e) = self.store.apply(updates).await {
            warn!(error = %e, "failed to persist state");
        }
    }
}
