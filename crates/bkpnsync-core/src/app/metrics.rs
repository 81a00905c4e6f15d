//! Prometheus text exposition of `ProcessState`.
//!
//! The state file is the source of truth, so every scrape builds a fresh
//! registry from it instead of keeping live collectors around.

use chrono::{DateTime, Utc};
use prometheus::core::Collector;
use prometheus::{Encoder, Gauge, GaugeVec, IntCounter, IntGauge, Opts, Registry, TextEncoder};

use crate::domain::ProcessState;

const HOST_LABEL: &str = "backuphost";
const VOLUME_LABEL: &str = "volume";

struct Exposition<'a> {
    registry: Registry,
    host: &'a str,
}

impl<'a> Exposition<'a> {
    fn new(host: &'a str) -> Self {
        Self {
            registry: Registry::new(),
            host,
        }
    }

    fn opts(&self, name: &str, help: &str) -> Opts {
        Opts::new(name, help).const_label(HOST_LABEL, self.host)
    }

    fn register<C: Collector + Clone + 'static>(&self, collector: C) -> prometheus::Result<C> {
        self.registry.register(Box::new(collector.clone()))?;
        Ok(collector)
    }

    fn counter(&self, name: &str, help: &str, value: u64) -> prometheus::Result<()> {
        self.register(IntCounter::with_opts(self.opts(name, help))?)?
            .inc_by(value);
        Ok(())
    }

    fn int_gauge(&self, name: &str, help: &str, value: i64) -> prometheus::Result<()> {
        self.register(IntGauge::with_opts(self.opts(name, help))?)?
            .set(value);
        Ok(())
    }

    fn gauge(&self, name: &str, help: &str, value: f64) -> prometheus::Result<()> {
        self.register(Gauge::with_opts(self.opts(name, help))?)?
            .set(value);
        Ok(())
    }

    fn per_volume(&self, name: &str, help: &str) -> prometheus::Result<GaugeVec> {
        self.register(GaugeVec::new(self.opts(name, help), &[VOLUME_LABEL])?)
    }

    fn encode(self) -> prometheus::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

/// Render the metrics page for `state` as seen at `now`.
pub fn render(state: &ProcessState, host: &str, now: DateTime<Utc>) -> prometheus::Result<String> {
    let m = Exposition::new(host);

    m.counter(
        "backup_total_count",
        "Total number of backup cycles completed",
        state.total_backups,
    )?;
    m.counter(
        "backup_failure_count",
        "Total number of backup failures",
        state.total_failures,
    )?;
    m.int_gauge(
        "backup_volumes_success",
        "Number of volumes successfully backed up in last cycle",
        state.volumes_backed_up as i64,
    )?;
    m.int_gauge(
        "backup_volumes_failed",
        "Number of volumes that failed in last cycle",
        state.volumes_failed as i64,
    )?;
    m.int_gauge(
        "backup_volumes_skipped",
        "Number of volumes skipped in last cycle",
        state.volumes_skipped as i64,
    )?;
    m.gauge(
        "backup_last_duration_seconds",
        "Duration of last backup cycle in seconds",
        state.last_duration,
    )?;
    m.int_gauge(
        "backup_last_success_timestamp",
        "Unix timestamp of last successful backup",
        state.last_backup_time.map_or(0, |at| at.timestamp()),
    )?;
    m.int_gauge(
        "backup_last_total_size_bytes",
        "Total size of archives produced in last cycle",
        i64::try_from(state.last_total_size).unwrap_or(i64::MAX),
    )?;
    let uptime = state
        .start_time
        .map_or(0.0, |start| seconds_between(start, now).max(0.0));
    m.gauge("backup_uptime_seconds", "Service uptime in seconds", uptime)?;
    if let Some(next) = state.next_run {
        m.gauge(
            "backup_next_run_seconds",
            "Seconds until the next scheduled backup",
            seconds_between(now, next).max(0.0),
        )?;
    }

    if !state.volumes.is_empty() {
        let size = m.per_volume(
            "backup_volume_size_bytes",
            "Archive size of the volume in last cycle",
        )?;
        let result = m.per_volume(
            "backup_volume_state",
            "Volume result in last cycle (1 success, 0 failed, 2 skipped)",
        )?;
        let duration = m.per_volume(
            "backup_volume_duration_seconds",
            "Time spent on the volume in last cycle",
        )?;
        for (name, volume) in &state.volumes {
            size.with_label_values(&[name.as_str()]).set(volume.size_bytes as f64);
            result
                .with_label_values(&[name.as_str()])
                .set(volume.state.metric_value() as f64);
            duration
                .with_label_values(&[name.as_str()])
                .set(volume.duration_seconds);
        }
    }

    m.encode()
}
