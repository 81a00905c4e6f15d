//! Settings - 環境変数からの設定読み込み
//!
//! # 学習ポイント
//! - `config` crate の Environment source + `set_default` でデフォルト値を一箇所に集約
//! - 値はいったん文字列で受け取り、検証は `Settings::from_raw` で行う（エラーメッセージに変数名を出すため）
//! - 起動時に検証して失敗なら即終了（Fail-fast）

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use config::{Config, Environment};
use serde::Deserialize;
use thiserror::Error;

use crate::app::{CycleOptions, SchedulerOptions, WorkflowOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("rclone config missing at {0}")]
    RcloneConfigMissing(PathBuf),
}

/// Environment as read by `config`; keys are the lowercased variable names.
#[derive(Debug, Deserialize)]
struct RawSettings {
    volslist: String,
    prescript: String,
    postscript: String,
    src_vol_base: String,
    bkp_base_dir: String,
    hostid: Option<String>,
    maxbkp: String,
    rcl_target: Option<String>,
    rcl_prefix: Option<String>,
    rcl_suffix: String,
    rclone_config: String,
    synconly: Option<String>,
    wakeuptime: Option<String>,
    skipfirstrun: String,
    health_port: String,
    health_enabled: String,
    state_file: String,
    restore_test: String,
    hook_shell: String,
}

const DEFAULTS: &[(&str, &str)] = &[
    ("volslist", "/config/bns/backup_vols.txt"),
    ("prescript", "/config/bns/backup_pre_script.sh"),
    ("postscript", "/config/bns/backup_post_script.sh"),
    ("src_vol_base", "/data"),
    ("bkp_base_dir", "/backups"),
    ("maxbkp", "7"),
    ("rcl_suffix", "dockervolumes"),
    ("rclone_config", "/config/rclone/rclone.conf"),
    ("skipfirstrun", "false"),
    ("health_port", "8080"),
    ("health_enabled", "true"),
    ("state_file", "/tmp/backup_state.json"),
    ("restore_test", "true"),
    ("hook_shell", "bash"),
];

/// Validated runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub volume_list: PathBuf,
    pub global_prescript: PathBuf,
    pub global_postscript: PathBuf,
    pub source_base: PathBuf,
    pub staging_base: PathBuf,
    pub host_id: String,
    pub max_backups: usize,
    pub rclone_target: String,
    pub rclone_prefix: String,
    pub rclone_suffix: String,
    pub rclone_config: PathBuf,
    pub sync_only: bool,
    /// `None` runs a single cycle.
    pub wakeup: Option<NaiveTime>,
    pub skip_first_run: bool,
    pub health_port: u16,
    pub health_enabled: bool,
    pub state_file: PathBuf,
    pub restore_test: bool,
    pub hook_shell: String,
}

impl Settings {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Environment::default())
    }

    /// Load from an explicit variable map instead of the process environment.
    pub fn from_map(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::load(Environment::default().source(Some(vars)))
    }

    fn load(env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        for (key, value) in DEFAULTS {
            builder = builder.set_default(*key, *value)?;
        }
        let raw: RawSettings = builder
            .add_source(env.ignore_empty(true))
            .build()?
            .try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, ConfigError> {
        let max_backups = parse_number::<usize>("MAXBKP", &raw.maxbkp)?;
        if max_backups == 0 {
            return Err(ConfigError::Invalid {
                key: "MAXBKP",
                value: raw.maxbkp,
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            volume_list: raw.volslist.into(),
            global_prescript: raw.prescript.into(),
            global_postscript: raw.postscript.into(),
            source_base: raw.src_vol_base.into(),
            staging_base: raw.bkp_base_dir.into(),
            host_id: raw.hostid.unwrap_or_else(system_hostname),
            max_backups,
            rclone_target: required("RCL_TARGET", raw.rcl_target)?,
            rclone_prefix: required("RCL_PREFIX", raw.rcl_prefix)?,
            rclone_suffix: raw.rcl_suffix,
            rclone_config: raw.rclone_config.into(),
            sync_only: raw
                .synconly
                .as_deref()
                .is_some_and(|v| !is_falsy(v)),
            wakeup: raw
                .wakeuptime
                .as_deref()
                .map(parse_wakeup)
                .transpose()?,
            skip_first_run: parse_flag("SKIPFIRSTRUN", &raw.skipfirstrun)?,
            health_port: parse_number("HEALTH_PORT", &raw.health_port)?,
            health_enabled: parse_flag("HEALTH_ENABLED", &raw.health_enabled)?,
            state_file: raw.state_file.into(),
            restore_test: parse_flag("RESTORE_TEST", &raw.restore_test)?,
            hook_shell: raw.hook_shell,
        })
    }

    /// Fails when the rclone config file is absent.
    pub fn check_remote_config(&self) -> Result<(), ConfigError> {
        if self.rclone_config.is_file() {
            Ok(())
        } else {
            Err(ConfigError::RcloneConfigMissing(self.rclone_config.clone()))
        }
    }

    /// `{BKP_BASE_DIR}/{host}`
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_base.join(&self.host_id)
    }

    /// `{prefix}/{host}/{suffix}`
    pub fn remote_root(&self) -> String {
        format!("{}/{}/{}", self.rclone_prefix, self.host_id, self.rclone_suffix)
    }

    pub fn health_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.health_port))
    }

    pub fn workflow_options(&self) -> WorkflowOptions {
        WorkflowOptions {
            staging_dir: self.staging_dir(),
            remote_root: self.remote_root(),
            restore_test: self.restore_test,
        }
    }

    pub fn cycle_options(&self) -> CycleOptions {
        CycleOptions {
            volume_list: self.volume_list.clone(),
            source_base: self.source_base.clone(),
            global_prescript: self.global_prescript.clone(),
            global_postscript: self.global_postscript.clone(),
            sync_only: self.sync_only,
        }
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            wakeup: self.wakeup,
            skip_first_run: self.skip_first_run,
            ..SchedulerOptions::default()
        }
    }
}

fn required(key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_number<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn is_falsy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no")
}

/// `true`/`1`/`yes` or `false`/`0`/`no`, case-insensitive.
fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected true/false, 1/0 or yes/no".to_string(),
        }),
    }
}

fn parse_wakeup(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|e| ConfigError::Invalid {
        key: "WAKEUPTIME",
        value: value.to_string(),
        reason: format!("expected HH:MM ({e})"),
    })
}

fn system_hostname() -> String {
    read_hostname(Path::new("/proc/sys/kernel/hostname")).unwrap_or_else(|| "localhost".to_string())
}

fn read_hostname(path: &Path) -> Option<String> {
    let name = std::fs::read_to_string(path).ok()?;
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}
