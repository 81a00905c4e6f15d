//! RetentionPolicy - リモートに残す世代数の管理
//!
//! # 学習ポイント
//! - 判断 (`plan`) は純粋関数、副作用 (`apply`) は RemoteStore 経由
//! - 日付を読めないファイルは keep にも delete にも数えない

use std::cmp::Reverse;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::{info, warn};

use crate::domain::{DeletionFailure, RemoteRecord, RetentionPlan, RetentionReport};
use crate::ports::RemoteStore;

fn backup_name_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<name>.+)_(?P<date>[0-9]{8})\.(?P<ext>[A-Za-z0-9]+(?:\.[A-Za-z0-9]+)*)$").ok()
    })
    .as_ref()
}

/// Date embedded in `name_YYYYMMDD.ext`; `None` when absent or not a real date.
pub fn parse_backup_date(file_name: &str) -> Option<NaiveDate> {
    let caps = backup_name_regex()?.captures(file_name)?;
    let digits = caps.name("date")?.as_str();
    let year = digits[0..4].parse().ok()?;
    let month = digits[4..6].parse().ok()?;
    let day = digits[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Keep the newest `max_keep` dated archives of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    max_keep: usize,
}

impl RetentionPolicy {
    pub fn new(max_keep: usize) -> Self {
        Self { max_keep }
    }

    /// Decide what to keep. Order of `listing` does not matter.
    pub fn plan(&self, listing: &[String]) -> RetentionPlan {
        let mut dated = Vec::new();
        let mut unparsed = Vec::new();
        for name in listing {
            match parse_backup_date(name) {
                Some(date) => dated.push(RemoteRecord {
                    file_name: name.clone(),
                    date,
                }),
                None => unparsed.push(name.clone()),
            }
        }

        // newest first; same day: file name descending
        dated.sort_by_key(|r| Reverse((r.date, r.file_name.clone())));
        let delete = dated.split_off(self.max_keep.min(dated.len()));

        RetentionPlan {
            keep: dated,
            delete,
            unparsed,
        }
    }

    /// List `remote_dir`, then delete what the plan says. Never fails:
    /// problems end up in the report.
    pub async fn apply(&self, remote: &dyn RemoteStore, remote_dir: &str) -> RetentionReport {
        let location = remote.describe(remote_dir);
        let listing = match remote.list(remote_dir).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(remote = %location, error = %e, "cannot list remote backups, skipping retention");
                return RetentionReport::listing_failed(e.to_string());
            }
        };

        let plan = self.plan(&listing);
        if !plan.unparsed.is_empty() {
            info!(remote = %location, files = ?plan.unparsed, "ignoring files without a backup date");
        }

        let mut report = RetentionReport {
            kept: plan.keep.into_iter().map(|r| r.file_name).collect(),
            unparsed: plan.unparsed,
            ..RetentionReport::default()
        };

        for record in plan.delete {
            match remote.delete(remote_dir, &record.file_name).await {
                Ok(()) => {
                    info!(remote = %location, file = %record.file_name, date = %record.date, "deleted old backup");
                    report.deleted.push(record.file_name);
                }
                Err(e) => {
                    warn!(remote = %location, file = %record.file_name, error = %e, "failed to delete old backup");
                    report.failed.push(DeletionFailure {
                        file_name: record.file_name,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            remote = %location,
            kept = report.kept.len(),
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "retention applied"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRemote;
    use rstest::rstest;

    fn names(records: &[RemoteRecord]) -> Vec<&str> {
        records.iter().map(|r| r.file_name.as_str()).collect()
    }

    fn ten_days() -> Vec<String> {
        (1..=10).map(|d| format!("vol_202401{d:02}.tar.gz")).collect()
    }

    #[rstest]
    #[case("vol_20240131.tar.gz", Some((2024, 1, 31)))]
    #[case("my_vol_2_20231201.tar.gz", Some((2023, 12, 1)))]
    #[case("vol_20240101.zip", Some((2024, 1, 1)))]
    #[case("vol_20241301.tar.gz", None)]
    #[case("vol_2024011.tar.gz", None)]
    #[case("readme.txt", None)]
    #[case("_20240101.tar.gz", None)]
    fn date_parsing(#[case] name: &str, #[case] expected: Option<(i32, u32, u32)>) {
        let expected = expected.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap());
        assert_eq!(parse_backup_date(name), expected);
    }

    #[test]
    fn keeps_newest_regardless_of_listing_order() {
        let policy = RetentionPolicy::new(7);
        let mut listing = ten_days();
        listing.reverse();
        listing.swap(0, 5);

        let plan = policy.plan(&listing);

        assert_eq!(plan.keep.len(), 7);
        assert_eq!(
            names(&plan.delete),
            vec!["vol_20240103.tar.gz", "vol_20240102.tar.gz", "vol_20240101.tar.gz"]
        );
        assert_eq!(plan.keep[0].file_name, "vol_20240110.tar.gz");
    }

    #[test]
    fn unparseable_entries_are_neither_kept_nor_deleted() {
        let policy = RetentionPolicy::new(7);
        let mut listing = ten_days();
        listing.push("readme.txt".into());

        let plan = policy.plan(&listing);

        assert_eq!(plan.keep.len(), 7);
        assert_eq!(plan.delete.len(), 3);
        assert_eq!(plan.unparsed, vec!["readme.txt"]);
        assert!(!names(&plan.keep).contains(&"readme.txt"));
        assert!(!names(&plan.delete).contains(&"readme.txt"));
    }

    #[test]
    fn same_day_ties_break_on_name() {
        let policy = RetentionPolicy::new(1);
        let plan = policy.plan(&["a_20240101.tar.gz".into(), "b_20240101.tar.gz".into()]);
        assert_eq!(names(&plan.keep), vec!["b_20240101.tar.gz"]);
        assert_eq!(names(&plan.delete), vec!["a_20240101.tar.gz"]);
    }

    #[test]
    fn fewer_entries_than_max_keep_deletes_nothing() {
        let plan = RetentionPolicy::new(7).plan(&["v_20240101.tar.gz".into()]);
        assert_eq!(plan.keep.len(), 1);
        assert!(plan.delete.is_empty());
    }

    #[tokio::test]
    async fn apply_deletes_oldest_through_remote() {
        let remote = FakeRemote::new();
        for name in ten_days() {
            remote.put("dir", &name, 1);
        }
        remote.put("dir", "readme.txt", 1);

        let report = RetentionPolicy::new(7).apply(&remote, "dir").await;

        assert_eq!(report.deleted.len(), 3);
        assert_eq!(report.kept.len(), 7);
        assert!(!report.has_warnings());
        let left = remote.files("dir");
        assert_eq!(left.len(), 8);
        assert!(left.contains(&"readme.txt".to_string()));
        assert!(!left.contains(&"vol_20240101.tar.gz".to_string()));
    }

    #[tokio::test]
    async fn deletion_failures_are_collected() {
        let remote = FakeRemote::new();
        for name in ten_days() {
            remote.put("dir", &name, 1);
        }
        remote.fail_delete_of("vol_20240102.tar.gz");

        let report = RetentionPolicy::new(7).apply(&remote, "dir").await;

        assert_eq!(report.deleted, vec!["vol_20240103.tar.gz", "vol_20240101.tar.gz"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].file_name, "vol_20240102.tar.gz");
        assert!(report.has_warnings());
    }

    #[tokio::test]
    async fn listing_failure_prunes_nothing() {
        let remote = FakeRemote::new();
        remote.put("dir", "vol_20240101.tar.gz", 1);
        remote.fail_listing();

        let report = RetentionPolicy::new(0).apply(&remote, "dir").await;

        assert!(report.listing_error.is_some());
        assert!(report.deleted.is_empty());
        assert_eq!(remote.files("dir").len(), 1);
    }
}
