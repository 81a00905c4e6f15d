//! Remote archive records and retention results.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A remote archive whose file name carries a parseable date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub file_name: String,
    pub date: NaiveDate,
}

/// Which remote entries to keep and which to delete.
///
/// `keep` and `delete` only ever contain dated entries; everything else lands
/// in `unparsed` and is left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Newest first.
    pub keep: Vec<RemoteRecord>,
    /// Newest first.
    pub delete: Vec<RemoteRecord>,
    pub unparsed: Vec<String>,
}

/// A deletion that kept failing after its retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionFailure {
    pub file_name: String,
    pub error: String,
}

/// What retention actually did for one volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionReport {
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
    pub failed: Vec<DeletionFailure>,
    pub unparsed: Vec<String>,
    /// Set when the remote listing itself failed; nothing was pruned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_error: Option<String>,
}

impl RetentionReport {
    pub fn listing_failed(error: impl Into<String>) -> Self {
        Self {
            listing_error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn has_warnings(&self) -> bool {
        !self.failed.is_empty() || self.listing_error.is_some()
    }
}
