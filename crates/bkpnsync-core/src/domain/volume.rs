//! Volumes: named source directories archived every cycle.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// Directory (relative to the volume root) holding per-volume hook scripts.
pub const HOOK_DIR: &str = ".bkpnsync";

/// A named source directory.
///
/// Volumes are read from the volume list at the start of each cycle and are
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    name: String,
    source: PathBuf,
}

impl Volume {
    /// A volume named `name` living under `source_base`.
    pub fn new(name: impl Into<String>, source_base: &Path) -> Self {
        let name = name.into();
        let source = source_base.join(&name);
        Self { name, source }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Optional script run before the volume is archived.
    pub fn prescript(&self) -> PathBuf {
        self.source.join(HOOK_DIR).join("prescript.sh")
    }

    /// Optional script run after the volume is uploaded and pruned.
    pub fn postscript(&self) -> PathBuf {
        self.source.join(HOOK_DIR).join("postscript.sh")
    }
}

/// `{volume}_{YYYYMMDD}.{extension}`
pub fn archive_file_name(volume: &str, date: NaiveDate, extension: &str) -> String {
    format!("{}_{}.{}", volume, date.format("%Y%m%d"), extension)
}

/// Parse the volume list file format: one name per line, blank lines and
/// `#` comments ignored.
pub fn parse_volume_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_paths_are_derived_from_base() {
        let volume = Volume::new("nextcloud", Path::new("/data"));

        assert_eq!(volume.name(), "nextcloud");
        assert_eq!(volume.source(), Path::new("/data/nextcloud"));
        assert_eq!(
            volume.prescript(),
            PathBuf::from("/data/nextcloud/.bkpnsync/prescript.sh")
        );
        assert_eq!(
            volume.postscript(),
            PathBuf::from("/data/nextcloud/.bkpnsync/postscript.sh")
        );
    }

    #[test]
    fn archive_name_embeds_date() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        assert_eq!(archive_file_name("volA", date, "tar.gz"), "volA_20240109.tar.gz");
    }

    #[test]
    fn volume_list_skips_comments_and_blank_lines() {
        let contents = "# header\nvolA\n\n  volB  \n#volC\n\t\nvolD\n";
        assert_eq!(parse_volume_list(contents), vec!["volA", "volB", "volD"]);
    }

    #[test]
    fn empty_volume_list_is_empty() {
        assert!(parse_volume_list("").is_empty());
        assert!(parse_volume_list("# nothing here\n").is_empty());
    }
}
