//! On-disk layout of a service's state directory.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use toolsync_core::ServiceSlug;

/// File holding the latest committed snapshot
pub const LATEST_FILE: &str = "latest.json";
/// File holding metadata for the latest committed snapshot
pub const LATEST_META_FILE: &str = "latest.meta.json";
/// Directory holding immutable historical snapshots
pub const HISTORY_DIR: &str = "history";
/// Directory holding markdown change reports
pub const REPORTS_DIR: &str = "reports";

/// Paths for one service under the state root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLayout {
    dir: PathBuf,
}

impl ServiceLayout {
    /// Layout for a service name under a state root
    #[must_use]
    pub fn new(root: &Path, service_name: &str) -> Self {
        Self {
            dir: root.join(ServiceSlug::from_name(service_name).as_str()),
        }
    }

    /// Service directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Latest snapshot path
    #[must_use]
    pub fn latest(&self) -> PathBuf {
        self.dir.join(LATEST_FILE)
    }

    /// Latest metadata path
    #[must_use]
    pub fn latest_meta(&self) -> PathBuf {
        self.dir.join(LATEST_META_FILE)
    }

    /// History directory
    #[must_use]
    pub fn history_dir(&self) -> PathBuf {
        self.dir.join(HISTORY_DIR)
    }

    /// Reports directory
    #[must_use]
    pub fn reports_dir(&self) -> PathBuf {
        self.dir.join(REPORTS_DIR)
    }

    /// File stem for a point in time, sortable lexicographically
    #[must_use]
    pub fn stamp(at: &DateTime<Utc>) -> String {
        at.format("%Y%m%dT%H%M%S%.3fZ").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_layout_paths() {
        let layout = ServiceLayout::new(Path::new("/state"), "My Server");
        assert_eq!(layout.dir(), Path::new("/state/my-server"));
        assert_eq!(layout.latest(), PathBuf::from("/state/my-server/latest.json"));
        assert_eq!(
            layout.latest_meta(),
            PathBuf::from("/state/my-server/latest.meta.json")
        );
        assert_eq!(layout.history_dir(), PathBuf::from("/state/my-server/history"));
    }

    #[test]
    fn test_stamp_is_sortable() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 11, 2, 3, 4, 5).unwrap();
        assert_eq!(ServiceLayout::stamp(&a), "20260102T030405.000Z");
        assert!(ServiceLayout::stamp(&a) < ServiceLayout::stamp(&b));
    }
}
