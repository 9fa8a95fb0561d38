//! Snapshot and fingerprint store.

use crate::layout::ServiceLayout;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use toolsync_core::{CoreError, Fingerprint};
use toolsync_schema::{ChangeReport, IntrospectionSnapshot, SnapshotMetadata};

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Store error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("I/O error at {path}: {reason}")]
    Io {
        /// Path involved
        path: String,
        /// Underlying error
        reason: String,
    },

    /// A persisted file could not be decoded
    #[error("Corrupt state file {path}: {reason}")]
    Corrupt {
        /// Path involved
        path: String,
        /// Decoder message
        reason: String,
    },

    /// Fingerprint or encoding failure
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StoreError {
    fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

/// The last committed snapshot of a service together with its metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedSnapshot {
    /// The snapshot
    pub snapshot: IntrospectionSnapshot,
    /// Its metadata
    pub metadata: SnapshotMetadata,
}

/// Filesystem-backed snapshot store.
///
/// Writes are per-service and never touch another service's directory.
/// The latest snapshot is replaced atomically (write to a temporary file,
/// then rename); historical copies are created with `create_new` and never
/// rewritten.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// Create a store rooted at a directory (created lazily on first write)
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Layout for a service
    #[must_use]
    pub fn layout(&self, service_name: &str) -> ServiceLayout {
        ServiceLayout::new(&self.root, service_name)
    }

    /// Read the last committed snapshot, or `None` on first run.
    ///
    /// The snapshot is authoritative: metadata that is missing or names a
    /// different fingerprint is recomputed from it.
    ///
    /// # Errors
    ///
    /// Returns error if the files exist but cannot be read or decoded
    pub fn read_latest(&self, service_name: &str) -> StoreResult<Option<CommittedSnapshot>> {
        let layout = self.layout(service_name);
        let Some(snapshot) = read_json::<IntrospectionSnapshot>(&layout.latest())? else {
            return Ok(None);
        };
        let derived = SnapshotMetadata::derive(&snapshot)?;
        let metadata = match read_json::<SnapshotMetadata>(&layout.latest_meta())? {
            Some(stored) if stored.schema_fingerprint == derived.schema_fingerprint => stored,
            Some(_) => {
                tracing::warn!(
                    service = %service_name,
                    "metadata does not match snapshot, recomputing"
                );
                derived
            }
            None => {
                tracing::warn!(
                    service = %service_name,
                    "metadata missing, recomputing from snapshot"
                );
                derived
            }
        };
        Ok(Some(CommittedSnapshot { snapshot, metadata }))
    }

    /// Read only the latest metadata
    ///
    /// # Errors
    ///
    /// Returns error if the files exist but cannot be read or decoded
    pub fn read_metadata(&self, service_name: &str) -> StoreResult<Option<SnapshotMetadata>> {
        Ok(self.read_latest(service_name)?.map(|c| c.metadata))
    }

    /// Whether the committed fingerprint equals `fingerprint`.
    ///
    /// Answers "has this service's shape changed" without network access.
    /// Returns `false` when nothing has been committed yet.
    ///
    /// # Errors
    ///
    /// Returns error if committed state cannot be read
    pub fn matches_latest(
        &self,
        service_name: &str,
        fingerprint: &Fingerprint,
    ) -> StoreResult<bool> {
        Ok(self
            .read_metadata(service_name)?
            .is_some_and(|meta| meta.schema_fingerprint == *fingerprint))
    }

    /// Commit a snapshot as the current version.
    ///
    /// Appends an immutable historical copy, replaces `latest`, then writes
    /// metadata containing the fingerprint.
    ///
    /// # Errors
    ///
    /// Returns error if any write fails
    pub fn write_latest(&self, snapshot: &IntrospectionSnapshot) -> StoreResult<SnapshotMetadata> {
        let layout = self.layout(&snapshot.service_name);
        let metadata = SnapshotMetadata::derive(snapshot)?;

        let history_dir = layout.history_dir();
        fs::create_dir_all(&history_dir).map_err(|e| StoreError::io(&history_dir, &e))?;

        let body = to_pretty_json(snapshot)?;
        let stamp = ServiceLayout::stamp(&snapshot.retrieved_at);
        let history_path = write_new(&history_dir, &stamp, "json", &body)?;
        write_atomic(&layout.latest(), &body)?;
        write_atomic(&layout.latest_meta(), &to_pretty_json(&metadata)?)?;

        tracing::info!(
            service = %snapshot.service_name,
            fingerprint = %metadata.schema_fingerprint,
            history = %history_path.display(),
            "committed snapshot"
        );
        Ok(metadata)
    }

    /// Historical snapshot files for a service, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if the history directory cannot be listed
    pub fn history(&self, service_name: &str) -> StoreResult<Vec<PathBuf>> {
        let dir = self.layout(service_name).history_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, &e)),
        };
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, &e))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Write a markdown change report, returning its path
    ///
    /// # Errors
    ///
    /// Returns error if the report cannot be written
    pub fn write_report(&self, report: &ChangeReport) -> StoreResult<PathBuf> {
        let dir = self.layout(&report.service_name).reports_dir();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, &e))?;
        let path = write_new(
            &dir,
            &ServiceLayout::stamp(&report.retrieved_at),
            "md",
            report.render().as_bytes(),
        )?;
        tracing::debug!(
            service = %report.service_name,
            path = %path.display(),
            "wrote change report"
        );
        Ok(path)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, &e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

fn to_pretty_json<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(CoreError::from)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn write_atomic(path: &Path, body: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, &e))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body).map_err(|e| StoreError::io(&tmp, &e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, &e))
}

/// Create `<stem>.<ext>` (or `<stem>-N.<ext>` on collision) without overwriting
fn write_new(dir: &Path, stem: &str, ext: &str, body: &[u8]) -> StoreResult<PathBuf> {
    write_new_with(dir, stem, ext, |file| file.write_all(body))
}

/// Like [`write_new`], removing the created file if filling it fails
fn write_new_with(
    dir: &Path,
    stem: &str,
    ext: &str,
    fill: impl FnOnce(&mut fs::File) -> std::io::Result<()>,
) -> StoreResult<PathBuf> {
    let mut attempt = 1u32;
    loop {
        let name = if attempt == 1 {
            format!("{}.{}", stem, ext)
        } else {
            format!("{}-{}.{}", stem, attempt, ext)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                if let Err(e) = fill(&mut file) {
                    drop(file);
                    if let Err(cleanup) = fs::remove_file(&path) {
                        tracing::warn!(
                            path = %path.display(),
                            error = %cleanup,
                            "failed to remove partial file"
                        );
                    }
                    return Err(StoreError::io(&path, &e));
                }
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(StoreError::io(&path, &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use toolsync_schema::{DiffResult, OperationDefinition, TransportDescriptor};

    fn snapshot(ops: &[&str]) -> IntrospectionSnapshot {
        IntrospectionSnapshot::new(
            "github",
            TransportDescriptor::http("https://api.test/mcp"),
            ops.iter()
                .map(|name| OperationDefinition::new(*name, json!({"type": "object"})))
                .collect(),
        )
    }

    #[test]
    fn test_read_latest_first_run() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.read_latest("github").unwrap().is_none());
        assert!(store.read_metadata("github").unwrap().is_none());
        assert!(store.history("github").unwrap().is_empty());
    }

    #[test]
    fn test_write_then_read_latest() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let snap = snapshot(&["a", "b"]);

        let meta = store.write_latest(&snap).unwrap();
        assert_eq!(meta.schema_fingerprint, snap.fingerprint().unwrap());

        let committed = store.read_latest("github").unwrap().unwrap();
        assert_eq!(committed.snapshot, snap);
        assert_eq!(committed.metadata, meta);
        assert!(store.matches_latest("github", &meta.schema_fingerprint).unwrap());
    }

    #[test]
    fn test_history_is_append_only() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let first = snapshot(&["a"]);
        // Same timestamp forces the collision path.
        let second = snapshot(&["a", "b"]).with_retrieved_at(first.retrieved_at);

        store.write_latest(&first).unwrap();
        store.write_latest(&second).unwrap();

        let history = store.history("github").unwrap();
        assert_eq!(history.len(), 2);
        let oldest: IntrospectionSnapshot =
            serde_json::from_slice(&fs::read(&history[0]).unwrap()).unwrap();
        assert_eq!(oldest, first);

        let latest = store.read_latest("github").unwrap().unwrap();
        assert_eq!(latest.snapshot, second);
    }

    #[test]
    fn test_matches_latest_detects_change() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.write_latest(&snapshot(&["a"])).unwrap();
        let other = snapshot(&["a", "b"]).fingerprint().unwrap();
        assert!(!store.matches_latest("github", &other).unwrap());
        assert!(!store.matches_latest("unknown", &other).unwrap());
    }

    #[test]
    fn test_missing_metadata_is_recomputed() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let snap = snapshot(&["a"]);
        store.write_latest(&snap).unwrap();
        fs::remove_file(store.layout("github").latest_meta()).unwrap();

        let meta = store.read_metadata("github").unwrap().unwrap();
        assert_eq!(meta.schema_fingerprint, snap.fingerprint().unwrap());
    }

    #[test]
    fn test_stale_metadata_is_recomputed() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let first = snapshot(&["a"]);
        let second = snapshot(&["a", "b"]);
        store.write_latest(&first).unwrap();
        let stale = fs::read(store.layout("github").latest_meta()).unwrap();
        store.write_latest(&second).unwrap();
        // Crash between the two renames: new snapshot, old metadata.
        fs::write(store.layout("github").latest_meta(), stale).unwrap();

        let committed = store.read_latest("github").unwrap().unwrap();
        assert_eq!(committed.snapshot, second);
        assert_eq!(
            committed.metadata.schema_fingerprint,
            second.fingerprint().unwrap()
        );
        assert_eq!(committed.metadata.operation_count, 2);
        assert!(
            store
                .matches_latest("github", &second.fingerprint().unwrap())
                .unwrap()
        );
    }

    #[test]
    fn test_failed_write_leaves_no_partial_file() {
        let dir = TempDir::new().unwrap();
        let err = write_new_with(dir.path(), "stamp", "json", |file| {
            file.write_all(b"{ half")?;
            Err(std::io::Error::other("disk full"))
        })
        .unwrap_err();

        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        let path = write_new(dir.path(), "stamp", "json", b"{}").unwrap();
        assert!(path.ends_with("stamp.json"));
    }

    #[test]
    fn test_corrupt_latest_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let layout = store.layout("github");
        fs::create_dir_all(layout.dir()).unwrap();
        fs::write(layout.latest(), b"{ nope").unwrap();
        assert!(matches!(
            store.read_latest("github"),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_write_report() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let report = ChangeReport {
            service_name: "github".to_string(),
            old_version: None,
            new_version: Fingerprint::compute(b"v1"),
            retrieved_at: chrono::Utc::now(),
            diff: DiffResult::default(),
        };
        let path = store.write_report(&report).unwrap();
        assert!(path.starts_with(store.layout("github").reports_dir()));
        assert!(fs::read_to_string(path).unwrap().contains("# Schema changes: github"));
    }
}
