//! `toolsync status`: committed state per service, read from the store only.

use toolsync_storage::{SnapshotStore, StoreResult};
use toolsync_sync::ToolsyncConfig;

/// One line per configured service
///
/// # Errors
///
/// Returns error if committed state exists but cannot be read
pub fn render_status(config: &ToolsyncConfig) -> StoreResult<String> {
    let store = SnapshotStore::new(&config.state_dir);
    let width = config.servers.keys().map(String::len).max().unwrap_or(0);
    let mut out = String::new();

    for service in config.services() {
        let line = match store.read_metadata(&service.name)? {
            Some(meta) => format!(
                "{:<width$}  {}  {}  {} operations, {} snapshots",
                service.name,
                meta.schema_fingerprint.short(),
                meta.retrieved_at.format("%Y-%m-%d %H:%M:%SZ"),
                meta.operation_count,
                store.history(&service.name)?.len(),
                width = width
            ),
            None => format!("{:<width$}  not synced", service.name, width = width),
        };
        out.push_str(&line);
        out.push('\n');
    }
    if config.servers.is_empty() {
        out.push_str("no servers configured\n");
    }
    Ok(out)
}
