//! The sync orchestrator.
//!
//! Services are processed one at a time in configuration order. Each one
//! ends in exactly one outcome; nothing a service does can stop the run.
//! In sync mode, breaking changes that need a human are staged in memory
//! and confirmed once, after every service has been attempted. Shared
//! outputs (catalog, top-level index) are rewritten when at least one
//! service succeeded.
//!
//! A service's sources are generated before its snapshot is committed. If
//! either step fails the previous snapshot stays current, so the next check
//! still reports the service as drifted.

use crate::config::{ConfigError, ToolsyncConfig};
use crate::confirm::{BreakingChange, ConfirmationPort, ConfirmationRequest, Deny};
use crate::options::{RunMode, RunOptions};
use crate::outcome::{ServiceOutcome, ServiceResult, SyncReport};
use std::sync::Arc;
use toolsync_codegen::{ArtifactWriter, ServiceArtifacts, generate_service};
use toolsync_schema::{ChangeReport, DiffEngine, DiffResult, IntrospectionSnapshot};
use toolsync_storage::SnapshotStore;
use toolsync_transport::{
    Connector, CredentialResolver, EnvSource, Introspector, PoolRegistry, ServiceConfig,
};

/// Run-level failures. Per-service problems are outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `--server` named a service that is not configured
    #[error("Unknown service '{name}'; configured: {known}")]
    UnknownService {
        /// Requested name
        name: String,
        /// Configured names, comma separated
        known: String,
    },
}

/// A breaking snapshot waiting for confirmation
struct StagedCommit {
    index: usize,
    snapshot: IntrospectionSnapshot,
}

enum Processed {
    Done(ServiceResult),
    Staged(ServiceResult, IntrospectionSnapshot),
}

/// Drives introspection, diffing, commit and generation across services
pub struct SyncOrchestrator {
    services: Vec<ServiceConfig>,
    introspector: Introspector,
    resolver: CredentialResolver,
    store: SnapshotStore,
    writer: ArtifactWriter,
    confirmation: Arc<dyn ConfirmationPort>,
    engine: DiffEngine,
}

impl SyncOrchestrator {
    /// Create an orchestrator. Breaking changes are rejected until a
    /// confirmation port is supplied.
    #[must_use]
    pub fn new(
        services: Vec<ServiceConfig>,
        introspector: Introspector,
        resolver: CredentialResolver,
        store: SnapshotStore,
        writer: ArtifactWriter,
    ) -> Self {
        Self {
            services,
            introspector,
            resolver,
            store,
            writer,
            confirmation: Arc::new(Deny),
            engine: DiffEngine::new(),
        }
    }

    /// Build every collaborator from a configuration
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid
    pub fn from_config(
        config: &ToolsyncConfig,
        env: Arc<dyn EnvSource>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let pool = Arc::new(PoolRegistry::new(config.pool_config()));
        let introspector = Introspector::new(config.selector(), Arc::clone(&env), connector, pool);
        Ok(Self::new(
            config.services(),
            introspector,
            CredentialResolver::new(env),
            SnapshotStore::new(&config.state_dir),
            ArtifactWriter::new(&config.output_dir),
        ))
    }

    /// Set the port asked to confirm breaking changes
    #[must_use]
    pub fn with_confirmation(mut self, port: Arc<dyn ConfirmationPort>) -> Self {
        self.confirmation = port;
        self
    }

    /// Connection pool shared by every service in a run
    #[must_use]
    pub fn pool(&self) -> &Arc<PoolRegistry> {
        self.introspector.pool()
    }

    /// Configured services
    #[must_use]
    pub fn services(&self) -> &[ServiceConfig] {
        &self.services
    }

    /// Snapshot store
    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Introspector, for callers that borrow connections directly
    #[must_use]
    pub fn introspector(&self) -> &Introspector {
        &self.introspector
    }

    /// Credential resolver
    #[must_use]
    pub fn resolver(&self) -> &CredentialResolver {
        &self.resolver
    }

    /// Look up one configured service
    ///
    /// # Errors
    ///
    /// Returns `UnknownService` if no service has that name
    pub fn service(&self, name: &str) -> Result<&ServiceConfig, SyncError> {
        self.services
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SyncError::UnknownService {
                name: name.to_string(),
                known: self
                    .services
                    .iter()
                    .map(|s| s.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    fn targets(&self, only: Option<&str>) -> Result<Vec<&ServiceConfig>, SyncError> {
        match only {
            Some(name) => Ok(vec![self.service(name)?]),
            None => Ok(self.services.iter().collect()),
        }
    }

    /// Run the pipeline once over the configured services (or one of them).
    ///
    /// The pool is drained before returning.
    ///
    /// # Errors
    ///
    /// Returns `UnknownService` if `options.only` names no configured service
    pub async fn run(&self, options: &RunOptions) -> Result<SyncReport, SyncError> {
        let targets = self.targets(options.only.as_deref())?;
        tracing::info!(mode = ?options.mode, services = targets.len(), "starting run");

        let mut report = SyncReport::new(options.mode);
        let mut staged = Vec::new();
        let mut generated = Vec::new();

        for service in targets {
            match self.process(service, options, &mut generated).await {
                Processed::Done(result) => report.results.push(result),
                Processed::Staged(result, snapshot) => {
                    staged.push(StagedCommit {
                        index: report.results.len(),
                        snapshot,
                    });
                    report.results.push(result);
                }
            }
        }

        if !staged.is_empty() {
            self.confirm_staged(staged, &mut report, &mut generated).await;
        }

        if options.mode == RunMode::Sync
            && report.succeeded() > 0
            && let Err(e) = self.writer.finalize(&generated)
        {
            tracing::error!(error = %e, "failed to write shared outputs");
            report.finalize_error = Some(e.to_string());
        }

        if report.succeeded() == 0 && report.failed() == 0 && report.skipped() > 0 {
            tracing::warn!("every service was skipped; nothing was synchronized");
        }

        self.pool().close_all().await;
        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            "run finished"
        );
        Ok(report)
    }

    async fn process(
        &self,
        service: &ServiceConfig,
        options: &RunOptions,
        generated: &mut Vec<ServiceArtifacts>,
    ) -> Processed {
        let name = service.name.as_str();
        let credential = self.resolver.resolve(service.auth.as_ref());
        if let Some(var) = credential.missing_var() {
            if options.skip_missing_auth {
                tracing::info!(service = %name, var = %var, "skipping service: credential missing");
                return Processed::Done(ServiceResult::new(
                    name,
                    ServiceOutcome::Skipped(format!("missing credential: {}", var)),
                ));
            }
            tracing::warn!(
                service = %name,
                var = %var,
                "credential missing; connecting without it"
            );
        }

        let snapshot = match self.introspector.introspect(service, &credential).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    service = %name,
                    stage = %e.stage,
                    kind = ?e.kind,
                    error = %e,
                    "introspection failed"
                );
                let reason = match service.credential_env_var() {
                    Some(var) if e.is_authentication() => format!("{} (check {})", e, var),
                    _ => e.to_string(),
                };
                return Processed::Done(failed(name, reason));
            }
        };

        let fingerprint = match snapshot.fingerprint() {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                let reason = format!("failed to fingerprint snapshot: {}", e);
                return Processed::Done(failed(name, reason));
            }
        };
        let committed = match self.store.read_latest(name) {
            Ok(committed) => committed,
            Err(e) => {
                let reason = format!("failed to read committed snapshot: {}", e);
                return Processed::Done(failed(name, reason));
            }
        };

        let mut result = ServiceResult::new(name, ServiceOutcome::Succeeded);
        result.current = Some(fingerprint);
        result.previous = committed.as_ref().map(|c| c.metadata.schema_fingerprint);
        let unchanged = result.previous == Some(fingerprint);
        let diff = committed
            .as_ref()
            .map(|c| self.engine.diff(&c.snapshot, &snapshot));

        if options.mode == RunMode::Check {
            if !unchanged {
                tracing::info!(
                    service = %name,
                    fingerprint = %fingerprint.short(),
                    "drift detected"
                );
            }
            result.drift = Some(!unchanged);
            result.diff = diff;
            return Processed::Done(result);
        }

        // An unchanged service keeps its committed listing order so the
        // regenerated output stays byte-identical.
        if unchanged && let Some(committed) = committed {
            tracing::debug!(service = %name, "schema unchanged");
            result.diff = Some(DiffResult::default());
            let refreshed = IntrospectionSnapshot {
                operations: committed.snapshot.operations,
                ..snapshot
            };
            self.commit(&refreshed, &mut result, generated);
            return Processed::Done(result);
        }

        result.diff = diff;
        if result.is_breaking() && options.requires_confirmation() {
            tracing::info!(service = %name, "breaking changes staged for confirmation");
            result.outcome = ServiceOutcome::Skipped("awaiting confirmation".to_string());
            return Processed::Staged(result, snapshot);
        }
        if result.is_breaking() {
            tracing::warn!(service = %name, "accepting breaking changes without confirmation");
        }

        self.commit(&snapshot, &mut result, generated);
        Processed::Done(result)
    }

    async fn confirm_staged(
        &self,
        staged: Vec<StagedCommit>,
        report: &mut SyncReport,
        generated: &mut Vec<ServiceArtifacts>,
    ) {
        let mut request = ConfirmationRequest::default();
        for commit in &staged {
            let Some(result) = report.results.get(commit.index) else {
                continue;
            };
            let Some(new_version) = result.current else {
                continue;
            };
            request.services.push(result.service.clone());
            if let Some(diff) = &result.diff {
                request
                    .changes
                    .extend(diff.breaking_changes().into_iter().map(|change| BreakingChange {
                        service: result.service.clone(),
                        old_version: result.previous,
                        new_version,
                        change: change.clone(),
                    }));
            }
        }

        let approved = self.confirmation.confirm(&request).await;
        tracing::info!(
            approved,
            services = request.services.len(),
            changes = request.changes.len(),
            "breaking change confirmation"
        );

        for commit in staged {
            let Some(result) = report.results.get_mut(commit.index) else {
                continue;
            };
            if approved {
                result.outcome = ServiceOutcome::Succeeded;
                self.commit(&commit.snapshot, result, generated);
            } else {
                result.outcome = ServiceOutcome::Failed("breaking changes rejected".to_string());
            }
        }
        if !approved {
            report.rejected = true;
        }
    }

    fn commit(
        &self,
        snapshot: &IntrospectionSnapshot,
        result: &mut ServiceResult,
        generated: &mut Vec<ServiceArtifacts>,
    ) {
        let artifacts = generate_service(snapshot);
        if let Err(e) = self.writer.write_service(&artifacts) {
            tracing::warn!(service = %snapshot.service_name, error = %e, "codegen failed");
            result.outcome =
                ServiceOutcome::Failed(format!("failed to write generated sources: {}", e));
            return;
        }

        let metadata = match self.store.write_latest(snapshot) {
            Ok(metadata) => metadata,
            Err(e) => {
                result.outcome =
                    ServiceOutcome::Failed(format!("failed to commit snapshot: {}", e));
                return;
            }
        };

        if result.previous.is_some()
            && let Some(diff) = result.diff.as_ref().filter(|d| !d.is_empty())
        {
            let change_report = ChangeReport {
                service_name: snapshot.service_name.clone(),
                old_version: result.previous,
                new_version: metadata.schema_fingerprint,
                retrieved_at: snapshot.retrieved_at,
                diff: diff.clone(),
            };
            match self.store.write_report(&change_report) {
                Ok(path) => result.report_path = Some(path),
                Err(e) => {
                    tracing::warn!(
                        service = %snapshot.service_name,
                        error = %e,
                        "failed to write change report"
                    );
                }
            }
        }

        generated.push(artifacts);
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("services", &self.services.len())
            .field("store", &self.store.root())
            .field("output", &self.writer.root())
            .finish_non_exhaustive()
    }
}

fn failed(service: &str, reason: String) -> ServiceResult {
    ServiceResult::new(service, ServiceOutcome::Failed(reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::AutoApprove;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use toolsync_transport::{
        MapEnv, ServerSpec, ToolConnection, TransportConfig, TransportError, TransportHandle,
        TransportResult,
    };

    #[derive(Clone)]
    enum Reply {
        Tools(Vec<Value>),
        Refuse(TransportError),
    }

    #[derive(Clone, Default)]
    struct Upstream {
        replies: Arc<Mutex<HashMap<String, Reply>>>,
        connects: Arc<Mutex<Vec<String>>>,
    }

    impl Upstream {
        fn set(&self, service: &str, reply: Reply) {
            self.replies
                .lock()
                .unwrap()
                .insert(service.to_string(), reply);
        }

        fn connects(&self, service: &str) -> usize {
            self.connects
                .lock()
                .unwrap()
                .iter()
                .filter(|s| *s == service)
                .count()
        }
    }

    struct FakeConnection {
        tools: Vec<Value>,
    }

    #[async_trait]
    impl ToolConnection for FakeConnection {
        async fn list_tools(&mut self) -> TransportResult<Vec<Value>> {
            Ok(self.tools.clone())
        }

        async fn call_tool(&mut self, _name: &str, _arguments: Value) -> TransportResult<Value> {
            Ok(Value::Null)
        }

        fn is_open(&mut self) -> bool {
            true
        }

        async fn close(&mut self) -> TransportResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Connector for Upstream {
        async fn connect(
            &self,
            service: &str,
            _handle: &TransportHandle,
        ) -> TransportResult<Box<dyn ToolConnection>> {
            self.connects.lock().unwrap().push(service.to_string());
            let reply = self.replies.lock().unwrap().get(service).cloned();
            match reply {
                Some(Reply::Tools(tools)) => Ok(Box::new(FakeConnection { tools })),
                Some(Reply::Refuse(e)) => Err(e),
                None => Err(TransportError::ConnectionFailed("no such host".to_string())),
            }
        }
    }

    struct Recorder {
        answer: bool,
        requests: Mutex<Vec<ConfirmationRequest>>,
    }

    #[async_trait]
    impl ConfirmationPort for Recorder {
        async fn confirm(&self, request: &ConfirmationRequest) -> bool {
            self.requests.lock().unwrap().push(request.clone());
            self.answer
        }
    }

    fn tool(name: &str, schema: Value) -> Value {
        json!({"name": name, "description": format!("{} op", name), "inputSchema": schema})
    }

    fn simple_tools() -> Vec<Value> {
        vec![
            tool("getX", json!({"type": "object", "properties": {"id": {"type": "string"}}})),
            tool("listY", json!({"type": "object"})),
        ]
    }

    fn http(url: &str) -> ServerSpec {
        ServerSpec {
            transport: TransportConfig::http(url),
            auth: None,
        }
    }

    struct Harness {
        dir: TempDir,
        upstream: Upstream,
        config: ToolsyncConfig,
        env: MapEnv,
    }

    impl Harness {
        fn new(names: &[&str]) -> Self {
            let dir = TempDir::new().unwrap();
            let mut config = ToolsyncConfig::new()
                .with_dirs(dir.path().join("generated"), dir.path().join("state"));
            for name in names {
                config = config.with_server(*name, http(&format!("https://{}.test/mcp", name)));
            }
            Self {
                dir,
                upstream: Upstream::default(),
                config,
                env: MapEnv::new(),
            }
        }

        fn orchestrator(&self) -> SyncOrchestrator {
            SyncOrchestrator::from_config(
                &self.config,
                Arc::new(self.env.clone()),
                Arc::new(self.upstream.clone()),
            )
            .unwrap()
        }

        fn output(&self) -> std::path::PathBuf {
            self.dir.path().join("generated")
        }

        fn store(&self) -> SnapshotStore {
            SnapshotStore::new(self.dir.path().join("state"))
        }
    }

    fn read_tree(root: &Path) -> Vec<(String, String)> {
        let mut files = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    files.push((
                        path.strip_prefix(root).unwrap().display().to_string(),
                        fs::read_to_string(&path).unwrap(),
                    ));
                }
            }
        }
        files.sort();
        files
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let h = Harness::new(&["alpha", "beta", "gamma"]);
        h.upstream.set("alpha", Reply::Tools(simple_tools()));
        h.upstream.set(
            "beta",
            Reply::Refuse(TransportError::ConnectionFailed("connection refused".to_string())),
        );
        h.upstream.set("gamma", Reply::Tools(simple_tools()));

        let report = h.orchestrator().run(&RunOptions::sync()).await.unwrap();

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.exit_code(), 0);
        match &report.result("beta").unwrap().outcome {
            ServiceOutcome::Failed(reason) => {
                assert!(reason.starts_with("failed to connect to beta"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let store = h.store();
        assert!(store.read_latest("alpha").unwrap().is_some());
        assert!(store.read_latest("beta").unwrap().is_none());
        assert!(store.read_latest("gamma").unwrap().is_some());
        assert!(h.output().join("alpha").join("getX.ts").exists());
        assert!(h.output().join("gamma").join("index.ts").exists());
        assert!(!h.output().join("beta").exists());

        let index = fs::read_to_string(h.output().join("index.ts")).unwrap();
        assert!(index.contains("./alpha/index.js"));
        assert!(!index.contains("./beta/index.js"));
    }

    #[tokio::test]
    async fn test_missing_credential_is_skipped_without_connecting() {
        let mut h = Harness::new(&["open"]);
        h.config = h.config.with_server(
            "locked",
            ServerSpec {
                transport: TransportConfig::http("https://locked.test/mcp"),
                auth: Some(toolsync_transport::AuthConfig::Bearer {
                    credential_env_var: "TOKEN".to_string(),
                }),
            },
        );
        h.upstream.set("open", Reply::Tools(simple_tools()));
        h.upstream.set("locked", Reply::Tools(simple_tools()));

        let options = RunOptions::sync().with_skip_missing_auth(true);
        let report = h.orchestrator().run(&options).await.unwrap();

        assert_eq!(
            report.result("locked").unwrap().outcome,
            ServiceOutcome::Skipped("missing credential: TOKEN".to_string())
        );
        assert_eq!(h.upstream.connects("locked"), 0);
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_authentication_failure_names_variable() {
        let mut h = Harness::new(&[]);
        h.config = h.config.with_server(
            "locked",
            ServerSpec {
                transport: TransportConfig::http("https://locked.test/mcp"),
                auth: Some(toolsync_transport::AuthConfig::Bearer {
                    credential_env_var: "TOKEN".to_string(),
                }),
            },
        );
        h.env = MapEnv::new().with("TOKEN", "stale");
        h.upstream.set(
            "locked",
            Reply::Refuse(TransportError::Http {
                status: 401,
                message: "Unauthorized".to_string(),
            }),
        );

        let report = h.orchestrator().run(&RunOptions::sync()).await.unwrap();
        match &report.result("locked").unwrap().outcome {
            ServiceOutcome::Failed(reason) => assert!(reason.ends_with("(check TOKEN)")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_resync_is_idempotent_and_check_is_clean() {
        let h = Harness::new(&["svc"]);
        h.upstream.set("svc", Reply::Tools(simple_tools()));

        h.orchestrator().run(&RunOptions::sync()).await.unwrap();
        let first = read_tree(&h.output());

        // Same operations in a different order: same fingerprint.
        let mut reordered = simple_tools();
        reordered.reverse();
        h.upstream.set("svc", Reply::Tools(reordered));
        let report = h.orchestrator().run(&RunOptions::sync()).await.unwrap();
        let second = read_tree(&h.output());

        assert_eq!(first, second);
        assert!(report.result("svc").unwrap().report_path.is_none());
        assert!(!h.store().layout("svc").reports_dir().exists());

        // Every successful sync commits a snapshot, even an unchanged one.
        let history = h.store().history("svc").unwrap();
        assert_eq!(history.len(), 2);
        let latest = h.store().read_latest("svc").unwrap().unwrap();
        let oldest: IntrospectionSnapshot =
            serde_json::from_slice(&fs::read(&history[0]).unwrap()).unwrap();
        assert_eq!(latest.snapshot.operations, oldest.operations);
        assert!(latest.snapshot.retrieved_at >= oldest.retrieved_at);

        let check = h.orchestrator().run(&RunOptions::check()).await.unwrap();
        assert_eq!(check.result("svc").unwrap().drift, Some(false));
        assert_eq!(check.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_check_reports_drift_without_writing() {
        let h = Harness::new(&["svc"]);
        h.upstream.set("svc", Reply::Tools(simple_tools()));
        h.orchestrator().run(&RunOptions::sync()).await.unwrap();
        let before = read_tree(h.dir.path());

        let mut tools = simple_tools();
        tools.push(tool("createZ", json!({"type": "object"})));
        h.upstream.set("svc", Reply::Tools(tools));
        let report = h.orchestrator().run(&RunOptions::check()).await.unwrap();

        assert_eq!(report.drifted(), vec!["svc"]);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(read_tree(h.dir.path()), before);
    }

    #[tokio::test]
    async fn test_breaking_change_scenario_is_reported() {
        let h = Harness::new(&["S"]);
        h.upstream.set("S", Reply::Tools(simple_tools()));
        h.orchestrator().run(&RunOptions::sync()).await.unwrap();

        h.upstream.set(
            "S",
            Reply::Tools(vec![
                tool(
                    "getX",
                    json!({
                        "type": "object",
                        "properties": {"id": {"type": "string"}, "scope": {"type": "string"}},
                        "required": ["scope"]
                    }),
                ),
                tool("listY", json!({"type": "object"})),
                tool("createZ", json!({"type": "object"})),
            ]),
        );
        let report = h.orchestrator().run(&RunOptions::sync()).await.unwrap();
        let result = report.result("S").unwrap();

        assert_eq!(result.outcome, ServiceOutcome::Succeeded);
        let diff = result.diff.as_ref().unwrap();
        assert!(diff.breaking);
        assert_eq!(diff.changes.len(), 2);
        assert_eq!(diff.changes[0].operation(), "getX");
        assert_eq!(diff.changes[1].operation(), "createZ");

        let path = result.report_path.as_ref().unwrap();
        assert!(fs::read_to_string(path).unwrap().contains("**breaking**"));
        assert!(h.output().join("s").join("createZ.ts").exists());
        assert_eq!(h.store().history("S").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_confirmation_keeps_previous_snapshot() {
        let h = Harness::new(&["stable", "shifty"]);
        h.upstream.set("stable", Reply::Tools(simple_tools()));
        h.upstream.set("shifty", Reply::Tools(simple_tools()));
        h.orchestrator().run(&RunOptions::sync()).await.unwrap();
        let committed = h.store().read_metadata("shifty").unwrap().unwrap();

        // stable gains an operation (safe), shifty loses one (breaking)
        let mut grown = simple_tools();
        grown.push(tool("createZ", json!({"type": "object"})));
        h.upstream.set("stable", Reply::Tools(grown));
        let get_x = tool(
            "getX",
            json!({"type": "object", "properties": {"id": {"type": "string"}}}),
        );
        h.upstream.set("shifty", Reply::Tools(vec![get_x]));

        let port = Arc::new(Recorder {
            answer: false,
            requests: Mutex::new(Vec::new()),
        });
        let options = RunOptions::sync().with_interactive(true);
        let report = h
            .orchestrator()
            .with_confirmation(port.clone())
            .run(&options)
            .await
            .unwrap();

        let requests = port.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].services, vec!["shifty".to_string()]);
        assert_eq!(requests[0].changes.len(), 1);
        assert_eq!(requests[0].changes[0].old_version, Some(committed.schema_fingerprint));

        assert!(report.rejected);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.result("stable").unwrap().outcome, ServiceOutcome::Succeeded);
        assert_eq!(
            report.result("shifty").unwrap().outcome,
            ServiceOutcome::Failed("breaking changes rejected".to_string())
        );
        assert_eq!(
            h.store().read_metadata("shifty").unwrap().unwrap().schema_fingerprint,
            committed.schema_fingerprint
        );
        assert!(h.output().join("shifty").join("listY.ts").exists());
        assert!(h.output().join("stable").join("createZ.ts").exists());
    }

    #[tokio::test]
    async fn test_codegen_failure_keeps_previous_snapshot() {
        let h = Harness::new(&["svc"]);
        h.upstream.set("svc", Reply::Tools(simple_tools()));
        h.orchestrator().run(&RunOptions::sync()).await.unwrap();
        let committed = h.store().read_metadata("svc").unwrap().unwrap();

        // A file where the output directory should be makes every write fail.
        fs::remove_dir_all(h.output()).unwrap();
        fs::write(h.output(), "not a directory").unwrap();
        let mut tools = simple_tools();
        tools.push(tool("createZ", json!({"type": "object"})));
        h.upstream.set("svc", Reply::Tools(tools));

        let report = h.orchestrator().run(&RunOptions::sync()).await.unwrap();
        match &report.result("svc").unwrap().outcome {
            ServiceOutcome::Failed(reason) => {
                assert!(reason.starts_with("failed to write generated sources"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(report.exit_code(), 1);
        assert_eq!(
            h.store().read_metadata("svc").unwrap().unwrap().schema_fingerprint,
            committed.schema_fingerprint
        );
        assert_eq!(h.store().history("svc").unwrap().len(), 1);

        let check = h.orchestrator().run(&RunOptions::check()).await.unwrap();
        assert_eq!(check.result("svc").unwrap().drift, Some(true));
    }

    #[tokio::test]
    async fn test_approved_confirmation_commits() {
        let h = Harness::new(&["svc"]);
        h.upstream.set("svc", Reply::Tools(simple_tools()));
        h.orchestrator().run(&RunOptions::sync()).await.unwrap();

        h.upstream.set("svc", Reply::Tools(vec![tool("listY", json!({"type": "object"}))]));
        let options = RunOptions::sync().with_interactive(true);
        let report = h
            .orchestrator()
            .with_confirmation(Arc::new(AutoApprove))
            .run(&options)
            .await
            .unwrap();

        assert!(!report.rejected);
        assert_eq!(report.exit_code(), 0);
        assert!(report.result("svc").unwrap().is_breaking());
        assert!(!h.output().join("svc").join("getX.ts").exists());
    }

    #[tokio::test]
    async fn test_non_interactive_accepts_breaking_changes() {
        let h = Harness::new(&["svc"]);
        h.upstream.set("svc", Reply::Tools(simple_tools()));
        h.orchestrator().run(&RunOptions::sync()).await.unwrap();

        h.upstream.set("svc", Reply::Tools(vec![tool("listY", json!({"type": "object"}))]));
        // The default port denies, so reaching it would fail the run.
        let report = h.orchestrator().run(&RunOptions::sync()).await.unwrap();

        assert_eq!(report.result("svc").unwrap().outcome, ServiceOutcome::Succeeded);
        assert!(report.render().contains("breaking: removed `getX`"));
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_all_failed_exits_non_zero_and_writes_nothing_shared() {
        let h = Harness::new(&["a", "b"]);
        let report = h.orchestrator().run(&RunOptions::sync()).await.unwrap();

        assert_eq!(report.failed(), 2);
        assert_eq!(report.exit_code(), 1);
        assert!(!h.output().join("catalog.json").exists());
    }

    #[tokio::test]
    async fn test_only_restricts_run() {
        let h = Harness::new(&["a", "b"]);
        h.upstream.set("a", Reply::Tools(simple_tools()));
        h.upstream.set("b", Reply::Tools(simple_tools()));

        let report = h
            .orchestrator()
            .run(&RunOptions::sync().with_only("b"))
            .await
            .unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(h.upstream.connects("a"), 0);

        let err = h
            .orchestrator()
            .run(&RunOptions::sync().with_only("zzz"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownService { .. }));
    }

    #[tokio::test]
    async fn test_pool_drained_after_run() {
        let h = Harness::new(&["svc"]);
        h.upstream.set("svc", Reply::Tools(simple_tools()));
        let orchestrator = h.orchestrator();
        orchestrator.run(&RunOptions::sync()).await.unwrap();
        assert!(!orchestrator.pool().is_pooled("svc").await);
    }
}
