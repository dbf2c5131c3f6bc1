//! The build execution coordinator.
//!
//! Validates requests against the current snapshot, batches targets into the
//! minimum number of Gradle invocations, and maps streamed tool events onto
//! BSP notifications: task progress correlated by origin id, diagnostics
//! attributed to targets by source-root matching.

use crate::cache::{FetchError, ProjectModelCache};
use crate::client::BuildClient;
use crate::config::Preferences;
use crate::convert;
use girder_bsp::{self as bsp, StatusCode};
use girder_core::Diagnostic;
use girder_gradle::{
    CancellationToken, EventSink, GradleConnector, OperationKind, OperationRequest,
    OperationStatus, TaskProgressEvent, TaskState, ToolStatus,
};
use girder_model::{BuildTarget, BuildTargetId, ProjectModelSnapshot};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Synthetic bucket for diagnostics in files outside every known source
/// root. They are reported rather than dropped.
pub const UNMAPPED_TARGET_URI: &str = "girder:/unmapped";

/// Malformed client requests, rejected synchronously before any build tool
/// invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("unknown build target: {0}")]
    UnknownTarget(String),

    #[error("build target {target} does not support {capability}")]
    UnsupportedCapability {
        target: String,
        capability: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Client(#[from] RequestError),

    #[error(transparent)]
    Model(#[from] FetchError),

    /// The connection to the build tool broke. Retryable; reported
    /// workspace-wide since every pending operation on the root is affected.
    #[error("build tool connection lost: {0}")]
    Connection(String),
}

#[derive(Clone)]
pub struct ExecutionCoordinator {
    root: PathBuf,
    connector: GradleConnector,
    cache: Arc<ProjectModelCache>,
    client: BuildClient,
    preferences: Preferences,
}

impl ExecutionCoordinator {
    pub fn new(
        root: PathBuf,
        connector: GradleConnector,
        cache: Arc<ProjectModelCache>,
        client: BuildClient,
        preferences: Preferences,
    ) -> Self {
        Self {
            root,
            connector,
            cache,
            client,
            preferences,
        }
    }

    pub fn compile(
        &self,
        params: &bsp::CompileParams,
        cancel: &CancellationToken,
    ) -> Result<StatusCode, CoordinatorError> {
        let status = self.run_batches(
            OperationKind::Compile,
            &params.targets,
            params.origin_id.as_deref(),
            params.arguments.clone(),
            "compile",
            |target| target.capabilities.can_compile,
            |target| target.classes_task.clone(),
            cancel,
        )?;

        // Compilation can create generated source roots (annotation
        // processing, protobuf); refresh the model in the background so the
        // next buildTargets call sees them.
        if self.preferences.reload_after_compile && status != StatusCode::Cancelled {
            self.spawn_background_reload();
        }

        Ok(status)
    }

    pub fn test(
        &self,
        params: &bsp::TestParams,
        cancel: &CancellationToken,
    ) -> Result<StatusCode, CoordinatorError> {
        let mut args = Vec::new();
        for class in params.test_classes() {
            args.push("--tests".to_string());
            args.push(class);
        }
        args.extend(params.arguments.iter().cloned());

        self.run_batches(
            OperationKind::Test,
            &params.targets,
            params.origin_id.as_deref(),
            args,
            "test",
            |target| target.capabilities.can_test,
            |target| target.test_task.clone(),
            cancel,
        )
    }

    pub fn run(
        &self,
        params: &bsp::RunParams,
        cancel: &CancellationToken,
    ) -> Result<StatusCode, CoordinatorError> {
        let args = if params.arguments.is_empty() {
            Vec::new()
        } else {
            vec![format!("--args={}", params.arguments.join(" "))]
        };

        self.run_batches(
            OperationKind::Run,
            std::slice::from_ref(&params.target),
            params.origin_id.as_deref(),
            args,
            "run",
            |target| target.capabilities.can_run,
            |target| target.run_task.clone(),
            cancel,
        )
    }

    pub fn clean(
        &self,
        params: &bsp::CleanCacheParams,
        cancel: &CancellationToken,
    ) -> Result<StatusCode, CoordinatorError> {
        self.run_batches(
            OperationKind::Clean,
            &params.targets,
            None,
            Vec::new(),
            "clean",
            |target| target.clean_task.is_some(),
            |target| target.clean_task.clone(),
            cancel,
        )
    }

    /// Validate, batch by root project directory, and execute. One Gradle
    /// invocation per group; groups run sequentially and stop at the first
    /// failure, like the tool itself would.
    #[allow(clippy::too_many_arguments)]
    fn run_batches(
        &self,
        kind: OperationKind,
        targets: &[bsp::BuildTargetIdentifier],
        origin_id: Option<&str>,
        args: Vec<String>,
        capability: &'static str,
        supports: impl Fn(&BuildTarget) -> bool,
        task_of: impl Fn(&BuildTarget) -> Option<String>,
        cancel: &CancellationToken,
    ) -> Result<StatusCode, CoordinatorError> {
        if targets.is_empty() {
            return Ok(StatusCode::Ok);
        }

        let snapshot = self.cache.snapshot(&self.root, false, cancel)?;

        // Synchronous validation: nothing reaches Gradle unless every
        // requested target exists and supports the operation.
        let mut groups: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
        for id in targets {
            let target_id = BuildTargetId::from_uri(id.uri.clone());
            let target = snapshot
                .target(&target_id)
                .ok_or_else(|| RequestError::UnknownTarget(id.uri.clone()))?;
            if !supports(target) {
                return Err(RequestError::UnsupportedCapability {
                    target: id.uri.clone(),
                    capability,
                }
                .into());
            }
            let task = task_of(target).ok_or(RequestError::UnsupportedCapability {
                target: id.uri.clone(),
                capability,
            })?;

            let tasks = groups.entry(target.base_directory.clone()).or_default();
            // Some tasks are shared between source sets (`clean`); dedupe so
            // the invocation stays minimal.
            if !tasks.contains(&task) {
                tasks.push(task);
            }
        }

        let sink: Arc<dyn EventSink> = Arc::new(CoordinatorSink::new(
            self.client.clone(),
            origin_id.map(String::from),
            snapshot.clone(),
        ));

        let mut status = StatusCode::Ok;
        for (dir, tasks) in groups {
            if cancel.is_cancelled() {
                status = StatusCode::Cancelled;
                break;
            }

            let handle = self.connector.execute(
                &dir,
                OperationRequest::tasks(kind, tasks, args.clone()),
                sink.clone(),
                cancel.clone(),
            );
            let outcome = handle.wait();
            match outcome.status {
                OperationStatus::Succeeded => {}
                OperationStatus::Failed => {
                    status = StatusCode::Error;
                    break;
                }
                OperationStatus::Cancelled => {
                    status = StatusCode::Cancelled;
                    break;
                }
                OperationStatus::ConnectionLost => {
                    let message = outcome
                        .error
                        .unwrap_or_else(|| "build tool connection lost".to_string());
                    // Affects every pending operation on this root; tell the
                    // whole workspace, not just this request.
                    self.client.log_message(
                        bsp::MESSAGE_TYPE_ERROR,
                        format!("gradle connection lost, retry the request: {message}"),
                    );
                    return Err(CoordinatorError::Connection(message));
                }
            }
        }

        Ok(status)
    }

    fn spawn_background_reload(&self) {
        let cache = self.cache.clone();
        let client = self.client.clone();
        let root = self.root.clone();
        let notify = self.preferences.notify_target_changes;
        std::thread::Builder::new()
            .name("girder-reload".to_string())
            .spawn(move || {
                match cache.refresh(&root, &CancellationToken::new()) {
                    Ok((_, diff)) => {
                        if notify && !diff.is_empty() {
                            client.did_change_build_target(crate::handlers::diff_to_wire(&diff));
                        }
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "post-compile model refresh failed");
                    }
                }
            })
            .expect("failed to spawn reload thread");
    }
}

/// Maps streamed tool events onto client notifications for one operation.
struct CoordinatorSink {
    client: BuildClient,
    origin_id: Option<String>,
    snapshot: Arc<ProjectModelSnapshot>,
    state: Mutex<SinkState>,
}

#[derive(Default)]
struct SinkState {
    /// Last state forwarded per task id; rapid duplicates are dropped so
    /// event volume stays bounded.
    last_state: HashMap<String, TaskState>,
    /// (file uri, target uri) pairs already published in this operation; the
    /// first publication per pair resets the client's slate.
    published: HashSet<(String, String)>,
}

impl CoordinatorSink {
    fn new(
        client: BuildClient,
        origin_id: Option<String>,
        snapshot: Arc<ProjectModelSnapshot>,
    ) -> Self {
        Self {
            client,
            origin_id,
            snapshot,
            state: Mutex::new(SinkState::default()),
        }
    }

    fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0)
    }
}

impl EventSink for CoordinatorSink {
    fn task_event(&self, event: TaskProgressEvent) {
        {
            let mut state = self.state.lock().expect("sink lock poisoned");
            if state.last_state.get(&event.task) == Some(&event.state) {
                return;
            }
            state.last_state.insert(event.task.clone(), event.state);
        }

        let task_id = bsp::TaskId {
            id: event.task.clone(),
            parents: Vec::new(),
        };
        match event.state {
            TaskState::Started => self.client.task_start(bsp::TaskStartParams {
                task_id,
                origin_id: self.origin_id.clone(),
                event_time: Some(Self::now_millis()),
                message: Some(event.task),
            }),
            TaskState::Progress => self.client.task_progress(bsp::TaskProgressParams {
                task_id,
                origin_id: self.origin_id.clone(),
                message: event.message,
            }),
            TaskState::Finished => self.client.task_finish(bsp::TaskFinishParams {
                task_id,
                origin_id: self.origin_id.clone(),
                event_time: Some(Self::now_millis()),
                message: event.message,
                status: match event.status {
                    Some(ToolStatus::Ok) | None => StatusCode::Ok,
                    Some(ToolStatus::Failed) => StatusCode::Error,
                    Some(ToolStatus::Cancelled) => StatusCode::Cancelled,
                },
            }),
        }
    }

    fn diagnostic(&self, diagnostic: Diagnostic) {
        let target_uri = self
            .snapshot
            .owner_of(&diagnostic.file)
            .map(|id| id.as_uri().to_string())
            .unwrap_or_else(|| UNMAPPED_TARGET_URI.to_string());
        let file_uri = convert::path_uri(&diagnostic.file);

        let reset = {
            let mut state = self.state.lock().expect("sink lock poisoned");
            state
                .published
                .insert((file_uri.clone(), target_uri.clone()))
        };

        self.client.publish_diagnostics(bsp::PublishDiagnosticsParams {
            text_document: bsp::TextDocumentIdentifier { uri: file_uri },
            build_target: bsp::BuildTargetIdentifier::new(target_uri),
            origin_id: self.origin_id.clone(),
            diagnostics: vec![convert::diagnostic_to_wire(&diagnostic)],
            reset,
        });
    }

    fn log(&self, message: &str) {
        self.client.notify(
            bsp::methods::LOG_MESSAGE,
            bsp::LogMessageParams {
                message_type: bsp::MESSAGE_TYPE_LOG,
                origin_id: self.origin_id.clone(),
                message: message.to_string(),
            },
        );
    }
}
