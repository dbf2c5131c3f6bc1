//! Per-workspace wiring: connector, cache, coordinator.

use crate::cache::{FetchError, ModelFetcher, ProjectModelCache};
use crate::client::BuildClient;
use crate::config::Preferences;
use crate::coordinator::ExecutionCoordinator;
use girder_bsp as bsp;
use girder_core::Diagnostic;
use girder_gradle::{
    CancellationToken, EventSink, GradleConnector, GradleLauncher, NativeBuildModel,
    OperationRequest, OperationStatus, TaskProgressEvent, TaskState, Tooling,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Workspace {
    pub root: PathBuf,
    pub preferences: Preferences,
    pub cache: Arc<ProjectModelCache>,
    pub coordinator: ExecutionCoordinator,
}

impl Workspace {
    pub fn new(root: PathBuf, preferences: Preferences, client: BuildClient) -> Self {
        let launcher = GradleLauncher::new(preferences.launcher_config());
        Self::with_tooling(root, Arc::new(launcher), preferences, client)
    }

    /// Same wiring with a substituted build tool; this is how tests drive the
    /// whole server against a scripted Gradle.
    pub fn with_tooling(
        root: PathBuf,
        tooling: Arc<dyn Tooling>,
        preferences: Preferences,
        client: BuildClient,
    ) -> Self {
        let connector = GradleConnector::new(tooling);
        let fetcher = Arc::new(ConnectorFetcher {
            connector: connector.clone(),
            client: client.clone(),
        });
        let cache = Arc::new(ProjectModelCache::new(fetcher));
        let coordinator = ExecutionCoordinator::new(
            root.clone(),
            connector,
            cache.clone(),
            client,
            preferences.clone(),
        );
        Self {
            root,
            preferences,
            cache,
            coordinator,
        }
    }
}

/// Model fetches go through the connector like any other operation, so they
/// queue behind builds on the same root instead of racing them.
struct ConnectorFetcher {
    connector: GradleConnector,
    client: BuildClient,
}

impl ModelFetcher for ConnectorFetcher {
    fn fetch(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<NativeBuildModel, FetchError> {
        let sink: Arc<dyn EventSink> = Arc::new(ModelFetchSink {
            client: self.client.clone(),
        });
        let handle = self.connector.execute(
            root,
            OperationRequest::model_fetch(),
            sink,
            cancel.clone(),
        );
        let outcome = handle.wait();
        match outcome.status {
            OperationStatus::Succeeded => outcome.model.ok_or_else(|| FetchError {
                message: "build tool returned no model".to_string(),
                retryable: false,
            }),
            OperationStatus::Cancelled => Err(FetchError {
                message: "model fetch cancelled".to_string(),
                retryable: false,
            }),
            OperationStatus::Failed => Err(FetchError {
                message: outcome
                    .error
                    .unwrap_or_else(|| "model fetch failed".to_string()),
                retryable: false,
            }),
            OperationStatus::ConnectionLost => Err(FetchError {
                message: outcome
                    .error
                    .unwrap_or_else(|| "build tool connection lost".to_string()),
                retryable: true,
            }),
        }
    }
}

/// Sink for model fetches: there is no snapshot to attribute against yet, so
/// task lifecycle is forwarded plainly and stray output becomes log lines.
struct ModelFetchSink {
    client: BuildClient,
}

impl EventSink for ModelFetchSink {
    fn task_event(&self, event: TaskProgressEvent) {
        let task_id = bsp::TaskId {
            id: event.task.clone(),
            parents: Vec::new(),
        };
        match event.state {
            TaskState::Started => self.client.task_start(bsp::TaskStartParams {
                task_id,
                origin_id: None,
                event_time: None,
                message: Some(event.task),
            }),
            TaskState::Progress => self.client.task_progress(bsp::TaskProgressParams {
                task_id,
                origin_id: None,
                message: event.message,
            }),
            TaskState::Finished => self.client.task_finish(bsp::TaskFinishParams {
                task_id,
                origin_id: None,
                event_time: None,
                message: event.message,
                status: bsp::StatusCode::Ok,
            }),
        }
    }

    fn diagnostic(&self, diagnostic: Diagnostic) {
        self.client.log_message(
            bsp::MESSAGE_TYPE_WARNING,
            format!("{}: {}", diagnostic.file.display(), diagnostic.message),
        );
    }

    fn log(&self, message: &str) {
        self.client.log_message(bsp::MESSAGE_TYPE_LOG, message);
    }
}
