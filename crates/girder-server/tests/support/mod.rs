//! Shared fixtures: a scripted Gradle and a recording client.
#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver};
use girder_bsp::{self as bsp, Message};
use girder_core::Diagnostic;
use girder_gradle::{
    CancellationToken, EventSink, GradleError, NativeBuildModel, NativeJavaExtension,
    NativeModule, NativeModuleDependency, NativeSourceSet, TaskProgressEvent, ToolStatus,
    Tooling, ToolingSession,
};
use girder_server::BuildClient;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum ScriptedEvent {
    Task(TaskProgressEvent),
    Diagnostic(Diagnostic),
}

/// One planned `run_tasks` invocation.
#[derive(Debug, Clone)]
pub struct PlannedRun {
    pub events: Vec<ScriptedEvent>,
    pub status: ToolStatus,
    /// Emit the events, then hold the invocation open until the operation's
    /// token is cancelled.
    pub block_until_cancel: bool,
}

impl PlannedRun {
    pub fn ok() -> Self {
        Self {
            events: Vec::new(),
            status: ToolStatus::Ok,
            block_until_cancel: false,
        }
    }

    pub fn failed(events: Vec<ScriptedEvent>) -> Self {
        Self {
            events,
            status: ToolStatus::Failed,
            block_until_cancel: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRun {
    pub root: PathBuf,
    pub tasks: Vec<String>,
    pub args: Vec<String>,
}

/// Stand-in for the real Gradle launcher: returns a scripted model and plays
/// back planned runs, recording everything it was asked to do.
#[derive(Debug)]
pub struct ScriptedGradle {
    pub model: Mutex<NativeBuildModel>,
    pub plan: Mutex<VecDeque<PlannedRun>>,
    pub runs: Mutex<Vec<RecordedRun>>,
    pub model_fetches: AtomicUsize,
}

impl ScriptedGradle {
    pub fn new(model: NativeBuildModel) -> Arc<Self> {
        Arc::new(Self {
            model: Mutex::new(model),
            plan: Mutex::new(VecDeque::new()),
            runs: Mutex::new(Vec::new()),
            model_fetches: AtomicUsize::new(0),
        })
    }

    pub fn plan_run(&self, run: PlannedRun) {
        self.plan.lock().unwrap().push_back(run);
    }

    pub fn set_model(&self, model: NativeBuildModel) {
        *self.model.lock().unwrap() = model;
    }

    pub fn recorded_runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().unwrap().clone()
    }
}

/// Local newtype so we can implement the foreign `Tooling` trait for a
/// shared `ScriptedGradle` (the orphan rule forbids `impl Tooling for
/// Arc<ScriptedGradle>` outside the trait's crate).
#[derive(Debug, Clone)]
pub struct ScriptedTooling(pub Arc<ScriptedGradle>);

impl Tooling for ScriptedTooling {
    fn connect(&self, root: &Path) -> Result<Box<dyn ToolingSession>, GradleError> {
        Ok(Box::new(ScriptedSession {
            script: self.0.clone(),
            root: root.to_path_buf(),
        }))
    }
}

struct ScriptedSession {
    script: Arc<ScriptedGradle>,
    root: PathBuf,
}

impl ToolingSession for ScriptedSession {
    fn fetch_model(
        &mut self,
        _sink: Arc<dyn EventSink>,
        _cancel: &CancellationToken,
    ) -> Result<NativeBuildModel, GradleError> {
        self.script.model_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.script.model.lock().unwrap().clone())
    }

    fn run_tasks(
        &mut self,
        tasks: &[String],
        args: &[String],
        sink: Arc<dyn EventSink>,
        cancel: &CancellationToken,
    ) -> Result<ToolStatus, GradleError> {
        self.script.runs.lock().unwrap().push(RecordedRun {
            root: self.root.clone(),
            tasks: tasks.to_vec(),
            args: args.to_vec(),
        });

        let planned = self
            .script
            .plan
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(PlannedRun::ok);
        for event in planned.events {
            match event {
                ScriptedEvent::Task(event) => sink.task_event(event),
                ScriptedEvent::Diagnostic(diagnostic) => sink.diagnostic(diagnostic),
            }
        }
        if planned.block_until_cancel {
            while !cancel.is_cancelled() {
                std::thread::sleep(Duration::from_millis(5));
            }
            return Ok(ToolStatus::Cancelled);
        }
        Ok(planned.status)
    }
}

/// A client end that records every outbound message.
pub struct RecordingClient {
    pub client: BuildClient,
    pub receiver: Receiver<Message>,
}

impl RecordingClient {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            client: BuildClient::new(tx),
            receiver: rx,
        }
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(message) = self.receiver.try_recv() {
            out.push(message);
        }
        out
    }

    pub fn notifications<T: serde::de::DeserializeOwned>(&self, method: &str) -> Vec<T> {
        self.drain()
            .into_iter()
            .filter_map(|message| match message {
                Message::Notification(notification) if notification.method == method => {
                    serde_json::from_value(notification.params).ok()
                }
                _ => None,
            })
            .collect()
    }

    pub fn wait_for_notification(&self, method: &str, timeout: Duration) -> Option<bsp::Notification> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(std::time::Instant::now())?;
            match self.receiver.recv_timeout(remaining) {
                Ok(Message::Notification(notification)) if notification.method == method => {
                    return Some(notification)
                }
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// A two-module workspace under `root`: `:app` (main + test) depending on
/// `:lib` (main). Paths all live inside `root` so diagnostics can be
/// attributed by source dir.
pub fn two_module_model(root: &Path, app_depends_on_lib: bool) -> NativeBuildModel {
    let app_dir = root.join("app");
    let lib_dir = root.join("lib");

    let mut app_main = source_set(&app_dir, ":app", "main");
    app_main.java = Some(NativeJavaExtension {
        java_home: None,
        java_version: "21".to_string(),
        source_compatibility: "17".to_string(),
        target_compatibility: "17".to_string(),
    });
    if app_depends_on_lib {
        app_main.module_dependencies = vec![NativeModuleDependency {
            project_dir: lib_dir.clone(),
            source_set_name: "main".to_string(),
        }];
    }
    let mut app_test = source_set(&app_dir, ":app", "test");
    app_test.has_tests = true;
    app_test.test_task_name = Some(":app:test".to_string());

    NativeBuildModel {
        gradle_version: Some("8.7".to_string()),
        modules: vec![
            NativeModule {
                project_path: ":app".to_string(),
                project_dir: app_dir,
                root_dir: root.to_path_buf(),
                source_sets: vec![app_main, app_test],
                resolution_error: None,
            },
            NativeModule {
                project_path: ":lib".to_string(),
                project_dir: lib_dir,
                root_dir: root.to_path_buf(),
                source_sets: vec![source_set(&root.join("lib"), ":lib", "main")],
                resolution_error: None,
            },
        ],
    }
}

pub fn source_set(project_dir: &Path, project_path: &str, name: &str) -> NativeSourceSet {
    NativeSourceSet {
        name: name.to_string(),
        kind: None,
        source_dirs: vec![project_dir.join("src").join(name).join("java")],
        resource_dirs: vec![project_dir.join("src").join(name).join("resources")],
        output_dirs: vec![project_dir
            .join("build")
            .join("classes")
            .join("java")
            .join(name)],
        language_ids: vec!["java".to_string()],
        classes_task_name: Some(format!("{project_path}:{name}Classes")),
        clean_task_name: Some(format!("{project_path}:clean")),
        ..NativeSourceSet::default()
    }
}

/// Workspace directory with a build file so fingerprints resolve.
pub fn workspace_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("build.gradle"), "plugins { id 'java' }").unwrap();
    std::fs::write(dir.path().join("settings.gradle"), "include 'app', 'lib'").unwrap();
    dir
}

pub fn target_uri(project_dir: &Path, source_set: &str) -> String {
    format!(
        "{}?sourceset={source_set}",
        girder_core::path_to_file_uri(project_dir).unwrap()
    )
}
