//! Default tooling implementation: launching `gradle`/`gradlew`.
//!
//! Gradle's own daemon provides warm JVM reuse between invocations; the
//! session object here is the explicit handle the connector pools and
//! recycles, so broken state never leaks into the next operation.
//!
//! Model export relies on the companion init script (the Gradle-side plugin)
//! printing the project model as marker-delimited JSON. Without it, a reduced
//! model is synthesized from `gradle projects` output: conventional source
//! roots, no dependency edges, no compiler settings.

use crate::event::{EventSink, TaskProgressEvent};
use crate::javac::JavacOutputParser;
use crate::model::{NativeBuildModel, NativeModule, NativeSourceSet};
use crate::tooling::{ToolStatus, Tooling, ToolingSession};
use crate::{GradleError, Result};
use girder_process::{
    launch, CancellationToken, Invocation, LaunchOptions, LineObserver, OutputStream,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const MODEL_TASK: &str = "girderModel";
pub const MODEL_BEGIN: &str = "GIRDER_MODEL_BEGIN";
pub const MODEL_END: &str = "GIRDER_MODEL_END";

#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// `gradle` executable used when no wrapper is present.
    pub gradle_path: PathBuf,
    /// Prefer `./gradlew` when the workspace ships one.
    pub prefer_wrapper: bool,
    /// Exported as `JAVA_HOME` for the launched process.
    pub java_home: Option<PathBuf>,
    /// Init script that registers the model export task. When absent, model
    /// fetches degrade to a project scan.
    pub init_script: Option<PathBuf>,
    /// Extra arguments appended to every invocation.
    pub extra_args: Vec<String>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            gradle_path: PathBuf::from("gradle"),
            prefer_wrapper: true,
            java_home: None,
            init_script: None,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct GradleLauncher {
    config: LauncherConfig,
}

impl GradleLauncher {
    pub fn new(config: LauncherConfig) -> Self {
        Self { config }
    }
}

impl Tooling for GradleLauncher {
    fn connect(&self, root: &Path) -> Result<Box<dyn ToolingSession>> {
        if !root.is_dir() {
            return Err(GradleError::Unsupported(root.to_path_buf()));
        }
        Ok(Box::new(LauncherSession {
            root: root.to_path_buf(),
            config: self.config.clone(),
        }))
    }
}

struct LauncherSession {
    root: PathBuf,
    config: LauncherConfig,
}

impl LauncherSession {
    fn program(&self) -> PathBuf {
        if self.config.prefer_wrapper {
            let wrapper = if cfg!(windows) { "gradlew.bat" } else { "gradlew" };
            let candidate = self.root.join(wrapper);
            if candidate.is_file() {
                return candidate;
            }
        }
        self.config.gradle_path.clone()
    }

    fn invocation(&self, args: Vec<String>) -> Invocation {
        let mut invocation = Invocation::new(&self.root, &self.program(), &args);
        if let Some(java_home) = &self.config.java_home {
            invocation = invocation.env("JAVA_HOME", java_home.to_string_lossy().to_string());
        }
        invocation
    }

    fn launch(
        &self,
        args: Vec<String>,
        sink: Arc<dyn EventSink>,
        cancel: &CancellationToken,
    ) -> Result<(girder_process::LaunchResult, Arc<ForwardingObserver>)> {
        let observer = Arc::new(ForwardingObserver::new(sink));
        let invocation = self.invocation(args);
        let result = launch(
            &invocation,
            LaunchOptions {
                cancellation: Some(cancel.clone()),
                observer: Some(observer.clone() as Arc<dyn LineObserver>),
                ..LaunchOptions::default()
            },
        )
        .map_err(|err| GradleError::Connection(format!("failed to launch `{invocation}`: {err}")))?;

        // A signal-killed Gradle (OOM killer, daemon crash) is a connection
        // failure, not a build failure.
        if !result.cancelled && !result.timed_out && result.status.code().is_none() {
            return Err(GradleError::Connection(
                "gradle terminated abnormally".to_string(),
            ));
        }

        Ok((result, observer))
    }
}

impl ToolingSession for LauncherSession {
    fn fetch_model(
        &mut self,
        sink: Arc<dyn EventSink>,
        cancel: &CancellationToken,
    ) -> Result<NativeBuildModel> {
        let mut args = Vec::new();
        let export = self.config.init_script.is_some();
        if let Some(init_script) = &self.config.init_script {
            args.push("--init-script".to_string());
            args.push(init_script.to_string_lossy().to_string());
            args.push(MODEL_TASK.to_string());
        } else {
            args.push("projects".to_string());
        }
        args.push("--console=plain".to_string());
        args.extend(self.config.extra_args.iter().cloned());

        let (result, observer) = self.launch(args, sink, cancel)?;

        if result.cancelled {
            observer.flush(ToolStatus::Cancelled);
            return Err(GradleError::Model("model fetch cancelled".to_string()));
        }
        if !result.status.success() {
            observer.flush(ToolStatus::Failed);
            return Err(GradleError::Model(format!(
                "gradle exited with {}: {}",
                result.status,
                excerpt(&result.output.stderr)
            )));
        }
        observer.flush(ToolStatus::Ok);

        let combined = result.output.combined();
        if export {
            parse_exported_model(&combined)
        } else {
            Ok(scan_projects_output(&self.root, &combined))
        }
    }

    fn run_tasks(
        &mut self,
        tasks: &[String],
        args: &[String],
        sink: Arc<dyn EventSink>,
        cancel: &CancellationToken,
    ) -> Result<ToolStatus> {
        let mut full_args: Vec<String> = tasks.to_vec();
        full_args.push("--console=plain".to_string());
        full_args.extend(args.iter().cloned());
        full_args.extend(self.config.extra_args.iter().cloned());

        let (result, observer) = self.launch(full_args, sink, cancel)?;

        if result.cancelled {
            observer.flush(ToolStatus::Cancelled);
            return Ok(ToolStatus::Cancelled);
        }
        if result.status.success() {
            observer.flush(ToolStatus::Ok);
            Ok(ToolStatus::Ok)
        } else {
            observer.flush(ToolStatus::Failed);
            Ok(ToolStatus::Failed)
        }
    }
}

fn excerpt(text: &str) -> String {
    const MAX: usize = 2048;
    if text.len() <= MAX {
        return text.trim().to_string();
    }
    let mut cut = MAX;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", text[..cut].trim())
}

/// Translate raw output lines into sink events while the tool runs.
///
/// Task lifecycle comes from plain-console `> Task :path` markers; a new
/// marker finishes the previous task. stderr is run through the javac parser
/// for diagnostics; everything else is forwarded as log output.
struct ForwardingObserver {
    sink: Arc<dyn EventSink>,
    state: Mutex<ObserverState>,
}

#[derive(Default)]
struct ObserverState {
    javac: JavacOutputParser,
    current_task: Option<String>,
}

impl ForwardingObserver {
    fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(ObserverState::default()),
        }
    }

    /// Close the last open task and drain the diagnostic parser.
    fn flush(&self, status: ToolStatus) {
        let mut state = self.state.lock().expect("observer lock poisoned");
        if let Some(task) = state.current_task.take() {
            self.sink.task_event(TaskProgressEvent::finished(task, status));
        }
        if let Some(diagnostic) = state.javac.finish() {
            self.sink.diagnostic(diagnostic);
        }
    }
}

impl LineObserver for ForwardingObserver {
    fn line(&self, stream: OutputStream, line: &str) {
        let mut state = self.state.lock().expect("observer lock poisoned");
        match stream {
            OutputStream::Stdout => {
                if let Some(rest) = line.strip_prefix("> Task ") {
                    let (task, failed) = match rest.strip_suffix(" FAILED") {
                        Some(task) => (task, true),
                        None => (rest.split_whitespace().next().unwrap_or(rest), false),
                    };
                    if let Some(previous) = state.current_task.take() {
                        if previous != task {
                            self.sink
                                .task_event(TaskProgressEvent::finished(previous, ToolStatus::Ok));
                        }
                    }
                    self.sink.task_event(TaskProgressEvent::started(task));
                    if failed {
                        self.sink
                            .task_event(TaskProgressEvent::finished(task, ToolStatus::Failed));
                    } else {
                        state.current_task = Some(task.to_string());
                    }
                    return;
                }
                if !line.is_empty() {
                    self.sink.log(line);
                }
            }
            OutputStream::Stderr => {
                if let Some(diagnostic) = state.javac.push_line(line) {
                    self.sink.diagnostic(diagnostic);
                }
            }
        }
    }
}

fn parse_exported_model(output: &str) -> Result<NativeBuildModel> {
    let begin = output
        .find(MODEL_BEGIN)
        .ok_or_else(|| GradleError::Model("model export marker not found".to_string()))?;
    let after_begin = begin + MODEL_BEGIN.len();
    let end = output[after_begin..]
        .find(MODEL_END)
        .map(|idx| after_begin + idx)
        .ok_or_else(|| GradleError::Model("model export not terminated".to_string()))?;

    let json = output[after_begin..end].trim();
    serde_json::from_str(json).map_err(|err| GradleError::Model(err.to_string()))
}

/// Reduced-fidelity fallback when the companion plugin is not installed:
/// derive modules from `gradle projects` output with conventional layouts.
/// No dependency edges, no compiler settings — targets still enumerate and
/// build.
fn scan_projects_output(root: &Path, output: &str) -> NativeBuildModel {
    let mut paths = vec![":".to_string()];
    for line in output.lines() {
        // `+--- Project ':app'` / `\--- Project ':lib:core'`
        if let Some(idx) = line.find("Project '") {
            let rest = &line[idx + "Project '".len()..];
            if let Some(end) = rest.find('\'') {
                paths.push(rest[..end].to_string());
            }
        }
    }
    paths.sort();
    paths.dedup();

    let modules = paths
        .into_iter()
        .map(|project_path| {
            let rel: PathBuf = project_path
                .trim_start_matches(':')
                .split(':')
                .filter(|part| !part.is_empty())
                .collect();
            let project_dir = root.join(rel);
            NativeModule {
                project_path: project_path.clone(),
                project_dir: project_dir.clone(),
                root_dir: root.to_path_buf(),
                source_sets: vec![
                    conventional_source_set(&project_path, &project_dir, "main"),
                    conventional_source_set(&project_path, &project_dir, "test"),
                ],
                resolution_error: None,
            }
        })
        .collect();

    NativeBuildModel {
        gradle_version: None,
        modules,
    }
}

fn conventional_source_set(project_path: &str, project_dir: &Path, name: &str) -> NativeSourceSet {
    let prefix = if project_path == ":" {
        String::new()
    } else {
        project_path.to_string()
    };
    let task = |task: &str| format!("{prefix}:{task}");
    let is_test = name == "test";

    NativeSourceSet {
        name: name.to_string(),
        kind: Some(if is_test { "test" } else { "library" }.to_string()),
        source_dirs: vec![project_dir.join("src").join(name).join("java")],
        generated_source_dirs: Vec::new(),
        resource_dirs: vec![project_dir.join("src").join(name).join("resources")],
        output_dirs: vec![project_dir
            .join("build")
            .join("classes")
            .join("java")
            .join(name)],
        language_ids: vec!["java".to_string()],
        classes_task_name: Some(task(if is_test { "testClasses" } else { "classes" })),
        clean_task_name: Some(task("clean")),
        test_task_name: is_test.then(|| task("test")),
        run_task_name: None,
        has_tests: is_test,
        task_names: Vec::new(),
        module_dependencies: Vec::new(),
        external_dependencies: Vec::new(),
        java: None,
    }
}
