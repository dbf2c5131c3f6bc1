//! Coordinator behavior against a scripted Gradle.

mod support;

use girder_bsp::{self as bsp, StatusCode};
use girder_core::{Diagnostic, Position, Range, Severity};
use girder_gradle::{CancellationToken, TaskProgressEvent};
use girder_server::{CoordinatorError, Preferences, RequestError, Workspace, UNMAPPED_TARGET_URI};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use support::{
    target_uri, two_module_model, workspace_dir, PlannedRun, RecordingClient, ScriptedEvent,
    ScriptedGradle, ScriptedTooling,
};

fn test_workspace(
    root: &Path,
    script: &Arc<ScriptedGradle>,
    client: &RecordingClient,
) -> Workspace {
    let preferences = Preferences {
        reload_after_compile: false,
        ..Preferences::default()
    };
    Workspace::with_tooling(
        root.to_path_buf(),
        Arc::new(ScriptedTooling(script.clone())),
        preferences,
        client.client.clone(),
    )
}

fn compile_params(uris: &[String]) -> bsp::CompileParams {
    bsp::CompileParams {
        targets: uris
            .iter()
            .map(|uri| bsp::BuildTargetIdentifier::new(uri.clone()))
            .collect(),
        origin_id: Some("origin-1".to_string()),
        arguments: Vec::new(),
    }
}

fn error_diagnostic(file: &Path, message: &str) -> Diagnostic {
    Diagnostic::new(
        file.to_path_buf(),
        Range::new(Position::new(2, 0), Position::new(2, 1)),
        Severity::Error,
        message,
        Some("javac".to_string()),
    )
}

#[test]
fn failed_compile_reports_status_and_attributed_diagnostics() {
    let dir = workspace_dir();
    let root = dir.path();
    let script = ScriptedGradle::new(two_module_model(root, true));
    let client = RecordingClient::new();
    let workspace = test_workspace(root, &script, &client);

    let source_file = root.join("app/src/main/java/com/example/App.java");
    let mut warning = error_diagnostic(&source_file, "unchecked call");
    warning.severity = Severity::Warning;
    script.plan_run(PlannedRun::failed(vec![
        ScriptedEvent::Diagnostic(error_diagnostic(&source_file, "cannot find symbol")),
        ScriptedEvent::Diagnostic(warning),
    ]));

    let app_main = target_uri(&root.join("app"), "main");
    let status = workspace
        .coordinator
        .compile(&compile_params(&[app_main.clone()]), &CancellationToken::new())
        .unwrap();
    assert_eq!(status, StatusCode::Error);

    let published: Vec<bsp::PublishDiagnosticsParams> =
        client.notifications(bsp::methods::PUBLISH_DIAGNOSTICS);
    assert_eq!(published.len(), 2);
    for params in &published {
        assert_eq!(params.build_target.uri, app_main);
        assert_eq!(params.origin_id.as_deref(), Some("origin-1"));
        assert_eq!(params.diagnostics.len(), 1);
    }
    assert_eq!(published[0].diagnostics[0].severity, Some(1));
    assert_eq!(published[1].diagnostics[0].severity, Some(2));
    // First publication for a (file, target) pair resets the client's slate,
    // later ones append.
    assert!(published[0].reset);
    assert!(!published[1].reset);
}

#[test]
fn compile_batches_same_root_targets_into_one_invocation() {
    let dir = workspace_dir();
    let root = dir.path();
    let script = ScriptedGradle::new(two_module_model(root, false));
    let client = RecordingClient::new();
    let workspace = test_workspace(root, &script, &client);

    let status = workspace
        .coordinator
        .compile(
            &compile_params(&[
                target_uri(&root.join("app"), "main"),
                target_uri(&root.join("lib"), "main"),
            ]),
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(status, StatusCode::Ok);

    let runs = script.recorded_runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(
        runs[0].tasks,
        vec![":app:mainClasses".to_string(), ":lib:mainClasses".to_string()]
    );
}

#[test]
fn unknown_target_is_rejected_before_any_invocation() {
    let dir = workspace_dir();
    let root = dir.path();
    let script = ScriptedGradle::new(two_module_model(root, false));
    let client = RecordingClient::new();
    let workspace = test_workspace(root, &script, &client);

    let err = workspace
        .coordinator
        .compile(
            &compile_params(&["file:///nowhere?sourceset=main".to_string()]),
            &CancellationToken::new(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Client(RequestError::UnknownTarget(_))
    ));
    assert!(script.recorded_runs().is_empty());
}

#[test]
fn unsupported_capability_is_rejected_synchronously() {
    let dir = workspace_dir();
    let root = dir.path();
    let script = ScriptedGradle::new(two_module_model(root, false));
    let client = RecordingClient::new();
    let workspace = test_workspace(root, &script, &client);

    // `:app` main has no run task in the scripted model.
    let err = workspace
        .coordinator
        .run(
            &bsp::RunParams {
                target: bsp::BuildTargetIdentifier::new(target_uri(&root.join("app"), "main")),
                origin_id: None,
                arguments: Vec::new(),
            },
            &CancellationToken::new(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Client(RequestError::UnsupportedCapability { .. })
    ));
    assert!(script.recorded_runs().is_empty());
}

#[test]
fn cancelled_compile_ends_cancelled_with_no_further_progress() {
    let dir = workspace_dir();
    let root = dir.path();
    let script = ScriptedGradle::new(two_module_model(root, false));
    let client = RecordingClient::new();
    let workspace = Arc::new(test_workspace(root, &script, &client));

    script.plan_run(PlannedRun {
        events: vec![ScriptedEvent::Task(TaskProgressEvent::started(
            ":app:compileJava",
        ))],
        status: girder_gradle::ToolStatus::Ok,
        block_until_cancel: true,
    });

    let token = CancellationToken::new();
    let app_main = target_uri(&root.join("app"), "main");
    let compile = {
        let workspace = workspace.clone();
        let token = token.clone();
        std::thread::spawn(move || {
            workspace
                .coordinator
                .compile(&compile_params(&[app_main]), &token)
        })
    };

    // One event-tick after the task shows started, cancel.
    client
        .wait_for_notification(bsp::methods::TASK_START, Duration::from_secs(5))
        .expect("compile task should start");
    token.cancel();

    let status = compile.join().unwrap().unwrap();
    assert_eq!(status, StatusCode::Cancelled);

    // No further progress events for this request id after the terminal
    // state.
    std::thread::sleep(Duration::from_millis(100));
    let late_starts: Vec<bsp::TaskStartParams> = client.notifications(bsp::methods::TASK_START);
    assert!(late_starts.is_empty());
}

#[test]
fn duplicate_task_states_are_coalesced() {
    let dir = workspace_dir();
    let root = dir.path();
    let script = ScriptedGradle::new(two_module_model(root, false));
    let client = RecordingClient::new();
    let workspace = test_workspace(root, &script, &client);

    script.plan_run(PlannedRun {
        events: vec![
            ScriptedEvent::Task(TaskProgressEvent::started(":app:compileJava")),
            ScriptedEvent::Task(TaskProgressEvent::started(":app:compileJava")),
        ],
        status: girder_gradle::ToolStatus::Ok,
        block_until_cancel: false,
    });

    workspace
        .coordinator
        .compile(
            &compile_params(&[target_uri(&root.join("app"), "main")]),
            &CancellationToken::new(),
        )
        .unwrap();

    let starts: Vec<bsp::TaskStartParams> = client.notifications(bsp::methods::TASK_START);
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].task_id.id, ":app:compileJava");
}

#[test]
fn diagnostics_outside_known_source_roots_land_in_the_unmapped_bucket() {
    let dir = workspace_dir();
    let root = dir.path();
    let script = ScriptedGradle::new(two_module_model(root, false));
    let client = RecordingClient::new();
    let workspace = test_workspace(root, &script, &client);

    script.plan_run(PlannedRun::failed(vec![ScriptedEvent::Diagnostic(
        error_diagnostic(&root.join("generated/Mystery.java"), "bad file"),
    )]));

    workspace
        .coordinator
        .compile(
            &compile_params(&[target_uri(&root.join("app"), "main")]),
            &CancellationToken::new(),
        )
        .unwrap();

    let published: Vec<bsp::PublishDiagnosticsParams> =
        client.notifications(bsp::methods::PUBLISH_DIAGNOSTICS);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].build_target.uri, UNMAPPED_TARGET_URI);
}

#[test]
fn clean_deduplicates_shared_tasks() {
    let dir = workspace_dir();
    let root = dir.path();
    let script = ScriptedGradle::new(two_module_model(root, false));
    let client = RecordingClient::new();
    let workspace = test_workspace(root, &script, &client);

    let status = workspace
        .coordinator
        .clean(
            &bsp::CleanCacheParams {
                targets: vec![
                    bsp::BuildTargetIdentifier::new(target_uri(&root.join("app"), "main")),
                    bsp::BuildTargetIdentifier::new(target_uri(&root.join("app"), "test")),
                ],
            },
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(status, StatusCode::Ok);

    let runs = script.recorded_runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].tasks, vec![":app:clean".to_string()]);
}

#[test]
fn test_request_passes_class_filters_to_the_tool() {
    let dir = workspace_dir();
    let root = dir.path();
    let script = ScriptedGradle::new(two_module_model(root, false));
    let client = RecordingClient::new();
    let workspace = test_workspace(root, &script, &client);

    let params = bsp::TestParams {
        targets: vec![bsp::BuildTargetIdentifier::new(target_uri(
            &root.join("app"),
            "test",
        ))],
        origin_id: None,
        arguments: Vec::new(),
        data_kind: Some("testClasses".to_string()),
        data: Some(serde_json::json!({"testClasses": ["com.example.AppTest"]})),
    };
    let status = workspace
        .coordinator
        .test(&params, &CancellationToken::new())
        .unwrap();
    assert_eq!(status, StatusCode::Ok);

    let runs = script.recorded_runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].tasks, vec![":app:test".to_string()]);
    assert_eq!(
        runs[0].args,
        vec!["--tests".to_string(), "com.example.AppTest".to_string()]
    );
}
