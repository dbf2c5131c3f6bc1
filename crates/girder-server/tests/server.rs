//! Full server loop against a scripted Gradle: lifecycle gate, target
//! enumeration, change notifications, cancellation bookkeeping.

mod support;

use crossbeam_channel::{unbounded, Receiver, Sender};
use girder_bsp::{
    self as bsp, error_codes, methods, Message, Notification, Request, RequestId, Response,
};
use girder_server::{BuildClient, Dispatcher};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use support::{target_uri, two_module_model, workspace_dir, ScriptedGradle, ScriptedTooling};

struct ServerHarness {
    incoming: Sender<Message>,
    outgoing: Receiver<Message>,
    exit: std::thread::JoinHandle<i32>,
}

impl ServerHarness {
    fn start(script: Arc<ScriptedGradle>) -> Self {
        let (incoming_tx, incoming_rx) = unbounded();
        let (outgoing_tx, outgoing_rx) = unbounded();
        let dispatcher =
            Dispatcher::with_tooling(BuildClient::new(outgoing_tx), Arc::new(ScriptedTooling(script)));
        let exit = std::thread::spawn(move || dispatcher.run(incoming_rx));
        Self {
            incoming: incoming_tx,
            outgoing: outgoing_rx,
            exit,
        }
    }

    fn request(&self, id: i64, method: &str, params: serde_json::Value) {
        self.incoming
            .send(Message::Request(Request {
                id: RequestId::Number(id),
                method: method.to_string(),
                params,
            }))
            .unwrap();
    }

    fn notify(&self, method: &str, params: serde_json::Value) {
        self.incoming
            .send(Message::Notification(Notification {
                method: method.to_string(),
                params,
            }))
            .unwrap();
    }

    /// Wait for the response with the given id, collecting (and dropping)
    /// interleaved notifications.
    fn response(&self, id: i64) -> Response {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            let remaining = deadline
                .checked_duration_since(std::time::Instant::now())
                .expect("timed out waiting for response");
            match self.outgoing.recv_timeout(remaining).expect("server alive") {
                Message::Response(response) if response.id == RequestId::Number(id) => {
                    return response
                }
                _ => continue,
            }
        }
    }

    fn notification(&self, method: &str) -> Notification {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            let remaining = deadline
                .checked_duration_since(std::time::Instant::now())
                .expect("timed out waiting for notification");
            match self.outgoing.recv_timeout(remaining).expect("server alive") {
                Message::Notification(notification) if notification.method == method => {
                    return notification
                }
                _ => continue,
            }
        }
    }

    fn initialize(&self, root: &Path) {
        self.request(
            1,
            methods::INITIALIZE,
            serde_json::json!({
                "displayName": "test-editor",
                "version": "1.0",
                "bspVersion": "2.1.0",
                "rootUri": girder_core::path_to_file_uri(root).unwrap(),
                "capabilities": {"languageIds": ["java"]},
                "data": {"reloadAfterCompile": false}
            }),
        );
        let response = self.response(1);
        assert!(response.error.is_none(), "initialize failed: {response:?}");
        self.notify(methods::INITIALIZED, serde_json::Value::Null);
    }

    fn shutdown_and_exit(self) -> i32 {
        self.request(99, methods::SHUTDOWN, serde_json::Value::Null);
        let _ = self.response(99);
        self.notify(methods::EXIT, serde_json::Value::Null);
        self.exit.join().unwrap()
    }
}

#[test]
fn requests_are_rejected_until_initialized() {
    let dir = workspace_dir();
    let script = ScriptedGradle::new(two_module_model(dir.path(), false));
    let harness = ServerHarness::start(script);

    harness.request(7, methods::WORKSPACE_BUILD_TARGETS, serde_json::Value::Null);
    let response = harness.response(7);
    let error = response.error.expect("must be rejected");
    assert_eq!(error.code, error_codes::SERVER_NOT_INITIALIZED);

    harness.notify(methods::EXIT, serde_json::Value::Null);
}

#[test]
fn build_targets_round_trip_with_dependencies() {
    let dir = workspace_dir();
    let root = dir.path();
    let script = ScriptedGradle::new(two_module_model(root, true));
    let harness = ServerHarness::start(script);
    harness.initialize(root);

    harness.request(2, methods::WORKSPACE_BUILD_TARGETS, serde_json::Value::Null);
    let response = harness.response(2);
    let result: bsp::WorkspaceBuildTargetsResult =
        serde_json::from_value(response.result.expect("result")).unwrap();

    assert_eq!(result.targets.len(), 3);
    let app_main = result
        .targets
        .iter()
        .find(|target| target.id.uri == target_uri(&root.join("app"), "main"))
        .expect("app main target");
    assert_eq!(
        app_main.dependencies,
        vec![bsp::BuildTargetIdentifier::new(target_uri(
            &root.join("lib"),
            "main"
        ))]
    );
    assert_eq!(app_main.data_kind.as_deref(), Some("jvm"));

    assert_eq!(harness.shutdown_and_exit(), 0);
}

#[test]
fn build_file_change_reports_target_diff_not_full_snapshot() {
    let dir = workspace_dir();
    let root = dir.path();
    let script = ScriptedGradle::new(two_module_model(root, true));
    let harness = ServerHarness::start(script.clone());
    harness.initialize(root);

    harness.request(2, methods::WORKSPACE_BUILD_TARGETS, serde_json::Value::Null);
    let _ = harness.response(2);

    // Drop the :app -> :lib dependency and tell the server build files
    // changed.
    script.set_model(two_module_model(root, false));
    std::fs::write(root.join("build.gradle"), "plugins { id 'java' } // edited").unwrap();
    harness.notify(methods::DID_CHANGE_BUILD_FILES, serde_json::json!({}));

    let notification = harness.notification(methods::DID_CHANGE_BUILD_TARGET);
    let params: bsp::DidChangeBuildTarget =
        serde_json::from_value(notification.params).unwrap();
    assert_eq!(params.changes.len(), 1);
    assert_eq!(
        params.changes[0].target.uri,
        target_uri(&root.join("app"), "main")
    );
    assert_eq!(params.changes[0].kind, Some(bsp::BUILD_TARGET_EVENT_CHANGED));

    assert_eq!(harness.shutdown_and_exit(), 0);
}

#[test]
fn compile_round_trip_reports_status() {
    let dir = workspace_dir();
    let root = dir.path();
    let script = ScriptedGradle::new(two_module_model(root, false));
    let harness = ServerHarness::start(script.clone());
    harness.initialize(root);

    harness.request(
        3,
        methods::BUILD_TARGET_COMPILE,
        serde_json::json!({
            "targets": [{"uri": target_uri(&root.join("app"), "main")}],
            "originId": "compile-1"
        }),
    );
    let response = harness.response(3);
    let result: bsp::CompileResult =
        serde_json::from_value(response.result.expect("result")).unwrap();
    assert_eq!(result.status_code, bsp::StatusCode::Ok);
    assert_eq!(result.origin_id.as_deref(), Some("compile-1"));
    assert_eq!(script.recorded_runs().len(), 1);

    assert_eq!(harness.shutdown_and_exit(), 0);
}

#[test]
fn unknown_methods_get_method_not_found() {
    let dir = workspace_dir();
    let root = dir.path();
    let script = ScriptedGradle::new(two_module_model(root, false));
    let harness = ServerHarness::start(script);
    harness.initialize(root);

    harness.request(5, "buildTarget/javacOptions", serde_json::Value::Null);
    let response = harness.response(5);
    assert_eq!(
        response.error.expect("error").code,
        error_codes::METHOD_NOT_FOUND
    );

    assert_eq!(harness.shutdown_and_exit(), 0);
}

#[test]
fn exit_without_shutdown_reports_failure_code() {
    let dir = workspace_dir();
    let script = ScriptedGradle::new(two_module_model(dir.path(), false));
    let harness = ServerHarness::start(script);

    harness.notify(methods::EXIT, serde_json::Value::Null);
    assert_eq!(harness.exit.join().unwrap(), 1);
}

#[test]
fn cancelling_an_unknown_request_id_is_a_no_op() {
    let dir = workspace_dir();
    let root = dir.path();
    let script = ScriptedGradle::new(two_module_model(root, false));
    let harness = ServerHarness::start(script);
    harness.initialize(root);

    harness.notify(
        methods::CANCEL_REQUEST,
        serde_json::json!({"id": 424242}),
    );

    // The server keeps serving normally.
    harness.request(6, methods::WORKSPACE_BUILD_TARGETS, serde_json::Value::Null);
    assert!(harness.response(6).error.is_none());

    assert_eq!(harness.shutdown_and_exit(), 0);
}
