//! Request routing and cancellation bookkeeping.
//!
//! Each decoded message enters here exactly once. Independent requests run
//! concurrently on their own worker threads; serialization per workspace
//! root is the connector's job, not the dispatcher's — this layer only tags
//! every request with a cancellation token and forwards it.

use crate::cache::FetchError;
use crate::client::BuildClient;
use crate::config::Preferences;
use crate::coordinator::CoordinatorError;
use crate::handlers;
use crate::lifecycle::LifecycleService;
use crate::workspace::Workspace;
use crossbeam_channel::Receiver;
use girder_bsp::{
    self as bsp, error_codes, methods, Message, Notification, Request, RequestId, Response,
    ResponseError,
};
use girder_gradle::{CancellationToken, Tooling};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct Dispatcher {
    client: BuildClient,
    tooling: Option<Arc<dyn Tooling>>,
    lifecycle: Arc<LifecycleService>,
    workspace: Arc<Mutex<Option<Arc<Workspace>>>>,
    pending: Arc<Mutex<HashMap<RequestId, CancellationToken>>>,
}

impl Dispatcher {
    pub fn new(client: BuildClient) -> Self {
        Self {
            client,
            tooling: None,
            lifecycle: Arc::new(LifecycleService::new()),
            workspace: Arc::new(Mutex::new(None)),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Substitute the build tool; used by tests to run the full server loop
    /// against a scripted Gradle.
    pub fn with_tooling(client: BuildClient, tooling: Arc<dyn Tooling>) -> Self {
        Self {
            tooling: Some(tooling),
            ..Self::new(client)
        }
    }

    /// Process messages until `build/exit` (or the transport closes) and
    /// return the process exit code.
    pub fn run(&self, receiver: Receiver<Message>) -> i32 {
        for message in receiver.iter() {
            match message {
                Message::Request(request) => self.dispatch_request(request),
                Message::Notification(notification) => {
                    if notification.method == methods::EXIT {
                        return self.lifecycle.exit_code();
                    }
                    self.dispatch_notification(notification);
                }
                Message::Response(response) => {
                    tracing::debug!(id = %response.id, "unexpected response from client");
                }
            }
        }
        // Transport closed without build/exit.
        1
    }

    fn respond(&self, response: Response) {
        self.client.send(Message::Response(response));
    }

    fn dispatch_request(&self, request: Request) {
        let method = request.method.clone();
        match method.as_str() {
            methods::INITIALIZE => self.handle_initialize(request),
            methods::SHUTDOWN => {
                self.lifecycle.shutdown();
                self.respond(Response::ok(request.id, serde_json::Value::Null));
            }
            _ => {
                if !self.lifecycle.is_initialized() {
                    self.respond(Response::err(
                        request.id,
                        error_codes::SERVER_NOT_INITIALIZED,
                        "server has not been initialized",
                    ));
                    return;
                }
                let workspace = self
                    .workspace
                    .lock()
                    .expect("dispatcher lock poisoned")
                    .clone();
                let Some(workspace) = workspace else {
                    self.respond(Response::err(
                        request.id,
                        error_codes::SERVER_NOT_INITIALIZED,
                        "server has not been initialized",
                    ));
                    return;
                };

                let token = CancellationToken::new();
                self.pending
                    .lock()
                    .expect("dispatcher lock poisoned")
                    .insert(request.id.clone(), token.clone());

                let client = self.client.clone();
                let pending = self.pending.clone();
                std::thread::Builder::new()
                    .name("girder-request".to_string())
                    .spawn(move || {
                        let id = request.id.clone();
                        let response = if token.is_cancelled() {
                            // Cancelled before it started: it never runs.
                            Response::err(
                                id.clone(),
                                error_codes::REQUEST_CANCELLED,
                                "request cancelled",
                            )
                        } else {
                            handle_request(&workspace, &client, &request, &token)
                        };
                        pending
                            .lock()
                            .expect("dispatcher lock poisoned")
                            .remove(&id);
                        client.send(Message::Response(response));
                    })
                    .expect("failed to spawn request worker");
            }
        }
    }

    fn handle_initialize(&self, request: Request) {
        let params: bsp::InitializeBuildParams = match serde_json::from_value(request.params.clone())
        {
            Ok(params) => params,
            Err(err) => {
                self.respond(Response::err(
                    request.id,
                    error_codes::INVALID_PARAMS,
                    format!("invalid initialize params: {err}"),
                ));
                return;
            }
        };

        match self.lifecycle.initialize(&params) {
            Ok((root, result)) => {
                let preferences = Preferences::from_initialize_data(params.data.as_ref());
                let workspace = match &self.tooling {
                    Some(tooling) => Workspace::with_tooling(
                        root,
                        tooling.clone(),
                        preferences,
                        self.client.clone(),
                    ),
                    None => Workspace::new(root, preferences, self.client.clone()),
                };
                *self.workspace.lock().expect("dispatcher lock poisoned") =
                    Some(Arc::new(workspace));
                self.respond(Response::ok(request.id, result));
            }
            Err(err) => {
                self.respond(Response::err(
                    request.id,
                    error_codes::INVALID_PARAMS,
                    err.to_string(),
                ));
            }
        }
    }

    fn dispatch_notification(&self, notification: Notification) {
        match notification.method.as_str() {
            methods::INITIALIZED => {}
            methods::CANCEL_REQUEST => {
                let Ok(params) =
                    serde_json::from_value::<bsp::CancelRequestParams>(notification.params)
                else {
                    return;
                };
                // Completed requests have left the table: cancelling them is
                // a no-op by construction.
                if let Some(token) = self
                    .pending
                    .lock()
                    .expect("dispatcher lock poisoned")
                    .get(&params.id)
                {
                    token.cancel();
                }
            }
            methods::DID_CHANGE_BUILD_FILES => {
                let workspace = self
                    .workspace
                    .lock()
                    .expect("dispatcher lock poisoned")
                    .clone();
                let Some(workspace) = workspace else {
                    return;
                };
                let client = self.client.clone();
                std::thread::Builder::new()
                    .name("girder-invalidate".to_string())
                    .spawn(move || refresh_and_notify(&workspace, &client))
                    .expect("failed to spawn invalidation worker");
            }
            other => {
                tracing::debug!(method = other, "ignoring unknown notification");
            }
        }
    }
}

fn refresh_and_notify(workspace: &Workspace, client: &BuildClient) {
    match workspace
        .cache
        .refresh(&workspace.root, &CancellationToken::new())
    {
        Ok((_, diff)) => {
            if workspace.preferences.notify_target_changes && !diff.is_empty() {
                client.did_change_build_target(handlers::diff_to_wire(&diff));
            }
        }
        Err(err) => {
            client.log_message(
                bsp::MESSAGE_TYPE_ERROR,
                format!("workspace model refresh failed: {err}"),
            );
        }
    }
}

fn parse_params<P: DeserializeOwned>(request: &Request) -> Result<P, Response> {
    serde_json::from_value(request.params.clone()).map_err(|err| {
        Response::err(
            request.id.clone(),
            error_codes::INVALID_PARAMS,
            format!("invalid params for {}: {err}", request.method),
        )
    })
}

fn handle_request(
    workspace: &Workspace,
    client: &BuildClient,
    request: &Request,
    token: &CancellationToken,
) -> Response {
    let id = request.id.clone();
    match request.method.as_str() {
        methods::WORKSPACE_BUILD_TARGETS => {
            match workspace.cache.snapshot(&workspace.root, false, token) {
                Ok(snapshot) => Response::ok(id, handlers::build_targets_result(&snapshot)),
                Err(err) => fetch_error_response(id, err),
            }
        }
        methods::WORKSPACE_RELOAD => {
            match workspace.cache.refresh(&workspace.root, token) {
                Ok((_, diff)) => {
                    if workspace.preferences.notify_target_changes && !diff.is_empty() {
                        client.did_change_build_target(handlers::diff_to_wire(&diff));
                    }
                    Response::ok(id, serde_json::Value::Null)
                }
                Err(err) => fetch_error_response(id, err),
            }
        }
        methods::BUILD_TARGET_SOURCES => match parse_params::<bsp::SourcesParams>(request) {
            Ok(params) => with_snapshot(workspace, token, id, |snapshot| {
                handlers::sources_result(snapshot, &params)
            }),
            Err(response) => response,
        },
        methods::BUILD_TARGET_OUTPUT_PATHS => {
            match parse_params::<bsp::OutputPathsParams>(request) {
                Ok(params) => with_snapshot(workspace, token, id, |snapshot| {
                    handlers::output_paths_result(snapshot, &params)
                }),
                Err(response) => response,
            }
        }
        methods::BUILD_TARGET_DEPENDENCY_SOURCES => {
            match parse_params::<bsp::DependencySourcesParams>(request) {
                Ok(params) => with_snapshot(workspace, token, id, |snapshot| {
                    handlers::dependency_sources_result(snapshot, &params)
                }),
                Err(response) => response,
            }
        }
        methods::BUILD_TARGET_COMPILE => match parse_params::<bsp::CompileParams>(request) {
            Ok(params) => match workspace.coordinator.compile(&params, token) {
                Ok(status_code) => Response::ok(
                    id,
                    bsp::CompileResult {
                        origin_id: params.origin_id.clone(),
                        status_code,
                    },
                ),
                Err(err) => coordinator_error_response(id, err),
            },
            Err(response) => response,
        },
        methods::BUILD_TARGET_TEST => match parse_params::<bsp::TestParams>(request) {
            Ok(params) => match workspace.coordinator.test(&params, token) {
                Ok(status_code) => Response::ok(
                    id,
                    bsp::TestResult {
                        origin_id: params.origin_id.clone(),
                        status_code,
                    },
                ),
                Err(err) => coordinator_error_response(id, err),
            },
            Err(response) => response,
        },
        methods::BUILD_TARGET_RUN => match parse_params::<bsp::RunParams>(request) {
            Ok(params) => match workspace.coordinator.run(&params, token) {
                Ok(status_code) => Response::ok(
                    id,
                    bsp::RunResult {
                        origin_id: params.origin_id.clone(),
                        status_code,
                    },
                ),
                Err(err) => coordinator_error_response(id, err),
            },
            Err(response) => response,
        },
        methods::BUILD_TARGET_CLEAN_CACHE => {
            match parse_params::<bsp::CleanCacheParams>(request) {
                Ok(params) => match workspace.coordinator.clean(&params, token) {
                    Ok(status_code) => Response::ok(
                        id,
                        bsp::CleanCacheResult {
                            message: None,
                            cleaned: status_code == bsp::StatusCode::Ok,
                        },
                    ),
                    Err(err) => coordinator_error_response(id, err),
                },
                Err(response) => response,
            }
        }
        other => Response::err(
            id,
            error_codes::METHOD_NOT_FOUND,
            format!("method not supported: {other}"),
        ),
    }
}

fn with_snapshot<T: serde::Serialize>(
    workspace: &Workspace,
    token: &CancellationToken,
    id: RequestId,
    handler: impl FnOnce(&girder_model::ProjectModelSnapshot) -> Result<T, crate::coordinator::RequestError>,
) -> Response {
    match workspace.cache.snapshot(&workspace.root, false, token) {
        Ok(snapshot) => match handler(&snapshot) {
            Ok(result) => Response::ok(id, result),
            Err(err) => Response::err(id, error_codes::INVALID_PARAMS, err.to_string()),
        },
        Err(err) => fetch_error_response(id, err),
    }
}

fn coordinator_error_response(id: RequestId, err: CoordinatorError) -> Response {
    match err {
        CoordinatorError::Client(err) => {
            Response::err(id, error_codes::INVALID_PARAMS, err.to_string())
        }
        CoordinatorError::Model(err) => fetch_error_response(id, err),
        CoordinatorError::Connection(message) => retryable_response(id, message),
    }
}

fn fetch_error_response(id: RequestId, err: FetchError) -> Response {
    if err.retryable {
        retryable_response(id, err.to_string())
    } else {
        Response::err(id, error_codes::INTERNAL_ERROR, err.to_string())
    }
}

/// Connection-class failures tell the client to retry rather than give up.
fn retryable_response(id: RequestId, message: String) -> Response {
    Response {
        id,
        result: None,
        error: Some(ResponseError {
            code: error_codes::INTERNAL_ERROR,
            message,
            data: Some(serde_json::json!({ "retryable": true })),
        }),
    }
}
