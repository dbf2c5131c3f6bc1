//! Per-workspace-root operation scheduling.
//!
//! Exactly one build-tool-affecting operation runs at a time against a given
//! root: each root gets a dedicated worker thread owning the (warm) tooling
//! session, with a FIFO queue in front of it. Roots are fully independent.
//!
//! The session never leaves its worker, so no two operations can race on one
//! connection. After a connection failure the session is dropped and the
//! next operation reconnects; operations already queued behind the failure
//! are failed with a retryable status instead of running against a corpse.

use crate::event::EventSink;
use crate::model::NativeBuildModel;
use crate::tooling::{ToolStatus, Tooling, ToolingSession};
use crate::GradleError;
use girder_process::CancellationToken;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

pub type OperationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    ModelFetch,
    Compile,
    Test,
    Run,
    Clean,
}

/// One unit of work against a workspace root's tooling session.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub kind: OperationKind,
    /// Task paths to execute. Unused for `ModelFetch`.
    pub tasks: Vec<String>,
    /// Extra command-line arguments (test filters, program args).
    pub args: Vec<String>,
}

impl OperationRequest {
    pub fn model_fetch() -> Self {
        Self {
            kind: OperationKind::ModelFetch,
            tasks: Vec::new(),
            args: Vec::new(),
        }
    }

    pub fn tasks(kind: OperationKind, tasks: Vec<String>, args: Vec<String>) -> Self {
        Self { kind, tasks, args }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Succeeded,
    /// The tool ran and reported failure — an expected outcome carrying
    /// diagnostics, not a server error.
    Failed,
    Cancelled,
    /// The connection to the tool broke before or during the operation.
    /// Retryable: the next operation gets a fresh session.
    ConnectionLost,
}

#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub status: OperationStatus,
    /// Populated for successful `ModelFetch` operations.
    pub model: Option<NativeBuildModel>,
    pub error: Option<String>,
}

impl OperationOutcome {
    fn status(status: OperationStatus) -> Self {
        Self {
            status,
            model: None,
            error: None,
        }
    }

    fn failed(error: Option<String>) -> Self {
        Self {
            status: OperationStatus::Failed,
            model: None,
            error,
        }
    }

    fn connection_lost(error: String) -> Self {
        Self {
            status: OperationStatus::ConnectionLost,
            model: None,
            error: Some(error),
        }
    }
}

/// Externally observable lifecycle of one operation.
#[derive(Debug, Clone)]
pub enum OperationState {
    Queued,
    Running,
    Done(OperationOutcome),
}

#[derive(Debug)]
struct OpShared {
    state: Mutex<OperationState>,
    done: Condvar,
}

impl OpShared {
    fn complete(&self, outcome: OperationOutcome) {
        let mut state = self.state.lock().expect("operation lock poisoned");
        *state = OperationState::Done(outcome);
        self.done.notify_all();
    }
}

/// Handle to one in-flight operation.
///
/// Dropping the handle does not cancel the operation; cancellation is always
/// explicit so a client disconnect policy stays in the caller's hands.
pub struct OperationHandle {
    id: OperationId,
    kind: OperationKind,
    cancel: CancellationToken,
    worker: Arc<RootWorker>,
    shared: Arc<OpShared>,
}

impl OperationHandle {
    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn state(&self) -> OperationState {
        self.shared
            .state
            .lock()
            .expect("operation lock poisoned")
            .clone()
    }

    /// Request cancellation. Queued operations are removed from the queue and
    /// complete as `Cancelled` without ever starting; running operations are
    /// signalled and complete once the tool acknowledges. Idempotent, and a
    /// no-op once the operation is terminal.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.worker.remove_queued(self.id);
    }

    /// Block until the operation reaches a terminal state.
    pub fn wait(&self) -> OperationOutcome {
        let mut state = self.shared.state.lock().expect("operation lock poisoned");
        loop {
            if let OperationState::Done(outcome) = &*state {
                return outcome.clone();
            }
            state = self
                .shared
                .done
                .wait(state)
                .expect("operation lock poisoned");
        }
    }
}

struct QueuedOp {
    id: OperationId,
    request: OperationRequest,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
    shared: Arc<OpShared>,
}

#[derive(Default)]
struct WorkerQueue {
    queue: VecDeque<QueuedOp>,
}

struct RootWorker {
    root: PathBuf,
    tooling: Arc<dyn Tooling>,
    state: Mutex<WorkerQueue>,
    wake: Condvar,
}

impl RootWorker {
    /// Remove a still-queued operation and complete it as cancelled. Returns
    /// quietly when the operation already left the queue.
    fn remove_queued(&self, id: OperationId) {
        let mut state = self.state.lock().expect("connector lock poisoned");
        if let Some(idx) = state.queue.iter().position(|op| op.id == id) {
            let op = state.queue.remove(idx).expect("index just found");
            drop(state);
            op.shared
                .complete(OperationOutcome::status(OperationStatus::Cancelled));
        }
    }

    /// Fail everything currently queued. Used when the session is lost so
    /// queued work reports retryable instead of silently rebinding.
    fn fail_queued(&self, error: &str) {
        let drained: Vec<QueuedOp> = {
            let mut state = self.state.lock().expect("connector lock poisoned");
            state.queue.drain(..).collect()
        };
        for op in drained {
            op.shared
                .complete(OperationOutcome::connection_lost(error.to_string()));
        }
    }
}

fn worker_loop(worker: Arc<RootWorker>) {
    let mut session: Option<Box<dyn ToolingSession>> = None;

    loop {
        let op = {
            let mut state = worker.state.lock().expect("connector lock poisoned");
            loop {
                if let Some(op) = state.queue.pop_front() {
                    // Transition under the queue lock: once an operation
                    // leaves the queue it is either Running or terminal, so
                    // `remove_queued` can guarantee queued-cancel semantics.
                    let mut op_state = op.shared.state.lock().expect("operation lock poisoned");
                    if op.cancel.is_cancelled() {
                        *op_state = OperationState::Done(OperationOutcome::status(
                            OperationStatus::Cancelled,
                        ));
                        op.shared.done.notify_all();
                        continue;
                    }
                    *op_state = OperationState::Running;
                    drop(op_state);
                    break op;
                }
                state = worker.wake.wait(state).expect("connector lock poisoned");
            }
        };

        if session.is_none() {
            match worker.tooling.connect(&worker.root) {
                Ok(fresh) => session = Some(fresh),
                Err(err) => {
                    let message = err.to_string();
                    tracing::warn!(root = %worker.root.display(), error = %message, "gradle connect failed");
                    op.shared
                        .complete(OperationOutcome::connection_lost(message.clone()));
                    worker.fail_queued(&message);
                    continue;
                }
            }
        }
        let active = session.as_mut().expect("session populated above");

        enum RunResult {
            Model(NativeBuildModel),
            Status(ToolStatus),
            Error(GradleError),
        }

        let result = match op.request.kind {
            OperationKind::ModelFetch => match active.fetch_model(op.sink.clone(), &op.cancel) {
                Ok(model) => RunResult::Model(model),
                Err(err) => RunResult::Error(err),
            },
            _ => match active.run_tasks(
                &op.request.tasks,
                &op.request.args,
                op.sink.clone(),
                &op.cancel,
            ) {
                Ok(status) => RunResult::Status(status),
                Err(err) => RunResult::Error(err),
            },
        };

        let outcome = match result {
            RunResult::Model(model) => OperationOutcome {
                status: OperationStatus::Succeeded,
                model: Some(model),
                error: None,
            },
            RunResult::Status(ToolStatus::Ok) => {
                OperationOutcome::status(OperationStatus::Succeeded)
            }
            RunResult::Status(ToolStatus::Failed) => OperationOutcome::failed(None),
            RunResult::Status(ToolStatus::Cancelled) => {
                OperationOutcome::status(OperationStatus::Cancelled)
            }
            RunResult::Error(GradleError::Connection(message)) => {
                tracing::warn!(root = %worker.root.display(), error = %message, "gradle session lost, recycling");
                session = None;
                worker.fail_queued(&message);
                OperationOutcome::connection_lost(message)
            }
            RunResult::Error(_) if op.cancel.is_cancelled() => {
                // Fallout of our own cancellation (killed process,
                // half-written model output).
                OperationOutcome::status(OperationStatus::Cancelled)
            }
            RunResult::Error(err) => OperationOutcome::failed(Some(err.to_string())),
        };

        op.shared.complete(outcome);
    }
}

/// The connector: one [`RootWorker`] per workspace root, created on first
/// use.
#[derive(Clone)]
pub struct GradleConnector {
    inner: Arc<ConnectorInner>,
}

struct ConnectorInner {
    tooling: Arc<dyn Tooling>,
    next_id: AtomicU64,
    roots: Mutex<HashMap<PathBuf, Arc<RootWorker>>>,
}

impl GradleConnector {
    pub fn new(tooling: Arc<dyn Tooling>) -> Self {
        Self {
            inner: Arc::new(ConnectorInner {
                tooling,
                next_id: AtomicU64::new(0),
                roots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Enqueue an operation against `root`. Returns immediately; the handle
    /// observes queueing, execution and completion.
    pub fn execute(
        &self,
        root: &Path,
        request: OperationRequest,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> OperationHandle {
        let worker = self.worker_for(root);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let kind = request.kind;
        let shared = Arc::new(OpShared {
            state: Mutex::new(OperationState::Queued),
            done: Condvar::new(),
        });

        {
            let mut state = worker.state.lock().expect("connector lock poisoned");
            state.queue.push_back(QueuedOp {
                id,
                request,
                sink,
                cancel: cancel.clone(),
                shared: shared.clone(),
            });
        }
        worker.wake.notify_all();

        OperationHandle {
            id,
            kind,
            cancel,
            worker,
            shared,
        }
    }

    fn worker_for(&self, root: &Path) -> Arc<RootWorker> {
        let mut roots = self.inner.roots.lock().expect("connector lock poisoned");
        if let Some(worker) = roots.get(root) {
            return worker.clone();
        }

        let worker = Arc::new(RootWorker {
            root: root.to_path_buf(),
            tooling: self.inner.tooling.clone(),
            state: Mutex::new(WorkerQueue::default()),
            wake: Condvar::new(),
        });
        let for_thread = worker.clone();
        std::thread::Builder::new()
            .name("girder-gradle-connector".to_string())
            .spawn(move || worker_loop(for_thread))
            .expect("failed to spawn gradle connector worker");
        roots.insert(root.to_path_buf(), worker.clone());
        worker
    }
}
