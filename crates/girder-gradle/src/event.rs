//! Event sink for in-flight build tool operations.
//!
//! Progress and diagnostics are pushed through an explicit sink passed into
//! each operation, decoupling delivery from any transport. The coordinator
//! in `girder-server` installs a sink that maps these onto BSP notifications.

use crate::tooling::ToolStatus;
use girder_core::Diagnostic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Started,
    Progress,
    Finished,
}

/// Task-level progress mirroring Gradle's task granularity
/// (`:app:compileJava` started / finished, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProgressEvent {
    /// Gradle task path, e.g. `:app:compileJava`.
    pub task: String,
    pub state: TaskState,
    /// Only present on `Finished`.
    pub status: Option<ToolStatus>,
    pub message: Option<String>,
}

impl TaskProgressEvent {
    pub fn started(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            state: TaskState::Started,
            status: None,
            message: None,
        }
    }

    pub fn finished(task: impl Into<String>, status: ToolStatus) -> Self {
        Self {
            task: task.into(),
            state: TaskState::Finished,
            status: Some(status),
            message: None,
        }
    }
}

/// Receiver for streamed operation events. Implementations must be cheap and
/// thread-safe; events arrive from connector worker threads as the tool runs,
/// not after it completes.
pub trait EventSink: Send + Sync {
    fn task_event(&self, event: TaskProgressEvent);
    fn diagnostic(&self, diagnostic: Diagnostic);
    fn log(&self, message: &str);
}

/// Sink that drops everything. Useful for model fetches nobody observes and
/// for tests that only care about outcomes.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn task_event(&self, _event: TaskProgressEvent) {}
    fn diagnostic(&self, _diagnostic: Diagnostic) {}
    fn log(&self, _message: &str) {}
}
