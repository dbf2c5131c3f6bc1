//! The seam between the connector and the concrete build tool.
//!
//! Any build tool exposing these three capabilities — query the native
//! model, execute a task selection with streamed events, cancel — is
//! substitutable. The default implementation is [`crate::GradleLauncher`];
//! tests substitute scripted implementations.

use crate::event::EventSink;
use crate::model::NativeBuildModel;
use crate::Result;
use girder_process::CancellationToken;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Terminal status reported by the tool for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Ok,
    /// The build ran and failed (compile errors, test failures). An expected
    /// outcome, not an error.
    Failed,
    Cancelled,
}

/// Factory for per-workspace-root sessions.
pub trait Tooling: Send + Sync + fmt::Debug {
    fn connect(&self, root: &Path) -> Result<Box<dyn ToolingSession>>;
}

/// A warm connection to the build tool for one workspace root.
///
/// Sessions are owned by a single connector worker and never shared, so the
/// methods take `&mut self` and may block for as long as the build runs.
/// Implementations must honor the cancellation token by stopping the tool
/// and must not return a terminal status before the tool acknowledged.
pub trait ToolingSession: Send {
    /// Fetch the native project model.
    fn fetch_model(
        &mut self,
        sink: Arc<dyn EventSink>,
        cancel: &CancellationToken,
    ) -> Result<NativeBuildModel>;

    /// Execute a set of task paths with extra command-line arguments,
    /// streaming progress and diagnostics through `sink`.
    fn run_tasks(
        &mut self,
        tasks: &[String],
        args: &[String],
        sink: Arc<dyn EventSink>,
        cancel: &CancellationToken,
    ) -> Result<ToolStatus>;
}
