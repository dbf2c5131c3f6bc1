//! Gradle integration for Girder: the build tool connector.
//!
//! This crate owns everything that touches the external Gradle process: the
//! typed native project model, build-file fingerprints, the tooling seam and
//! its default process-launcher implementation, and the per-workspace-root
//! connection pool that serializes operations and recycles broken sessions.

mod connector;
mod event;
mod fingerprint;
mod javac;
mod launcher;
mod model;
mod tooling;

pub use connector::{
    GradleConnector, OperationHandle, OperationKind, OperationOutcome, OperationRequest,
    OperationState, OperationStatus,
};
pub use event::{EventSink, NullSink, TaskProgressEvent, TaskState};
pub use fingerprint::{collect_build_files, BuildFingerprint};
pub use javac::JavacOutputParser;
pub use launcher::{GradleLauncher, LauncherConfig};
pub use model::{
    ExternalDependency, NativeBuildModel, NativeJavaExtension, NativeModule,
    NativeModuleDependency, NativeSourceSet,
};
pub use tooling::{Tooling, ToolingSession, ToolStatus};

pub use girder_process::CancellationToken;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GradleError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The connection to the build tool is gone: the process could not be
    /// spawned, crashed, or its output channel broke. Distinct from a build
    /// failure — callers should recycle the session and retry.
    #[error("gradle connection failure: {0}")]
    Connection(String),

    /// The native model output was missing or did not parse.
    #[error("failed to read the gradle project model: {0}")]
    Model(String),

    #[error("unsupported project layout at {0}")]
    Unsupported(PathBuf),
}

pub type Result<T> = std::result::Result<T, GradleError>;
