//! Build target records.

use girder_gradle::ExternalDependency;
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable, URI-shaped build target identifier:
/// `<project-dir file URI>?sourceset=<name>`.
///
/// Derived deterministically from the native model so clients can correlate
/// targets across refreshes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildTargetId(String);

impl BuildTargetId {
    pub fn derive(project_dir: &Path, source_set: &str) -> Self {
        let base = girder_core::path_to_file_uri(project_dir)
            .unwrap_or_else(|_| format!("file://{}", project_dir.display()));
        Self(format!("{base}?sourceset={source_set}"))
    }

    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_uri(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildTargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Library,
    Application,
    Test,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetCapabilities {
    pub can_compile: bool,
    pub can_test: bool,
    pub can_run: bool,
    pub can_debug: bool,
}

/// JVM settings attached to a target when the native model carried them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JvmSettings {
    pub java_home: Option<PathBuf>,
    pub java_version: String,
    pub source_compatibility: String,
    pub target_compatibility: String,
    pub gradle_version: String,
}

/// One build target. Immutable once produced for a cache generation —
/// refreshes produce new records, they never mutate these in place.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildTarget {
    pub id: BuildTargetId,
    pub display_name: String,
    /// Root directory of the whole Gradle build.
    pub base_directory: PathBuf,
    pub project_dir: PathBuf,
    /// Gradle project path, e.g. `:app`.
    pub project_path: String,
    pub source_set: String,
    pub kind: TargetKind,
    pub capabilities: TargetCapabilities,
    pub language_ids: Vec<String>,
    /// Workspace-internal dependency edges; every entry resolves inside the
    /// same snapshot.
    pub dependencies: Vec<BuildTargetId>,
    /// Off-workspace dependencies, kept as metadata rather than edges.
    pub external_dependencies: Vec<ExternalDependency>,
    pub source_dirs: Vec<PathBuf>,
    pub generated_source_dirs: Vec<PathBuf>,
    pub resource_dirs: Vec<PathBuf>,
    pub output_dirs: Vec<PathBuf>,
    pub classes_task: Option<String>,
    pub clean_task: Option<String>,
    pub test_task: Option<String>,
    pub run_task: Option<String>,
    /// Every Gradle task path owned by this target, for progress
    /// attribution.
    pub task_names: Vec<String>,
    pub jvm: Option<JvmSettings>,
    /// Set when the underlying module failed to resolve; such a target is
    /// visible but degraded.
    pub error: Option<String>,
}
