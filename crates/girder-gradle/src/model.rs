//! Typed native project model.
//!
//! This is the versioned intermediate representation of what Gradle knows
//! about a workspace, populated either from the companion plugin's JSON
//! export or from a reduced project scan when the plugin is absent. All
//! fields are defaulted so partially resolved projects still deserialize;
//! a module that failed to resolve carries `resolution_error` instead of
//! being dropped.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeBuildModel {
    #[serde(default)]
    pub gradle_version: Option<String>,
    #[serde(default)]
    pub modules: Vec<NativeModule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeModule {
    /// Gradle project path, e.g. `:` or `:app`.
    pub project_path: String,
    pub project_dir: PathBuf,
    /// Root of the whole build; shared by every module.
    pub root_dir: PathBuf,
    #[serde(default)]
    pub source_sets: Vec<NativeSourceSet>,
    /// Set when Gradle could not configure this module; the module still
    /// appears in the model so clients can see it exists.
    #[serde(default)]
    pub resolution_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeSourceSet {
    /// Source set name, e.g. `main` or `test`.
    pub name: String,
    /// Kind reported by the exporter, e.g. `library`, `application`,
    /// `test`. Unrecognized kinds degrade to a plain library target.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub source_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub generated_source_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub resource_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub output_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub language_ids: Vec<String>,
    /// Task that compiles this source set, e.g. `:app:classes`.
    #[serde(default)]
    pub classes_task_name: Option<String>,
    #[serde(default)]
    pub clean_task_name: Option<String>,
    /// Task that runs this source set's tests, when it has any.
    #[serde(default)]
    pub test_task_name: Option<String>,
    /// Task that runs the application entry point, when there is one.
    #[serde(default)]
    pub run_task_name: Option<String>,
    #[serde(default)]
    pub has_tests: bool,
    /// All task paths owned by this source set, used to correlate Gradle
    /// progress back to build targets.
    #[serde(default)]
    pub task_names: Vec<String>,
    /// Workspace-internal dependencies on other source sets.
    #[serde(default)]
    pub module_dependencies: Vec<NativeModuleDependency>,
    /// Off-workspace (repository) dependencies.
    #[serde(default)]
    pub external_dependencies: Vec<ExternalDependency>,
    #[serde(default)]
    pub java: Option<NativeJavaExtension>,
}

/// Edge to another source set inside the same build, identified the same way
/// build target ids are derived: project directory plus source set name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeModuleDependency {
    pub project_dir: PathBuf,
    pub source_set_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalDependency {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub artifact: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub jar: Option<PathBuf>,
    #[serde(default)]
    pub source_jar: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeJavaExtension {
    #[serde(default)]
    pub java_home: Option<PathBuf>,
    #[serde(default)]
    pub java_version: String,
    #[serde(default)]
    pub source_compatibility: String,
    #[serde(default)]
    pub target_compatibility: String,
}
