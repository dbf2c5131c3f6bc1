//! Build Server Protocol (BSP) 2.1 wire surface.
//!
//! JSON-RPC 2.0 message types, the BSP request/notification payloads Girder
//! speaks, and the standard `Content-Length` framing codec. Everything here
//! is plain data; behavior lives in `girder-server`.

mod codec;
mod rpc;

pub use codec::{read_message, write_message, CodecError, MAX_MESSAGE_BYTES_DEFAULT};
pub use rpc::{Message, Notification, Request, RequestId, Response, ResponseError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC error codes used by this server. The base-protocol values follow
/// LSP, which BSP inherits.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const SERVER_NOT_INITIALIZED: i64 = -32002;
    pub const REQUEST_CANCELLED: i64 = -32800;
}

/// Request/notification method names.
pub mod methods {
    pub const INITIALIZE: &str = "build/initialize";
    pub const INITIALIZED: &str = "build/initialized";
    pub const SHUTDOWN: &str = "build/shutdown";
    pub const EXIT: &str = "build/exit";
    pub const WORKSPACE_BUILD_TARGETS: &str = "workspace/buildTargets";
    pub const WORKSPACE_RELOAD: &str = "workspace/reload";
    pub const BUILD_TARGET_SOURCES: &str = "buildTarget/sources";
    pub const BUILD_TARGET_OUTPUT_PATHS: &str = "buildTarget/outputPaths";
    pub const BUILD_TARGET_DEPENDENCY_SOURCES: &str = "buildTarget/dependencySources";
    pub const BUILD_TARGET_COMPILE: &str = "buildTarget/compile";
    pub const BUILD_TARGET_TEST: &str = "buildTarget/test";
    pub const BUILD_TARGET_RUN: &str = "buildTarget/run";
    pub const BUILD_TARGET_CLEAN_CACHE: &str = "buildTarget/cleanCache";
    pub const CANCEL_REQUEST: &str = "$/cancelRequest";
    pub const DID_CHANGE_BUILD_FILES: &str = "workspace/didChangeBuildFiles";

    // Server -> client notifications.
    pub const TASK_START: &str = "build/taskStart";
    pub const TASK_PROGRESS: &str = "build/taskProgress";
    pub const TASK_FINISH: &str = "build/taskFinish";
    pub const PUBLISH_DIAGNOSTICS: &str = "build/publishDiagnostics";
    pub const LOG_MESSAGE: &str = "build/logMessage";
    pub const DID_CHANGE_BUILD_TARGET: &str = "buildTarget/didChange";
}

/// Terminal status of a compile/test/run/clean operation.
///
/// Build failures are expected outcomes, reported through this code plus
/// diagnostics rather than as JSON-RPC errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum StatusCode {
    Ok,
    Error,
    Cancelled,
}

impl From<i32> for StatusCode {
    fn from(code: i32) -> Self {
        match code {
            1 => StatusCode::Ok,
            3 => StatusCode::Cancelled,
            _ => StatusCode::Error,
        }
    }
}

impl From<StatusCode> for i32 {
    fn from(code: StatusCode) -> Self {
        match code {
            StatusCode::Ok => 1,
            StatusCode::Error => 2,
            StatusCode::Cancelled => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeBuildParams {
    pub display_name: String,
    pub version: String,
    pub bsp_version: String,
    pub root_uri: String,
    pub capabilities: ClientCapabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    #[serde(default)]
    pub language_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeBuildResult {
    pub display_name: String,
    pub version: String,
    pub bsp_version: String,
    pub capabilities: ServerCapabilities,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_provider: Option<LanguageProvider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_provider: Option<LanguageProvider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_provider: Option<LanguageProvider>,
    #[serde(default)]
    pub can_reload: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageProvider {
    pub language_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildTargetIdentifier {
    pub uri: String,
}

impl BuildTargetIdentifier {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTargetCapabilities {
    pub can_compile: bool,
    pub can_test: bool,
    pub can_run: bool,
    pub can_debug: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTarget {
    pub id: BuildTargetIdentifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_directory: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub language_ids: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<BuildTargetIdentifier>,
    pub capabilities: BuildTargetCapabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Standard BSP build target tags.
pub mod target_tags {
    pub const APPLICATION: &str = "application";
    pub const LIBRARY: &str = "library";
    pub const TEST: &str = "test";
}

/// `data` payload for JVM build targets (`dataKind == "jvm"`), extended with
/// the Gradle version the way `JvmBuildTargetEx` extends bsp4j.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JvmBuildTargetData {
    #[serde(default)]
    pub java_home: String,
    #[serde(default)]
    pub java_version: String,
    #[serde(default)]
    pub gradle_version: String,
    #[serde(default)]
    pub source_compatibility: String,
    #[serde(default)]
    pub target_compatibility: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceBuildTargetsResult {
    pub targets: Vec<BuildTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesParams {
    pub targets: Vec<BuildTargetIdentifier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesResult {
    pub items: Vec<SourcesItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesItem {
    pub target: BuildTargetIdentifier,
    pub sources: Vec<SourceItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roots: Vec<String>,
}

pub const SOURCE_ITEM_FILE: i32 = 1;
pub const SOURCE_ITEM_DIRECTORY: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceItem {
    pub uri: String,
    pub kind: i32,
    pub generated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPathsParams {
    pub targets: Vec<BuildTargetIdentifier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPathsResult {
    pub items: Vec<OutputPathsItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputPathsItem {
    pub target: BuildTargetIdentifier,
    pub output_paths: Vec<OutputPathItem>,
}

pub const OUTPUT_PATH_FILE: i32 = 1;
pub const OUTPUT_PATH_DIRECTORY: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputPathItem {
    pub uri: String,
    pub kind: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySourcesParams {
    pub targets: Vec<BuildTargetIdentifier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySourcesResult {
    pub items: Vec<DependencySourcesItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencySourcesItem {
    pub target: BuildTargetIdentifier,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileParams {
    pub targets: Vec<BuildTargetIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    pub status_code: StatusCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestParams {
    pub targets: Vec<BuildTargetIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// `data` payload for scoping a test request to specific classes
/// (`dataKind == "testClasses"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestClassesData {
    #[serde(default)]
    pub test_classes: Vec<String>,
}

impl TestParams {
    /// Extract the class filter when present and well-formed.
    pub fn test_classes(&self) -> Vec<String> {
        if self.data_kind.as_deref() != Some("testClasses") {
            return Vec::new();
        }
        self.data
            .as_ref()
            .and_then(|data| serde_json::from_value::<TestClassesData>(data.clone()).ok())
            .map(|data| data.test_classes)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    pub status_code: StatusCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunParams {
    pub target: BuildTargetIdentifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    pub status_code: StatusCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanCacheParams {
    pub targets: Vec<BuildTargetIdentifier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanCacheResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub cleaned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskId {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStartParams {
    pub task_id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgressParams {
    pub task_id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFinishParams {
    pub task_id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: StatusCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDocumentIdentifier {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: i32,
    pub character: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub range: Range,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishDiagnosticsParams {
    pub text_document: TextDocumentIdentifier,
    pub build_target: BuildTargetIdentifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default)]
    pub reset: bool,
}

pub const MESSAGE_TYPE_ERROR: i32 = 1;
pub const MESSAGE_TYPE_WARNING: i32 = 2;
pub const MESSAGE_TYPE_INFO: i32 = 3;
pub const MESSAGE_TYPE_LOG: i32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessageParams {
    #[serde(rename = "type")]
    pub message_type: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    pub message: String,
}

pub const BUILD_TARGET_EVENT_CREATED: i32 = 1;
pub const BUILD_TARGET_EVENT_CHANGED: i32 = 2;
pub const BUILD_TARGET_EVENT_DELETED: i32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidChangeBuildTarget {
    pub changes: Vec<BuildTargetEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTargetEvent {
    pub target: BuildTargetIdentifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequestParams {
    pub id: RequestId,
}

/// Client notification that build configuration files changed on disk.
///
/// The URI list is advisory; invalidation is fingerprint-driven per
/// workspace root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidChangeBuildFilesParams {
    #[serde(default)]
    pub uris: Vec<String>,
}
