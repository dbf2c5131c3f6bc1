//! Server preferences.
//!
//! Clients pass these in the `data` field of `build/initialize`; missing
//! fields keep their defaults, unknown fields are ignored so older servers
//! tolerate newer clients.

use girder_gradle::LauncherConfig;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    /// `gradle` executable used when the workspace has no wrapper.
    pub gradle_path: Option<PathBuf>,
    /// Prefer `./gradlew` when present.
    pub prefer_wrapper: bool,
    /// Exported as `JAVA_HOME` to Gradle.
    pub java_home: Option<PathBuf>,
    /// Init script registering the companion model-export task. Without it
    /// the server falls back to a reduced project scan.
    pub init_script: Option<PathBuf>,
    /// Extra arguments for every Gradle invocation.
    pub gradle_arguments: Vec<String>,
    /// Refresh the project model in the background after a successful
    /// compile, picking up generated source roots.
    pub reload_after_compile: bool,
    /// Emit `buildTarget/didChange` notifications when the target set
    /// changes.
    pub notify_target_changes: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            gradle_path: None,
            prefer_wrapper: true,
            java_home: None,
            init_script: None,
            gradle_arguments: Vec::new(),
            reload_after_compile: true,
            notify_target_changes: true,
        }
    }
}

impl Preferences {
    /// Parse from the initialize `data` blob; `None` or a malformed blob
    /// falls back to defaults rather than failing the handshake.
    pub fn from_initialize_data(data: Option<&serde_json::Value>) -> Self {
        data.and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }

    pub fn launcher_config(&self) -> LauncherConfig {
        let defaults = LauncherConfig::default();
        LauncherConfig {
            gradle_path: self.gradle_path.clone().unwrap_or(defaults.gradle_path),
            prefer_wrapper: self.prefer_wrapper,
            java_home: self.java_home.clone(),
            init_script: self.init_script.clone(),
            extra_args: self.gradle_arguments.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_data_yields_defaults() {
        let prefs = Preferences::from_initialize_data(None);
        assert!(prefs.prefer_wrapper);
        assert!(prefs.reload_after_compile);
        assert!(prefs.gradle_path.is_none());
    }

    #[test]
    fn partial_data_overrides_only_named_fields() {
        let data = serde_json::json!({
            "gradlePath": "/opt/gradle/bin/gradle",
            "reloadAfterCompile": false,
            "somethingFromTheFuture": true
        });
        let prefs = Preferences::from_initialize_data(Some(&data));
        assert_eq!(
            prefs.gradle_path,
            Some(PathBuf::from("/opt/gradle/bin/gradle"))
        );
        assert!(!prefs.reload_after_compile);
        assert!(prefs.prefer_wrapper);
    }
}
