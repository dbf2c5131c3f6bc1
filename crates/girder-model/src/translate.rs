//! Native model -> build target translation.
//!
//! Pure and deterministic: the same native model always yields the same
//! identifiers, the same dependency edges, and the same iteration order.
//! Translation never fails wholesale — a module that failed to resolve
//! still yields a degraded target with an error marker.

use crate::target::{BuildTarget, BuildTargetId, JvmSettings, TargetCapabilities, TargetKind};
use girder_gradle::{NativeBuildModel, NativeModule, NativeSourceSet};
use std::collections::BTreeMap;

pub fn translate(model: &NativeBuildModel) -> BTreeMap<BuildTargetId, BuildTarget> {
    let mut targets = BTreeMap::new();

    // First pass: produce targets and remember which (project dir, source
    // set) pairs exist, so dependency edges can be resolved in-snapshot.
    let mut produced: BTreeMap<(std::path::PathBuf, String), BuildTargetId> = BTreeMap::new();
    for module in &model.modules {
        if let Some(error) = &module.resolution_error {
            let target = unresolved_target(module, error);
            produced.insert(
                (module.project_dir.clone(), target.source_set.clone()),
                target.id.clone(),
            );
            targets.insert(target.id.clone(), target);
            continue;
        }

        for source_set in &module.source_sets {
            let target = source_set_target(model, module, source_set);
            produced.insert(
                (module.project_dir.clone(), source_set.name.clone()),
                target.id.clone(),
            );
            targets.insert(target.id.clone(), target);
        }
    }

    // Second pass: resolve dependency edges. Edges that do not land on a
    // produced target are module-external and already covered by the
    // external dependency metadata.
    for module in &model.modules {
        for source_set in &module.source_sets {
            let id = BuildTargetId::derive(&module.project_dir, &source_set.name);
            let mut dependencies: Vec<BuildTargetId> = source_set
                .module_dependencies
                .iter()
                .filter_map(|dep| {
                    produced
                        .get(&(dep.project_dir.clone(), dep.source_set_name.clone()))
                        .cloned()
                })
                .filter(|dep| *dep != id)
                .collect();
            dependencies.sort();
            dependencies.dedup();

            if let Some(target) = targets.get_mut(&id) {
                target.dependencies = dependencies;
            }
        }
    }

    make_display_names_unique(&mut targets);
    targets
}

fn source_set_target(
    model: &NativeBuildModel,
    module: &NativeModule,
    source_set: &NativeSourceSet,
) -> BuildTarget {
    let id = BuildTargetId::derive(&module.project_dir, &source_set.name);
    let capabilities = TargetCapabilities {
        can_compile: source_set.classes_task_name.is_some(),
        can_test: source_set.test_task_name.is_some(),
        can_run: source_set.run_task_name.is_some(),
        can_debug: false,
    };

    let language_ids = if source_set.language_ids.is_empty() {
        vec!["java".to_string()]
    } else {
        source_set.language_ids.clone()
    };

    let jvm = source_set.java.as_ref().map(|java| JvmSettings {
        java_home: java.java_home.clone(),
        java_version: java.java_version.clone(),
        source_compatibility: java.source_compatibility.clone(),
        target_compatibility: java.target_compatibility.clone(),
        gradle_version: model.gradle_version.clone().unwrap_or_default(),
    });

    BuildTarget {
        id,
        display_name: display_name(module, &source_set.name),
        base_directory: module.root_dir.clone(),
        project_dir: module.project_dir.clone(),
        project_path: module.project_path.clone(),
        source_set: source_set.name.clone(),
        kind: kind_of(source_set),
        capabilities,
        language_ids,
        dependencies: Vec::new(),
        external_dependencies: source_set.external_dependencies.clone(),
        source_dirs: source_set.source_dirs.clone(),
        generated_source_dirs: source_set.generated_source_dirs.clone(),
        resource_dirs: source_set.resource_dirs.clone(),
        output_dirs: source_set.output_dirs.clone(),
        classes_task: source_set.classes_task_name.clone(),
        clean_task: source_set.clean_task_name.clone(),
        test_task: source_set.test_task_name.clone(),
        run_task: source_set.run_task_name.clone(),
        task_names: source_set.task_names.clone(),
        jvm,
        error: None,
    }
}

/// A module Gradle could not configure still yields a visible target, with
/// everything interesting disabled.
fn unresolved_target(module: &NativeModule, error: &str) -> BuildTarget {
    BuildTarget {
        id: BuildTargetId::derive(&module.project_dir, "main"),
        display_name: display_name(module, "main"),
        base_directory: module.root_dir.clone(),
        project_dir: module.project_dir.clone(),
        project_path: module.project_path.clone(),
        source_set: "main".to_string(),
        kind: TargetKind::Library,
        capabilities: TargetCapabilities::default(),
        language_ids: Vec::new(),
        dependencies: Vec::new(),
        external_dependencies: Vec::new(),
        source_dirs: Vec::new(),
        generated_source_dirs: Vec::new(),
        resource_dirs: Vec::new(),
        output_dirs: Vec::new(),
        classes_task: None,
        clean_task: None,
        test_task: None,
        run_task: None,
        task_names: Vec::new(),
        jvm: None,
        error: Some(error.to_string()),
    }
}

/// Kind computation: explicit exporter kinds are trusted; anything
/// unrecognized falls back to entry-point sniffing, and ultimately to a
/// plain library so no unit is ever dropped.
fn kind_of(source_set: &NativeSourceSet) -> TargetKind {
    match source_set.kind.as_deref() {
        Some("application") => TargetKind::Application,
        Some("test") => TargetKind::Test,
        Some("library") => TargetKind::Library,
        _ => {
            if source_set.run_task_name.is_some() {
                TargetKind::Application
            } else if source_set.has_tests && source_set.test_task_name.is_some() {
                TargetKind::Test
            } else {
                TargetKind::Library
            }
        }
    }
}

fn display_name(module: &NativeModule, source_set: &str) -> String {
    let project = if module.project_path == ":" {
        module
            .project_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| ":".to_string())
    } else {
        module.project_path.clone()
    };
    format!("{project} [{source_set}]")
}

/// Composite builds can repeat project paths; suffix duplicates so every
/// display name is unique within the snapshot.
fn make_display_names_unique(targets: &mut BTreeMap<BuildTargetId, BuildTarget>) {
    let mut seen: BTreeMap<String, u32> = BTreeMap::new();
    for target in targets.values_mut() {
        let count = seen.entry(target.display_name.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            target.display_name = format!("{} ({})", target.display_name, *count);
        }
    }
}
