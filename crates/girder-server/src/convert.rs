//! Model <-> wire conversions.

use girder_bsp as bsp;
use girder_core::{path_to_file_uri, Severity};
use girder_model::{BuildTarget, BuildTargetId, TargetKind};
use std::path::Path;

pub fn target_id_to_wire(id: &BuildTargetId) -> bsp::BuildTargetIdentifier {
    bsp::BuildTargetIdentifier::new(id.as_uri())
}

pub fn path_uri(path: &Path) -> String {
    path_to_file_uri(path).unwrap_or_else(|_| format!("file://{}", path.display()))
}

pub fn target_to_wire(target: &BuildTarget) -> bsp::BuildTarget {
    let tags = match target.kind {
        TargetKind::Library => vec![bsp::target_tags::LIBRARY.to_string()],
        TargetKind::Application => vec![bsp::target_tags::APPLICATION.to_string()],
        TargetKind::Test => vec![bsp::target_tags::TEST.to_string()],
    };

    let (data_kind, data) = match &target.jvm {
        Some(jvm) => {
            let data = bsp::JvmBuildTargetData {
                java_home: jvm
                    .java_home
                    .as_deref()
                    .map(path_uri)
                    .unwrap_or_default(),
                java_version: jvm.java_version.clone(),
                gradle_version: jvm.gradle_version.clone(),
                source_compatibility: jvm.source_compatibility.clone(),
                target_compatibility: jvm.target_compatibility.clone(),
            };
            (
                Some("jvm".to_string()),
                serde_json::to_value(data).ok(),
            )
        }
        None => (None, None),
    };

    bsp::BuildTarget {
        id: target_id_to_wire(&target.id),
        display_name: Some(target.display_name.clone()),
        base_directory: Some(path_uri(&target.base_directory)),
        tags,
        language_ids: target.language_ids.clone(),
        dependencies: target.dependencies.iter().map(target_id_to_wire).collect(),
        capabilities: bsp::BuildTargetCapabilities {
            can_compile: target.capabilities.can_compile,
            can_test: target.capabilities.can_test,
            can_run: target.capabilities.can_run,
            can_debug: target.capabilities.can_debug,
        },
        data_kind,
        data,
    }
}

pub fn sources_item(target: &BuildTarget) -> bsp::SourcesItem {
    let mut sources = Vec::new();
    for dir in &target.source_dirs {
        sources.push(bsp::SourceItem {
            uri: path_uri(dir),
            kind: bsp::SOURCE_ITEM_DIRECTORY,
            generated: false,
        });
    }
    for dir in &target.generated_source_dirs {
        sources.push(bsp::SourceItem {
            uri: path_uri(dir),
            kind: bsp::SOURCE_ITEM_DIRECTORY,
            generated: true,
        });
    }

    bsp::SourcesItem {
        target: target_id_to_wire(&target.id),
        roots: sources.iter().map(|item| item.uri.clone()).collect(),
        sources,
    }
}

pub fn output_paths_item(target: &BuildTarget) -> bsp::OutputPathsItem {
    bsp::OutputPathsItem {
        target: target_id_to_wire(&target.id),
        output_paths: target
            .output_dirs
            .iter()
            .map(|dir| bsp::OutputPathItem {
                uri: path_uri(dir),
                kind: bsp::OUTPUT_PATH_DIRECTORY,
            })
            .collect(),
    }
}

pub fn dependency_sources_item(target: &BuildTarget) -> bsp::DependencySourcesItem {
    bsp::DependencySourcesItem {
        target: target_id_to_wire(&target.id),
        sources: target
            .external_dependencies
            .iter()
            .filter_map(|dep| dep.source_jar.as_deref().map(path_uri))
            .collect(),
    }
}

pub fn severity_to_wire(severity: Severity) -> i32 {
    match severity {
        Severity::Error => 1,
        Severity::Warning => 2,
        Severity::Information => 3,
        Severity::Hint => 4,
    }
}

pub fn diagnostic_to_wire(diagnostic: &girder_core::Diagnostic) -> bsp::Diagnostic {
    bsp::Diagnostic {
        range: bsp::Range {
            start: bsp::Position {
                line: diagnostic.range.start.line as i32,
                character: diagnostic.range.start.character as i32,
            },
            end: bsp::Position {
                line: diagnostic.range.end.line as i32,
                character: diagnostic.range.end.character as i32,
            },
        },
        severity: Some(severity_to_wire(diagnostic.severity)),
        source: diagnostic.source.clone(),
        message: diagnostic.message.clone(),
    }
}
