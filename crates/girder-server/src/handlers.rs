//! Pure request handlers over a snapshot.

use crate::convert;
use crate::coordinator::RequestError;
use girder_bsp as bsp;
use girder_model::{BuildTarget, BuildTargetId, ProjectModelSnapshot, SnapshotDiff};

pub fn build_targets_result(snapshot: &ProjectModelSnapshot) -> bsp::WorkspaceBuildTargetsResult {
    bsp::WorkspaceBuildTargetsResult {
        targets: snapshot.targets().map(convert::target_to_wire).collect(),
    }
}

fn resolve<'a>(
    snapshot: &'a ProjectModelSnapshot,
    id: &bsp::BuildTargetIdentifier,
) -> Result<&'a BuildTarget, RequestError> {
    snapshot
        .target(&BuildTargetId::from_uri(id.uri.clone()))
        .ok_or_else(|| RequestError::UnknownTarget(id.uri.clone()))
}

pub fn sources_result(
    snapshot: &ProjectModelSnapshot,
    params: &bsp::SourcesParams,
) -> Result<bsp::SourcesResult, RequestError> {
    let mut items = Vec::with_capacity(params.targets.len());
    for id in &params.targets {
        items.push(convert::sources_item(resolve(snapshot, id)?));
    }
    Ok(bsp::SourcesResult { items })
}

pub fn output_paths_result(
    snapshot: &ProjectModelSnapshot,
    params: &bsp::OutputPathsParams,
) -> Result<bsp::OutputPathsResult, RequestError> {
    let mut items = Vec::with_capacity(params.targets.len());
    for id in &params.targets {
        items.push(convert::output_paths_item(resolve(snapshot, id)?));
    }
    Ok(bsp::OutputPathsResult { items })
}

pub fn dependency_sources_result(
    snapshot: &ProjectModelSnapshot,
    params: &bsp::DependencySourcesParams,
) -> Result<bsp::DependencySourcesResult, RequestError> {
    let mut items = Vec::with_capacity(params.targets.len());
    for id in &params.targets {
        items.push(convert::dependency_sources_item(resolve(snapshot, id)?));
    }
    Ok(bsp::DependencySourcesResult { items })
}

/// Added/changed/deleted identifiers only — never the full snapshot.
pub fn diff_to_wire(diff: &SnapshotDiff) -> bsp::DidChangeBuildTarget {
    let event = |id: &BuildTargetId, kind: i32| bsp::BuildTargetEvent {
        target: bsp::BuildTargetIdentifier::new(id.as_uri()),
        kind: Some(kind),
    };

    let mut changes = Vec::new();
    changes.extend(
        diff.created
            .iter()
            .map(|id| event(id, bsp::BUILD_TARGET_EVENT_CREATED)),
    );
    changes.extend(
        diff.changed
            .iter()
            .map(|id| event(id, bsp::BUILD_TARGET_EVENT_CHANGED)),
    );
    changes.extend(
        diff.deleted
            .iter()
            .map(|id| event(id, bsp::BUILD_TARGET_EVENT_DELETED)),
    );
    bsp::DidChangeBuildTarget { changes }
}
