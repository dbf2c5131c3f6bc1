//! Immutable project model snapshots.

use crate::target::{BuildTarget, BuildTargetId};
use crate::translate::translate;
use girder_gradle::{BuildFingerprint, NativeBuildModel};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The full translated model for one workspace root at one point in time.
///
/// Snapshots are internally consistent (every dependency edge resolves
/// inside the snapshot), shared behind `Arc`, and replaced wholesale on
/// refresh — never patched in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectModelSnapshot {
    generation: u64,
    fingerprint: BuildFingerprint,
    targets: BTreeMap<BuildTargetId, BuildTarget>,
    /// Source directory -> owning target, longest-prefix matched.
    source_index: Vec<(PathBuf, BuildTargetId)>,
}

impl ProjectModelSnapshot {
    pub fn from_native(
        generation: u64,
        fingerprint: BuildFingerprint,
        model: &NativeBuildModel,
    ) -> Self {
        Self::from_targets(generation, fingerprint, translate(model))
    }

    pub fn from_targets(
        generation: u64,
        fingerprint: BuildFingerprint,
        targets: BTreeMap<BuildTargetId, BuildTarget>,
    ) -> Self {
        let mut source_index: Vec<(PathBuf, BuildTargetId)> = targets
            .values()
            .flat_map(|target| {
                target
                    .source_dirs
                    .iter()
                    .chain(&target.generated_source_dirs)
                    .chain(&target.resource_dirs)
                    .map(|dir| (dir.clone(), target.id.clone()))
            })
            .collect();
        // Longest paths first so nested source roots win prefix matching.
        source_index.sort_by(|a, b| {
            b.0.as_os_str()
                .len()
                .cmp(&a.0.as_os_str().len())
                .then_with(|| a.0.cmp(&b.0))
        });

        Self {
            generation,
            fingerprint,
            targets,
            source_index,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fingerprint(&self) -> &BuildFingerprint {
        &self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn target(&self, id: &BuildTargetId) -> Option<&BuildTarget> {
        self.targets.get(id)
    }

    pub fn targets(&self) -> impl Iterator<Item = &BuildTarget> {
        self.targets.values()
    }

    /// Which target owns a source file, by longest source-root prefix.
    pub fn owner_of(&self, file: &Path) -> Option<&BuildTargetId> {
        self.source_index
            .iter()
            .find(|(dir, _)| file.starts_with(dir))
            .map(|(_, id)| id)
    }

    /// Targets whose task set contains the given Gradle task path.
    pub fn targets_for_task(&self, task: &str) -> Vec<&BuildTargetId> {
        self.targets
            .values()
            .filter(|target| {
                target.task_names.iter().any(|name| name == task)
                    || target.classes_task.as_deref() == Some(task)
                    || target.clean_task.as_deref() == Some(task)
                    || target.test_task.as_deref() == Some(task)
                    || target.run_task.as_deref() == Some(task)
            })
            .map(|target| &target.id)
            .collect()
    }

    /// Compute the delta to report on `buildTarget/didChange`: identifiers
    /// only, never full snapshots.
    pub fn diff(old: &ProjectModelSnapshot, new: &ProjectModelSnapshot) -> SnapshotDiff {
        let mut diff = SnapshotDiff::default();

        for (id, target) in &new.targets {
            match old.targets.get(id) {
                None => diff.created.push(id.clone()),
                Some(previous) if previous != target => diff.changed.push(id.clone()),
                Some(_) => {}
            }
        }
        for id in old.targets.keys() {
            if !new.targets.contains_key(id) {
                diff.deleted.push(id.clone());
            }
        }

        diff
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub created: Vec<BuildTargetId>,
    pub changed: Vec<BuildTargetId>,
    pub deleted: Vec<BuildTargetId>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }
}
