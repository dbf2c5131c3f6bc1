//! The protocol-side project model: build targets, immutable snapshots,
//! and the pure translation from Gradle's native model.

mod snapshot;
mod target;
mod translate;

pub use snapshot::{ProjectModelSnapshot, SnapshotDiff};
pub use target::{BuildTarget, BuildTargetId, JvmSettings, TargetCapabilities, TargetKind};
pub use translate::translate;
