//! The project model cache.
//!
//! One entry per workspace root, holding the last good snapshot behind an
//! `Arc`. Readers never block writers: a refresh builds the replacement off
//! to the side and swaps it in atomically under the entry lock, bumping the
//! generation token. At most one model fetch is in flight per root;
//! concurrent refreshers collapse onto it.

use girder_gradle::{BuildFingerprint, CancellationToken, NativeBuildModel};
use girder_model::{ProjectModelSnapshot, SnapshotDiff};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("model fetch failed: {message}")]
pub struct FetchError {
    pub message: String,
    /// Connection-class failures are worth retrying; translation and tool
    /// errors are not until the build files change.
    pub retryable: bool,
}

/// How the cache obtains a native model. The production implementation goes
/// through the connector so fetches queue behind builds on the same root;
/// tests substitute scripted fetchers.
pub trait ModelFetcher: Send + Sync {
    fn fetch(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<NativeBuildModel, FetchError>;
}

pub struct ProjectModelCache {
    fetcher: Arc<dyn ModelFetcher>,
    roots: Mutex<HashMap<PathBuf, Arc<RootEntry>>>,
}

#[derive(Default)]
struct RootEntry {
    state: Mutex<RootState>,
    done: Condvar,
}

struct RootState {
    current: Option<Arc<ProjectModelSnapshot>>,
    next_generation: u64,
    fetching: bool,
    /// Bumped when a fetch settles, so waiters can tell "the fetch I joined"
    /// from a later one.
    epoch: u64,
    last_result: Option<Result<Arc<ProjectModelSnapshot>, FetchError>>,
    last_diff: SnapshotDiff,
}

impl Default for RootState {
    fn default() -> Self {
        Self {
            current: None,
            next_generation: 1,
            fetching: false,
            epoch: 0,
            last_result: None,
            last_diff: SnapshotDiff::default(),
        }
    }
}

impl ProjectModelCache {
    pub fn new(fetcher: Arc<dyn ModelFetcher>) -> Self {
        Self {
            fetcher,
            roots: Mutex::new(HashMap::new()),
        }
    }

    /// Get the snapshot for `root`, refreshing when there is none, when the
    /// build-file fingerprint went stale, or when `force` is set.
    ///
    /// Non-forced callers prefer a stale-but-available snapshot over
    /// blocking behind an in-flight fetch.
    pub fn snapshot(
        &self,
        root: &Path,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<Arc<ProjectModelSnapshot>, FetchError> {
        self.snapshot_inner(root, force, cancel)
            .map(|(snapshot, _)| snapshot)
    }

    /// Force a refresh and report the target diff against the previous
    /// snapshot. Collapsing callers observe the diff of the fetch they
    /// joined.
    pub fn refresh(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<(Arc<ProjectModelSnapshot>, SnapshotDiff), FetchError> {
        self.snapshot_inner(root, true, cancel)
    }

    fn snapshot_inner(
        &self,
        root: &Path,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<(Arc<ProjectModelSnapshot>, SnapshotDiff), FetchError> {
        let entry = self.entry_for(root);
        let mut state = entry.state.lock().expect("cache lock poisoned");

        loop {
            if !force {
                if let Some(current) = state.current.clone() {
                    if fingerprint_matches(root, &current) {
                        return Ok((current, SnapshotDiff::default()));
                    }
                    // Stale, but a refresh is already under way: serve the
                    // old snapshot instead of blocking.
                    if state.fetching {
                        return Ok((current, SnapshotDiff::default()));
                    }
                } else if state.fetching {
                    // Nothing to serve yet; join the in-flight fetch. On
                    // failure there is no fallback, so the error propagates.
                    let joined = state.epoch;
                    while state.fetching && state.epoch == joined {
                        state = entry.done.wait(state).expect("cache lock poisoned");
                    }
                    match state.last_result.clone() {
                        Some(Ok(snapshot)) => {
                            let diff = state.last_diff.clone();
                            return Ok((snapshot, diff));
                        }
                        Some(Err(err)) => match state.current.clone() {
                            Some(current) => return Ok((current, SnapshotDiff::default())),
                            None => return Err(err),
                        },
                        None => continue,
                    }
                }
            } else if state.fetching {
                // Forced refreshers collapse onto the in-flight fetch; all of
                // them receive that fetch's result.
                let joined = state.epoch;
                while state.fetching && state.epoch == joined {
                    state = entry.done.wait(state).expect("cache lock poisoned");
                }
                match state.last_result.clone() {
                    Some(Ok(snapshot)) => {
                        let diff = state.last_diff.clone();
                        return Ok((snapshot, diff));
                    }
                    Some(Err(err)) => return Err(err),
                    None => continue,
                }
            }

            state.fetching = true;
            break;
        }
        drop(state);

        // Perform the fetch without holding any lock; readers keep being
        // served the previous snapshot meanwhile.
        let fetched = BuildFingerprint::of_workspace(root)
            .map_err(|err| FetchError {
                message: format!("failed to fingerprint build files: {err}"),
                retryable: false,
            })
            .and_then(|fingerprint| {
                self.fetcher
                    .fetch(root, cancel)
                    .map(|model| (fingerprint, model))
            });

        let mut state = entry.state.lock().expect("cache lock poisoned");
        state.fetching = false;
        state.epoch += 1;

        let result = match fetched {
            Ok((fingerprint, model)) => {
                let generation = state.next_generation;
                state.next_generation += 1;
                let snapshot = Arc::new(ProjectModelSnapshot::from_native(
                    generation,
                    fingerprint,
                    &model,
                ));
                let diff = match &state.current {
                    Some(previous) => ProjectModelSnapshot::diff(previous, &snapshot),
                    None => SnapshotDiff::default(),
                };
                state.current = Some(snapshot.clone());
                state.last_result = Some(Ok(snapshot.clone()));
                state.last_diff = diff.clone();
                Ok((snapshot, diff))
            }
            Err(err) => {
                // Keep serving the last good snapshot. Callers that demanded
                // freshness get the error; opportunistic readers fall back.
                state.last_result = Some(Err(err.clone()));
                state.last_diff = SnapshotDiff::default();
                match (state.current.clone(), force) {
                    (Some(current), false) => Ok((current, SnapshotDiff::default())),
                    _ => Err(err),
                }
            }
        };

        entry.done.notify_all();
        result
    }

    fn entry_for(&self, root: &Path) -> Arc<RootEntry> {
        let mut roots = self.roots.lock().expect("cache lock poisoned");
        roots
            .entry(root.to_path_buf())
            .or_insert_with(|| Arc::new(RootEntry::default()))
            .clone()
    }
}

fn fingerprint_matches(root: &Path, snapshot: &ProjectModelSnapshot) -> bool {
    match BuildFingerprint::of_workspace(root) {
        Ok(fingerprint) => fingerprint == *snapshot.fingerprint(),
        // Unreadable build files count as stale.
        Err(_) => false,
    }
}
