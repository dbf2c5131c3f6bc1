//! Build-file fingerprints.
//!
//! A fingerprint is a content hash over every build configuration file in a
//! workspace, used to decide whether a cached project model is stale.

use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFingerprint {
    pub digest: String,
}

impl BuildFingerprint {
    /// Hash the given files. Paths are hashed relative to `root` so a moved
    /// checkout with identical contents fingerprints identically.
    pub fn from_files(root: &Path, mut files: Vec<PathBuf>) -> Result<Self> {
        files.sort();
        files.dedup();

        let mut hasher = Sha256::new();
        for path in files {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            hasher.update(rel.to_string_lossy().as_bytes());
            hasher.update([0]);

            let bytes = fs::read(&path)?;
            hasher.update(&bytes);
            hasher.update([0]);
        }

        Ok(Self {
            digest: hex::encode(hasher.finalize()),
        })
    }

    /// Fingerprint a workspace root by collecting its Gradle build files.
    pub fn of_workspace(root: &Path) -> Result<Self> {
        Self::from_files(root, collect_build_files(root)?)
    }
}

/// Collect every file that can influence Gradle's project configuration.
pub fn collect_build_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    collect_rec(root, root, &mut out)?;
    // Stable order for hashing.
    out.sort_by(|a, b| {
        let ra = a.strip_prefix(root).unwrap_or(a);
        let rb = b.strip_prefix(root).unwrap_or(b);
        ra.cmp(rb)
    });
    out.dedup();
    Ok(out)
}

fn collect_rec(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();

        if path.is_dir() {
            if matches!(
                file_name.as_ref(),
                ".git" | ".gradle" | "build" | "out" | ".idea"
            ) {
                continue;
            }
            collect_rec(root, &path, out)?;
            continue;
        }

        let name = file_name.as_ref();

        // Any `build.gradle*` / `settings.gradle*` variant counts, including
        // the `.kts` forms.
        if name.starts_with("build.gradle") || name.starts_with("settings.gradle") {
            out.push(path);
            continue;
        }

        match name {
            "gradle.properties" => out.push(path),
            "libs.versions.toml" => {
                if path.parent().and_then(Path::file_name).is_some_and(|parent| parent == "gradle")
                {
                    out.push(path);
                }
            }
            "gradle-wrapper.properties" => {
                if path.ends_with(Path::new("gradle/wrapper/gradle-wrapper.properties")) {
                    out.push(path);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn collects_build_files_and_skips_output_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("settings.gradle.kts"), "rootProject.name = \"w\"");
        touch(&root.join("app/build.gradle"), "plugins {}");
        touch(&root.join("gradle.properties"), "org.gradle.caching=true");
        touch(
            &root.join("gradle/wrapper/gradle-wrapper.properties"),
            "distributionUrl=...",
        );
        // Must not be picked up.
        touch(&root.join("build/build.gradle"), "generated");
        touch(&root.join("app/src/main/java/App.java"), "class App {}");

        let files = collect_build_files(root).unwrap();
        let names: Vec<PathBuf> = files
            .iter()
            .map(|f| f.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("app/build.gradle"),
                PathBuf::from("gradle.properties"),
                PathBuf::from("gradle/wrapper/gradle-wrapper.properties"),
                PathBuf::from("settings.gradle.kts"),
            ]
        );
    }

    #[test]
    fn fingerprint_changes_with_content_and_is_stable_otherwise() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("build.gradle"), "plugins { id 'java' }");

        let first = BuildFingerprint::of_workspace(root).unwrap();
        let again = BuildFingerprint::of_workspace(root).unwrap();
        assert_eq!(first, again);

        touch(&root.join("build.gradle"), "plugins { id 'application' }");
        let changed = BuildFingerprint::of_workspace(root).unwrap();
        assert_ne!(first, changed);
    }
}
