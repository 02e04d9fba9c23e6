//! Persistence of generation results.
//!
//! A run owns one namespace keyed by its selection parameters. Inside it,
//! every reduction call leaves a derived [`Artifact`] at `(level, index)`
//! and the synthesis call leaves one summary artifact. The presence of an
//! artifact is the only completion signal: a key that has a value is never
//! computed again, which is what makes runs resumable and idempotent.
//!
//! [`FsArtifactStore`] lays the namespace out on disk:
//!
//! ```text
//! <data_dir>/<app_id>/texts/<params_hash>/
//!   0/
//!     0.json   0.txt
//!     1.json   1.txt
//!   1/
//!     0.json   0.txt
//!   summary.json
//!   summary.txt
//! ```
//!
//! The `.json` files are authoritative; the `.txt` siblings hold the output
//! text alone for people reading the results.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

use crate::error::{DistillError, Result};
use crate::select::SelectionParams;

/// One generation call: the system prompt, the user input, and the output.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub prompt: String,
    pub input: String,
    pub output: String,
}

/// Key-value store for derived and summary artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Whether the derived artifact at `(level, index)` exists.
    fn has_derived(&self, level: usize, index: usize) -> Result<bool>;

    /// Persist the derived artifact at `(level, index)`. Existing keys are
    /// never overwritten.
    fn save_derived(&self, level: usize, index: usize, artifact: &Artifact) -> Result<()>;

    /// Every derived artifact stored for `level`, ordered by index.
    fn load_level(&self, level: usize) -> Result<Vec<(usize, Artifact)>>;

    /// The final summary, if one was stored.
    fn load_summary(&self) -> Result<Option<Artifact>>;

    /// Persist the final summary.
    fn save_summary(&self, artifact: &Artifact) -> Result<()>;

    /// Where the readable summary text lives.
    fn summary_location(&self) -> PathBuf;
}

/// Filesystem-backed [`ArtifactStore`].
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Open (and create) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| DistillError::Store(format!("failed to create {}: {e}", root.display())))?;
        Ok(Self { root })
    }

    /// Open the namespace for an app and a set of selection parameters.
    pub fn for_run(data_dir: &Path, app_id: &str, params: &SelectionParams) -> Result<Self> {
        Self::new(data_dir.join(app_id).join("texts").join(params.hash()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn level_dir(&self, level: usize) -> PathBuf {
        self.root.join(level.to_string())
    }

    fn derived_path(&self, level: usize, index: usize) -> PathBuf {
        self.level_dir(level).join(format!("{index}.json"))
    }

    fn summary_path(&self) -> PathBuf {
        self.root.join("summary.json")
    }

    fn read_artifact(path: &Path) -> Result<Artifact> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| DistillError::Store(format!("failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&json)
            .map_err(|e| DistillError::Store(format!("failed to parse {}: {e}", path.display())))
    }

    /// The `.txt` sibling is written first so a present `.json` implies both.
    fn write_artifact(path: &Path, artifact: &Artifact) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| DistillError::Store(format!("no parent for {}", path.display())))?;
        std::fs::create_dir_all(dir)
            .map_err(|e| DistillError::Store(format!("failed to create {}: {e}", dir.display())))?;

        std::fs::write(path.with_extension("txt"), &artifact.output).map_err(|e| {
            DistillError::Store(format!("failed to write text for {}: {e}", path.display()))
        })?;

        write_json_atomic(path, artifact)?;
        trace!("Wrote artifact {}", path.display());
        Ok(())
    }
}

/// Serialize `value` to a temp file next to `path`, then rename it into place.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(&tmp_path, json)
        .map_err(|e| DistillError::Store(format!("failed to write {}: {e}", tmp_path.display())))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| DistillError::Store(format!("failed to rename into {}: {e}", path.display())))?;
    Ok(())
}

impl ArtifactStore for FsArtifactStore {
    fn has_derived(&self, level: usize, index: usize) -> Result<bool> {
        Ok(self.derived_path(level, index).is_file())
    }

    fn save_derived(&self, level: usize, index: usize, artifact: &Artifact) -> Result<()> {
        let path = self.derived_path(level, index);
        if path.exists() {
            return Err(DistillError::Store(format!(
                "artifact ({level}, {index}) already exists at {}",
                path.display()
            )));
        }
        Self::write_artifact(&path, artifact)
    }

    fn load_level(&self, level: usize) -> Result<Vec<(usize, Artifact)>> {
        let dir = self.level_dir(level);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&dir)
            .map_err(|e| DistillError::Store(format!("failed to read {}: {e}", dir.display())))?;

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DistillError::Store(format!("failed to read entry: {e}")))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            match stem.parse::<usize>() {
                Ok(index) => artifacts.push((index, Self::read_artifact(&entry.path())?)),
                Err(_) => warn!("Ignoring unexpected file {} in level {level}", name),
            }
        }
        artifacts.sort_by_key(|(index, _)| *index);
        Ok(artifacts)
    }

    fn load_summary(&self) -> Result<Option<Artifact>> {
        let path = self.summary_path();
        if !path.is_file() {
            return Ok(None);
        }
        Self::read_artifact(&path).map(Some)
    }

    fn save_summary(&self, artifact: &Artifact) -> Result<()> {
        Self::write_artifact(&self.summary_path(), artifact)
    }

    fn summary_location(&self) -> PathBuf {
        self.summary_path().with_extension("txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(output: &str) -> Artifact {
        Artifact {
            prompt: "p".into(),
            input: format!("input for {output}"),
            output: output.into(),
        }
    }

    #[test]
    fn derived_round_trip_with_text_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();

        assert!(!store.has_derived(0, 0).unwrap());
        store.save_derived(0, 0, &artifact("first")).unwrap();
        assert!(store.has_derived(0, 0).unwrap());

        let loaded = store.load_level(0).unwrap();
        assert_eq!(loaded, vec![(0, artifact("first"))]);

        let txt = std::fs::read_to_string(dir.path().join("0").join("0.txt")).unwrap();
        assert_eq!(txt, "first");
    }

    #[test]
    fn existing_artifacts_are_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        store.save_derived(1, 3, &artifact("kept")).unwrap();

        assert!(store.save_derived(1, 3, &artifact("replacement")).is_err());
        assert_eq!(store.load_level(1).unwrap()[0].1.output, "kept");
    }

    #[test]
    fn level_scan_is_ordered_numerically_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        for index in [10, 2, 0, 1] {
            store
                .save_derived(0, index, &artifact(&format!("out-{index}")))
                .unwrap();
        }
        std::fs::write(dir.path().join("0").join("notes.json"), "{}").unwrap();

        let outputs: Vec<String> = store
            .load_level(0)
            .unwrap()
            .into_iter()
            .map(|(_, a)| a.output)
            .collect();
        assert_eq!(outputs, vec!["out-0", "out-1", "out-2", "out-10"]);
    }

    #[test]
    fn missing_level_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        assert!(store.load_level(4).unwrap().is_empty());
    }

    #[test]
    fn summary_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        assert!(store.load_summary().unwrap().is_none());

        store.save_summary(&artifact("the article")).unwrap();
        assert_eq!(store.load_summary().unwrap(), Some(artifact("the article")));
        assert_eq!(
            std::fs::read_to_string(store.summary_location()).unwrap(),
            "the article"
        );
    }

    #[test]
    fn run_namespace_is_keyed_by_params_hash() {
        let dir = tempfile::tempdir().unwrap();
        let params = SelectionParams::new(Some(2000), Some(5));
        let store = FsArtifactStore::for_run(dir.path(), "2398120", &params).unwrap();
        assert_eq!(
            store.root(),
            dir.path().join("2398120").join("texts").join(params.hash())
        );
    }
}
