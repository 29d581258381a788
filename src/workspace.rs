use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::DatasetId;
use crate::error::YamasError;
use crate::stage::Stage;

const RAW_DIR: &str = "raw";
const READS_DIR: &str = "reads";
const ARTIFACTS_DIR: &str = "artifacts";
const VISUALIZATIONS_DIR: &str = "visualizations";
const EXPORTS_DIR: &str = "exports";

pub const MANIFEST_FILE: &str = "manifest.tsv";
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Directory tree owned by one dataset run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunWorkspace {
    root: Utf8PathBuf,
}

impl RunWorkspace {
    /// Creates `<base>/<dataset>` and its sub-directories. Calling it again is a no-op.
    pub fn create(base: &Utf8Path, dataset: &DatasetId) -> Result<Self, YamasError> {
        let base = absolute(base)?;
        fs::create_dir_all(base.as_std_path())
            .map_err(|err| YamasError::Storage(format!("create {base}: {err}")))?;
        let workspace = Self {
            root: base.join(dataset.as_str()),
        };
        workspace.ensure_layout()?;
        tracing::debug!(root = %workspace.root, "workspace ready");
        Ok(workspace)
    }

    /// Attaches to a workspace created by an earlier run and restores any missing sub-directory.
    pub fn open(root: &Utf8Path) -> Result<Self, YamasError> {
        let workspace = Self::attach(root)?;
        workspace.ensure_layout()?;
        Ok(workspace)
    }

    /// Like [`RunWorkspace::open`], but leaves the directory tree untouched.
    pub fn attach(root: &Utf8Path) -> Result<Self, YamasError> {
        let root = absolute(root)?;
        if !root.as_std_path().is_dir() {
            return Err(YamasError::Input(format!(
                "workspace {root} does not exist or is not a directory"
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn raw_dir(&self) -> Utf8PathBuf {
        self.root.join(RAW_DIR)
    }

    pub fn reads_dir(&self) -> Utf8PathBuf {
        self.root.join(READS_DIR)
    }

    pub fn artifacts_dir(&self) -> Utf8PathBuf {
        self.root.join(ARTIFACTS_DIR)
    }

    pub fn visualizations_dir(&self) -> Utf8PathBuf {
        self.root.join(VISUALIZATIONS_DIR)
    }

    pub fn exports_dir(&self) -> Utf8PathBuf {
        self.root.join(EXPORTS_DIR)
    }

    pub fn artifact(&self, name: &str) -> Utf8PathBuf {
        self.artifacts_dir().join(name)
    }

    pub fn export(&self, name: &str) -> Utf8PathBuf {
        self.exports_dir().join(name)
    }

    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn checkpoint_path(&self) -> Utf8PathBuf {
        self.root.join(CHECKPOINT_FILE)
    }

    pub fn stage_log_path(&self, stage: Stage) -> Utf8PathBuf {
        self.artifacts_dir()
            .join("logs")
            .join(format!("{}.log", stage.name()))
    }

    pub fn sub_directories(&self) -> [Utf8PathBuf; 5] {
        [
            self.raw_dir(),
            self.reads_dir(),
            self.artifacts_dir(),
            self.visualizations_dir(),
            self.exports_dir(),
        ]
    }

    /// Removes downloaded archives once they have been converted. The directory itself stays.
    pub fn prune_raw(&self) -> Result<(), YamasError> {
        let raw = self.raw_dir();
        let entries = fs::read_dir(raw.as_std_path())
            .map_err(|err| YamasError::Storage(format!("read {raw}: {err}")))?;
        for entry in entries {
            let path = entry
                .map_err(|err| YamasError::Storage(err.to_string()))?
                .path();
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.map_err(|err| {
                YamasError::Storage(format!("prune {}: {err}", path.display()))
            })?;
        }
        tracing::info!(raw = %raw, "pruned raw archives");
        Ok(())
    }

    pub fn ensure_layout(&self) -> Result<(), YamasError> {
        for dir in self.sub_directories() {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| YamasError::Storage(format!("create {dir}: {err}")))?;
        }
        Ok(())
    }
}

fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf, YamasError> {
    let absolute = std::path::absolute(path.as_std_path())
        .map_err(|err| YamasError::Storage(format!("resolve {path}: {err}")))?;
    Utf8PathBuf::from_path_buf(absolute)
        .map_err(|_| YamasError::Storage(format!("non-utf8 path: {path}")))
}
