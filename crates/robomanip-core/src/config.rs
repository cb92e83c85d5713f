//! Configuration for the rollout driver and dataset output paths.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// How the external per-task rollout program is located and launched.
///
/// The program for a task is `<interpreter> <script_dir>/Rollout<policy><task>.py`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutConfig {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_script_dir")]
    pub script_dir: PathBuf,
    #[serde(default = "default_policy")]
    pub policy: String,
}

fn default_interpreter() -> String {
    "python".into()
}
fn default_script_dir() -> PathBuf {
    PathBuf::from("./bin/rollout")
}
fn default_policy() -> String {
    "Act".into()
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            script_dir: default_script_dir(),
            policy: default_policy(),
        }
    }
}

impl RolloutConfig {
    /// Load config from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Create configuration from the process environment and defaults.
    ///
    /// `ROBOMANIP_CONFIG` names an optional JSON file; `ROBOMANIP_PYTHON`,
    /// `ROBOMANIP_ROLLOUT_DIR` and `ROBOMANIP_POLICY` override single fields.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RolloutConfig::from_env`] with an injectable variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("ROBOMANIP_CONFIG") {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(interpreter) = lookup("ROBOMANIP_PYTHON") {
            if interpreter.trim().is_empty() {
                return Err(Error::Config("ROBOMANIP_PYTHON is empty".into()));
            }
            config.interpreter = interpreter;
        }
        if let Some(dir) = lookup("ROBOMANIP_ROLLOUT_DIR") {
            config.script_dir = PathBuf::from(dir);
        }
        if let Some(policy) = lookup("ROBOMANIP_POLICY") {
            config.policy = policy;
        }

        debug!(?config, "rollout config resolved");
        Ok(config)
    }

    /// Path of the rollout script for a task.
    pub fn script_for(&self, task: &str) -> PathBuf {
        self.script_dir
            .join(format!("Rollout{}{}.py", self.policy, task))
    }
}

/// Output locations of a processed (split) dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetPaths {
    /// Root of the processed tree.
    pub root: PathBuf,
    /// Training split (`<root>/train/`).
    pub train: PathBuf,
    /// Test split (`<root>/test/`).
    pub test: PathBuf,
    /// Split manifest (`<root>/split_manifest.json`).
    pub manifest_file: PathBuf,
}

impl DatasetPaths {
    /// Name the output paths under `root`. Nothing is created on disk.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            train: root.join("train"),
            test: root.join("test"),
            manifest_file: root.join("split_manifest.json"),
            root,
        }
    }

    /// Create the train and test directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.train)?;
        std::fs::create_dir_all(&self.test)?;
        Ok(())
    }
}
