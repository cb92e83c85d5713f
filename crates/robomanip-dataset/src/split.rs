//! Train/test split of a raw dataset by environment-name keywords.
//!
//! An environment directory goes to `test` if its name contains a test
//! keyword, to `train` if it contains a train keyword, and nowhere if it
//! contains neither. Matching both is an error, so no episode can end up in
//! both splits. Files are copied, never moved or overwritten.

use std::fs::File;
use std::path::{Path, PathBuf};

use robomanip_core::{DatasetPaths, Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::scan::DatasetIndex;

/// Destination split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn dir<'a>(&self, paths: &'a DatasetPaths) -> &'a Path {
        match self {
            Self::Train => &paths.train,
            Self::Test => &paths.test,
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Keyword lists deciding which split an environment belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRule {
    #[serde(rename = "trainKeywords")]
    pub train_keywords: Vec<String>,
    #[serde(rename = "testKeywords")]
    pub test_keywords: Vec<String>,
}

impl SplitRule {
    pub fn new(train_keywords: Vec<String>, test_keywords: Vec<String>) -> Result<Self> {
        if train_keywords.is_empty() && test_keywords.is_empty() {
            return Err(Error::InvalidArgument("no split keywords given".into()));
        }
        if train_keywords
            .iter()
            .chain(test_keywords.iter())
            .any(|k| k.is_empty())
        {
            return Err(Error::InvalidArgument("split keywords must not be empty".into()));
        }
        Ok(Self {
            train_keywords,
            test_keywords,
        })
    }

    /// Split for an environment directory name, `None` if unassigned.
    pub fn assign(&self, env_name: &str) -> Result<Option<Split>> {
        let train = self.train_keywords.iter().find(|k| env_name.contains(k.as_str()));
        let test = self.test_keywords.iter().find(|k| env_name.contains(k.as_str()));
        match (train, test) {
            (Some(train), Some(test)) => Err(Error::SplitOverlap {
                env: env_name.to_string(),
                train: train.clone(),
                test: test.clone(),
            }),
            (Some(_), None) => Ok(Some(Split::Train)),
            (None, Some(_)) => Ok(Some(Split::Test)),
            (None, None) => Ok(None),
        }
    }
}

/// One file to copy.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedCopy {
    pub split: Split,
    pub env: String,
    pub source: PathBuf,
    #[serde(rename = "fileName")]
    pub file_name: String,
}

/// Every copy a split will perform, decided before anything is written.
#[derive(Debug, Clone, Serialize)]
pub struct SplitPlan {
    #[serde(rename = "sourceRoot")]
    pub source_root: PathBuf,
    pub rule: SplitRule,
    pub copies: Vec<PlannedCopy>,
    /// Environment directories matching no keyword.
    pub unassigned: Vec<String>,
}

impl SplitPlan {
    pub fn count(&self, split: Split) -> usize {
        self.copies.iter().filter(|c| c.split == split).count()
    }
}

/// Decide the split of every episode in `index`.
///
/// Fails with [`Error::SplitOverlap`] on the first environment matching
/// both keyword lists.
pub fn plan_split(index: &DatasetIndex, rule: &SplitRule) -> Result<SplitPlan> {
    let mut copies = Vec::new();
    let mut unassigned = Vec::new();

    for env in &index.envs {
        let split = match rule.assign(&env.name)? {
            Some(split) => split,
            None => {
                unassigned.push(env.name.clone());
                continue;
            }
        };
        for episode in &env.episodes {
            copies.push(PlannedCopy {
                split,
                env: env.name.clone(),
                source: episode.path.clone(),
                file_name: episode.file_name.clone(),
            });
        }
    }

    if !unassigned.is_empty() {
        warn!("Unassigned environments: {}", unassigned.join(", "));
    }

    Ok(SplitPlan {
        source_root: index.root.clone(),
        rule: rule.clone(),
        copies,
        unassigned,
    })
}

/// Record of one copied episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub split: Split,
    pub env: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "sizeBytes")]
    pub size_bytes: u64,
    pub sha256: String,
}

/// `split_manifest.json`, written next to the `train/` and `test/` trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitManifest {
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "sourceRoot")]
    pub source_root: PathBuf,
    pub rule: SplitRule,
    pub entries: Vec<ManifestEntry>,
    pub unassigned: Vec<String>,
}

impl SplitManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn count(&self, split: Split) -> usize {
        self.entries.iter().filter(|e| e.split == split).count()
    }
}

/// Copy the planned episodes into `<out_dir>/{train,test}/<env>/`.
///
/// Every destination is checked before the first copy; an existing file or
/// manifest aborts the split with [`Error::AlreadyExists`]. Each copy is
/// verified against the SHA-256 of its source. If any copy fails, the files
/// and env directories written so far are removed again and no manifest is
/// left behind.
pub fn execute_split(plan: &SplitPlan, out_dir: &Path) -> Result<SplitManifest> {
    let paths = DatasetPaths::new(out_dir);

    if paths.manifest_file.exists() {
        return Err(Error::AlreadyExists(paths.manifest_file.clone()));
    }
    let destinations: Vec<PathBuf> = plan
        .copies
        .iter()
        .map(|c| c.split.dir(&paths).join(&c.env).join(&c.file_name))
        .collect();
    if let Some(existing) = destinations.iter().find(|d| d.exists()) {
        return Err(Error::AlreadyExists(existing.clone()));
    }

    paths.ensure_dirs()?;

    let mut written = Written::default();
    let manifest = match copy_all(plan, &destinations, &paths, &mut written) {
        Ok(manifest) => manifest,
        Err(e) => {
            written.roll_back();
            return Err(e);
        }
    };

    info!(
        "Split written to {}: {} train, {} test episodes",
        paths.root.display(),
        manifest.count(Split::Train),
        manifest.count(Split::Test)
    );
    Ok(manifest)
}

fn copy_all(
    plan: &SplitPlan,
    destinations: &[PathBuf],
    paths: &DatasetPaths,
    written: &mut Written,
) -> Result<SplitManifest> {
    let mut entries = Vec::with_capacity(plan.copies.len());
    for (copy, dest) in plan.copies.iter().zip(destinations) {
        if let Some(parent) = dest.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| file_io(parent, e))?;
                written.dirs.push(parent.to_path_buf());
            }
        }
        let source_hash = sha256_file(&copy.source)?;
        // Recorded before copying: a failed copy can leave a partial file.
        written.files.push(dest.clone());
        let size_bytes = std::fs::copy(&copy.source, dest).map_err(|e| file_io(&copy.source, e))?;
        let dest_hash = sha256_file(dest)?;
        if source_hash != dest_hash {
            return Err(Error::Dataset(format!(
                "copy of {} does not match its source",
                copy.source.display()
            )));
        }

        entries.push(ManifestEntry {
            split: copy.split,
            env: copy.env.clone(),
            file_name: copy.file_name.clone(),
            size_bytes,
            sha256: source_hash,
        });
    }

    let manifest = SplitManifest {
        created_at: chrono::Utc::now().to_rfc3339(),
        source_root: plan.source_root.clone(),
        rule: plan.rule.clone(),
        entries,
        unassigned: plan.unassigned.clone(),
    };
    std::fs::write(&paths.manifest_file, serde_json::to_string_pretty(&manifest)?)
        .map_err(|e| file_io(&paths.manifest_file, e))?;
    Ok(manifest)
}

/// Files and directories created by a split in progress.
#[derive(Default)]
struct Written {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

impl Written {
    fn roll_back(&self) {
        for file in &self.files {
            match std::fs::remove_file(file) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove partial copy {}: {}", file.display(), e),
            }
        }
        for dir in self.dirs.iter().rev() {
            if let Err(e) = std::fs::remove_dir(dir) {
                warn!("Failed to remove {}: {}", dir.display(), e);
            }
        }
        info!(
            "Rolled back {} copied files after a failed split",
            self.files.len()
        );
    }
}

fn file_io(path: &Path, source: std::io::Error) -> Error {
    Error::FileIo {
        path: path.to_path_buf(),
        source,
    }
}

/// Hex SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| file_io(path, e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| file_io(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}
