//! Dataset directory scanning.

use std::path::{Path, PathBuf};

use robomanip_core::{Error, Result};
use serde::Serialize;
use tracing::{debug, warn};

use crate::layout::{parse_env_dir, EpisodeName};

/// One captured episode file.
#[derive(Debug, Clone, Serialize)]
pub struct Episode {
    pub path: PathBuf,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "sizeBytes")]
    pub size_bytes: u64,
    /// Parsed name, when the file follows the capture naming convention.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<EpisodeName>,
}

/// An environment directory and its episodes, sorted by file name.
#[derive(Debug, Clone, Serialize)]
pub struct EnvDir {
    pub name: String,
    pub path: PathBuf,
    #[serde(rename = "worldIdx")]
    pub world_idx: Option<u32>,
    pub episodes: Vec<Episode>,
}

/// Everything found under a dataset root.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetIndex {
    pub root: PathBuf,
    pub envs: Vec<EnvDir>,
}

impl DatasetIndex {
    pub fn episode_count(&self) -> usize {
        self.envs.iter().map(|e| e.episodes.len()).sum()
    }

    pub fn env(&self, name: &str) -> Option<&EnvDir> {
        self.envs.iter().find(|e| e.name == name)
    }
}

/// Scan `root` for environment directories holding `.npz` episodes.
///
/// Environment directories are ordered by world index (`env2` before
/// `env10`), then by name for directories without one. Non-`.npz` files,
/// hidden entries and nested directories are ignored.
pub fn scan_dataset(root: &Path) -> Result<DatasetIndex> {
    if !root.is_dir() {
        return Err(Error::NotFound(root.to_path_buf()));
    }

    let mut envs = Vec::new();
    for entry in dir_entries(root)? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !path.is_dir() {
            continue;
        }

        let episodes = scan_env_dir(&path)?;
        debug!("{}: {} episodes", name, episodes.len());
        envs.push(EnvDir {
            world_idx: parse_env_dir(&name),
            name,
            path,
            episodes,
        });
    }

    envs.sort_by(|a, b| match (a.world_idx, b.world_idx) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.name.cmp(&b.name)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    });

    Ok(DatasetIndex {
        root: root.to_path_buf(),
        envs,
    })
}

/// Entries of `dir`. Unreadable entries are logged and skipped.
fn dir_entries(dir: &Path) -> Result<Vec<std::fs::DirEntry>> {
    let read_dir = std::fs::read_dir(dir).map_err(|source| Error::FileIo {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut entries = Vec::new();
    for entry in read_dir {
        match entry {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("Skipping unreadable entry in {}: {}", dir.display(), e),
        }
    }
    Ok(entries)
}

fn scan_env_dir(dir: &Path) -> Result<Vec<Episode>> {
    let mut episodes = Vec::new();
    for entry in dir_entries(dir)? {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().to_string();
        if file_name.starts_with('.') || !file_name.ends_with(".npz") || !path.is_file() {
            continue;
        }

        // Follows symlinks, unlike DirEntry::metadata.
        let size_bytes = match std::fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!("Cannot stat {}: {}; recording size 0", path.display(), e);
                0
            }
        };
        let name = match EpisodeName::parse(&file_name) {
            Ok(name) => Some(name),
            Err(_) => {
                debug!("{} does not follow the episode naming convention", path.display());
                None
            }
        };
        if let (Some(parsed), Some(dir_world)) = (
            &name,
            dir.file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_env_dir),
        ) {
            if parsed.world_idx != dir_world {
                warn!(
                    "{} is named for world {} but stored under env{}",
                    path.display(),
                    parsed.world_idx,
                    dir_world
                );
            }
        }

        episodes.push(Episode {
            path,
            file_name,
            size_bytes,
            name,
        });
    }
    episodes.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(episodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npz::build_test_episode;

    fn touch(path: &Path, bytes: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_scan_orders_envs_by_world() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for world in [10, 2, 0] {
            let name = format!("Cable_env{}_000.npz", world);
            touch(
                &root.join(format!("env{}", world)).join(name),
                &build_test_episode(world as i64, 2),
            );
        }
        std::fs::create_dir_all(root.join("calibration")).unwrap();

        let index = scan_dataset(root).unwrap();
        let names: Vec<&str> = index.envs.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["env0", "env2", "env10", "calibration"]);
        assert_eq!(index.envs[2].world_idx, Some(10));
        assert_eq!(index.envs[3].world_idx, None);
        assert_eq!(index.episode_count(), 3);
    }

    #[test]
    fn test_scan_filters_and_sorts_episodes() {
        let dir = tempfile::tempdir().unwrap();
        let env = dir.path().join("env1");
        touch(&env.join("Cable_env1_002.npz"), b"x");
        touch(&env.join("Cable_env1_000_nominal.npz"), b"xy");
        touch(&env.join("notes.txt"), b"ignored");
        touch(&env.join(".Cable_env1_003.npz"), b"hidden");
        touch(&env.join("manual_capture.npz"), b"xyz");
        std::fs::create_dir_all(env.join("nested.npz")).unwrap();

        let index = scan_dataset(dir.path()).unwrap();
        let env = index.env("env1").unwrap();
        let files: Vec<&str> = env.episodes.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(
            files,
            vec!["Cable_env1_000_nominal.npz", "Cable_env1_002.npz", "manual_capture.npz"]
        );
        assert_eq!(env.episodes[0].size_bytes, 2);
        assert!(env.episodes[0].name.is_some());
        assert!(env.episodes[2].name.is_none());
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_dataset(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_follows_symlinked_episodes() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("shared/Cable_env0_000.npz");
        touch(&shared, &[7u8; 300]);
        let env = dir.path().join("raw/env0");
        std::fs::create_dir_all(&env).unwrap();
        std::os::unix::fs::symlink(&shared, env.join("Cable_env0_000.npz")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.npz"), env.join("Cable_env0_001.npz"))
            .unwrap();

        let index = scan_dataset(&dir.path().join("raw")).unwrap();
        let env = index.env("env0").unwrap();
        assert_eq!(env.episodes.len(), 1);
        assert_eq!(env.episodes[0].size_bytes, 300);
    }
}
