//! Episode archives: `.npz` files are zip archives with one `<key>.npy`
//! member per recorded stream (`time`, `joint_pos`, `front_rgb_image`, …)
//! plus scalar metadata such as `world_idx`.

use std::fs::File;
use std::path::{Path, PathBuf};

use ndarray::ArrayD;
use robomanip_core::{Error, Result};
use serde::Serialize;
use tracing::debug;

use crate::npy;

/// Name, type and shape of one array in an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArraySummary {
    pub name: String,
    pub dtype: String,
    pub shape: Vec<usize>,
}

impl std::fmt::Display for ArraySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dims: Vec<String> = self.shape.iter().map(|d| d.to_string()).collect();
        write!(f, "{} {} [{}]", self.name, self.dtype, dims.join(", "))
    }
}

/// An opened `.npz` archive.
pub struct NpzArchive {
    path: PathBuf,
    archive: zip::ZipArchive<File>,
}

impl NpzArchive {
    /// Open an archive for reading. Episode files are never opened for writing.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let archive = zip::ZipArchive::new(file)
            .map_err(|e| Error::Archive(format!("{}: {}", path.display(), e)))?;
        debug!("Opened {} ({} members)", path.display(), archive.len());
        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Array names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .archive
            .file_names()
            .filter_map(|n| n.strip_suffix(".npy"))
            .map(|n| n.to_string())
            .collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.archive.index_for_name(&member_name(name)).is_some()
    }

    /// Headers of every array, sorted by name. Only headers are read.
    pub fn summaries(&mut self) -> Result<Vec<ArraySummary>> {
        let mut summaries = Vec::new();
        for i in 0..self.archive.len() {
            let mut entry = self
                .archive
                .by_index(i)
                .map_err(|e| Error::Archive(format!("{}: {}", self.path.display(), e)))?;
            let name = match entry.name().strip_suffix(".npy") {
                Some(n) => n.to_string(),
                None => continue,
            };
            let header = npy::read_header(&mut entry)
                .map_err(|e| Error::Npy(format!("{}/{}: {}", self.path.display(), name, e)))?;
            summaries.push(ArraySummary {
                name,
                dtype: header.dtype.to_string(),
                shape: header.shape,
            });
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    /// Decode one numeric array.
    pub fn read_array(&mut self, name: &str) -> Result<ArrayD<f64>> {
        let mut entry = match self.archive.by_name(&member_name(name)) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(Error::Dataset(format!(
                    "{} has no array '{}'",
                    self.path.display(),
                    name
                )))
            }
            Err(e) => return Err(Error::Archive(format!("{}: {}", self.path.display(), e))),
        };
        npy::read_array(&mut entry)
    }

    /// World index recorded in the episode, if the archive carries one.
    pub fn world_idx(&mut self) -> Result<Option<u32>> {
        if !self.contains("world_idx") {
            return Ok(None);
        }
        let array = self.read_array("world_idx")?;
        if array.len() != 1 {
            return Err(Error::Dataset(format!(
                "{}: world_idx has {} elements, expected 1",
                self.path.display(),
                array.len()
            )));
        }
        let value = array.iter().next().copied().unwrap_or(f64::NAN);
        if !(value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64) {
            return Err(Error::Dataset(format!(
                "{}: invalid world_idx {}",
                self.path.display(),
                value
            )));
        }
        Ok(Some(value as u32))
    }
}

fn member_name(name: &str) -> String {
    format!("{}.npy", name)
}

/// Build an in-memory `.npz` from `(name, npy bytes)` pairs. Test fixtures only.
#[cfg(test)]
pub(crate) fn build_test_npz(arrays: &[(&str, Vec<u8>)]) -> Vec<u8> {
    use std::io::Write;
    let buf = std::io::Cursor::new(Vec::new());
    let mut zip = zip::ZipWriter::new(buf);
    let options = zip::write::SimpleFileOptions::default();
    for (name, bytes) in arrays {
        zip.start_file(member_name(name), options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// A small episode with a time axis, joint positions and its world index.
#[cfg(test)]
pub(crate) fn build_test_episode(world_idx: i64, steps: usize) -> Vec<u8> {
    let time: Vec<f64> = (0..steps).map(|t| t as f64 * 0.02).collect();
    let joints: Vec<f64> = (0..steps * 7).map(|v| v as f64).collect();
    build_test_npz(&[
        ("time", npy::encode_f64(&[steps], &time)),
        ("joint_pos", npy::encode_f64(&[steps, 7], &joints)),
        ("world_idx", npy::encode_i64(&[], &[world_idx])),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_episode(dir: &Path, name: &str, bytes: Vec<u8>) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_names_and_summaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_episode(dir.path(), "ep.npz", build_test_episode(2, 5));

        let mut npz = NpzArchive::open(&path).unwrap();
        assert_eq!(npz.names(), vec!["joint_pos", "time", "world_idx"]);
        assert!(npz.contains("time"));
        assert!(!npz.contains("wrench"));

        let summaries = npz.summaries().unwrap();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].name, "joint_pos");
        assert_eq!(summaries[0].dtype, "float64");
        assert_eq!(summaries[0].shape, vec![5, 7]);
        assert_eq!(summaries[2].to_string(), "world_idx int64 []");
    }

    #[test]
    fn test_read_array_and_world_idx() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_episode(dir.path(), "ep.npz", build_test_episode(4, 3));

        let mut npz = NpzArchive::open(&path).unwrap();
        let joints = npz.read_array("joint_pos").unwrap();
        assert_eq!(joints.shape(), &[3, 7]);
        assert_eq!(joints[[1, 0]], 7.0);
        assert_eq!(npz.world_idx().unwrap(), Some(4));

        let err = npz.read_array("wrench").unwrap_err();
        assert!(matches!(err, Error::Dataset(_)));
    }

    #[test]
    fn test_missing_world_idx() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = build_test_npz(&[("time", npy::encode_f64(&[2], &[0.0, 0.1]))]);
        let path = write_episode(dir.path(), "ep.npz", bytes);

        let mut npz = NpzArchive::open(&path).unwrap();
        assert_eq!(npz.world_idx().unwrap(), None);
    }

    #[test]
    fn test_negative_world_idx_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = build_test_npz(&[("world_idx", npy::encode_i64(&[], &[-1]))]);
        let path = write_episode(dir.path(), "ep.npz", bytes);

        let mut npz = NpzArchive::open(&path).unwrap();
        assert!(npz.world_idx().is_err());
    }

    #[test]
    fn test_oversized_world_idx_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = build_test_npz(&[("world_idx", npy::encode("|u1", &[1 << 62], false, &[3]))]);
        let path = write_episode(dir.path(), "ep.npz", bytes);

        let mut npz = NpzArchive::open(&path).unwrap();
        assert!(npz.world_idx().is_err());
    }

    #[test]
    fn test_summaries_with_structured_array() {
        let dir = tempfile::tempdir().unwrap();
        let descr = "[('stamp', '<f8'), ('frame', '<u4')]";
        let bytes = build_test_npz(&[
            ("events", npy::encode_raw(descr, &[2], false, &[0u8; 24])),
            ("time", npy::encode_f64(&[2], &[0.0, 0.1])),
        ]);
        let path = write_episode(dir.path(), "ep.npz", bytes);

        let mut npz = NpzArchive::open(&path).unwrap();
        let summaries = npz.summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name, "events");
        assert_eq!(summaries[0].dtype, descr);
        assert_eq!(summaries[0].shape, vec![2]);
        assert!(npz.read_array("events").is_err());
    }

    #[test]
    fn test_open_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = NpzArchive::open(&dir.path().join("missing.npz")).err().unwrap();
        assert!(matches!(missing, Error::NotFound(_)));

        let path = write_episode(dir.path(), "broken.npz", b"not a zip".to_vec());
        let broken = NpzArchive::open(&path).err().unwrap();
        assert!(matches!(broken, Error::Archive(_)));
    }
}
