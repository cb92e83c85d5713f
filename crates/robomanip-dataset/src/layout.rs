//! Naming conventions of the on-disk dataset.
//!
//! Episodes are written as
//! `<demo>_<YYYYmmdd_HHMMSS>/env<world>/<demo>_env<world>_<data_idx:03>[_<label>].npz`.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use robomanip_core::{Error, Result};
use serde::{Deserialize, Serialize};

static EPISODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?P<demo>.+)_env(?P<world>\d+)_(?P<idx>\d{3,})",
        r"(?:_(?P<label>nominal|augmented\d{3,}))?\.npz$",
    ))
    .unwrap()
});

/// Label distinguishing the representative environment from fluctuated
/// copies captured in the same vectorised session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeLabel {
    Nominal,
    Augmented(u32),
}

impl std::fmt::Display for EpisodeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nominal => write!(f, "nominal"),
            Self::Augmented(k) => write!(f, "augmented{:03}", k),
        }
    }
}

impl std::str::FromStr for EpisodeLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "nominal" {
            return Ok(Self::Nominal);
        }
        s.strip_prefix("augmented")
            .and_then(|k| k.parse::<u32>().ok())
            .map(Self::Augmented)
            .ok_or_else(|| Error::Dataset(format!("unknown episode label '{}'", s)))
    }
}

/// Parsed episode file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeName {
    pub demo: String,
    #[serde(rename = "worldIdx")]
    pub world_idx: u32,
    #[serde(rename = "dataIdx")]
    pub data_idx: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<EpisodeLabel>,
}

impl EpisodeName {
    /// Parse a file name (not a path) such as `UR5eCable_env2_007_nominal.npz`.
    pub fn parse(file_name: &str) -> Result<Self> {
        let caps = EPISODE_RE
            .captures(file_name)
            .ok_or_else(|| Error::Dataset(format!("not an episode file name: '{}'", file_name)))?;

        let number = |name: &str| -> Result<u32> {
            caps[name]
                .parse()
                .map_err(|_| Error::Dataset(format!("index out of range in '{}'", file_name)))
        };

        let label = match caps.name("label") {
            Some(m) => Some(m.as_str().parse()?),
            None => None,
        };

        Ok(Self {
            demo: caps["demo"].to_string(),
            world_idx: number("world")?,
            data_idx: number("idx")?,
            label,
        })
    }

    /// Relative path of this episode inside a session directory.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(env_dir_name(self.world_idx)).join(self.to_string())
    }
}

impl std::fmt::Display for EpisodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_env{}_{:03}", self.demo, self.world_idx, self.data_idx)?;
        if let Some(label) = &self.label {
            write!(f, "_{}", label)?;
        }
        write!(f, ".npz")
    }
}

/// Directory name for a world index (`env3`).
pub fn env_dir_name(world_idx: u32) -> String {
    format!("env{}", world_idx)
}

/// World index encoded in an environment directory name, if any.
pub fn parse_env_dir(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("env")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Session directory name (`<demo>_<YYYYmmdd_HHMMSS>`).
pub fn session_dir_name(demo: &str, started_at: &NaiveDateTime) -> String {
    format!("{}_{}", demo, started_at.format("%Y%m%d_%H%M%S"))
}

/// Full path of an episode under a session directory.
pub fn episode_path(session_dir: &Path, name: &EpisodeName) -> PathBuf {
    session_dir.join(name.relative_path())
}

/// World index for the `data_idx`-th capture when cycling through `world_list`.
pub fn world_idx_for(data_idx: u32, world_list: &[u32]) -> Option<u32> {
    if world_list.is_empty() {
        return None;
    }
    Some(world_list[data_idx as usize % world_list.len()])
}

/// Labels for the episodes of one vectorised capture.
///
/// Failed environments get `None` (nothing is saved); the representative
/// environment is `Nominal` and the others are numbered in order among the
/// successful ones.
pub fn labels_for_envs(success: &[bool], rep_env_idx: usize) -> Vec<Option<EpisodeLabel>> {
    let mut aug_idx = 0;
    success
        .iter()
        .enumerate()
        .map(|(env_idx, &ok)| {
            if !ok {
                return None;
            }
            if env_idx == rep_env_idx {
                Some(EpisodeLabel::Nominal)
            } else {
                let label = EpisodeLabel::Augmented(aug_idx);
                aug_idx += 1;
                Some(label)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_plain_episode() {
        let name = EpisodeName::parse("UR5eCable_env3_012.npz").unwrap();
        assert_eq!(name.demo, "UR5eCable");
        assert_eq!(name.world_idx, 3);
        assert_eq!(name.data_idx, 12);
        assert_eq!(name.label, None);
        assert_eq!(name.to_string(), "UR5eCable_env3_012.npz");
    }

    #[test]
    fn test_parse_labelled_episode() {
        let name = EpisodeName::parse("MujocoUR5eCable_env0_004_augmented002.npz").unwrap();
        assert_eq!(name.demo, "MujocoUR5eCable");
        assert_eq!(name.label, Some(EpisodeLabel::Augmented(2)));
        assert_eq!(name.to_string(), "MujocoUR5eCable_env0_004_augmented002.npz");

        let name = EpisodeName::parse("MujocoUR5eCable_env5_000_nominal.npz").unwrap();
        assert_eq!(name.label, Some(EpisodeLabel::Nominal));
    }

    #[test]
    fn test_demo_name_with_underscores() {
        let name = EpisodeName::parse("ur5e_cable_routing_env1_100.npz").unwrap();
        assert_eq!(name.demo, "ur5e_cable_routing");
        assert_eq!(name.world_idx, 1);
        assert_eq!(name.data_idx, 100);
    }

    #[test]
    fn test_reject_malformed_names() {
        for bad in [
            "UR5eCable_env3_12.npz",
            "UR5eCable_env3_012.npy",
            "UR5eCable_world3_012.npz",
            "UR5eCable_env3_012_unknown.npz",
            "env3_012.npz",
        ] {
            assert!(EpisodeName::parse(bad).is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_env_dir_names() {
        assert_eq!(env_dir_name(4), "env4");
        assert_eq!(parse_env_dir("env4"), Some(4));
        assert_eq!(parse_env_dir("env10"), Some(10));
        assert_eq!(parse_env_dir("env"), None);
        assert_eq!(parse_env_dir("env1a"), None);
        assert_eq!(parse_env_dir("test_env1"), None);
    }

    #[test]
    fn test_session_and_episode_paths() {
        let started = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 5, 30)
            .unwrap();
        let session = session_dir_name("MujocoUR5eCable", &started);
        assert_eq!(session, "MujocoUR5eCable_20240601_090530");

        let name = EpisodeName {
            demo: "MujocoUR5eCable".into(),
            world_idx: 2,
            data_idx: 7,
            label: Some(EpisodeLabel::Nominal),
        };
        let path = episode_path(&Path::new("teleop_data").join(&session), &name);
        assert_eq!(
            path,
            Path::new("teleop_data/MujocoUR5eCable_20240601_090530/env2")
                .join("MujocoUR5eCable_env2_007_nominal.npz")
        );
    }

    #[test]
    fn test_world_idx_cycles() {
        let worlds = [0, 2, 4];
        let seq: Vec<u32> = (0..7).filter_map(|d| world_idx_for(d, &worlds)).collect();
        assert_eq!(seq, vec![0, 2, 4, 0, 2, 4, 0]);
        assert_eq!(world_idx_for(3, &[]), None);
    }

    #[test]
    fn test_labels_for_envs() {
        let labels = labels_for_envs(&[true, false, true, true], 2);
        assert_eq!(
            labels,
            vec![
                Some(EpisodeLabel::Augmented(0)),
                None,
                Some(EpisodeLabel::Nominal),
                Some(EpisodeLabel::Augmented(1)),
            ]
        );
    }
}
