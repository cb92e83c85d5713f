//! Positional command-line arguments of the rollout driver.

use std::path::PathBuf;

use robomanip_core::{Error, Result};
use serde::Serialize;
use tracing::warn;

/// Task evaluated when none is given.
pub const DEFAULT_TASK: &str = "MujocoUR5eCable";

/// Frame skip used when none is given.
pub const DEFAULT_SKIP: u32 = 3;

/// Parsed `CKPT_DIR [TASK_NAME] [SKIP]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolloutArgs {
    pub checkpoint_dir: PathBuf,
    pub task: String,
    pub skip: u32,
}

impl RolloutArgs {
    /// Parse positional arguments, excluding the program name.
    ///
    /// Only the checkpoint directory is required. Its existence is not
    /// checked; the rollout program reports a bad checkpoint itself.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let checkpoint_dir = match args.first() {
            Some(dir) => PathBuf::from(dir.as_ref()),
            None => return Err(Error::Usage("missing checkpoint directory".into())),
        };

        let task = args
            .get(1)
            .map(|t| t.as_ref().to_string())
            .unwrap_or_else(|| DEFAULT_TASK.to_string());

        let skip = match args.get(2) {
            Some(raw) => raw.as_ref().parse::<u32>().map_err(|_| {
                Error::InvalidArgument(format!(
                    "skip must be a non-negative integer, got '{}'",
                    raw.as_ref()
                ))
            })?,
            None => DEFAULT_SKIP,
        };

        if args.len() > 3 {
            let extra: Vec<&str> = args[3..].iter().map(|a| a.as_ref()).collect();
            warn!("Ignoring extra arguments: {}", extra.join(" "));
        }

        Ok(Self {
            checkpoint_dir,
            task,
            skip,
        })
    }
}

/// Usage text for the driver, naming the program as invoked.
pub fn usage(program: &str) -> String {
    format!(
        "Usage: {} CKPT_DIR [TASK_NAME] [SKIP]\n\
         \n\
         Runs the rollout program for TASK_NAME (default: {}) once per world index,\n\
         with frame skip SKIP (default: {}).",
        program, DEFAULT_TASK, DEFAULT_SKIP
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_is_usage_error() {
        let err = RolloutArgs::parse::<&str>(&[]).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn test_defaults_with_checkpoint_only() {
        let args = RolloutArgs::parse(&["/tmp/run1"]).unwrap();
        assert_eq!(args.checkpoint_dir, PathBuf::from("/tmp/run1"));
        assert_eq!(args.task, "MujocoUR5eCable");
        assert_eq!(args.skip, 3);
    }

    #[test]
    fn test_all_arguments_override_defaults() {
        let args = RolloutArgs::parse(&["ckpt/act", "IsaacUR5eChain", "6"]).unwrap();
        assert_eq!(args.checkpoint_dir, PathBuf::from("ckpt/act"));
        assert_eq!(args.task, "IsaacUR5eChain");
        assert_eq!(args.skip, 6);
    }

    #[test]
    fn test_task_only_override() {
        let args = RolloutArgs::parse(&["ckpt", "MujocoUR5eParticle"]).unwrap();
        assert_eq!(args.task, "MujocoUR5eParticle");
        assert_eq!(args.skip, DEFAULT_SKIP);
    }

    #[test]
    fn test_invalid_skip() {
        let err = RolloutArgs::parse(&["ckpt", "MujocoUR5eCable", "three"]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = RolloutArgs::parse(&["ckpt", "MujocoUR5eCable", "-1"]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_extra_arguments_ignored() {
        let args = RolloutArgs::parse(&["ckpt", "MujocoUR5eCable", "2", "extra"]).unwrap();
        assert_eq!(args.skip, 2);
    }

    #[test]
    fn test_usage_names_program() {
        let text = usage("rollout-worlds");
        assert!(text.starts_with("Usage: rollout-worlds CKPT_DIR"));
        assert!(text.contains("MujocoUR5eCable"));
    }
}
