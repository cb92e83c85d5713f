//! Rollout plan: one external invocation per world index.

use robomanip_core::RolloutConfig;
use serde::Serialize;

use crate::args::RolloutArgs;

/// World indices every checkpoint is evaluated on, in order.
pub const WORLD_INDICES: [u32; 6] = [0, 1, 2, 3, 4, 5];

/// Screen position of the policy window, passed to every invocation.
pub const WIN_XY_POLICY: (u32, u32) = (0, 700);

/// A single external command of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    #[serde(rename = "worldIdx")]
    pub world_idx: u32,
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Whether this invocation asks the rollout program to pause before starting.
    pub fn waits_before_start(&self) -> bool {
        self.args.iter().any(|a| a == "--wait_before_start")
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// The ordered list of invocations for one checkpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RolloutPlan {
    pub args: RolloutArgs,
    pub invocations: Vec<Invocation>,
}

impl RolloutPlan {
    /// Build the plan for `args`. Only the first world gets `--wait_before_start`
    /// so the operator can prepare the scene once.
    pub fn new(args: RolloutArgs, config: &RolloutConfig) -> Self {
        let script = config.script_for(&args.task);
        let invocations = WORLD_INDICES
            .iter()
            .enumerate()
            .map(|(i, &world_idx)| {
                let mut argv = vec![
                    script.to_string_lossy().to_string(),
                    "--checkpoint".to_string(),
                    args.checkpoint_dir.to_string_lossy().to_string(),
                    "--skip".to_string(),
                    args.skip.to_string(),
                    "--world_idx".to_string(),
                    world_idx.to_string(),
                    "--win_xy_policy".to_string(),
                    WIN_XY_POLICY.0.to_string(),
                    WIN_XY_POLICY.1.to_string(),
                ];
                if i == 0 {
                    argv.push("--wait_before_start".to_string());
                }
                Invocation {
                    world_idx,
                    program: config.interpreter.clone(),
                    args: argv,
                }
            })
            .collect();

        Self { args, invocations }
    }

    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }

    /// The plan as pretty-printed JSON, for logs and dry runs.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn plan_for(argv: &[&str]) -> RolloutPlan {
        let args = RolloutArgs::parse(argv).unwrap();
        RolloutPlan::new(args, &RolloutConfig::default())
    }

    fn flag_value<'a>(inv: &'a Invocation, flag: &str) -> &'a str {
        let pos = inv.args.iter().position(|a| a == flag).unwrap();
        &inv.args[pos + 1]
    }

    #[test]
    fn test_six_invocations_in_world_order() {
        let plan = plan_for(&["/tmp/run1"]);
        assert_eq!(plan.len(), 6);
        let worlds: Vec<String> = plan
            .invocations
            .iter()
            .map(|inv| flag_value(inv, "--world_idx").to_string())
            .collect();
        assert_eq!(worlds, vec!["0", "1", "2", "3", "4", "5"]);
        let ids: Vec<u32> = plan.invocations.iter().map(|inv| inv.world_idx).collect();
        assert_eq!(ids, WORLD_INDICES.to_vec());
    }

    #[test]
    fn test_only_first_waits() {
        let plan = plan_for(&["/tmp/run1"]);
        assert!(plan.invocations[0].waits_before_start());
        for inv in &plan.invocations[1..] {
            assert!(!inv.waits_before_start());
        }
    }

    #[test]
    fn test_window_position_on_every_invocation() {
        let plan = plan_for(&["/tmp/run1", "IsaacUR5eChain", "5"]);
        for inv in &plan.invocations {
            let pos = inv.args.iter().position(|a| a == "--win_xy_policy").unwrap();
            assert_eq!(&inv.args[pos + 1..pos + 3], &["0", "700"]);
        }
    }

    #[test]
    fn test_defaults_flow_into_commands() {
        let plan = plan_for(&["/tmp/run1"]);
        let first = &plan.invocations[0];
        assert_eq!(first.program, "python");
        assert_eq!(first.args[0], "./bin/rollout/RolloutActMujocoUR5eCable.py");
        assert_eq!(flag_value(first, "--checkpoint"), "/tmp/run1");
        assert_eq!(flag_value(first, "--skip"), "3");
    }

    #[test]
    fn test_commands_differ_only_in_world_and_wait() {
        let plan = plan_for(&["/tmp/run1"]);
        let strip = |inv: &Invocation| -> Vec<String> {
            let mut args = inv.args.clone();
            args.retain(|a| a != "--wait_before_start");
            let pos = args.iter().position(|a| a == "--world_idx").unwrap();
            args.drain(pos..pos + 2);
            args
        };
        let base = strip(&plan.invocations[0]);
        for inv in &plan.invocations[1..] {
            assert_eq!(strip(inv), base);
        }
    }

    #[test]
    fn test_overrides_flow_into_commands() {
        let config = RolloutConfig {
            interpreter: "python3".into(),
            script_dir: PathBuf::from("/opt/act/bin/rollout"),
            policy: "Act".into(),
        };
        let args = RolloutArgs::parse(&["ckpt", "IsaacUR5eChain", "1"]).unwrap();
        let plan = RolloutPlan::new(args, &config);
        let last = plan.invocations.last().unwrap();
        assert_eq!(
            last.to_string(),
            "python3 /opt/act/bin/rollout/RolloutActIsaacUR5eChain.py --checkpoint ckpt \
             --skip 1 --world_idx 5 --win_xy_policy 0 700"
        );
    }

    #[test]
    fn test_plan_json() {
        let plan = plan_for(&["/tmp/run1", "MujocoUR5eRing", "5"]);
        let value: serde_json::Value = serde_json::from_str(&plan.to_json().unwrap()).unwrap();
        assert_eq!(value["args"]["task"], "MujocoUR5eRing");
        assert_eq!(value["args"]["skip"], 5);
        let invocations = value["invocations"].as_array().unwrap();
        assert_eq!(invocations.len(), 6);
        assert_eq!(invocations[3]["worldIdx"], 3);
        assert_eq!(invocations[0]["program"], "python");
    }
}
