//! Rollout driver: evaluates one policy checkpoint across the fixed set of
//! world indices by invoking the external per-task rollout program once per
//! world, sequentially.

pub mod args;
pub mod plan;
pub mod runner;

pub use args::{usage, RolloutArgs, DEFAULT_SKIP, DEFAULT_TASK};
pub use plan::{Invocation, RolloutPlan, WIN_XY_POLICY, WORLD_INDICES};
pub use runner::{run_plan, CommandRunner, InvocationResult, ProcessRunner, RolloutSummary};
