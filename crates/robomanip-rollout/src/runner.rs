//! Blocking execution of a rollout plan.

use std::process::{Command, ExitStatus};

use robomanip_core::{Error, Result};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::plan::{Invocation, RolloutPlan};

/// Exit code recorded when the rollout program could not be found.
const EXIT_NOT_FOUND: i32 = 127;
/// Exit code recorded when the rollout program could not be executed.
const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Runs one invocation to completion and returns its exit code.
pub trait CommandRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<i32>;
}

/// Spawns the real process with inherited stdio and waits for it.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<i32> {
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .status()?;
        Ok(exit_code(status))
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => code,
        // Killed by a signal: report it the way a shell does.
        None => 128 + status.signal().unwrap_or(0),
    }
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationResult {
    #[serde(rename = "worldIdx")]
    pub world_idx: u32,
    #[serde(rename = "exitCode")]
    pub exit_code: i32,
}

/// Outcomes of all invocations, in execution order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RolloutSummary {
    pub results: Vec<InvocationResult>,
}

impl RolloutSummary {
    /// Exit code of the last invocation, 0 if nothing ran.
    pub fn exit_code(&self) -> i32 {
        self.results.last().map(|r| r.exit_code).unwrap_or(0)
    }

    /// Number of invocations that exited non-zero.
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.exit_code != 0).count()
    }

    /// Compact JSON of the per-world results.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Run every invocation of the plan in order.
///
/// A failing or unspawnable invocation never stops the loop; there is no
/// retry and no timeout.
pub fn run_plan<R: CommandRunner + ?Sized>(plan: &RolloutPlan, runner: &mut R) -> RolloutSummary {
    let mut summary = RolloutSummary::default();
    match plan.to_json() {
        Ok(json) => debug!("Rollout plan: {}", json),
        Err(e) => warn!("Failed to serialize rollout plan: {}", e),
    }

    for invocation in &plan.invocations {
        info!("[world {}] {}", invocation.world_idx, invocation);

        let exit_code = match runner.run(invocation) {
            Ok(code) => {
                if code != 0 {
                    warn!(
                        "[world {}] rollout exited with status {}",
                        invocation.world_idx, code
                    );
                }
                code
            }
            Err(e) => {
                error!(
                    "[world {}] failed to run {}: {}",
                    invocation.world_idx, invocation.program, e
                );
                spawn_failure_code(&e)
            }
        };

        summary.results.push(InvocationResult {
            world_idx: invocation.world_idx,
            exit_code,
        });
    }

    info!(
        "Rollout finished: {} worlds, {} failed",
        summary.results.len(),
        summary.failures()
    );
    match summary.to_json() {
        Ok(json) => info!("Rollout results: {}", json),
        Err(e) => warn!("Failed to serialize rollout results: {}", e),
    }
    summary
}

fn spawn_failure_code(e: &Error) -> i32 {
    match e {
        Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => EXIT_NOT_FOUND,
        Error::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied => EXIT_NOT_EXECUTABLE,
        _ => 1,
    }
}
