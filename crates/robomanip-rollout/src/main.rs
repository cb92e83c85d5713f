//! rollout-worlds: evaluate a policy checkpoint on every world index.

use std::path::Path;

use robomanip_core::{Error, RolloutConfig};
use robomanip_rollout::{run_plan, usage, ProcessRunner, RolloutArgs, RolloutPlan};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn program_name(argv0: Option<&String>) -> String {
    argv0
        .and_then(|p| Path::new(p).file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "rollout-worlds".to_string())
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; the rollout program owns stdout.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let argv: Vec<String> = std::env::args().collect();
    let program = program_name(argv.first());

    let args = match RolloutArgs::parse(argv.get(1..).unwrap_or(&[])) {
        Ok(args) => args,
        Err(Error::Usage(_)) => {
            eprintln!("{}", usage(&program));
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", usage(&program));
            std::process::exit(1);
        }
    };

    let config = RolloutConfig::from_env()?;
    info!(
        "Checkpoint: {}, task: {}, skip: {}",
        args.checkpoint_dir.display(),
        args.task,
        args.skip
    );

    let plan = RolloutPlan::new(args, &config);
    let summary = run_plan(&plan, &mut ProcessRunner);

    std::process::exit(summary.exit_code());
}
