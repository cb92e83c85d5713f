//! robomanip-data: inspect and split recorded teleoperation datasets.

use std::path::{Path, PathBuf};

use robomanip_dataset::{execute_split, plan_split, scan_dataset, NpzArchive, SplitRule};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: robomanip-data <command>

Commands:
  scan <dataset-root>                                  List environments and episodes
  inspect <episode.npz>                                List arrays of an episode
  split <raw-root> <out-dir> --train K1,K2 --test K3   Split episodes by env-name keywords
  help                                                 Show this help message";

fn usage_error(message: &str) -> ! {
    eprintln!("{}", message);
    eprintln!();
    eprintln!("{}", USAGE);
    std::process::exit(1);
}

fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

fn run_scan(root: &Path) -> anyhow::Result<()> {
    let index = scan_dataset(root)?;
    for env in &index.envs {
        let world = env
            .world_idx
            .map(|w| format!("world {}", w))
            .unwrap_or_else(|| "no world index".to_string());
        println!("{:<16} {:>5} episodes  ({})", env.name, env.episodes.len(), world);
    }
    println!(
        "{} environments, {} episodes",
        index.envs.len(),
        index.episode_count()
    );
    Ok(())
}

fn run_inspect(path: &Path) -> anyhow::Result<()> {
    let mut npz = NpzArchive::open(path)?;
    for summary in npz.summaries()? {
        println!("{}", summary);
    }
    if let Some(world_idx) = npz.world_idx()? {
        println!("world_idx = {}", world_idx);
    }
    Ok(())
}

fn run_split(args: &[String]) -> anyhow::Result<()> {
    let mut positional = Vec::new();
    let mut train = Vec::new();
    let mut test = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--train" => match iter.next() {
                Some(v) => train.extend(parse_keywords(v)),
                None => usage_error("--train needs a value"),
            },
            "--test" => match iter.next() {
                Some(v) => test.extend(parse_keywords(v)),
                None => usage_error("--test needs a value"),
            },
            _ => positional.push(PathBuf::from(arg)),
        }
    }
    if positional.len() != 2 {
        usage_error("split needs <raw-root> and <out-dir>");
    }

    let rule = SplitRule::new(train, test)?;
    let index = scan_dataset(&positional[0])?;
    let plan = plan_split(&index, &rule)?;
    info!(
        "Splitting {} episodes from {}",
        plan.copies.len(),
        index.root.display()
    );

    let manifest = execute_split(&plan, &positional[1])?;
    println!(
        "train: {}  test: {}  unassigned envs: {}",
        manifest.count(robomanip_dataset::Split::Train),
        manifest.count(robomanip_dataset::Split::Test),
        if manifest.unassigned.is_empty() {
            "-".to_string()
        } else {
            manifest.unassigned.join(", ")
        }
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        usage_error("Missing command.");
    }

    match args[1].as_str() {
        "scan" => match args.get(2) {
            Some(root) => run_scan(Path::new(root)),
            None => usage_error("scan needs <dataset-root>"),
        },
        "inspect" => match args.get(2) {
            Some(file) => run_inspect(Path::new(file)),
            None => usage_error("inspect needs <episode.npz>"),
        },
        "split" => run_split(&args[2..]),
        "--help" | "-h" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => usage_error(&format!(
            "Unknown command: {}. Use 'robomanip-data help' for usage.",
            other
        )),
    }
}
